//! Exact-count and delimiter-bounded reads over a [`ByteStream`].

use std::marker::PhantomData;

use super::ByteStream;
use crate::error::{Error, Result};

const CHUNK: usize = 1024;

/// Buffered reader: whatever a read pulls in beyond what the caller
/// asked for stays in the carry-over buffer for the next call.
pub struct ByteReader<'a, S: ByteStream> {
    stream: &'a mut S,
    buffer: Vec<u8>,
}

impl<'a, S: ByteStream> ByteReader<'a, S> {
    /// Wraps `stream`.
    pub fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Fills `buf` completely, or fails with [`Error::Eof`] if the peer
    /// closes first.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        if !self.buffer.is_empty() {
            let take = buf.len().min(self.buffer.len());
            buf[..take].copy_from_slice(&self.buffer[..take]);
            self.buffer.drain(..take);
            filled = take;
        }
        while filled < buf.len() {
            let n = self.stream.read_some(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(Error::Eof);
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads through the first occurrence of `delimiter` and returns
    /// everything up to and including it. Bytes past the delimiter are
    /// kept for the next read, never lost.
    pub async fn read_until(&mut self, delimiter: &[u8]) -> Result<Vec<u8>> {
        assert!(!delimiter.is_empty(), "empty delimiter");
        let mut searched: usize = 0;
        loop {
            let from = searched.saturating_sub(delimiter.len() - 1);
            if let Some(pos) = find(&self.buffer[from..], delimiter) {
                let end = from + pos + delimiter.len();
                let result = self.buffer.drain(..end).collect();
                return Ok(result);
            }
            searched = self.buffer.len();

            let mut chunk = [0u8; CHUNK];
            let n = self.stream.read_some(&mut chunk).await?;
            if n == 0 {
                return Err(Error::Eof);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Fixed-size records decodable from raw bytes.
///
/// The wire shape is explicit: `SIZE` bytes in, one value out. The Rust
/// stand-in for reading a trivially-copyable struct off a socket.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decodes a value from exactly [`SIZE`](Self::SIZE) bytes.
    fn decode(bytes: &[u8]) -> Self;
}

/// Reads whole [`Record`]s off a stream.
pub struct StructReader<'a, S: ByteStream, T: Record> {
    reader: ByteReader<'a, S>,
    _record: PhantomData<T>,
}

impl<'a, S: ByteStream, T: Record> StructReader<'a, S, T> {
    /// Wraps `stream`.
    pub fn new(stream: &'a mut S) -> Self {
        Self {
            reader: ByteReader::new(stream),
            _record: PhantomData,
        }
    }

    /// Reads one record, failing with [`Error::Eof`] on early close.
    pub async fn read(&mut self) -> Result<T> {
        let mut bytes = vec![0u8; T::SIZE];
        self.reader.read_exact(&mut bytes).await?;
        Ok(T::decode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stream feeding fixed data in small chunks.
    struct Feed {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Feed {
        fn new(data: &[u8], step: usize) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
                step,
            }
        }
    }

    impl ByteStream for Feed {
        async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        async fn write_some(&mut self, _buf: &[u8]) -> Result<usize> {
            unreachable!("read-only test stream")
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        // The test streams never return Pending, so a noop waker drives
        // them to completion in one poll.
        use std::future::Future;
        use std::sync::Arc;
        use std::task::{Context, Poll, Wake, Waker};
        struct Noop;
        impl Wake for Noop {
            fn wake(self: Arc<Self>) {}
        }
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        let mut future = std::pin::pin!(future);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(v) => v,
            Poll::Pending => unreachable!("test stream returned Pending"),
        }
    }

    #[test]
    fn read_until_keeps_the_delimiter_and_the_remainder() {
        let mut feed = Feed::new(b"line1\nline2\nline3\nline4\nline9\n", 7);
        let mut reader = ByteReader::new(&mut feed);
        let line1 = block_on(reader.read_until(b"\n")).unwrap();
        let line2 = block_on(reader.read_until(b"\n")).unwrap();
        let mut one = [0u8; 1];
        block_on(reader.read_exact(&mut one)).unwrap();
        let line3 = block_on(reader.read_until(b"\n")).unwrap();

        assert_eq!(line1, b"line1\n");
        assert_eq!(line2, b"line2\n");
        assert_eq!(one, [b'l']);
        assert_eq!(line3, b"ine3\n");
    }

    #[test]
    fn read_until_spanning_chunks() {
        let mut feed = Feed::new(b"abcdefgh--tail", 3);
        let mut reader = ByteReader::new(&mut feed);
        let head = block_on(reader.read_until(b"--")).unwrap();
        assert_eq!(head, b"abcdefgh--");
        let mut rest = [0u8; 4];
        block_on(reader.read_exact(&mut rest)).unwrap();
        assert_eq!(&rest, b"tail");
    }

    #[test]
    fn early_close_is_eof() {
        let mut feed = Feed::new(b"ab", 2);
        let mut reader = ByteReader::new(&mut feed);
        let mut buf = [0u8; 4];
        assert_eq!(block_on(reader.read_exact(&mut buf)), Err(Error::Eof));
    }

    struct Pair {
        id: u32,
        tag: [u8; 4],
    }

    impl Record for Pair {
        const SIZE: usize = 8;

        fn decode(bytes: &[u8]) -> Self {
            Self {
                id: u32::from_be_bytes(bytes[..4].try_into().unwrap()),
                tag: bytes[4..8].try_into().unwrap(),
            }
        }
    }

    #[test]
    fn struct_reader_fills_whole_records() {
        let mut data = 7u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"tag!");
        let mut feed = Feed::new(&data, 3);
        let mut reader = StructReader::<_, Pair>::new(&mut feed);
        let pair = block_on(reader.read()).unwrap();
        assert_eq!(pair.id, 7);
        assert_eq!(&pair.tag, b"tag!");
    }
}
