//! Socket-to-lines adapter over the zero-copy splitter.

use super::line::{Line, ZeroCopyLineSplitter};
use super::ByteStream;
use crate::error::{Error, Result};

/// Yields `\n`-terminated [`Line`]s read from a stream.
///
/// Socket reads land directly in the splitter's ring via acquire/commit.
/// At end of stream a final partial segment (no trailing newline) is not
/// returned as a line.
pub struct LineReader<'a, S: ByteStream> {
    stream: &'a mut S,
    splitter: ZeroCopyLineSplitter,
    chunk: usize,
}

impl<'a, S: ByteStream> LineReader<'a, S> {
    /// Reads lines of at most `capacity` bytes from `stream`.
    pub fn new(stream: &'a mut S, capacity: usize) -> Self {
        Self {
            stream,
            splitter: ZeroCopyLineSplitter::new(capacity),
            chunk: (capacity / 2).max(1),
        }
    }

    /// The next line, or `None` at end of stream.
    ///
    /// The returned views borrow the internal ring and stay valid until
    /// the next call. A line longer than the splitter's capacity fails
    /// with an `EMSGSIZE` error rather than wedging.
    pub async fn read(&mut self) -> Result<Option<Line<'_>>> {
        while !self.splitter.has_line() {
            let buf = self.splitter.acquire(self.chunk);
            if buf.is_empty() {
                return Err(Error::Os(libc::EMSGSIZE));
            }
            let n = self.stream.read_some(buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.splitter.commit(n);
        }
        Ok(self.splitter.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::pin;
    use std::sync::Arc;
    use std::task::{Context, Poll, Wake, Waker};

    struct Feed {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl ByteStream for Feed {
        async fn read_some(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        async fn write_some(&mut self, _buf: &[u8]) -> crate::Result<usize> {
            unreachable!()
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        struct Noop;
        impl Wake for Noop {
            fn wake(self: Arc<Self>) {}
        }
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        match pin!(future).poll(&mut cx) {
            Poll::Ready(v) => v,
            Poll::Pending => unreachable!("test stream returned Pending"),
        }
    }

    #[test]
    fn yields_lines_and_swallows_the_partial_tail() {
        let mut feed = Feed {
            data: b"one\ntwo\nthree".to_vec(),
            pos: 0,
            step: 5,
        };
        let mut reader = LineReader::new(&mut feed, 16);

        let line = block_on(reader.read()).unwrap().unwrap().to_vec();
        assert_eq!(line, b"one\n");
        let line = block_on(reader.read()).unwrap().unwrap().to_vec();
        assert_eq!(line, b"two\n");
        assert!(block_on(reader.read()).unwrap().is_none());
    }

    #[test]
    fn oversized_line_errors_instead_of_wedging() {
        let mut feed = Feed {
            data: b"aaaaaaaaaaaaaaaaaaaaaaaa\n".to_vec(),
            pos: 0,
            step: 8,
        };
        let mut reader = LineReader::new(&mut feed, 8);
        assert_eq!(block_on(reader.read()), Err(Error::Os(libc::EMSGSIZE)));
    }
}
