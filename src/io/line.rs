//! Newline-delimited framing over a fixed ring buffer.
//!
//! Both splitters keep a ring of `(buffer, head, len)` with modular
//! indexing. A popped [`Line`] is at most two contiguous views into the
//! ring — two when the line straddles the wrap point — and stays valid
//! until the next mutation of the splitter, which the borrow checker
//! enforces.

/// One `\n`-terminated line, in up to two pieces.
///
/// `part2` is empty unless the line wrapped around the ring's end;
/// concatenating `part1` then `part2` reproduces the bytes in order,
/// including the trailing newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// First (possibly only) piece.
    pub part1: &'a [u8],
    /// Remainder past the wrap point, often empty.
    pub part2: &'a [u8],
}

impl Line<'_> {
    /// Total line length in bytes, newline included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.part1.len() + self.part2.len()
    }

    /// True for a line with no bytes (never produced by `pop`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies both pieces into one owned buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.part1);
        out.extend_from_slice(self.part2);
        out
    }
}

/// Ring state shared by both splitter flavors.
#[derive(Debug)]
struct Ring {
    buf: Vec<u8>,
    head: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "splitter capacity must be non-zero");
        Self {
            buf: vec![0; capacity],
            head: 0,
            len: 0,
        }
    }

    fn cap(&self) -> usize {
        self.buf.len()
    }

    fn free(&self) -> usize {
        self.cap() - self.len
    }

    fn copy_in(&mut self, data: &[u8]) {
        assert!(
            data.len() <= self.free(),
            "splitter overflow: {} bytes into {} free",
            data.len(),
            self.free()
        );
        let cap = self.cap();
        let write = (self.head + self.len) % cap;
        let first = data.len().min(cap - write);
        self.buf[write..write + first].copy_from_slice(&data[..first]);
        self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();
    }

    /// Offset (from head) one past the first `\n`, if any.
    fn scan_newline(&self) -> Option<usize> {
        let cap = self.cap();
        (0..self.len).find(|i| self.buf[(self.head + i) % cap] == b'\n')
    }

    fn pop_line(&mut self) -> Option<Line<'_>> {
        let end = self.scan_newline()? + 1;
        let cap = self.cap();
        let start = self.head;
        self.head = (start + end) % cap;
        self.len -= end;

        let first = end.min(cap - start);
        Some(Line {
            part1: &self.buf[start..start + first],
            part2: &self.buf[..end - first],
        })
    }
}

/// Copying line splitter: [`push`](Self::push) copies caller bytes into
/// the ring, [`pop`](Self::pop) hands back views of the next line.
#[derive(Debug)]
pub struct LineSplitter {
    ring: Ring,
}

impl LineSplitter {
    /// A splitter over a ring of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Ring::new(capacity),
        }
    }

    /// Appends `data` to the ring.
    ///
    /// # Panics
    ///
    /// Overflowing the ring is a programmer error: callers must keep
    /// pushed-but-unpopped bytes within capacity.
    pub fn push(&mut self, data: &[u8]) {
        self.ring.copy_in(data);
    }

    /// Takes the next `\n`-terminated line off the ring, if complete.
    pub fn pop(&mut self) -> Option<Line<'_>> {
        self.ring.pop_line()
    }

    /// True when a complete line is buffered.
    #[must_use]
    pub fn has_line(&self) -> bool {
        self.ring.scan_newline().is_some()
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.len == 0
    }
}

/// Zero-copy line splitter: producers write straight into the ring via
/// [`acquire`](Self::acquire)/[`commit`](Self::commit), so socket reads
/// land in place. Popped views are valid until the next mutation.
#[derive(Debug)]
pub struct ZeroCopyLineSplitter {
    ring: Ring,
}

impl ZeroCopyLineSplitter {
    /// A splitter over a ring of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Ring::new(capacity),
        }
    }

    /// Borrows up to `size` contiguous free bytes at the write position.
    ///
    /// The returned slice may be shorter than `size` (free space or the
    /// wrap point cuts it off) and is empty when the ring is full. Bytes
    /// become visible only after [`commit`](Self::commit).
    pub fn acquire(&mut self, size: usize) -> &mut [u8] {
        let cap = self.ring.cap();
        let write = (self.ring.head + self.ring.len) % cap;
        let contiguous = size.min(self.ring.free()).min(cap - write);
        &mut self.ring.buf[write..write + contiguous]
    }

    /// Publishes `size` bytes previously written into
    /// [`acquire`](Self::acquire)'s slice.
    pub fn commit(&mut self, size: usize) {
        assert!(size <= self.ring.free(), "commit past acquired space");
        self.ring.len += size;
    }

    /// Convenience copy-in, equivalent to acquire/commit in a loop.
    pub fn push(&mut self, mut data: &[u8]) {
        assert!(
            data.len() <= self.ring.free(),
            "splitter overflow: {} bytes into {} free",
            data.len(),
            self.ring.free()
        );
        while !data.is_empty() {
            let chunk = self.acquire(data.len());
            let n = chunk.len();
            chunk.copy_from_slice(&data[..n]);
            self.commit(n);
            data = &data[n..];
        }
    }

    /// Takes the next `\n`-terminated line off the ring, if complete.
    pub fn pop(&mut self) -> Option<Line<'_>> {
        self.ring.pop_line()
    }

    /// True when a complete line is buffered.
    #[must_use]
    pub fn has_line(&self) -> bool {
        self.ring.scan_newline().is_some()
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xorshift(seed: &mut u32) -> u32 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 17;
        *seed ^= *seed << 5;
        *seed
    }

    fn make_line(len: usize, letter: u8) -> Vec<u8> {
        let mut line = vec![letter; len];
        *line.last_mut().unwrap() = b'\n';
        line
    }

    #[test]
    fn push_pop_round_trips_across_wrap() {
        let mut splitter = LineSplitter::new(16);
        let mut seed = 31337u32;
        for i in 0..10_000 {
            let len = (xorshift(&mut seed) % 16 + 1) as usize;
            let line = make_line(len, b'a' + (i % 26) as u8);
            splitter.push(&line);
            let popped = splitter.pop().expect("line ends in newline");
            assert_eq!(popped.to_vec(), line);
        }
    }

    #[test]
    fn batched_pushes_pop_in_order() {
        let mut splitter = LineSplitter::new(16);
        let mut seed = 31337u32;
        for i in 0..10_000 {
            let mut lines = Vec::new();
            let mut total = 0;
            loop {
                let len = (xorshift(&mut seed) % 6 + 1) as usize;
                total += len;
                if total > 16 {
                    break;
                }
                let line = make_line(len, b'a' + (i % 26) as u8);
                splitter.push(&line);
                lines.push(line);
            }
            for line in &lines {
                let popped = splitter.pop().expect("pushed a full line");
                assert_eq!(&popped.to_vec(), line);
            }
            assert!(splitter.pop().is_none());
        }
    }

    #[test]
    fn zero_copy_round_trips_across_wrap() {
        let mut splitter = ZeroCopyLineSplitter::new(16);
        let mut seed = 31337u32;
        for i in 0..10_000 {
            let len = (xorshift(&mut seed) % 16 + 1) as usize;
            let line = make_line(len, b'a' + (i % 26) as u8);
            splitter.push(&line);
            let popped = splitter.pop().expect("line ends in newline");
            assert_eq!(popped.to_vec(), line);
        }
    }

    #[test]
    fn acquire_commit_fills_in_place() {
        let mut splitter = ZeroCopyLineSplitter::new(8);
        let chunk = splitter.acquire(4);
        chunk[..3].copy_from_slice(b"hi\n");
        splitter.commit(3);

        let line = splitter.pop().unwrap();
        assert_eq!(line.to_vec(), b"hi\n");
        assert!(splitter.is_empty());
    }

    #[test]
    fn incomplete_line_stays_buffered() {
        let mut splitter = LineSplitter::new(8);
        splitter.push(b"abc");
        assert!(splitter.pop().is_none());
        splitter.push(b"\n");
        assert_eq!(splitter.pop().unwrap().to_vec(), b"abc\n");
    }

    #[test]
    fn wrapped_line_comes_back_in_two_parts() {
        let mut splitter = LineSplitter::new(8);
        splitter.push(b"abcde\n");
        assert_eq!(splitter.pop().unwrap().to_vec(), b"abcde\n");
        // Head is now at 6; this line wraps.
        splitter.push(b"xyzw\n");
        let line = splitter.pop().unwrap();
        assert!(!line.part2.is_empty(), "line should straddle the wrap");
        assert_eq!(line.to_vec(), b"xyzw\n");
    }

    #[test]
    #[should_panic(expected = "splitter overflow")]
    fn overflow_panics() {
        let mut splitter = LineSplitter::new(4);
        splitter.push(b"abcde");
    }
}
