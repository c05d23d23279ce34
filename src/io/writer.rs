//! Whole-buffer writes over a [`ByteStream`].

use super::{ByteStream, Line};
use crate::error::{Error, Result};

/// Writer that loops partial writes until everything is sent.
pub struct ByteWriter<'a, S: ByteStream> {
    stream: &'a mut S,
}

impl<'a, S: ByteStream> ByteWriter<'a, S> {
    /// Wraps `stream`.
    pub fn new(stream: &'a mut S) -> Self {
        Self { stream }
    }

    /// Writes all of `buf`, or fails with the first sub-write's error.
    /// How many bytes went out before a failure is unspecified.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.stream.write_some(buf).await?;
            if n == 0 {
                return Err(Error::Eof);
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Writes a [`Line`]'s pieces back to back.
    pub async fn write_line(&mut self, line: &Line<'_>) -> Result<()> {
        self.write_all(line.part1).await?;
        self.write_all(line.part2).await
    }
}
