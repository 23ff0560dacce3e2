use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Computes the MD5 of everything written through it
pub struct Md5Writer<W> {
    inner: W,
    context: md5::Context,
    written: u64,
}

impl<W: AsyncWrite + Unpin> Md5Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            context: md5::Context::new(),
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf).await?;
        self.context.consume(buf);
        self.written += buf.len() as u64;
        Ok(())
    }

    /// Flush and return the lowercase hex digest
    pub async fn finish(mut self) -> io::Result<String> {
        self.inner.flush().await?;
        Ok(format!("{:x}", self.context.compute()))
    }
}

/// Case-insensitive digest comparison
pub fn md5_matches(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}
