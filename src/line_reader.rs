use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads LF-terminated lines from a stream, dropping a trailing CR if present
/// so CRLF input reads the same.
pub struct LineReader<T: AsyncRead + Unpin> {
    /// Data that's been read in but lacks a LF.
    buf: BytesMut,
    /// Index in buf before which no LF appears.
    scanned: usize,
    /// Data source
    reader: T,
    /// On a reading error, this field is set and its value returned once the
    /// buffer is drained of pending lines.
    pending_error: Option<io::Error>,
    /// Set once the reader returns 0 bytes.
    eof: bool,
}

impl<T: AsyncRead + Unpin> LineReader<T> {
    /// Reads a line from the internal buffer and/or reader. On end-of-stream,
    /// a final unterminated line is returned, then None.
    ///
    /// This function is cancel-safe: its only async operation is a `read_buf`
    /// against the internal `reader`, so either a complete read occurs and is
    /// buffered, or nothing happens.
    pub async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            // Only scan bytes we haven't scanned before to keep
            // O(bytes_read) behaviour over long lines.
            if let Some(eol) =
                self.buf[self.scanned..].iter().position(|&c| c == b'\n')
            {
                let line = self.buf.split_to(self.scanned + eol + 1).freeze();
                self.scanned = 0;

                return Ok(Some(trim_eol(line)));
            }

            self.scanned = self.buf.len();

            if self.eof {
                if !self.buf.is_empty() {
                    self.scanned = 0;
                    let line = self.buf.split().freeze();
                    return Ok(Some(trim_eol(line)));
                }

                return match self.pending_error.take() {
                    Some(e) => Err(e),
                    None => Ok(None),
                };
            }

            // Try reading from the reader and accumulating in the buffer; if
            // we receive no bytes, assume the stream is finished.
            let n_bytes_read = match self.reader.read_buf(&mut self.buf).await
            {
                Ok(n) => n,
                Err(e) => {
                    self.pending_error = Some(e);
                    0
                },
            };

            if n_bytes_read == 0 {
                self.eof = true;
            }
        }
    }
}

/// Drops a trailing LF and then a trailing CR.
fn trim_eol(mut line: Bytes) -> Bytes {
    if line.ends_with(b"\n") {
        line.truncate(line.len() - 1);
    }
    if line.ends_with(b"\r") {
        line.truncate(line.len() - 1);
    }
    line
}

impl<T: AsyncRead + Unpin> From<T> for LineReader<T> {
    fn from(value: T) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            reader: value,
            pending_error: None,
            eof: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{self, AsyncWriteExt};
    use tokio::task::yield_now;

    #[tokio::test]
    async fn test() {
        // When properly read, each nth line should read b"test:{n}".
        let tests: &[&[u8]] = &[
            // Simple reassembly
            b"test:",
            b"1\n",
            // CRLF with split LF
            b"test:",
            b"2\r",
            b"\n",
            // Split CRLF
            b"test:",
            b"3",
            b"\r",
            b"\n",
            // Several lines in one read
            b"test:4\ntest:5\r\n",
            // Split mid-line
            b"test:6\n",
            b"te",
            b"st:7\n",
            // Unterminated final line
            b"test:8\ntest:9",
        ];

        // Set the buffer large enough that our tests will never overflow it.
        // We can ensure correct fragmentation of reads by explicitly yielding
        // between each.
        let (mut client, server) = io::duplex(4096);

        tokio::spawn(async move {
            for buf in tests {
                client.write_all(buf).await.unwrap();
                yield_now().await;
            }
        });

        let mut lr: LineReader<_> = server.into();

        for n in 1..=9 {
            assert_eq!(
                lr.read_line().await.unwrap().unwrap(),
                format!("test:{n}")
            );
        }

        assert!(lr.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_lines() {
        let mut lr: LineReader<_> = (&b"\n\r\nx\n"[..]).into();

        assert_eq!(lr.read_line().await.unwrap().unwrap(), "");
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "");
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "x");
        assert!(lr.read_line().await.unwrap().is_none());
    }
}
