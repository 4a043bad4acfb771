//! Bounded capture of child output streams.

use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes read from one stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the limit and discarded.
    pub dropped: usize,
}

impl Captured {
    pub fn into_text(self) -> (String, usize) {
        let text = match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        (text, self.dropped)
    }
}

/// Read `reader` to EOF keeping at most `limit` bytes.
///
/// The stream is always drained so the child never blocks on a full pipe.
/// A read error ends the capture with whatever was collected.
pub async fn read_limited<R>(mut reader: R, limit: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        };

        let room = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(room);
        captured.bytes.extend_from_slice(&buf[..keep]);
        captured.dropped += n - keep;
    }

    captured
}
