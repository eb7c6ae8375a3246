use std::path::Path;

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tracing::info;

use super::MemoryBroker;

/// Opens a JSON-lines relay feed; `-` reads standard input.
pub async fn open_feed(path: &Path) -> io::Result<Box<dyn AsyncBufRead + Send + Unpin>> {
    let reader: Box<dyn AsyncRead + Send + Unpin> = if path.as_os_str() == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(tokio::fs::File::open(path).await?)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Publishes one message per non-blank line, then closes the broker.
///
/// Returns the number of messages published.
pub async fn feed_lines<R>(reader: R, broker: &MemoryBroker) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;
    let result = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    broker.publish(line);
                    published += 1;
                }
            }
            Ok(None) => break Ok(published),
            Err(err) => break Err(err),
        }
    };
    broker.close();
    info!(published, "relay feed drained");
    result
}
