// SPDX-License-Identifier: Apache-2.0

//! Writes harvested lines to stdout or a file.

use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use super::BoxError;
use crate::bounded_channel::BoundedReceiver;
use crate::consumer::LineMessage;

pub type SinkWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Open the output: append to `path`, or stdout when none is given.
pub async fn open_output(path: Option<&Path>) -> Result<SinkWriter, BoxError> {
    match path {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| format!("unable to open output {}: {}", path.display(), e))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write each line followed by `\n` until the channel closes.
///
/// Barriers are acknowledged only after everything before them has been
/// flushed, so the harvester never checkpoints past unwritten output.
pub async fn run_sink<W>(mut rx: BoundedReceiver<LineMessage>, writer: W) -> Result<u64, BoxError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    let mut written = 0u64;

    while let Some(msg) = rx.next().await {
        match msg {
            LineMessage::Line(line) => {
                writer.write_all(&line).await?;
                writer.write_all(b"\n").await?;
                written += 1;
            }
            LineMessage::Barrier(ack) => {
                writer.flush().await?;
                // Harvester gone; nothing to acknowledge
                let _ = ack.send(());
            }
        }
    }

    writer.flush().await?;
    debug!(lines = written, "Line sink exiting");
    Ok(written)
}
