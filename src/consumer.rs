// SPDX-License-Identifier: Apache-2.0

//! Line consumers.
//!
//! The engine hands every line to a [`LineConsumer`] and calls
//! [`LineConsumer::flush`] before each checkpoint. A consumer that buffers or
//! hands work to another task must not return from `flush` until everything
//! it was given has been processed, or a checkpoint would cover data that was
//! never delivered.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::error::{Error, Result};

/// Receives lines from the engine, in file order.
pub trait LineConsumer {
    /// Take one line (terminator removed).
    fn consume(&mut self, line: &[u8]) -> Result<()>;

    /// Block until every line passed to `consume` has been fully handled.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<F> LineConsumer for F
where
    F: FnMut(&[u8]) -> Result<()>,
{
    fn consume(&mut self, line: &[u8]) -> Result<()> {
        self(line)
    }
}

/// Message carried from a [`ChannelConsumer`] to its receiving task.
#[derive(Debug)]
pub enum LineMessage {
    Line(Bytes),
    /// Acknowledge once every earlier line has been handled
    Barrier(oneshot::Sender<()>),
}

/// Consumer that forwards lines over a bounded channel to an async task.
///
/// Runs on the engine thread. `flush` waits for the receiver to acknowledge
/// a barrier, so the receiving side decides when data counts as delivered.
pub struct ChannelConsumer {
    tx: BoundedSender<LineMessage>,
}

impl ChannelConsumer {
    pub fn new(tx: BoundedSender<LineMessage>) -> Self {
        Self { tx }
    }

    /// Consumer plus the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, BoundedReceiver<LineMessage>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }
}

impl LineConsumer for ChannelConsumer {
    fn consume(&mut self, line: &[u8]) -> Result<()> {
        self.tx
            .send_blocking(LineMessage::Line(Bytes::copy_from_slice(line)))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send_blocking(LineMessage::Barrier(ack_tx))?;
        // Dropped without acking means the receiver went away mid-flush
        ack_rx.blocking_recv().map_err(|_| Error::ChannelSend)
    }
}
