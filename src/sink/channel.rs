//! In-process sink
//!
//! Hands records to another part of the host (a UI log view, an IPC bridge)
//! through a bounded channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{LogSink, SinkError};
use crate::record::LogRecord;

/// Sender half of the record channel
pub type RecordSender = mpsc::Sender<LogRecord>;

/// Receiver half of the record channel
pub type RecordReceiver = mpsc::Receiver<LogRecord>;

/// Create a bounded channel for records
///
/// # Arguments
/// * `buffer` - Maximum number of records to buffer before the sink reports `Full`
pub fn create_channel(buffer: usize) -> (RecordSender, RecordReceiver) {
    mpsc::channel(buffer)
}

/// Sink that pushes records into a channel without waiting for capacity
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: RecordSender,
}

impl ChannelSink {
    pub fn new(sender: RecordSender) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiver that drains it
    pub fn with_buffer(buffer: usize) -> (Self, RecordReceiver) {
        let (sender, receiver) = create_channel(buffer);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl LogSink for ChannelSink {
    async fn forward(&self, record: LogRecord) -> Result<(), SinkError> {
        match self.sender.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}
