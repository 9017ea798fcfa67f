//! Scripted transport for unit tests

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use crate::bus::Transport;
use crate::error::{Error, Result};
use crate::transfer::{Protocol, TransferDescriptor};

/// Records every batch and answers reads from a queue of canned replies
///
/// Reads with no queued reply return zeros of the requested length.
pub(crate) struct ScriptedTransport {
    protocol: Protocol,
    pub opens: usize,
    pub closes: usize,
    pub open_error: Option<Error>,
    pub submit_error: Option<Error>,
    pub replies: VecDeque<Vec<u8>>,
    pub submitted: Vec<Vec<TransferDescriptor>>,
}

impl ScriptedTransport {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            opens: 0,
            closes: 0,
            open_error: None,
            submit_error: None,
            replies: VecDeque::new(),
            submitted: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn path(&self) -> &str {
        "scripted"
    }

    fn open(&mut self) -> Result<()> {
        if let Some(err) = self.open_error {
            return Err(err);
        }
        self.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }

    fn submit(&mut self, batch: &[TransferDescriptor]) -> Result<Vec<Vec<u8>>> {
        self.submitted.push(batch.to_vec());
        if let Some(err) = self.submit_error {
            return Err(err);
        }
        Ok(batch
            .iter()
            .filter(|d| d.has_reply())
            .map(|d| {
                self.replies
                    .pop_front()
                    .unwrap_or_else(|| vec![0; d.reply_len()])
            })
            .collect())
    }
}
