use std::io::{ErrorKind, Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::block::TripleBlock;
use crate::errors::*;
use crate::poll::CancellationToken;

/// Failures of the block streams to and from the transform engine.
#[derive(Debug, Fail)]
pub enum StreamError {
    #[fail(display = "Failed to {} transform stream: {}", op, reason)]
    Fatal { op: &'static str, reason: String },

    #[fail(
        display = "Transform stream disconnected: {} returned no data {} times in a row",
        op, attempts
    )]
    Disconnected { op: &'static str, attempts: usize },

    #[fail(display = "Stream {} cancelled", op)]
    Cancelled { op: &'static str },
}

/// Wire encoding of a triple-block: every coefficient little endian, in the
/// in-memory order (channel major, then row major).
pub fn encode_block(block: &TripleBlock, out: &mut [u8; TripleBlock::BYTE_SIZE]) {
    LittleEndian::write_i16_into(block.as_slice(), out);
}

pub fn decode_block(data: &[u8; TripleBlock::BYTE_SIZE], block: &mut TripleBlock) {
    LittleEndian::read_i16_into(data, block.as_mut_slice());
}

/// Shared retry rules of both stream directions.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    /// Consecutive zero length transfers tolerated before giving up. Retries
    /// forever if not set.
    pub max_zero_transfers: Option<usize>,

    pub cancel: Option<std::sync::Arc<dyn CancellationToken>>,
}

impl RetryPolicy {
    fn check_cancelled(&self, op: &'static str) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled { op }.into());
            }
        }

        Ok(())
    }

    /// Called after the 'count'th consecutive zero length transfer.
    fn on_zero_transfer(&self, op: &'static str, count: usize) -> Result<()> {
        if count == 1 {
            warn!("Unexpected zero length {} on transform stream. Retrying", op);
        } else {
            debug!("Zero length {} on transform stream (x{})", op, count);
        }

        if let Some(max) = self.max_zero_transfers {
            if count >= max {
                error!("Giving up on transform stream after {} empty {}s", count, op);
                return Err(StreamError::Disconnected {
                    op,
                    attempts: count,
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Write half of the transform stream.
///
/// Writes are retried until a complete triple-block has been transmitted.
pub struct BlockWriter<W> {
    inner: W,
    retry: RetryPolicy,
    buffer: [u8; TripleBlock::BYTE_SIZE],
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: W, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            buffer: [0; TripleBlock::BYTE_SIZE],
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn set_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn write_block(&mut self, block: &TripleBlock) -> Result<()> {
        encode_block(block, &mut self.buffer);

        let mut offset = 0;
        let mut zero_writes = 0;
        while offset < self.buffer.len() {
            self.retry.check_cancelled("write")?;

            match self.inner.write(&self.buffer[offset..]) {
                Ok(0) => {
                    zero_writes += 1;
                    self.retry.on_zero_transfer("write", zero_writes)?;
                }
                Ok(n) => {
                    offset += n;
                    zero_writes = 0;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("Failed to write transform stream: {}", e);
                    return Err(StreamError::Fatal {
                        op: "write",
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Read half of the transform stream.
///
/// A zero length read is not treated as the end of the stream: exactly one
/// block comes back per block sent and the engine never closes its side
/// mid-image.
pub struct BlockReader<R> {
    inner: R,
    retry: RetryPolicy,
    buffer: [u8; TripleBlock::BYTE_SIZE],
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: R, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            buffer: [0; TripleBlock::BYTE_SIZE],
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn set_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn read_block(&mut self, block: &mut TripleBlock) -> Result<()> {
        let mut offset = 0;
        let mut zero_reads = 0;
        while offset < self.buffer.len() {
            self.retry.check_cancelled("read")?;

            match self.inner.read(&mut self.buffer[offset..]) {
                Ok(0) => {
                    zero_reads += 1;
                    self.retry.on_zero_transfer("read", zero_reads)?;
                }
                Ok(n) => {
                    offset += n;
                    zero_reads = 0;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("Failed to read transform stream: {}", e);
                    return Err(StreamError::Fatal {
                        op: "read",
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }

        decode_block(&self.buffer, block);
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
