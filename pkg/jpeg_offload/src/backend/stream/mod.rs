//! Transform engine reached through a pair of unidirectional byte streams.
//!
//! Blocks written to the write-only stream come back transformed, in the same
//! order, on the read-only stream. Nothing else is shared with the engine, so
//! the two directions can be driven from different threads or processes.

mod io;

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use crate::backend::BlockTransform;
use crate::block::TripleBlock;
use crate::config::StreamConfig;
use crate::errors::*;

pub use self::io::*;

pub struct StreamTransformEngine<W = File, R = File> {
    writer: BlockWriter<W>,
    reader: BlockReader<R>,
}

impl StreamTransformEngine {
    /// Opens both character devices named in 'config'.
    pub fn open(config: &StreamConfig) -> Result<Self> {
        let read_file = OpenOptions::new()
            .read(true)
            .open(&config.read_device)
            .map_err(|e| {
                error!("Failed to open read stream {}: {}", config.read_device, e);
                e
            })?;

        let write_file = OpenOptions::new()
            .write(true)
            .open(&config.write_device)
            .map_err(|e| {
                error!("Failed to open write stream {}: {}", config.write_device, e);
                e
            })?;

        let retry = RetryPolicy {
            max_zero_transfers: config.max_zero_reads,
            cancel: None,
        };

        Ok(Self {
            writer: BlockWriter::with_policy(write_file, retry.clone()),
            reader: BlockReader::with_policy(read_file, retry),
        })
    }
}

impl<W: Write, R: Read> StreamTransformEngine<W, R> {
    pub fn new(writer: BlockWriter<W>, reader: BlockReader<R>) -> Self {
        Self { writer, reader }
    }

    pub fn from_streams(to_engine: W, from_engine: R) -> Self {
        Self::new(BlockWriter::new(to_engine), BlockReader::new(from_engine))
    }

    /// Splits the engine into its two independently owned halves.
    pub fn into_parts(self) -> (BlockWriter<W>, BlockReader<R>) {
        (self.writer, self.reader)
    }
}

/// Lock-step use of the streams: each block is sent and its result awaited
/// before returning.
impl<W: Write, R: Read> BlockTransform for StreamTransformEngine<W, R> {
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()> {
        self.writer.write_block(block)?;
        self.reader.read_block(block)
    }
}
