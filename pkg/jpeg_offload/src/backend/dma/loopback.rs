use std::cell::Cell;

use byteorder::{ByteOrder, LittleEndian};

use crate::backend::dma::hardware::*;
use crate::block::{Block, Coeff};
use crate::constants::BLOCK_SIZE;
use crate::dct::forward_dct_scaled;
use crate::errors::*;

/// A hardware interaction recorded by [`LoopbackHardware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareOp {
    Start,
    Flush(BufferRegion),
    Invalidate(BufferRegion),
    Transfer(BufferRegion, Direction),
}

/// In-memory stand-in for the transform unit and its DMA engine.
///
/// Host and device views of each buffer are kept separately so that a
/// missing flush or invalidate is observable as stale data, the same way it
/// would be on a cached system. The transform itself is the software DCT.
pub struct LoopbackHardware {
    host_request: [u8; DMA_BUFFER_SIZE],
    device_request: [u8; DMA_BUFFER_SIZE],
    host_response: [u8; DMA_BUFFER_SIZE],
    device_response: [u8; DMA_BUFFER_SIZE],

    started: bool,
    received: bool,
    draining: bool,

    /// Number of busy polls reported for each device to host transfer.
    latency: usize,
    remaining: Cell<usize>,

    ops: Vec<HardwareOp>,
    blocks: usize,
}

impl LoopbackHardware {
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    pub fn with_latency(latency: usize) -> Self {
        Self {
            host_request: [0; DMA_BUFFER_SIZE],
            device_request: [0; DMA_BUFFER_SIZE],
            host_response: [0; DMA_BUFFER_SIZE],
            device_response: [0; DMA_BUFFER_SIZE],
            started: false,
            received: false,
            draining: false,
            latency,
            remaining: Cell::new(0),
            ops: vec![],
            blocks: 0,
        }
    }

    pub fn ops(&self) -> &[HardwareOp] {
        &self.ops
    }

    /// Number of blocks the simulated unit has transformed.
    pub fn blocks_transformed(&self) -> usize {
        self.blocks
    }

    fn run_transform(&mut self) {
        let mut input: Block = [0; BLOCK_SIZE];
        for (v, chunk) in input.iter_mut().zip(self.device_request.chunks_exact(4)) {
            *v = LittleEndian::read_i32(chunk) as Coeff;
        }

        let output = forward_dct_scaled(&input);
        for (chunk, v) in self.device_response.chunks_exact_mut(4).zip(output.iter()) {
            LittleEndian::write_u32(chunk, v.to_bits());
        }

        self.blocks += 1;
    }
}

impl Default for LoopbackHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformHardware for LoopbackHardware {
    fn start(&mut self) {
        self.ops.push(HardwareOp::Start);
        self.started = true;
        self.received = false;
        self.draining = false;
    }

    fn is_done(&self) -> bool {
        self.started && self.received && self.draining && self.remaining.get() == 0
    }

    fn request_buffer(&mut self) -> &mut [u8] {
        &mut self.host_request
    }

    fn response_buffer(&self) -> &[u8] {
        &self.host_response
    }

    fn flush_cache(&mut self, region: BufferRegion) {
        self.ops.push(HardwareOp::Flush(region));
        if region == BufferRegion::Request {
            self.device_request = self.host_request;
        }
    }

    fn invalidate_cache(&mut self, region: BufferRegion) {
        self.ops.push(HardwareOp::Invalidate(region));
        if region == BufferRegion::Response {
            self.host_response = self.device_response;
        }
    }

    fn simple_transfer(&mut self, region: BufferRegion, direction: Direction) -> Result<()> {
        self.ops.push(HardwareOp::Transfer(region, direction));

        match (region, direction) {
            (BufferRegion::Request, Direction::ToDevice) => {
                if !self.started {
                    return Err(err_msg("Transform unit was not started"));
                }

                self.run_transform();
                self.received = true;
            }
            (BufferRegion::Response, Direction::FromDevice) => {
                if !self.received {
                    return Err(err_msg("No block was sent to the transform unit"));
                }

                self.draining = true;
                self.remaining.set(self.latency);
            }
            _ => {
                return Err(format_err!(
                    "Unsupported transfer of {:?} {:?}",
                    region,
                    direction
                ));
            }
        }

        Ok(())
    }

    fn is_busy(&self, direction: Direction) -> bool {
        if direction == Direction::ToDevice || !self.draining {
            return false;
        }

        let n = self.remaining.get();
        if n == 0 {
            return false;
        }

        self.remaining.set(n - 1);
        true
    }
}
