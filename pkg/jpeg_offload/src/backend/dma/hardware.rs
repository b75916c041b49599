use crate::constants::BLOCK_SIZE;
use crate::errors::*;

/// Size in bytes of each of the request and response buffers.
///
/// Both hold one channel block as 32-bit words.
pub const DMA_BUFFER_SIZE: usize = BLOCK_SIZE * std::mem::size_of::<u32>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Memory mapped to stream (MM2S): request buffer into the transform unit.
    ToDevice,

    /// Stream to memory mapped (S2MM): transform unit output into the
    /// response buffer.
    FromDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRegion {
    Request,
    Response,
}

/// Register level access to a transform unit fed by a simple-mode DMA engine.
///
/// Implementations are only constructed after the device has been set up
/// with its interrupts disabled; completion is always observed by polling.
pub trait TransformHardware {
    /// Signals the transform unit to accept a new block. Doesn't block.
    fn start(&mut self);

    fn is_done(&self) -> bool;

    /// Host view of the request buffer.
    fn request_buffer(&mut self) -> &mut [u8];

    /// Host view of the response buffer.
    fn response_buffer(&self) -> &[u8];

    /// Writes back any cached host lines covering the region.
    fn flush_cache(&mut self, region: BufferRegion);

    /// Discards any cached host lines covering the region.
    fn invalidate_cache(&mut self, region: BufferRegion);

    /// Queues a transfer of a whole buffer in the given direction.
    fn simple_transfer(&mut self, region: BufferRegion, direction: Direction) -> Result<()>;

    fn is_busy(&self, direction: Direction) -> bool;
}

impl<T: TransformHardware + ?Sized> TransformHardware for Box<T> {
    fn start(&mut self) {
        (**self).start()
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn request_buffer(&mut self) -> &mut [u8] {
        (**self).request_buffer()
    }

    fn response_buffer(&self) -> &[u8] {
        (**self).response_buffer()
    }

    fn flush_cache(&mut self, region: BufferRegion) {
        (**self).flush_cache(region)
    }

    fn invalidate_cache(&mut self, region: BufferRegion) {
        (**self).invalidate_cache(region)
    }

    fn simple_transfer(&mut self, region: BufferRegion, direction: Direction) -> Result<()> {
        (**self).simple_transfer(region, direction)
    }

    fn is_busy(&self, direction: Direction) -> bool {
        (**self).is_busy(direction)
    }
}
