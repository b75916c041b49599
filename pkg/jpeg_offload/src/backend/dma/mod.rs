//! Synchronous transform engine driving the hardware through DMA.
//!
//! Only one block is ever in flight: the request and response buffers are
//! owned exclusively by the engine and every call waits for the block it
//! submitted.

mod axi;
mod hardware;
mod loopback;
mod memory;

use byteorder::{ByteOrder, LittleEndian};

use crate::backend::BlockTransform;
use crate::block::{Block, Coeff, TripleBlock};
use crate::config::DmaConfig;
use crate::constants::NUM_COMPONENTS;
use crate::dct::narrow;
use crate::errors::*;
use crate::poll::PollPolicy;

pub use axi::{AxiDmaHardware, SetupError};
pub use hardware::*;
pub use loopback::{HardwareOp, LoopbackHardware};
pub use memory::MemoryBlock;

const WORD_SIZE: usize = std::mem::size_of::<u32>();

/// A 32-bit word in the response buffer.
///
/// The transform unit natively emits IEEE-754 single precision values, so a
/// word is decoded by reinterpreting its bits rather than converting the
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct DeviceWord(u32);

impl DeviceWord {
    pub fn from_le_bytes(data: &[u8]) -> Self {
        Self(LittleEndian::read_u32(data))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0)
    }

    pub fn to_coeff(self) -> Coeff {
        narrow(self.as_f32())
    }
}

/// Transform backend that hands each channel block to the hardware unit.
///
/// Can only be built around hardware that has already been set up.
pub struct DmaTransformEngine<H> {
    hardware: H,
    poll: PollPolicy,
}

impl DmaTransformEngine<Box<dyn TransformHardware + Send>> {
    /// Sets up the transform unit and DMA engine described by 'config'.
    ///
    /// Failures are logged and returned; nothing is left half initialized.
    pub fn open(config: &DmaConfig) -> Result<Self> {
        let hardware = match AxiDmaHardware::open(config) {
            Ok(v) => v,
            Err(e) => {
                error!("{}", e);
                return Err(e.into());
            }
        };

        let mut poll = PollPolicy::unbounded();
        if let Some(timeout) = config.poll_timeout() {
            poll = poll.with_timeout(timeout);
        }

        Ok(Self::new(Box::new(hardware), poll))
    }
}

impl<H: TransformHardware> DmaTransformEngine<H> {
    pub fn new(hardware: H, poll: PollPolicy) -> Self {
        Self { hardware, poll }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Runs one 64 coefficient block through the hardware in place.
    pub fn transform_block(&mut self, coeffs: &mut Block) -> Result<()> {
        self.hardware.start();

        {
            let request = self.hardware.request_buffer();
            for (chunk, v) in request.chunks_exact_mut(WORD_SIZE).zip(coeffs.iter()) {
                LittleEndian::write_i32(chunk, *v as i32);
            }
        }

        // The response region is flushed too so no dirty host lines can later
        // be evicted on top of what the device writes.
        self.hardware.flush_cache(BufferRegion::Request);
        self.hardware.flush_cache(BufferRegion::Response);

        self.hardware
            .simple_transfer(BufferRegion::Request, Direction::ToDevice)?;
        self.hardware
            .simple_transfer(BufferRegion::Response, Direction::FromDevice)?;

        {
            let hardware = &self.hardware;
            self.poll.wait("DMA device to host transfer", || {
                !hardware.is_busy(Direction::FromDevice)
            })?;
        }

        self.hardware.invalidate_cache(BufferRegion::Response);

        {
            let hardware = &self.hardware;
            self.poll
                .wait("transform unit completion", || hardware.is_done())?;
        }

        let response = self.hardware.response_buffer();
        for (v, chunk) in coeffs.iter_mut().zip(response.chunks_exact(WORD_SIZE)) {
            *v = DeviceWord::from_le_bytes(chunk).to_coeff();
        }

        Ok(())
    }
}

impl<H: TransformHardware> BlockTransform for DmaTransformEngine<H> {
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()> {
        for c in 0..NUM_COMPONENTS {
            self.transform_block(block.channel_mut(c))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareTransform;
    use crate::constants::BLOCK_SIZE;
    use crate::poll::{CancellationFlag, TransformError};
    use std::time::Duration;

    fn gradient_block() -> TripleBlock {
        let mut block = TripleBlock::zero();
        for i in 0..(3 * BLOCK_SIZE) {
            block[i] = ((i * 13) % 255) as Coeff - 128;
        }
        block
    }

    #[test]
    fn device_word_is_reinterpreted() {
        let word = DeviceWord::from_le_bytes(&(-1234.75f32).to_bits().to_le_bytes());
        assert_eq!(word.as_f32(), -1234.75);
        assert_eq!(word.to_coeff(), -1234);

        // 0x40490fdb is pi, not the integer 1078530011.
        let word = DeviceWord::from_le_bytes(&[0xdb, 0x0f, 0x49, 0x40]);
        assert_eq!(word.bits(), 0x40490fdb);
        assert_eq!(word.to_coeff(), 3);
    }

    #[test]
    fn follows_transfer_protocol() {
        let mut engine = DmaTransformEngine::new(LoopbackHardware::with_latency(3), PollPolicy::unbounded());

        let mut block = [5 as Coeff; BLOCK_SIZE];
        engine.transform_block(&mut block).unwrap();

        assert_eq!(
            engine.hardware().ops(),
            &[
                HardwareOp::Start,
                HardwareOp::Flush(BufferRegion::Request),
                HardwareOp::Flush(BufferRegion::Response),
                HardwareOp::Transfer(BufferRegion::Request, Direction::ToDevice),
                HardwareOp::Transfer(BufferRegion::Response, Direction::FromDevice),
                HardwareOp::Invalidate(BufferRegion::Response),
            ][..]
        );

        assert_eq!(block[0], 8 * 16 * 5);
        assert!(block[1..].iter().all(|v| *v == 0));
    }

    #[test]
    fn matches_software_transform() {
        let mut hw_block = gradient_block();
        let mut sw_block = hw_block;

        let mut engine = DmaTransformEngine::new(LoopbackHardware::new(), PollPolicy::unbounded());
        engine.transform(&mut hw_block).unwrap();
        SoftwareTransform::new().transform(&mut sw_block).unwrap();

        assert_eq!(hw_block, sw_block);
        assert_eq!(engine.hardware().blocks_transformed(), 3);
    }

    /// Device whose DMA engine never finishes a transfer.
    struct JammedHardware(LoopbackHardware);

    impl TransformHardware for JammedHardware {
        fn start(&mut self) {
            self.0.start()
        }
        fn is_done(&self) -> bool {
            false
        }
        fn request_buffer(&mut self) -> &mut [u8] {
            self.0.request_buffer()
        }
        fn response_buffer(&self) -> &[u8] {
            self.0.response_buffer()
        }
        fn flush_cache(&mut self, region: BufferRegion) {
            self.0.flush_cache(region)
        }
        fn invalidate_cache(&mut self, region: BufferRegion) {
            self.0.invalidate_cache(region)
        }
        fn simple_transfer(&mut self, region: BufferRegion, direction: Direction) -> Result<()> {
            self.0.simple_transfer(region, direction)
        }
        fn is_busy(&self, _direction: Direction) -> bool {
            true
        }
    }

    #[test]
    fn jammed_device_times_out() {
        let mut engine = DmaTransformEngine::new(
            JammedHardware(LoopbackHardware::new()),
            PollPolicy::unbounded().with_timeout(Duration::from_millis(10)),
        );

        let mut block = gradient_block();
        let err = engine.transform(&mut block).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransformError>(),
            Some(&TransformError::Timeout {
                stage: "DMA device to host transfer"
            })
        );
    }

    #[test]
    fn jammed_device_can_be_cancelled() {
        let flag = CancellationFlag::new();
        let mut engine = DmaTransformEngine::new(
            JammedHardware(LoopbackHardware::new()),
            PollPolicy::unbounded().with_cancellation(flag.clone()),
        );

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            flag.cancel();
        });

        let mut block = gradient_block();
        let err = engine.transform(&mut block).unwrap_err();
        handle.join().unwrap();

        assert!(err.downcast_ref::<TransformError>().is_some());
    }

    #[test]
    fn open_fails_without_device() {
        let mut config = DmaConfig::default();
        config.memory_device = "/nonexistent/jpeg_offload/mem".into();

        let err = DmaTransformEngine::open(&config).err().unwrap();
        match err.downcast_ref::<SetupError>() {
            Some(SetupError::Transform(_)) => {}
            _ => panic!("Unexpected error: {}", err),
        }
    }
}
