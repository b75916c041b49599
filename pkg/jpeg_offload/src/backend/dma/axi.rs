/*
Register maps:
- AXI DMA in simple (non scatter-gather) mode, see Xilinx PG021.
- Vivado HLS generated AXI-Lite control block (ap_ctrl_hs) of the transform
  unit.
*/

use std::sync::atomic::{fence, Ordering};
use std::time::{Duration, Instant};

use crate::backend::dma::hardware::*;
use crate::backend::dma::memory::MemoryBlock;
use crate::config::DmaConfig;
use crate::errors::*;

const TRANSFORM_REGISTERS_SIZE: usize = 0x1000;
const DMA_REGISTERS_SIZE: usize = 0x1000;

// Offset of the ap_ctrl register and its bits.
const AP_CTRL: usize = 0x00;
const AP_START: u32 = 1 << 0;
const AP_DONE: u32 = 1 << 1;
const AP_IDLE: u32 = 1 << 2;
const AP_AUTO_RESTART: u32 = 1 << 7;

// Per-channel register offsets relative to the channel base.
const DMACR: usize = 0x00;
const DMASR: usize = 0x04;
const MM2S_BASE: usize = 0x00;
const S2MM_BASE: usize = 0x30;
const MM2S_SA: usize = 0x18;
const MM2S_SA_MSB: usize = 0x1C;
const MM2S_LENGTH: usize = 0x28;
const S2MM_DA: usize = 0x48;
const S2MM_DA_MSB: usize = 0x4C;
const S2MM_LENGTH: usize = 0x58;

const DMACR_RUNSTOP: u32 = 1 << 0;
const DMACR_RESET: u32 = 1 << 2;
const DMA_IRQ_ALL_MASK: u32 = 0x7000;

const DMASR_HALTED: u32 = 1 << 0;
const DMASR_IDLE: u32 = 1 << 1;

/// Time allowed for the DMA engine to come out of a soft reset.
const RESET_TIMEOUT: Duration = Duration::from_millis(100);

/// Failures while bringing up the transform hardware.
#[derive(Debug, Fail)]
pub enum SetupError {
    #[fail(display = "Error initializing transform core: {}", _0)]
    Transform(String),

    #[fail(display = "Error initializing AxiDMA core: {}", _0)]
    Dma(String),
}

/// Transform unit and DMA engine accessed through physical memory mappings.
pub struct AxiDmaHardware {
    transform: MemoryBlock,
    dma: MemoryBlock,
    request: MemoryBlock,
    response: MemoryBlock,
}

impl AxiDmaHardware {
    /// Maps and initializes both devices.
    ///
    /// Interrupts for both DMA directions are disabled; all completion is
    /// observed by polling.
    pub fn open(config: &DmaConfig) -> Result<Self, SetupError> {
        let path = config.memory_device.as_str();

        info!("Initializing transform unit @ {:#x}", config.transform_unit_address);
        let transform =
            MemoryBlock::open(path, config.transform_unit_address, TRANSFORM_REGISTERS_SIZE)
                .map_err(|e| SetupError::Transform(e.to_string()))?;

        let ctrl = transform.read_register(AP_CTRL);
        if ctrl & AP_START != 0 && ctrl & AP_IDLE == 0 {
            warn!("Transform unit busy at startup (ap_ctrl = {:#x})", ctrl);
        }
        transform.write_register(AP_CTRL, ctrl & !AP_AUTO_RESTART);

        info!("Initializing AxiDMA @ {:#x}", config.dma_engine_address);
        let dma = MemoryBlock::open(path, config.dma_engine_address, DMA_REGISTERS_SIZE)
            .map_err(|e| SetupError::Dma(e.to_string()))?;

        // Resetting one channel resets the whole engine.
        dma.write_register(MM2S_BASE + DMACR, DMACR_RESET);
        let start = Instant::now();
        while dma.read_register(MM2S_BASE + DMACR) & DMACR_RESET != 0 {
            if start.elapsed() > RESET_TIMEOUT {
                return Err(SetupError::Dma("reset did not complete".into()));
            }
            std::hint::spin_loop();
        }

        for base in &[MM2S_BASE, S2MM_BASE] {
            dma.modify_register(base + DMACR, |v| (v & !DMA_IRQ_ALL_MASK) | DMACR_RUNSTOP);
        }

        let request = MemoryBlock::open(path, config.request_buffer_address, DMA_BUFFER_SIZE)
            .map_err(|e| SetupError::Dma(e.to_string()))?;
        let response = MemoryBlock::open(path, config.response_buffer_address, DMA_BUFFER_SIZE)
            .map_err(|e| SetupError::Dma(e.to_string()))?;

        Ok(Self {
            transform,
            dma,
            request,
            response,
        })
    }

    fn channel_base(direction: Direction) -> usize {
        match direction {
            Direction::ToDevice => MM2S_BASE,
            Direction::FromDevice => S2MM_BASE,
        }
    }
}

impl TransformHardware for AxiDmaHardware {
    fn start(&mut self) {
        let ctrl = self.transform.read_register(AP_CTRL) & AP_AUTO_RESTART;
        self.transform.write_register(AP_CTRL, ctrl | AP_START);
    }

    fn is_done(&self) -> bool {
        self.transform.read_register(AP_CTRL) & AP_DONE != 0
    }

    fn request_buffer(&mut self) -> &mut [u8] {
        self.request.as_mut_slice()
    }

    fn response_buffer(&self) -> &[u8] {
        self.response.as_slice()
    }

    // The buffers are mapped uncached through an O_SYNC mapping so cache
    // maintenance reduces to ordering host accesses against the device.
    fn flush_cache(&mut self, _region: BufferRegion) {
        fence(Ordering::SeqCst);
    }

    fn invalidate_cache(&mut self, _region: BufferRegion) {
        fence(Ordering::SeqCst);
    }

    fn simple_transfer(&mut self, region: BufferRegion, direction: Direction) -> Result<()> {
        let base = Self::channel_base(direction);
        let sr = self.dma.read_register(base + DMASR);
        if sr & DMASR_HALTED != 0 {
            return Err(format_err!("DMA channel {:?} is halted (sr = {:#x})", direction, sr));
        }

        let address = match region {
            BufferRegion::Request => self.request.physical_address(),
            BufferRegion::Response => self.response.physical_address(),
        };

        let (addr_reg, addr_msb_reg, length_reg) = match direction {
            Direction::ToDevice => (MM2S_SA, MM2S_SA_MSB, MM2S_LENGTH),
            Direction::FromDevice => (S2MM_DA, S2MM_DA_MSB, S2MM_LENGTH),
        };

        self.dma.write_register(addr_reg, address as u32);
        self.dma.write_register(addr_msb_reg, (address >> 32) as u32);

        // Writing the length starts the transfer.
        self.dma.write_register(length_reg, DMA_BUFFER_SIZE as u32);

        Ok(())
    }

    fn is_busy(&self, direction: Direction) -> bool {
        let base = Self::channel_base(direction);
        self.dma.read_register(base + DMASR) & DMASR_IDLE == 0
    }
}
