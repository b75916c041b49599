use std::path::Path;
use std::time::Duration;

use crate::constants::TRIPLE_BLOCK_SIZE;
use crate::errors::*;
use crate::quantization::{create_quantization_table, DEFAULT_QUANT_TABLE};

const MEM_BASE_ADDR: u64 = 0x0100_0000;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CPU transform.
    Software,

    /// Blocking in-process transfers through the AXI DMA engine.
    Dma,

    /// Two stage pipeline over a pair of character device streams.
    Stream,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Dma
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "software" => BackendKind::Software,
            "dma" => BackendKind::Dma,
            "stream" => BackendKind::Stream,
            _ => return Err(format_err!("Unknown backend: {}", s)),
        })
    }
}

/// How the two stages of the streaming pipeline are executed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamTopology {
    /// Producer and consumer run as two threads of this process.
    Threads,

    /// The producer runs in a forked child process.
    Processes,
}

impl Default for StreamTopology {
    fn default() -> Self {
        StreamTopology::Threads
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DmaConfig {
    /// File through which physical memory is mapped.
    pub memory_device: String,

    /// Physical address of the transform unit's AXI-Lite control registers.
    pub transform_unit_address: u64,

    /// Physical address of the AXI DMA engine's registers.
    pub dma_engine_address: u64,

    /// Physical address of the reserved buffer read by the DMA engine.
    pub request_buffer_address: u64,

    /// Physical address of the reserved buffer written by the DMA engine.
    pub response_buffer_address: u64,

    /// Upper bound on each busy-wait. Unbounded if not set.
    pub poll_timeout_us: Option<u64>,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            memory_device: "/dev/mem".into(),
            transform_unit_address: 0x43C0_0000,
            dma_engine_address: 0x4040_0000,
            request_buffer_address: MEM_BASE_ADDR + 0x0010_0000,
            response_buffer_address: MEM_BASE_ADDR + 0x0030_0000,
            poll_timeout_us: None,
        }
    }
}

impl DmaConfig {
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_us.map(Duration::from_micros)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Write-only device feeding the transform engine.
    pub write_device: String,

    /// Read-only device returning transformed blocks.
    pub read_device: String,

    pub topology: StreamTopology,

    /// Number of consecutive zero length reads after which the engine is
    /// considered disconnected. Zero length reads are retried forever if not
    /// set.
    pub max_zero_reads: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            write_device: "/dev/xillybus_write_32".into(),
            read_device: "/dev/xillybus_read_32".into(),
            topology: StreamTopology::default(),
            max_zero_reads: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub backend: BackendKind,

    pub dma: DmaConfig,

    pub stream: StreamConfig,

    /// Explicit quantization steps: 64 per component in Y, Cb, Cr order.
    pub quant: Option<Vec<i32>>,

    /// Builds standard tables for this quality when no explicit table is
    /// given.
    pub quality: Option<usize>,
}

impl EncoderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Resolves the quantization table to encode with.
    ///
    /// Validation of the individual steps happens when the reciprocal table
    /// is built.
    pub fn quant_table(&self) -> Vec<i32> {
        if let Some(quant) = &self.quant {
            return quant.clone();
        }

        if let Some(quality) = self.quality {
            return create_quantization_table(quality).to_vec();
        }

        DEFAULT_QUANT_TABLE.to_vec()
    }
}

/// Parses a whitespace or comma separated list of quantization steps.
pub fn parse_quant_table(text: &str) -> Result<Vec<i32>> {
    let mut out = Vec::with_capacity(TRIPLE_BLOCK_SIZE);
    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
    {
        out.push(token.parse::<i32>()?);
    }

    Ok(out)
}
