//! Engines that execute the forward DCT of triple-blocks.
//!
//! Every engine consumes spatial domain Y/Cb/Cr samples and overwrites them
//! with frequency domain values scaled by 16. A call only returns once the
//! transform of that block is complete.

pub mod dma;
pub mod software;
pub mod stream;

use crate::block::TripleBlock;
use crate::config::StreamTopology;
use crate::errors::*;

pub use dma::DmaTransformEngine;
pub use software::SoftwareTransform;
pub use stream::StreamTransformEngine;

pub trait BlockTransform {
    /// Transforms all three channels of 'block' in place.
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()>;
}

impl<T: BlockTransform + ?Sized> BlockTransform for &mut T {
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()> {
        (**self).transform(block)
    }
}

impl<T: BlockTransform + ?Sized> BlockTransform for Box<T> {
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()> {
        (**self).transform(block)
    }
}

/// The transform backend selected for one encode.
///
/// The streaming engine is not driven block by block here: the pipeline
/// splits it into a producer and a consumer stage instead.
pub enum Backend {
    Software(SoftwareTransform),
    Dma(DmaTransformEngine<Box<dyn dma::TransformHardware + Send>>),
    Stream {
        engine: StreamTransformEngine,
        topology: StreamTopology,
    },
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Software(_) => "software",
            Backend::Dma(_) => "dma",
            Backend::Stream { .. } => "stream",
        }
    }
}
