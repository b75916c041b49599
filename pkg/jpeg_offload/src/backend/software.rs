use crate::backend::BlockTransform;
use crate::block::TripleBlock;
use crate::constants::NUM_COMPONENTS;
use crate::dct::forward_dct_in_place;
use crate::errors::*;

/// Runs the scaled forward DCT on the CPU.
#[derive(Default, Clone, Copy, Debug)]
pub struct SoftwareTransform;

impl SoftwareTransform {
    pub fn new() -> Self {
        Self
    }
}

impl BlockTransform for SoftwareTransform {
    fn transform(&mut self, block: &mut TripleBlock) -> Result<()> {
        for c in 0..NUM_COMPONENTS {
            forward_dct_in_place(block.channel_mut(c));
        }

        Ok(())
    }
}
