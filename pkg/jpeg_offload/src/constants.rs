pub const BLOCK_DIM: usize = 8;
pub const BLOCK_SIZE: usize = 64;

/// Number of color components carried through the pipeline (Y, Cb, Cr).
pub const NUM_COMPONENTS: usize = 3;

/// Number of coefficients in one Y/Cb/Cr triple-block.
pub const TRIPLE_BLOCK_SIZE: usize = NUM_COMPONENTS * BLOCK_SIZE;

/// Images must have each dimension strictly below this.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Fractional bits of the reciprocal quantization steps.
pub const IQUANT_BITS: u32 = 16;

/// Total right shift applied after multiplying by a reciprocal step.
/// NOTE: The transform output is upscaled by 16 so 4 extra bits are removed.
pub const DCT_BITS: u32 = IQUANT_BITS + 4;

/// Half-unit rounding bias for the combined fixed point scale.
pub const QUANT_BIAS: i64 = 0x80 << (DCT_BITS - 8);

/// Scale factor of transform outputs relative to the orthonormal DCT.
pub const DCT_OUTPUT_SCALE: f32 = 16.0;

/// Largest |coeff * quant| product accepted by the sanity check.
pub const MAX_COMPONENT_VALUE: i64 = 1 << 12;
