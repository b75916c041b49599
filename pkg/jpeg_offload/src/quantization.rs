use crate::block::{Coeff, TripleBlock};
use crate::constants::*;
use crate::errors::*;

/// Quantization table used when the caller doesn't supply one.
///
/// All ones so the quantizer only removes the fixed point scaling.
pub const DEFAULT_QUANT_TABLE: [i32; TRIPLE_BLOCK_SIZE] = [1; TRIPLE_BLOCK_SIZE];

/// Base luminance quantization table used as the default table for quality 50
/// (out of 100).
///
/// From ITU T.81, Table K.1.
const BASE_LUMINANCE_QUANTIZATION_TABLE: [u8; BLOCK_SIZE] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
    56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104,
    113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

/// Base chrominance quantization table used as the default table for quality 50
/// (out of 100).
///
/// From ITU T.81, Table K.2.
const BASE_CHROMINANCE_QUANTIZATION_TABLE: [u8; BLOCK_SIZE] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

/// Creates a full Y/Cb/Cr quantization table scaled for the given quality.
///
/// Arguments:
///   quality: Integer from 1 to 100
///
/// Returns: 192 steps, the luminance table followed by two copies of the
/// chrominance table.
pub fn create_quantization_table(quality: usize) -> [i32; TRIPLE_BLOCK_SIZE] {
    let quality = quality.max(1).min(100);

    let mut out = [0i32; TRIPLE_BLOCK_SIZE];
    for c in 0..NUM_COMPONENTS {
        let base = if c == 0 {
            &BASE_LUMINANCE_QUANTIZATION_TABLE
        } else {
            &BASE_CHROMINANCE_QUANTIZATION_TABLE
        };

        for (i, v) in base.iter().enumerate() {
            out[c * BLOCK_SIZE + i] = scale_quantization_step(*v, quality);
        }
    }

    out
}

fn scale_quantization_step(base: u8, quality: usize) -> i32 {
    let s_q = if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    };

    let v = ((base as usize) * s_q + 50) / 100;
    (v as i32).min(255).max(1)
}

/// Fixed point reciprocal of a quantization step.
#[inline]
pub fn reciprocal(step: i32) -> i32 {
    ((1 << IQUANT_BITS) + 1) / step
}

/// Quantizes one transformed coefficient.
///
/// 'coeff' is expected to be the x16 scaled transform output and 'iquant' the
/// reciprocal of the step (see [`reciprocal`]).
#[inline]
pub fn quantize(coeff: Coeff, iquant: i32) -> Coeff {
    (((coeff as i64) * (iquant as i64) + QUANT_BIAS) >> DCT_BITS) as Coeff
}

/// Reciprocal steps for all three components of an image.
///
/// Built once from the quantization table and shared by every block.
#[derive(Clone)]
pub struct ReciprocalTable {
    steps: [i32; TRIPLE_BLOCK_SIZE],
    values: [i32; TRIPLE_BLOCK_SIZE],
}

impl ReciprocalTable {
    pub fn new(quant: &[i32]) -> Result<Self> {
        if quant.len() != TRIPLE_BLOCK_SIZE {
            return Err(EncodeError::InvalidQuantTable { len: quant.len() }.into());
        }

        let mut steps = [0; TRIPLE_BLOCK_SIZE];
        let mut values = [0; TRIPLE_BLOCK_SIZE];
        for (i, v) in quant.iter().enumerate() {
            if *v <= 0 {
                return Err(EncodeError::ZeroQuantStep { index: i }.into());
            }

            steps[i] = *v;
            values[i] = reciprocal(*v);
        }

        Ok(Self { steps, values })
    }

    /// The quantization steps of one component.
    pub fn steps(&self, component: usize) -> &[i32; BLOCK_SIZE] {
        array_ref![self.steps, component * BLOCK_SIZE, BLOCK_SIZE]
    }

    pub fn quantize_block(&self, block: &mut TripleBlock) {
        for (v, iquant) in block.iter_mut().zip(self.values.iter()) {
            *v = quantize(*v, *iquant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reciprocal_values() {
        assert_eq!(reciprocal(1), 65537);
        assert_eq!(reciprocal(2), 32768);
        assert_eq!(reciprocal(255), 257);
    }

    #[test]
    fn quantize_rounding_error_is_bounded() {
        for step in 1..=255 {
            let iquant = reciprocal(step);
            for coeff in (-16384..16384).step_by(7) {
                let q = quantize(coeff as Coeff, iquant) as i64;
                let err = (q * (step as i64) * 16 - coeff as i64).abs();
                assert!(
                    err < 16 * (step as i64),
                    "coeff {} step {} -> {}",
                    coeff,
                    step,
                    q
                );
            }
        }
    }

    #[test]
    fn identity_quantization_removes_scale() {
        let iquant = reciprocal(1);
        assert_eq!(quantize(0, iquant), 0);
        assert_eq!(quantize(16, iquant), 1);
        assert_eq!(quantize(-16, iquant), -1);
        assert_eq!(quantize(-16384, iquant), -1024);
        assert_eq!(quantize(16256, iquant), 1016);
    }

    #[test]
    fn rejects_bad_tables() {
        let err = ReciprocalTable::new(&[1; 10]).err().unwrap();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::InvalidQuantTable { len: 10 })
        );

        let mut table = DEFAULT_QUANT_TABLE;
        table[70] = 0;
        let err = ReciprocalTable::new(&table).err().unwrap();
        assert_eq!(
            err.downcast_ref::<EncodeError>(),
            Some(&EncodeError::ZeroQuantStep { index: 70 })
        );
    }

    #[test]
    fn quality_tables() {
        let q50 = create_quantization_table(50);
        assert_eq!(&q50[0..8], &[16, 11, 10, 16, 24, 40, 51, 61]);
        assert_eq!(q50[BLOCK_SIZE], 17);
        assert_eq!(q50[2 * BLOCK_SIZE], 17);

        let q100 = create_quantization_table(100);
        assert!(q100.iter().all(|v| *v == 1));

        let q1 = create_quantization_table(1);
        assert!(q1.iter().all(|v| *v >= 1 && *v <= 255));
    }
}
