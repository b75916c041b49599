use crate::block::Coeff;

/// Fractional bits of the fixed point conversion matrix.
const FRAC: u32 = 16;
const HALF: i32 = 1 << (FRAC - 1);

/// Converts a single RGB pixel into signed Y/Cb/Cr samples.
///
/// Each output is centered around zero and lies in [-128, 127]. The matrix
/// coefficients are the T.871 ones scaled by 2^16; every row adds a half unit
/// before the final shift so results are rounded rather than truncated.
#[inline]
pub fn rgb_to_ycbcr16(r: u8, g: u8, b: u8) -> [Coeff; 3] {
    let r = r as i32;
    let g = g as i32;
    let b = b as i32;

    let y = (19595 * r + 38469 * g + 7471 * b - (128 << FRAC) + HALF) >> FRAC;
    let cb = (-11059 * r - 21709 * g + 32768 * b + HALF - 1) >> FRAC;
    let cr = (32768 * r - 27439 * g - 5329 * b + HALF - 1) >> FRAC;

    [y as Coeff, cb as Coeff, cr as Coeff]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_gray_is_zero() {
        assert_eq!(rgb_to_ycbcr16(128, 128, 128), [0, 0, 0]);
    }

    #[test]
    fn extremes() {
        assert_eq!(rgb_to_ycbcr16(0, 0, 0), [-128, 0, 0]);
        assert_eq!(rgb_to_ycbcr16(255, 255, 255), [127, 0, 0]);

        // Pure blue saturates Cb, pure red saturates Cr.
        assert_eq!(rgb_to_ycbcr16(0, 0, 255)[1], 127);
        assert_eq!(rgb_to_ycbcr16(255, 0, 0)[2], 127);
    }

    #[test]
    fn output_range_is_bounded() {
        for r in (0..=255).step_by(5) {
            for g in (0..=255).step_by(5) {
                for b in (0..=255).step_by(5) {
                    for v in rgb_to_ycbcr16(r as u8, g as u8, b as u8).iter() {
                        assert!(*v >= -128 && *v <= 127, "{} {} {} -> {}", r, g, b, v);
                    }
                }
            }
        }
    }
}
