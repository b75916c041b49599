use core::f32::consts::PI;

use crate::block::{Block, Coeff};
use crate::constants::*;

type Matrix8f = [[f32; BLOCK_DIM]; BLOCK_DIM];

// c = a * b
fn matmul(a: &Matrix8f, b: &Matrix8f, c: &mut Matrix8f) {
    for i in 0..BLOCK_DIM {
        for j in 0..BLOCK_DIM {
            let c_ij = &mut c[i][j];
            *c_ij = 0.0;
            for k in 0..BLOCK_DIM {
                *c_ij += a[i][k] * b[k][j];
            }
        }
    }
}

// c = a * b'
fn matmul_transposed(a: &Matrix8f, b: &Matrix8f, c: &mut Matrix8f) {
    for i in 0..BLOCK_DIM {
        for j in 0..BLOCK_DIM {
            let c_ij = &mut c[i][j];
            *c_ij = 0.0;
            for k in 0..BLOCK_DIM {
                *c_ij += a[i][k] * b[j][k];
            }
        }
    }
}

lazy_static! {
    /// Orthonormal DCT-II basis. Row k holds the k'th cosine.
    static ref DCT2_MAT_8X8: Matrix8f = {
        let mut out = [[0.0_f32; BLOCK_DIM]; BLOCK_DIM];
        let n = BLOCK_DIM;
        for k in 0..n {
            for i in 0..n {
                let mut v = ((PI / (n as f32)) * ((i as f32) + (1.0 / 2.0)) * (k as f32)).cos();

                v /= 2.0;
                if k == 0 {
                    v /= (2.0_f32).sqrt()
                }

                out[k][i] = v;
            }
        }

        out
    };
}

/// Computes the 2D forward DCT of one block.
///
/// The output is scaled by 16 relative to the orthonormal transform, which is
/// the scale the hardware transform engines produce.
pub fn forward_dct_scaled(input: &Block) -> [f32; BLOCK_SIZE] {
    let mut x = [[0.0_f32; BLOCK_DIM]; BLOCK_DIM];
    for (i, v) in input.iter().enumerate() {
        x[i / BLOCK_DIM][i % BLOCK_DIM] = *v as f32;
    }

    // = M * X * M'
    let dct_mat = &*DCT2_MAT_8X8;
    let mut temp = [[0.0_f32; BLOCK_DIM]; BLOCK_DIM];
    matmul(dct_mat, &x, &mut temp);
    matmul_transposed(&temp, dct_mat, &mut x);

    let mut out = [0.0_f32; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        out[i] = (x[i / BLOCK_DIM][i % BLOCK_DIM] * DCT_OUTPUT_SCALE).round();
    }

    out
}

/// Narrows a transform output to the coefficient type.
///
/// Fractions are truncated toward zero and out of range values saturate.
#[inline]
pub fn narrow(v: f32) -> Coeff {
    v as Coeff
}

/// In-place scaled forward DCT of one block.
pub fn forward_dct_in_place(block: &mut Block) {
    let out = forward_dct_scaled(block);
    for (v, o) in block.iter_mut().zip(out.iter()) {
        *v = narrow(*o);
    }
}
