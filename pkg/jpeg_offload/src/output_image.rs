//! Passive holder of already computed coefficients.
//!
//! Coefficients are stored dequantized (multiplied by their quantization
//! step) so they can be edited independently of the table they were encoded
//! with.

use crate::block::{ceil_div, Block, Coeff};
use crate::constants::*;
use crate::data::JpegData;
use crate::errors::*;

#[derive(Debug, Clone)]
pub struct OutputImageComponent {
    width: usize,
    height: usize,
    factor_x: usize,
    factor_y: usize,
    width_in_blocks: usize,
    height_in_blocks: usize,
    coeffs: Vec<Coeff>,
    quant: [i32; BLOCK_SIZE],
}

impl OutputImageComponent {
    pub fn new(width: usize, height: usize) -> Self {
        let mut comp = Self {
            width,
            height,
            factor_x: 1,
            factor_y: 1,
            width_in_blocks: 0,
            height_in_blocks: 0,
            coeffs: vec![],
            quant: [1; BLOCK_SIZE],
        };
        comp.reset(1, 1);
        comp
    }

    /// Clears all coefficients and resizes for the given subsampling factors.
    pub fn reset(&mut self, factor_x: usize, factor_y: usize) {
        self.factor_x = factor_x;
        self.factor_y = factor_y;
        self.width_in_blocks = ceil_div(self.width, BLOCK_DIM * factor_x);
        self.height_in_blocks = ceil_div(self.height, BLOCK_DIM * factor_y);
        self.coeffs = vec![0; self.num_blocks() * BLOCK_SIZE];
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn factor_x(&self) -> usize {
        self.factor_x
    }

    pub fn factor_y(&self) -> usize {
        self.factor_y
    }

    pub fn width_in_blocks(&self) -> usize {
        self.width_in_blocks
    }

    pub fn height_in_blocks(&self) -> usize {
        self.height_in_blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.width_in_blocks * self.height_in_blocks
    }

    pub fn coeffs(&self) -> &[Coeff] {
        &self.coeffs
    }

    pub fn quant(&self) -> &[i32; BLOCK_SIZE] {
        &self.quant
    }

    pub fn is_all_zero(&self) -> bool {
        self.coeffs.iter().all(|c| *c == 0)
    }

    fn block_offset(&self, block_x: usize, block_y: usize) -> usize {
        (block_y * self.width_in_blocks + block_x) * BLOCK_SIZE
    }

    pub fn get_coeff_block(&self, block_x: usize, block_y: usize) -> Block {
        let offset = self.block_offset(block_x, block_y);
        *array_ref![self.coeffs, offset, BLOCK_SIZE]
    }

    /// Replaces one block of dequantized coefficients. Every value must be a
    /// multiple of its quantization step.
    pub fn set_coeff_block(&mut self, block_x: usize, block_y: usize, block: &Block) -> Result<()> {
        for (k, (v, q)) in block.iter().zip(self.quant.iter()).enumerate() {
            if (*v as i32) % *q != 0 {
                return Err(format_err!(
                    "Coefficient {} at position {} is not a multiple of step {}",
                    v,
                    k,
                    q
                ));
            }
        }

        let offset = self.block_offset(block_x, block_y);
        self.coeffs[offset..(offset + BLOCK_SIZE)].copy_from_slice(block);
        Ok(())
    }

    fn copy_from_jpeg_component(
        &mut self,
        coeffs: &[Coeff],
        jpeg_width_in_blocks: usize,
        factor_x: usize,
        factor_y: usize,
        quant: &[i32; BLOCK_SIZE],
    ) {
        self.reset(factor_x, factor_y);
        self.quant = *quant;

        for block_y in 0..self.height_in_blocks {
            for block_x in 0..self.width_in_blocks {
                let src = (block_y * jpeg_width_in_blocks + block_x) * BLOCK_SIZE;
                let dst = self.block_offset(block_x, block_y);
                for k in 0..BLOCK_SIZE {
                    self.coeffs[dst + k] = ((coeffs[src + k] as i32) * quant[k]) as Coeff;
                }
            }
        }
    }
}

/// Per component coefficient planes of one image.
#[derive(Debug, Clone)]
pub struct OutputImage {
    width: usize,
    height: usize,
    components: Vec<OutputImageComponent>,
}

impl OutputImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            components: (0..NUM_COMPONENTS)
                .map(|_| OutputImageComponent::new(width, height))
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn component(&self, c: usize) -> &OutputImageComponent {
        &self.components[c]
    }

    pub fn component_mut(&mut self, c: usize) -> &mut OutputImageComponent {
        &mut self.components[c]
    }

    pub fn copy_from_jpeg_data(&mut self, jpg: &JpegData) -> Result<()> {
        if jpg.components.len() != self.components.len() {
            return Err(format_err!(
                "Expected {} components, got {}",
                self.components.len(),
                jpg.components.len()
            ));
        }

        // Everything is checked before the first component is overwritten.
        let mut tables = vec![];
        for jpeg_comp in &jpg.components {
            let quant = jpg
                .quant
                .get(jpeg_comp.quant_idx)
                .ok_or_else(|| format_err!("Missing quant table {}", jpeg_comp.quant_idx))?;

            if let Some(k) = quant.values.iter().position(|q| *q <= 0) {
                return Err(format_err!(
                    "Quant table {} has non-positive step {} at position {}",
                    jpeg_comp.quant_idx,
                    quant.values[k],
                    k
                ));
            }

            if jpeg_comp.h_samp_factor == 0 || jpeg_comp.v_samp_factor == 0 {
                return Err(format_err!("Component {} has a zero sampling factor", jpeg_comp.id));
            }

            tables.push(quant);
        }

        for ((comp, jpeg_comp), quant) in self
            .components
            .iter_mut()
            .zip(jpg.components.iter())
            .zip(tables)
        {
            comp.copy_from_jpeg_component(
                &jpeg_comp.coeffs,
                jpeg_comp.width_in_blocks,
                jpg.max_h_samp_factor / jpeg_comp.h_samp_factor,
                jpg.max_v_samp_factor / jpeg_comp.v_samp_factor,
                &quant.values,
            );
        }

        Ok(())
    }

    /// Writes the coefficients back in quantized form. Only 4:4:4 images can
    /// be saved.
    pub fn save_to_jpeg_data(&self, jpg: &mut JpegData) -> Result<()> {
        if self.components.iter().any(|c| c.factor_x != 1 || c.factor_y != 1) {
            return Err(err_msg("Only unsubsampled images can be saved"));
        }

        *jpg = JpegData::for_yuv444(self.width, self.height);
        jpg.add_app0_data();

        for (i, comp) in self.components.iter().enumerate() {
            jpg.quant[i].values = comp.quant;

            let out = &mut jpg.components[i].coeffs;
            for (j, v) in comp.coeffs.iter().enumerate() {
                out[j] = ((*v as i32) / comp.quant[j % BLOCK_SIZE]) as Coeff;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_component_is_empty() {
        let comp = OutputImageComponent::new(17, 8);
        assert_eq!(comp.width_in_blocks(), 3);
        assert_eq!(comp.height_in_blocks(), 1);
        assert_eq!(comp.coeffs().len(), 3 * 64);
        assert!(comp.is_all_zero());
        assert!(comp.quant().iter().all(|q| *q == 1));
    }

    #[test]
    fn set_coeff_block_checks_steps() {
        let mut image = OutputImage::new(16, 16);
        let mut jpg = JpegData::for_yuv444(16, 16);
        jpg.quant[0].values = [4; BLOCK_SIZE];
        image.copy_from_jpeg_data(&jpg).unwrap();

        let mut block = [0; BLOCK_SIZE];
        block[0] = 6;
        assert!(image.component_mut(0).set_coeff_block(1, 1, &block).is_err());

        block[0] = 8;
        image.component_mut(0).set_coeff_block(1, 1, &block).unwrap();
        assert_eq!(image.component(0).get_coeff_block(1, 1)[0], 8);
        assert!(!image.component(0).is_all_zero());
        assert!(image.component(1).is_all_zero());
    }

    #[test]
    fn rejects_non_positive_steps() {
        let mut jpg = JpegData::for_yuv444(8, 8);
        jpg.components[0].coeffs[0] = 3;
        jpg.quant[2].values[10] = 0;

        let mut image = OutputImage::new(8, 8);
        assert!(image.copy_from_jpeg_data(&jpg).is_err());
        assert!(image.component(0).is_all_zero());

        jpg.quant[2].values[10] = -4;
        assert!(image.copy_from_jpeg_data(&jpg).is_err());

        jpg.quant[2].values[10] = 4;
        image.copy_from_jpeg_data(&jpg).unwrap();
        assert_eq!(image.component(0).get_coeff_block(0, 0)[0], 3);
    }

    #[test]
    fn jpeg_data_round_trip() {
        let mut jpg = JpegData::for_yuv444(16, 8);
        jpg.quant[1].values = [3; BLOCK_SIZE];
        jpg.components[1].coeffs[64 + 5] = -7;

        let mut image = OutputImage::new(16, 8);
        image.copy_from_jpeg_data(&jpg).unwrap();
        assert_eq!(image.component(1).get_coeff_block(1, 0)[5], -21);

        let mut saved = JpegData::for_yuv444(1, 1);
        image.save_to_jpeg_data(&mut saved).unwrap();
        assert_eq!(saved.components[1].coeffs, jpg.components[1].coeffs);
        assert_eq!(saved.quant[1].values, [3; BLOCK_SIZE]);
    }
}
