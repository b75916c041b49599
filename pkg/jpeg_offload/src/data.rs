use crate::block::{Coeff, MacroblockGrid, TripleBlock};
use crate::constants::*;

/// JFIF APP0 segment (v1.01, 1:1 aspect ratio, no thumbnail).
const APP0_DATA: [u8; 17] = [
    0xe0, 0x00, 0x10, // APP0
    0x4a, 0x46, 0x49, 0x46, 0x00, // 'JFIF'
    0x01, 0x01, // v1.01
    0x00, 0x00, 0x01, 0x00, 0x01, // aspect ratio = 1:1
    0x00, 0x00, // thumbnail width/height
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub values: [i32; BLOCK_SIZE],
    pub index: usize,
}

/// One color component of a [`JpegData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    pub h_samp_factor: usize,
    pub v_samp_factor: usize,
    pub quant_idx: usize,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    pub num_blocks: usize,

    /// All blocks of the component in raster order, 64 coefficients each.
    pub coeffs: Vec<Coeff>,
}

impl Component {
    pub fn block(&self, block_index: usize) -> &[Coeff] {
        let start = block_index * BLOCK_SIZE;
        &self.coeffs[start..(start + BLOCK_SIZE)]
    }
}

/// Quantized coefficients and header fields of an image, handed on to the
/// entropy coder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegData {
    pub width: usize,
    pub height: usize,
    pub mcu_rows: usize,
    pub mcu_cols: usize,
    pub max_h_samp_factor: usize,
    pub max_v_samp_factor: usize,
    pub components: Vec<Component>,
    pub quant: Vec<QuantTable>,

    /// Raw APPn segments including their marker byte.
    pub app_data: Vec<Vec<u8>>,
}

impl JpegData {
    /// Creates an empty 4:4:4 Y/Cb/Cr image with zeroed coefficients.
    pub fn for_yuv444(width: usize, height: usize) -> Self {
        let grid = MacroblockGrid::new(width, height);
        let num_blocks = grid.num_cells();

        let mut components = vec![];
        let mut quant = vec![];
        for i in 0..NUM_COMPONENTS {
            components.push(Component {
                id: (i + 1) as u8,
                h_samp_factor: 1,
                v_samp_factor: 1,
                quant_idx: i,
                width_in_blocks: grid.cols(),
                height_in_blocks: grid.rows(),
                num_blocks,
                coeffs: vec![0; num_blocks * BLOCK_SIZE],
            });

            quant.push(QuantTable {
                values: [1; BLOCK_SIZE],
                index: i,
            });
        }

        Self {
            width,
            height,
            mcu_rows: grid.rows(),
            mcu_cols: grid.cols(),
            max_h_samp_factor: 1,
            max_v_samp_factor: 1,
            components,
            quant,
            app_data: vec![],
        }
    }

    pub fn add_app0_data(&mut self) {
        self.app_data.push(APP0_DATA.to_vec());
    }

    pub fn num_blocks(&self) -> usize {
        self.mcu_rows * self.mcu_cols
    }

    /// Copies the three channels of a quantized triple-block into the
    /// components at the given raster block index.
    pub fn set_triple_block(&mut self, block_index: usize, block: &TripleBlock) {
        let start = block_index * BLOCK_SIZE;
        for (c, component) in self.components.iter_mut().enumerate().take(NUM_COMPONENTS) {
            component.coeffs[start..(start + BLOCK_SIZE)].copy_from_slice(block.channel(c));
        }
    }

    /// Checks that no dequantized coefficient is out of the range a baseline
    /// decoder can handle.
    pub fn check_sanity(&self) -> bool {
        for comp in &self.components {
            let quant = match self.quant.get(comp.quant_idx) {
                Some(q) => q,
                None => return false,
            };

            for (i, coeff) in comp.coeffs.iter().enumerate() {
                let q = quant.values[i % BLOCK_SIZE] as i64;
                if ((*coeff as i64) * q).abs() > MAX_COMPONENT_VALUE {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv444_layout() {
        let jpg = JpegData::for_yuv444(20, 9);
        assert_eq!(jpg.mcu_cols, 3);
        assert_eq!(jpg.mcu_rows, 2);
        assert_eq!(jpg.components.len(), 3);
        for (i, comp) in jpg.components.iter().enumerate() {
            assert_eq!(comp.id as usize, i + 1);
            assert_eq!(comp.quant_idx, i);
            assert_eq!(comp.num_blocks, 6);
            assert_eq!(comp.coeffs.len(), 6 * 64);
        }
    }

    #[test]
    fn app0_segment() {
        let mut jpg = JpegData::for_yuv444(1, 1);
        jpg.add_app0_data();
        assert_eq!(jpg.app_data.len(), 1);
        assert_eq!(&jpg.app_data[0][3..7], b"JFIF");
    }

    #[test]
    fn triple_blocks_land_in_each_component() {
        let mut jpg = JpegData::for_yuv444(16, 8);
        let mut block = TripleBlock::zero();
        block.channel_mut(0)[0] = 1;
        block.channel_mut(1)[1] = 2;
        block.channel_mut(2)[63] = 3;
        jpg.set_triple_block(1, &block);

        assert_eq!(jpg.components[0].block(1)[0], 1);
        assert_eq!(jpg.components[1].block(1)[1], 2);
        assert_eq!(jpg.components[2].block(1)[63], 3);
        assert!(jpg.components[0].block(0).iter().all(|v| *v == 0));
    }

    #[test]
    fn sanity_limits() {
        let mut jpg = JpegData::for_yuv444(8, 8);
        jpg.components[0].coeffs[0] = 4096;
        assert!(jpg.check_sanity());

        jpg.quant[0].values[0] = 2;
        assert!(!jpg.check_sanity());
    }
}
