use std::ops::{Index, IndexMut};

use crate::constants::*;

/// Storage type of a single spatial or frequency domain coefficient.
pub type Coeff = i16;

/// Number of bytes used to encode one coefficient on the wire.
pub const COEFF_BYTES: usize = std::mem::size_of::<Coeff>();

/// One channel's 8x8 block stored in row-major order.
pub type Block = [Coeff; BLOCK_SIZE];

/// The Y, Cb and Cr blocks of one grid cell stored back to back.
///
/// This is the unit exchanged with transform engines.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TripleBlock {
    data: [Coeff; TRIPLE_BLOCK_SIZE],
}

impl TripleBlock {
    /// Size in bytes of the wire encoding of a triple-block.
    pub const BYTE_SIZE: usize = TRIPLE_BLOCK_SIZE * COEFF_BYTES;

    pub fn zero() -> Self {
        Self {
            data: [0; TRIPLE_BLOCK_SIZE],
        }
    }

    pub fn channel(&self, component: usize) -> &Block {
        match component {
            0 => array_ref![self.data, 0, BLOCK_SIZE],
            1 => array_ref![self.data, BLOCK_SIZE, BLOCK_SIZE],
            2 => array_ref![self.data, 2 * BLOCK_SIZE, BLOCK_SIZE],
            _ => panic!("Component index out of range: {}", component),
        }
    }

    pub fn channel_mut(&mut self, component: usize) -> &mut Block {
        match component {
            0 => array_mut_ref![self.data, 0, BLOCK_SIZE],
            1 => array_mut_ref![self.data, BLOCK_SIZE, BLOCK_SIZE],
            2 => array_mut_ref![self.data, 2 * BLOCK_SIZE, BLOCK_SIZE],
            _ => panic!("Component index out of range: {}", component),
        }
    }

    pub fn as_slice(&self) -> &[Coeff] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Coeff] {
        &mut self.data
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<Coeff> {
        self.data.iter_mut()
    }
}

impl Default for TripleBlock {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Debug for TripleBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TripleBlock")
            .field("y", &&self.data[0..BLOCK_SIZE])
            .field("cb", &&self.data[BLOCK_SIZE..2 * BLOCK_SIZE])
            .field("cr", &&self.data[2 * BLOCK_SIZE..])
            .finish()
    }
}

impl Index<usize> for TripleBlock {
    type Output = Coeff;

    fn index(&self, index: usize) -> &Coeff {
        &self.data[index]
    }
}

impl IndexMut<usize> for TripleBlock {
    fn index_mut(&mut self, index: usize) -> &mut Coeff {
        &mut self.data[index]
    }
}

pub fn ceil_div(a: usize, b: usize) -> usize {
    let mut out = a / b;
    if a % b != 0 {
        out += 1;
    }

    out
}

/// Position of one 8x8 cell in the macroblock grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub block_x: usize,
    pub block_y: usize,

    /// Raster index of the cell (block_y * cols + block_x).
    pub index: usize,
}

/// Row-major tiling of an image into 8x8 cells.
///
/// Both stages of the streaming pipeline derive their traversal from this
/// type so the Nth block written is always the Nth block read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroblockGrid {
    width: usize,
    height: usize,
    cols: usize,
    rows: usize,
}

impl MacroblockGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cols: ceil_div(width, BLOCK_DIM),
            rows: ceil_div(height, BLOCK_DIM),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// MCU_cols
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// MCU_rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn num_cells(&self) -> usize {
        self.cols * self.rows
    }

    pub fn cells(&self) -> GridCells {
        GridCells {
            cols: self.cols,
            total: self.num_cells(),
            next: 0,
        }
    }

    /// Gathers the triple-block of one cell from an interleaved RGB raster.
    ///
    /// Samples past the right or bottom edge repeat the last valid column or
    /// row of the image.
    pub fn sample_cell(&self, rgb: &[u8], cell: &GridCell, out: &mut TripleBlock) {
        for iy in 0..BLOCK_DIM {
            for ix in 0..BLOCK_DIM {
                let (y, x) = self.clamp(BLOCK_DIM * cell.block_y + iy, BLOCK_DIM * cell.block_x + ix);
                let p = 3 * (y * self.width + x);
                let yuv = crate::color::rgb_to_ycbcr16(rgb[p], rgb[p + 1], rgb[p + 2]);

                let i = BLOCK_DIM * iy + ix;
                out[i] = yuv[0];
                out[BLOCK_SIZE + i] = yuv[1];
                out[2 * BLOCK_SIZE + i] = yuv[2];
            }
        }
    }

    /// Maps a (possibly out of bounds) sample coordinate to the pixel it
    /// duplicates.
    pub fn clamp(&self, y: usize, x: usize) -> (usize, usize) {
        (y.min(self.height - 1), x.min(self.width - 1))
    }
}

/// Iterator over the cells of a [`MacroblockGrid`] in raster order.
pub struct GridCells {
    cols: usize,
    total: usize,
    next: usize,
}

impl Iterator for GridCells {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        if self.next >= self.total {
            return None;
        }

        let index = self.next;
        self.next += 1;

        Some(GridCell {
            block_x: index % self.cols,
            block_y: index / self.cols,
            index,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.total - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for GridCells {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_dimensions() {
        let grid = MacroblockGrid::new(17, 8);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.num_cells(), 3);

        let grid = MacroblockGrid::new(0, 0);
        assert_eq!(grid.num_cells(), 0);
        assert_eq!(grid.cells().count(), 0);
    }

    #[test]
    fn cells_are_row_major_and_unique() {
        for &(w, h) in &[(1, 1), (8, 8), (9, 7), (33, 17), (64, 3)] {
            let grid = MacroblockGrid::new(w, h);
            let cells = grid.cells().collect::<Vec<_>>();
            assert_eq!(cells.len(), ceil_div(w, 8) * ceil_div(h, 8));

            for (i, cell) in cells.iter().enumerate() {
                assert_eq!(cell.index, i);
                assert_eq!(cell.index, cell.block_y * grid.cols() + cell.block_x);
            }

            for pair in cells.windows(2) {
                let a = (pair[0].block_y, pair[0].block_x);
                let b = (pair[1].block_y, pair[1].block_x);
                assert!(a < b);
            }
        }
    }

    #[test]
    fn edge_samples_are_duplicated() {
        // 3x2 image where every pixel has a distinct gray level.
        let (w, h) = (3, 2);
        let mut rgb = vec![];
        for i in 0..(w * h) {
            let v = (i * 40) as u8;
            rgb.extend_from_slice(&[v, v, v]);
        }

        let grid = MacroblockGrid::new(w, h);
        let cell = grid.cells().next().unwrap();
        let mut block = TripleBlock::zero();
        grid.sample_cell(&rgb, &cell, &mut block);

        for iy in 0..8 {
            for ix in 0..8 {
                let (y, x) = (iy.min(h - 1), ix.min(w - 1));
                let v = (((y * w) + x) * 40) as u8;
                let expected = crate::color::rgb_to_ycbcr16(v, v, v);
                assert_eq!(block[iy * 8 + ix], expected[0], "at {},{}", iy, ix);
            }
        }

        assert_eq!(grid.clamp(100, 100), (1, 2));
    }

    #[test]
    fn channel_views() {
        let mut block = TripleBlock::zero();
        block.channel_mut(1)[3] = 7;
        block.channel_mut(2)[63] = -2;

        assert_eq!(block[BLOCK_SIZE + 3], 7);
        assert_eq!(block[TRIPLE_BLOCK_SIZE - 1], -2);
        assert_eq!(block.channel(0), &[0; BLOCK_SIZE]);
        assert_eq!(TripleBlock::BYTE_SIZE, 384);
    }
}
