//! The striped DP matrix.
//!
//! Matrix memory is laid out as follows:
//!
//! - Individual cell scores are packed into 128-bit [`V128`] words.
//! - Words are packed into quartets; the quartet members hold one vector
//!   from E, one from F, one from H, and one reserved word (TMP). The fill
//!   kernel stages the initial H column in the first column of TMP words.
//! - Quartets are packed into columns. The number of quartets per column is
//!   the number of matrix rows divided by the lanes per word, rounded up.
//!
//! Rows are striped: scalar row `r` lives in lane `r / nvecrow` of vector
//! row `r % nvecrow`. Columns are not striped, so moving one scalar column
//! advances by `colstride` words and moving one vector row advances by
//! `rowstride` words. The quartet offsets are fixed (E=0, F=1, H=2, TMP=3),
//! which lets [`StripedMatrix::elt`] recover any scalar value with one lane
//! read.

use std::sync::Arc;

use super::mask::MaskTable;
use super::mem_tally::{MemCategory, MemTally};
use super::vector_buf::{AlignedVectorBuffer, V128};

/// The four vector roles stored per DP cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Horizontal-gap score entering from the left.
    E = 0,
    /// Vertical-gap score entering from above.
    F = 1,
    /// Best score at the cell.
    H = 2,
    /// Reserved word, used by the fill kernel for staging.
    Tmp = 3,
}

impl Stream {
    #[inline]
    fn offset(self) -> usize {
        self as usize
    }
}

/// Vector words per matrix cell (E, F, H, TMP).
pub const NVEC_PER_CELL: usize = 4;

/// Striped matrix of E/F/H/TMP score vectors plus the backtrace mask table.
///
/// The vector buffer and mask table are owned inline; the matrix itself is
/// owned by one [`StripedData`](super::striped_data::StripedData) and reused
/// across alignments through [`StripedMatrix::clear`].
pub struct StripedMatrix {
    inited: bool,
    nrow: usize,
    ncol: usize,
    nvecrow: usize,
    nveccol: usize,
    wperv: usize,
    vec_shift: usize,
    nvec_per_col: usize,
    colstride: usize,
    rowstride: usize,
    buf: AlignedVectorBuffer,
    masks: MaskTable,
}

impl StripedMatrix {
    pub fn new(tally: Arc<MemTally>) -> Self {
        StripedMatrix {
            inited: false,
            nrow: 0,
            ncol: 0,
            nvecrow: 0,
            nveccol: 0,
            wperv: 0,
            vec_shift: 0,
            nvec_per_col: 0,
            colstride: 0,
            rowstride: 0,
            buf: AlignedVectorBuffer::new(MemCategory::DpVector, Arc::clone(&tally)),
            masks: MaskTable::new(tally),
        }
    }

    /// Size the matrix for `nrow x ncol` scalar cells with `wperv` lanes
    /// per vector word (16 for unsigned bytes, 8 for signed 16-bit), and
    /// zero the mask table.
    pub fn init(&mut self, nrow: usize, ncol: usize, wperv: usize) {
        debug_assert!(wperv == 8 || wperv == 16, "unsupported lane count {wperv}");
        debug_assert!(nrow > 0 && ncol > 0);
        self.nrow = nrow;
        self.ncol = ncol;
        self.wperv = wperv;
        self.vec_shift = wperv.trailing_zeros() as usize;
        self.nvecrow = (nrow + wperv - 1) >> self.vec_shift;
        self.nveccol = ncol;
        self.rowstride = NVEC_PER_CELL;
        self.nvec_per_col = self.nvecrow * NVEC_PER_CELL;
        self.colstride = self.nvec_per_col;
        // One spare column so the shifted-column accessors below can hand
        // out a word one past the last real column.
        self.buf.resize((self.nveccol + 1) * self.colstride);
        self.masks.init(nrow, ncol);
        self.inited = true;
    }

    /// Drop occupancy, keep capacity for the next alignment.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.inited = false;
    }

    #[inline]
    pub fn is_inited(&self) -> bool {
        self.inited
    }

    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Vector rows per column (`ceil(nrow / wperv)`).
    #[inline]
    pub fn nvecrow(&self) -> usize {
        self.nvecrow
    }

    #[inline]
    pub fn nveccol(&self) -> usize {
        self.nveccol
    }

    /// Lanes per vector word.
    #[inline]
    pub fn wperv(&self) -> usize {
        self.wperv
    }

    /// Words to skip from one cell to the cell one column over.
    #[inline]
    pub fn colstride(&self) -> usize {
        self.colstride
    }

    /// Words to skip from one cell to the cell one vector row down.
    #[inline]
    pub fn rowstride(&self) -> usize {
        self.rowstride
    }

    /// Aligned base pointer to the whole matrix buffer.
    #[inline]
    pub fn ptr_mut(&mut self) -> *mut V128 {
        debug_assert!(self.inited);
        self.buf.ptr_mut()
    }

    #[inline]
    fn vec_index(&self, rowvec: usize, col: usize, stream: Stream) -> usize {
        col * self.colstride + rowvec * self.rowstride + stream.offset()
    }

    /// E vector at vector row `rowvec`, column `col`.
    #[inline]
    pub fn evec(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::E)]
    }

    #[inline]
    pub fn evec_mut(&mut self, rowvec: usize, col: usize) -> &mut V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        let i = self.vec_index(rowvec, col, Stream::E);
        &mut self.buf[i]
    }

    /// Like [`evec`](Self::evec), but `col == nveccol` is allowed so a
    /// stencil kernel can write a shifted copy of the previous column one
    /// past the end; `init` sizes the buffer with the spare column.
    #[inline]
    pub fn evec_unsafe(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col <= self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::E)]
    }

    /// F vector at vector row `rowvec`, column `col`.
    #[inline]
    pub fn fvec(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::F)]
    }

    #[inline]
    pub fn fvec_mut(&mut self, rowvec: usize, col: usize) -> &mut V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        let i = self.vec_index(rowvec, col, Stream::F);
        &mut self.buf[i]
    }

    /// H vector at vector row `rowvec`, column `col`.
    #[inline]
    pub fn hvec(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::H)]
    }

    #[inline]
    pub fn hvec_mut(&mut self, rowvec: usize, col: usize) -> &mut V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        let i = self.vec_index(rowvec, col, Stream::H);
        &mut self.buf[i]
    }

    /// TMP vector at vector row `rowvec`, column `col`.
    #[inline]
    pub fn tmpvec(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::Tmp)]
    }

    #[inline]
    pub fn tmpvec_mut(&mut self, rowvec: usize, col: usize) -> &mut V128 {
        debug_assert!(rowvec < self.nvecrow && col < self.nveccol);
        let i = self.vec_index(rowvec, col, Stream::Tmp);
        &mut self.buf[i]
    }

    /// Like [`tmpvec`](Self::tmpvec), but `col == nveccol` is allowed.
    #[inline]
    pub fn tmpvec_unsafe(&self, rowvec: usize, col: usize) -> &V128 {
        debug_assert!(rowvec < self.nvecrow && col <= self.nveccol);
        &self.buf[self.vec_index(rowvec, col, Stream::Tmp)]
    }

    /// Scalar value at `(row, col)` in the given stream.
    ///
    /// Byte-mode lanes (wperv 16) are returned unsigned and carry the
    /// fill-time bias; 16-bit lanes are sign extended. Neither is adjusted
    /// here, the caller applies the bias from its
    /// [`StripedData`](super::striped_data::StripedData).
    #[inline]
    pub fn elt(&self, row: usize, col: usize, stream: Stream) -> i32 {
        debug_assert!(self.inited);
        debug_assert!(row < self.nrow && col < self.ncol);
        let rowelt = row / self.nvecrow;
        let rowvec = row % self.nvecrow;
        let v = &self.buf[self.vec_index(rowvec, col, stream)];
        if self.wperv == 16 {
            v.u8_lane(rowelt) as i32
        } else {
            v.i16_lane(rowelt) as i32
        }
    }

    /// Store a scalar lane; the fill-side inverse of [`elt`](Self::elt).
    #[inline]
    pub fn set_elt(&mut self, row: usize, col: usize, stream: Stream, val: i32) {
        debug_assert!(self.inited);
        debug_assert!(row < self.nrow && col < self.ncol);
        let rowelt = row / self.nvecrow;
        let rowvec = row % self.nvecrow;
        let i = self.vec_index(rowvec, col, stream);
        if self.wperv == 16 {
            debug_assert!((0..=255).contains(&val), "u8 lane value {val} out of range");
            self.buf[i].set_u8_lane(rowelt, val as u8);
        } else {
            debug_assert!(
                (i16::MIN as i32..=i16::MAX as i32).contains(&val),
                "i16 lane value {val} out of range"
            );
            self.buf[i].set_i16_lane(rowelt, val as i16);
        }
    }

    /// E value at `(row, col)`.
    #[inline]
    pub fn eelt(&self, row: usize, col: usize) -> i32 {
        self.elt(row, col, Stream::E)
    }

    /// F value at `(row, col)`.
    #[inline]
    pub fn felt(&self, row: usize, col: usize) -> i32 {
        self.elt(row, col, Stream::F)
    }

    /// H value at `(row, col)`.
    #[inline]
    pub fn helt(&self, row: usize, col: usize) -> i32 {
        self.elt(row, col, Stream::H)
    }

    /// Zero every mask word and backtrace flag.
    pub fn init_masks(&mut self) {
        self.masks.clear_masks();
    }

    #[inline]
    pub fn reported_through(&self, row: usize, col: usize) -> bool {
        self.masks.reported_through(row, col)
    }

    #[inline]
    pub fn set_reported_through(&mut self, row: usize, col: usize) {
        self.masks.set_reported_through(row, col);
    }

    #[inline]
    pub fn is_h_set(&self, row: usize, col: usize) -> bool {
        self.masks.is_h_set(row, col)
    }

    #[inline]
    pub fn set_h_mask(&mut self, row: usize, col: usize, mask: u16) {
        self.masks.set_h_mask(row, col, mask);
    }

    #[inline]
    pub fn h_mask(&self, row: usize, col: usize) -> u16 {
        self.masks.h_mask(row, col)
    }

    #[inline]
    pub fn is_e_set(&self, row: usize, col: usize) -> bool {
        self.masks.is_e_set(row, col)
    }

    #[inline]
    pub fn set_e_mask(&mut self, row: usize, col: usize, mask: u16) {
        self.masks.set_e_mask(row, col, mask);
    }

    #[inline]
    pub fn e_mask(&self, row: usize, col: usize) -> u16 {
        self.masks.e_mask(row, col)
    }

    #[inline]
    pub fn is_f_set(&self, row: usize, col: usize) -> bool {
        self.masks.is_f_set(row, col)
    }

    #[inline]
    pub fn set_f_mask(&mut self, row: usize, col: usize, mask: u16) {
        self.masks.set_f_mask(row, col, mask);
    }

    #[inline]
    pub fn f_mask(&self, row: usize, col: usize) -> u16 {
        self.masks.f_mask(row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(nrow: usize, ncol: usize, wperv: usize) -> StripedMatrix {
        let mut m = StripedMatrix::new(Arc::new(MemTally::new()));
        m.init(nrow, ncol, wperv);
        m
    }

    #[test]
    fn strides_follow_layout() {
        let m = matrix(20, 7, 16);
        assert_eq!(m.nvecrow(), 2);
        assert_eq!(m.rowstride(), 4);
        assert_eq!(m.colstride(), 8);
        let m = matrix(20, 7, 8);
        assert_eq!(m.nvecrow(), 3);
        assert_eq!(m.colstride(), 12);
    }

    #[test]
    fn elt_decodes_the_striped_lane() {
        let mut m = matrix(20, 5, 16);
        // Row 13 of 20 rows with nvecrow 2: vector row 1, lane 6.
        m.set_elt(13, 3, Stream::H, 200);
        assert_eq!(m.hvec(1, 3).u8_lane(6), 200);
        assert_eq!(m.helt(13, 3), 200);
        assert_eq!(m.eelt(13, 3), 0);
    }

    #[test]
    fn elt_sign_extends_16bit_lanes() {
        let mut m = matrix(10, 4, 8);
        m.set_elt(7, 2, Stream::F, -321);
        assert_eq!(m.felt(7, 2), -321);
        // Vector row 7 % 2, lane 7 / 2.
        assert_eq!(m.fvec(1, 2).i16_lane(3), -321);
    }

    #[test]
    fn reinit_clears_masks() {
        let mut m = matrix(6, 6, 16);
        m.set_h_mask(2, 2, 0b11);
        m.set_reported_through(2, 2);
        m.clear();
        m.init(6, 6, 16);
        assert!(!m.is_h_set(2, 2));
        assert!(!m.reported_through(2, 2));
    }
}
