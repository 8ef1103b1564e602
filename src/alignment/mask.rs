//! Per-cell backtrace masks, bit-packed into one 16-bit word per DP cell.
//!
//! Word layout (bits 13-15 must stay zero):
//!
//! | bits  | field           |
//! |-------|-----------------|
//! | 0     | reported-through|
//! | 1     | H-mask computed |
//! | 2-6   | H-mask payload  |
//! | 7     | E-mask computed |
//! | 8-9   | E-mask payload  |
//! | 10    | F-mask computed |
//! | 11-12 | F-mask payload  |
//!
//! This packing is normative for any sibling tool that reads the
//! intermediate matrix; do not split it into separate arrays.

use std::sync::Arc;

use super::mem_tally::{MemCategory, MemTally};

const REPORTED_THROUGH: u16 = 1 << 0;

const H_SET: u16 = 1 << 1;
const H_SHIFT: u16 = 2;
const H_FIELD: u16 = 0b0111_1110; // set bit + 5 payload bits

const E_SET: u16 = 1 << 7;
const E_SHIFT: u16 = 8;
const E_FIELD: u16 = 0b11_1000_0000;

const F_SET: u16 = 1 << 10;
const F_SHIFT: u16 = 11;
const F_FIELD: u16 = 0b1_1100_0000_0000;

/// Dense `nrow x ncol` table of packed mask words.
pub struct MaskTable {
    nrow: usize,
    ncol: usize,
    cells: Vec<u16>,
    tally: Arc<MemTally>,
    tallied: usize,
}

impl MaskTable {
    pub fn new(tally: Arc<MemTally>) -> Self {
        MaskTable {
            nrow: 0,
            ncol: 0,
            cells: Vec::new(),
            tally,
            tallied: 0,
        }
    }

    /// Size the table for an `nrow x ncol` matrix and zero every word.
    /// Capacity from a previous alignment is reused.
    pub fn init(&mut self, nrow: usize, ncol: usize) {
        self.nrow = nrow;
        self.ncol = ncol;
        self.cells.resize(nrow * ncol, 0);
        self.cells.fill(0);
        let bytes = self.cells.capacity() * std::mem::size_of::<u16>();
        if bytes > self.tallied {
            self.tally.add(MemCategory::DpMask, bytes - self.tallied);
            self.tallied = bytes;
        }
    }

    /// Zero the whole table.
    pub fn clear_masks(&mut self) {
        self.cells.fill(0);
    }

    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.nrow && col < self.ncol);
        row * self.ncol + col
    }

    #[inline]
    pub fn reported_through(&self, row: usize, col: usize) -> bool {
        self.cells[self.idx(row, col)] & REPORTED_THROUGH != 0
    }

    #[inline]
    pub fn set_reported_through(&mut self, row: usize, col: usize) {
        let i = self.idx(row, col);
        self.cells[i] |= REPORTED_THROUGH;
    }

    #[inline]
    pub fn is_h_set(&self, row: usize, col: usize) -> bool {
        self.cells[self.idx(row, col)] & H_SET != 0
    }

    /// Remaining legal H transitions; meaningful only once `is_h_set`.
    #[inline]
    pub fn h_mask(&self, row: usize, col: usize) -> u16 {
        (self.cells[self.idx(row, col)] >> H_SHIFT) & 0x1f
    }

    /// Store a 5-bit H mask and raise the computed bit. Overwrites any
    /// previous payload.
    #[inline]
    pub fn set_h_mask(&mut self, row: usize, col: usize, mask: u16) {
        debug_assert!(mask < 32, "H mask must fit in 5 bits");
        let i = self.idx(row, col);
        self.cells[i] &= !H_FIELD;
        self.cells[i] |= H_SET | (mask << H_SHIFT);
    }

    #[inline]
    pub fn is_e_set(&self, row: usize, col: usize) -> bool {
        self.cells[self.idx(row, col)] & E_SET != 0
    }

    #[inline]
    pub fn e_mask(&self, row: usize, col: usize) -> u16 {
        (self.cells[self.idx(row, col)] >> E_SHIFT) & 0x3
    }

    /// Store a 2-bit E mask and raise the computed bit.
    #[inline]
    pub fn set_e_mask(&mut self, row: usize, col: usize, mask: u16) {
        debug_assert!(mask < 4, "E mask must fit in 2 bits");
        let i = self.idx(row, col);
        self.cells[i] &= !E_FIELD;
        self.cells[i] |= E_SET | (mask << E_SHIFT);
    }

    #[inline]
    pub fn is_f_set(&self, row: usize, col: usize) -> bool {
        self.cells[self.idx(row, col)] & F_SET != 0
    }

    #[inline]
    pub fn f_mask(&self, row: usize, col: usize) -> u16 {
        (self.cells[self.idx(row, col)] >> F_SHIFT) & 0x3
    }

    /// Store a 2-bit F mask and raise the computed bit.
    #[inline]
    pub fn set_f_mask(&mut self, row: usize, col: usize, mask: u16) {
        debug_assert!(mask < 4, "F mask must fit in 2 bits");
        let i = self.idx(row, col);
        self.cells[i] &= !F_FIELD;
        self.cells[i] |= F_SET | (mask << F_SHIFT);
    }

    /// Raw word, for layout tests.
    #[inline]
    pub fn raw(&self, row: usize, col: usize) -> u16 {
        self.cells[self.idx(row, col)]
    }
}

impl Drop for MaskTable {
    fn drop(&mut self) {
        if self.tallied > 0 {
            self.tally.del(MemCategory::DpMask, self.tallied);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(nrow: usize, ncol: usize) -> MaskTable {
        let mut t = MaskTable::new(Arc::new(MemTally::new()));
        t.init(nrow, ncol);
        t
    }

    #[test]
    fn init_leaves_everything_clear() {
        let t = table(4, 7);
        for r in 0..4 {
            for c in 0..7 {
                assert!(!t.reported_through(r, c));
                assert!(!t.is_h_set(r, c));
                assert!(!t.is_e_set(r, c));
                assert!(!t.is_f_set(r, c));
            }
        }
    }

    #[test]
    fn setters_touch_only_their_field() {
        let mut t = table(3, 3);
        t.set_h_mask(1, 2, 0b10110);
        assert!(t.is_h_set(1, 2));
        assert_eq!(t.h_mask(1, 2), 0b10110);
        assert!(!t.is_e_set(1, 2));
        assert!(!t.is_f_set(1, 2));
        assert!(!t.reported_through(1, 2));

        t.set_e_mask(1, 2, 0b01);
        t.set_f_mask(1, 2, 0b11);
        assert_eq!(t.h_mask(1, 2), 0b10110);
        assert_eq!(t.e_mask(1, 2), 0b01);
        assert_eq!(t.f_mask(1, 2), 0b11);

        // Overwrite keeps the set bit and replaces the payload.
        t.set_h_mask(1, 2, 0);
        assert!(t.is_h_set(1, 2));
        assert_eq!(t.h_mask(1, 2), 0);
        assert_eq!(t.e_mask(1, 2), 0b01);
    }

    #[test]
    fn reported_through_is_idempotent() {
        let mut t = table(2, 2);
        t.set_reported_through(0, 1);
        let w = t.raw(0, 1);
        t.set_reported_through(0, 1);
        assert_eq!(t.raw(0, 1), w);
        assert!(t.reported_through(0, 1));
    }

    #[test]
    fn top_bits_stay_zero() {
        let mut t = table(2, 2);
        t.set_reported_through(1, 1);
        t.set_h_mask(1, 1, 0x1f);
        t.set_e_mask(1, 1, 0x3);
        t.set_f_mask(1, 1, 0x3);
        assert_eq!(t.raw(1, 1) & 0xe000, 0);
    }
}
