//! Per-alignment data carried between the fill and the backtrace.
//!
//! [`StripedData`] bundles the striped query profile, the DP matrix, the
//! score bias for unsigned byte lanes, and the locators of the final matrix
//! row. One instance is owned per worker and reused across alignments; the
//! buffers keep their capacity between reads.

use std::sync::Arc;

use super::matrix::StripedMatrix;
use super::mem_tally::{MemCategory, MemTally};
use super::scoring::Scoring;
use super::vector_buf::AlignedVectorBuffer;

/// Alphabet classes covered by the query profile (A, C, G, T, N).
pub const PROFILE_CLASSES: usize = 5;

/// Query profile, matrix and fill-side bookkeeping for one alignment.
pub struct StripedData {
    /// Striped per-(reference class, vector row) score vectors.
    pub profile: AlignedVectorBuffer,
    /// Vectors per reference class inside `profile`.
    pub profile_stride: usize,
    /// The striped score matrix plus backtrace masks.
    pub matrix: StripedMatrix,
    /// Largest bonus in the scheme used to build the profile.
    pub max_bonus: i32,
    /// Largest penalty in the scheme used to build the profile.
    pub max_penalty: i32,
    /// Vector row holding the final matrix row.
    pub last_iter: usize,
    /// Lane within `last_iter` holding the final matrix row.
    pub last_word: usize,
    /// Bias added to every unsigned byte lane at store time, zero for
    /// 16-bit lanes. Subtract it to recover a true score.
    pub bias: i32,
}

impl StripedData {
    pub fn new(tally: Arc<MemTally>) -> Self {
        StripedData {
            profile: AlignedVectorBuffer::new(MemCategory::QueryProfile, Arc::clone(&tally)),
            profile_stride: 0,
            matrix: StripedMatrix::new(tally),
            max_bonus: 0,
            max_penalty: 0,
            last_iter: 0,
            last_word: 0,
            bias: 0,
        }
    }

    /// Size the matrix for one `(read, reference window)` pair and build
    /// the striped query profile.
    ///
    /// The matrix gets `read.len() + 1` rows and `ref_len + 1` columns so
    /// row 0 and column 0 carry the recurrence boundary. With 16 lanes the
    /// bias is the scheme's largest penalty, which keeps every profile and
    /// matrix lane representable as an unsigned byte.
    pub fn init(
        &mut self,
        read: &[u8],
        quals: &[u8],
        ref_len: usize,
        sc: &Scoring,
        wperv: usize,
    ) {
        debug_assert_eq!(read.len(), quals.len());
        debug_assert!(!read.is_empty() && ref_len > 0);
        let nrow = read.len() + 1;
        let ncol = ref_len + 1;
        self.matrix.init(nrow, ncol, wperv);
        self.max_bonus = sc.max_bonus();
        self.max_penalty = sc.max_penalty();
        self.bias = if wperv == 16 { self.max_penalty } else { 0 };

        let nvecrow = self.matrix.nvecrow();
        self.last_iter = (nrow - 1) % nvecrow;
        self.last_word = (nrow - 1) / nvecrow;

        // Profile rows mirror matrix rows: lane row/nvecrow of vector
        // row%nvecrow. Row 0 is the boundary and stays at the bias.
        self.profile_stride = nvecrow;
        self.profile.resize(PROFILE_CLASSES * nvecrow);
        self.profile.zero_fill();
        for refc in 0..PROFILE_CLASSES {
            for row in 1..nrow {
                let rowvec = row % nvecrow;
                let rowelt = row / nvecrow;
                let s = sc.score(read[row - 1].min(4), refc as u8, quals[row - 1]);
                let v = &mut self.profile[refc * nvecrow + rowvec];
                if wperv == 16 {
                    let biased = s + self.bias;
                    debug_assert!((0..=255).contains(&biased));
                    v.set_u8_lane(rowelt, biased as u8);
                } else {
                    v.set_i16_lane(rowelt, s as i16);
                }
            }
        }
    }

    /// True score of aligning the read character of matrix row `row`
    /// against reference class `refc`.
    #[inline]
    pub fn profile_score(&self, refc: usize, row: usize) -> i32 {
        debug_assert!(refc < PROFILE_CLASSES);
        debug_assert!(row >= 1 && row < self.matrix.nrow());
        let nvecrow = self.profile_stride;
        let v = &self.profile[refc * nvecrow + row % nvecrow];
        if self.matrix.wperv() == 16 {
            v.u8_lane(row / nvecrow) as i32 - self.bias
        } else {
            v.i16_lane(row / nvecrow) as i32
        }
    }

    /// Drop occupancy of both buffers, keep capacity.
    pub fn clear(&mut self) {
        self.profile.clear();
        self.matrix.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_scores_round_trip_both_widths() {
        let sc = Scoring::local();
        let read = [0u8, 1, 2, 3, 4];
        let quals = [40u8; 5];
        for wperv in [16, 8] {
            let mut data = StripedData::new(Arc::new(MemTally::new()));
            data.init(&read, &quals, 8, &sc, wperv);
            // Row 1 holds read[0] = A.
            assert_eq!(data.profile_score(0, 1), 2);
            assert_eq!(data.profile_score(1, 1), -6);
            // Row 5 holds read[4] = N.
            assert_eq!(data.profile_score(0, 5), -1);
        }
    }

    #[test]
    fn last_row_locators() {
        let sc = Scoring::local();
        let read = vec![0u8; 17];
        let quals = vec![30u8; 17];
        let mut data = StripedData::new(Arc::new(MemTally::new()));
        data.init(&read, &quals, 4, &sc, 16);
        // 18 rows, nvecrow 2: final row 17 is lane 8 of vector row 1.
        assert_eq!(data.matrix.nvecrow(), 2);
        assert_eq!(data.last_iter, 1);
        assert_eq!(data.last_word, 8);
    }
}
