//! Reference fill for the striped matrix.
//!
//! This is the scalar counterpart of a vectorized fill kernel: it computes
//! the affine-gap recurrence cell by cell and stores every lane through the
//! striped layout, leaving the matrix exactly as a SIMD kernel would. Byte
//! lanes (16 per word) carry the bias from [`StripedData`]; 16-bit lanes
//! are stored raw. When a byte lane would exceed 255 the fill stops and
//! reports saturation so the caller can refill at 16 bits.
//!
//! Boundary convention: row 0 and column 0 belong to the matrix. In local
//! mode they hold the zero floor; in end-to-end mode they hold the
//! affine-gap ladder. Unreachable gap cells hold the floor.

use super::matrix::Stream;
use super::metrics::AlignMetrics;
use super::scoring::Scoring;
use super::striped_data::StripedData;

/// Floor sentinel for 16-bit end-to-end fills. Far below any reachable
/// score, far above the lane minimum so gap arithmetic cannot wrap.
pub const NEG_I16: i32 = i16::MIN as i32 / 2;

/// Outcome of one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillResult {
    /// Best end-cell score (true scale). Local mode: best over all cells.
    /// End-to-end mode: best over the final row.
    pub best_score: i32,
    pub best_row: usize,
    pub best_col: usize,
    /// A byte lane overflowed; matrix contents are not usable.
    pub saturated: bool,
}

#[inline]
fn read_true(data: &StripedData, row: usize, col: usize, stream: Stream) -> i32 {
    data.matrix.elt(row, col, stream) - data.bias
}

/// Store a true-scale score; returns false on byte-lane overflow.
#[inline]
fn store_true(data: &mut StripedData, row: usize, col: usize, stream: Stream, val: i32) -> bool {
    let bias = data.bias;
    if data.matrix.wperv() == 16 {
        let biased = val + bias;
        if biased > 255 {
            return false;
        }
        debug_assert!(biased >= 0);
        data.matrix.set_elt(row, col, stream, biased);
    } else {
        data.matrix.set_elt(row, col, stream, val);
    }
    true
}

/// Fill the matrix in `data` for the reference window `rf`.
///
/// The query side is already encoded in the profile built by
/// [`StripedData::init`]. On return (without saturation) every scalar
/// `(row, col)` satisfies the recurrence and all mask bits are zero.
pub fn fill_striped(
    data: &mut StripedData,
    rf: &[u8],
    sc: &Scoring,
    met: &mut AlignMetrics,
) -> FillResult {
    let nrow = data.matrix.nrow();
    let ncol = data.matrix.ncol();
    debug_assert_eq!(ncol, rf.len() + 1);
    debug_assert!(
        data.matrix.wperv() == 8 || sc.local,
        "byte lanes support local mode only"
    );

    let local = sc.local;
    let floor = if local { 0 } else { NEG_I16 };
    let open = sc.gap_open;
    let extend = sc.gap_extend;

    let mut sat = FillResult {
        best_score: floor,
        best_row: 0,
        best_col: 0,
        saturated: true,
    };
    let mut best_score = if local { 0 } else { i32::MIN };
    let mut best_row = 0;
    let mut best_col = 0;

    // Boundary column. H carries the ladder in end-to-end mode and the
    // floor in local mode; the H values are also staged into the TMP
    // stream the way a vector kernel stages its initial column.
    store_true(data, 0, 0, Stream::E, floor);
    store_true(data, 0, 0, Stream::F, floor);
    store_true(data, 0, 0, Stream::H, 0);
    store_true(data, 0, 0, Stream::Tmp, 0);
    for row in 1..nrow {
        let f = (read_true(data, row - 1, 0, Stream::H) - open)
            .max(read_true(data, row - 1, 0, Stream::F) - extend)
            .max(floor);
        let h = if local { 0 } else { f };
        store_true(data, row, 0, Stream::E, floor);
        store_true(data, row, 0, Stream::F, f);
        if !store_true(data, row, 0, Stream::H, h) {
            return sat;
        }
        store_true(data, row, 0, Stream::Tmp, h);
    }
    if !local {
        best_score = read_true(data, nrow - 1, 0, Stream::H);
        best_col = 0;
        best_row = nrow - 1;
    }
    met.col += 1;
    met.cell += nrow as u64;

    for col in 1..ncol {
        let refc = rf[col - 1].min(4) as usize;

        // Boundary row: only a horizontal gap can reach it.
        met.inner += 1;
        let e0 = (read_true(data, 0, col - 1, Stream::H) - open)
            .max(read_true(data, 0, col - 1, Stream::E) - extend)
            .max(floor);
        store_true(data, 0, col, Stream::E, e0);
        store_true(data, 0, col, Stream::F, floor);
        let h0 = if local { 0 } else { e0 };
        if !store_true(data, 0, col, Stream::H, h0) {
            sat.best_col = col;
            return sat;
        }

        for row in 1..nrow {
            met.inner += 1;
            let e = (read_true(data, row, col - 1, Stream::H) - open)
                .max(read_true(data, row, col - 1, Stream::E) - extend)
                .max(floor);
            let f = (read_true(data, row - 1, col, Stream::H) - open)
                .max(read_true(data, row - 1, col, Stream::F) - extend)
                .max(floor);
            let hd = read_true(data, row - 1, col - 1, Stream::H);
            let diag = if hd == floor && !local {
                // Unreachable diagonal predecessor in end-to-end mode.
                floor
            } else {
                hd + data.profile_score(refc, row)
            };
            let mut h = diag.max(e).max(f).max(floor);
            if local {
                h = h.max(0);
            }
            store_true(data, row, col, Stream::E, e);
            store_true(data, row, col, Stream::F, f);
            if !store_true(data, row, col, Stream::H, h) {
                sat.best_row = row;
                sat.best_col = col;
                return sat;
            }
            if local {
                if h > best_score {
                    best_score = h;
                    best_row = row;
                    best_col = col;
                }
            } else if row == nrow - 1 && h > best_score {
                best_score = h;
                best_row = row;
                best_col = col;
            }
        }
        met.col += 1;
        met.cell += nrow as u64;
    }

    FillResult {
        best_score,
        best_row,
        best_col,
        saturated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::mem_tally::MemTally;
    use std::sync::Arc;

    fn fill(
        read: &[u8],
        rf: &[u8],
        sc: &Scoring,
        wperv: usize,
    ) -> (StripedData, FillResult) {
        let quals = vec![40u8; read.len()];
        let mut data = StripedData::new(Arc::new(MemTally::new()));
        data.init(read, &quals, rf.len(), sc, wperv);
        let mut met = AlignMetrics::new();
        let res = fill_striped(&mut data, rf, sc, &mut met);
        (data, res)
    }

    #[test]
    fn perfect_match_scores_both_widths() {
        let sc = Scoring {
            mm_min: 4,
            mm_max: 4,
            ..Scoring::local()
        };
        for wperv in [16, 8] {
            let (data, res) = fill(&[0, 1, 2, 3], &[0, 1, 2, 3], &sc, wperv);
            assert!(!res.saturated);
            assert_eq!(res.best_score, 8);
            assert_eq!((res.best_row, res.best_col), (4, 4));
            assert_eq!(data.matrix.helt(4, 4) - data.bias, 8);
            assert_eq!(data.matrix.helt(2, 2) - data.bias, 4);
        }
    }

    #[test]
    fn end_to_end_mismatch_goes_negative() {
        let sc = Scoring {
            bonus: 2,
            mm_min: 4,
            mm_max: 4,
            gap_open: 30,
            gap_extend: 30,
            local: false,
            ..Scoring::local()
        };
        // ACGT vs AGGT: one mismatch in the middle.
        let (data, res) = fill(&[0, 1, 2, 3], &[0, 2, 2, 3], &sc, 8);
        assert!(!res.saturated);
        assert_eq!(data.matrix.helt(2, 2), -2);
        assert_eq!(res.best_score, 2);
        assert_eq!((res.best_row, res.best_col), (4, 4));
    }

    #[test]
    fn end_to_end_boundary_holds_gap_ladder() {
        let sc = Scoring {
            gap_open: 5,
            gap_extend: 3,
            local: false,
            ..Scoring::global()
        };
        let (data, _) = fill(&[0, 1, 2], &[0, 1, 2], &sc, 8);
        assert_eq!(data.matrix.helt(0, 0), 0);
        assert_eq!(data.matrix.helt(0, 1), -5);
        assert_eq!(data.matrix.helt(0, 2), -8);
        assert_eq!(data.matrix.helt(1, 0), -5);
        assert_eq!(data.matrix.helt(2, 0), -8);
        // Unreachable gap cells hold the floor.
        assert_eq!(data.matrix.eelt(1, 0), NEG_I16);
        assert_eq!(data.matrix.felt(0, 1), NEG_I16);
    }

    #[test]
    fn byte_fill_reports_saturation() {
        let sc = Scoring {
            bonus: 120,
            mm_min: 4,
            mm_max: 4,
            ..Scoring::local()
        };
        let read = vec![0u8; 8];
        let rf = vec![0u8; 8];
        let (_, res) = fill(&read, &rf, &sc, 16);
        assert!(res.saturated);
        let (_, res16) = fill(&read, &rf, &sc, 8);
        assert!(!res16.saturated);
        assert_eq!(res16.best_score, 960);
    }

    #[test]
    fn tmp_column_stages_initial_h() {
        let sc = Scoring::local();
        let (data, _) = fill(&[0, 1, 2, 3], &[3, 2, 1, 0], &sc, 16);
        for row in 0..data.matrix.nrow() {
            assert_eq!(
                data.matrix.elt(row, 0, Stream::Tmp),
                data.matrix.elt(row, 0, Stream::H)
            );
        }
    }
}
