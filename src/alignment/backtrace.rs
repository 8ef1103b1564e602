//! Randomized backtrace over the striped matrix.
//!
//! The analyzer inspects one cell of a filled matrix, enumerates every
//! backward transition consistent with the recurrence, records the set in
//! the cell's packed mask, and picks one uniformly at random among the
//! still-legal options. Each call at the same cell removes the chosen bit,
//! so a failed backtrace that revisits the cell is steered onto a path not
//! yet tried.
//!
//! Two kinds of empty cell are distinguished. A cell whose mask *becomes*
//! zero through decay is a dead end and the walk must fail. A cell whose
//! mask was zero on first sight never had a predecessor, so it is a legal
//! start of the alignment; the computed-mask bit in the mask word is what
//! separates the two.
//!
//! The driver walks from a candidate end cell toward the origin, emitting
//! one edit per consuming step, and rejects paths that cross a cell some
//! earlier backtrace already reported through or that accumulate more N
//! positions than the scoring scheme tolerates.

use std::sync::Arc;

use rand::RngCore;

use super::cigar;
use super::fill::{fill_striped, FillResult, NEG_I16};
use super::matrix::{Stream, StripedMatrix};
use super::mem_tally::MemTally;
use super::metrics::AlignMetrics;
use super::scoring::{bases_match, Scoring, BASE_N};
use super::striped_data::StripedData;

// H-mask bits, in mask-payload order.
pub const H_DIAG_MATCH: u16 = 1 << 0;
pub const H_DIAG_MISMATCH: u16 = 1 << 1;
pub const H_FROM_E: u16 = 1 << 2;
pub const H_FROM_F: u16 = 1 << 3;
pub const H_TERMINATE: u16 = 1 << 4;

// E-mask bits.
pub const E_FROM_H: u16 = 1 << 0;
pub const E_FROM_E: u16 = 1 << 1;

// F-mask bits.
pub const F_FROM_H: u16 = 1 << 0;
pub const F_FROM_F: u16 = 1 << 1;

/// One backward transition, named by the cell type just moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtTransition {
    /// H came from the diagonal with matching characters.
    DiagMatch,
    /// H came from the diagonal with a mismatch or an N.
    DiagMismatch,
    /// H equals E at the same cell; continue in the E stream.
    HFromE,
    /// H equals F at the same cell; continue in the F stream.
    HFromF,
    /// The alignment starts here.
    Terminate,
    /// E opened a gap from H one column left.
    EFromH,
    /// E extended a gap from E one column left.
    EFromE,
    /// F opened a gap from H one row up.
    FFromH,
    /// F extended a gap from F one row up.
    FFromF,
}

/// Outcome of analyzing one cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellDecision {
    /// No legal transition remained.
    pub empty: bool,
    /// The chosen transition, when one exists.
    pub next: Option<BtTransition>,
    /// More than one option existed and the RNG chose.
    pub branch: bool,
    /// The chosen transition is passable: something was chosen and no
    /// earlier backtrace reported through this cell.
    pub can_move_through: bool,
    /// The cell already lay on an earlier reported path.
    pub reported_through: bool,
    /// The cell is a legal end of the walk: its mask was zero the first
    /// time it was seen, so the path starts here.
    pub terminal: bool,
}

#[inline]
fn nth_set_bit(mask: u16, mut k: u32) -> u16 {
    debug_assert!(k < mask.count_ones());
    let mut m = mask;
    loop {
        let bit = m & m.wrapping_neg();
        if k == 0 {
            return bit;
        }
        k -= 1;
        m &= m - 1;
    }
}

impl StripedMatrix {
    /// Analyze the `(row, col)` cell of the `stream` matrix: determine and
    /// memorize the legal ways to continue the backtrace, then select one
    /// at random. `score_offset` converts stored lanes to true scores;
    /// `floor_score` is the local-mode floor (or the 16-bit sentinel in
    /// end-to-end mode).
    #[allow(clippy::too_many_arguments)]
    pub fn analyze_cell<R: RngCore>(
        &mut self,
        row: usize,
        col: usize,
        stream: Stream,
        refc: u8,
        readc: u8,
        readq: u8,
        sc: &Scoring,
        score_offset: i32,
        floor_score: i32,
        rng: &mut R,
    ) -> CellDecision {
        debug_assert!(row < self.nrow() && col < self.ncol());
        let was_reported = self.reported_through(row, col);
        let mut dec = CellDecision {
            reported_through: was_reported,
            ..CellDecision::default()
        };

        let (mask, first_visit) = match stream {
            Stream::H => {
                if self.is_h_set(row, col) {
                    (self.h_mask(row, col), false)
                } else {
                    let m = self.compute_h_mask(
                        row,
                        col,
                        refc,
                        readc,
                        readq,
                        sc,
                        score_offset,
                        floor_score,
                    );
                    (m, true)
                }
            }
            Stream::E => {
                if self.is_e_set(row, col) {
                    (self.e_mask(row, col), false)
                } else {
                    (self.compute_e_mask(row, col, sc, score_offset, floor_score), true)
                }
            }
            Stream::F => {
                if self.is_f_set(row, col) {
                    (self.f_mask(row, col), false)
                } else {
                    (self.compute_f_mask(row, col, sc, score_offset, floor_score), true)
                }
            }
            Stream::Tmp => unreachable!("TMP cells are never analyzed"),
        };

        if mask == 0 {
            dec.empty = true;
            // Pre-empty cells (zero on first sight) are legal terminals;
            // cells whose mask decayed to zero are not.
            dec.terminal = first_visit;
            if first_visit {
                self.store_mask(row, col, stream, 0);
            }
            if stream == Stream::H {
                self.set_reported_through(row, col);
            }
            return dec;
        }

        let n = mask.count_ones();
        let k = if n == 1 {
            0
        } else {
            dec.branch = true;
            rng.next_u32() % n
        };
        let bit = nth_set_bit(mask, k);
        self.store_mask(row, col, stream, mask & !bit);
        if stream == Stream::H {
            self.set_reported_through(row, col);
        }

        dec.next = Some(Self::transition_for(stream, bit));
        dec.can_move_through = !was_reported;
        dec
    }

    fn store_mask(&mut self, row: usize, col: usize, stream: Stream, mask: u16) {
        match stream {
            Stream::H => self.set_h_mask(row, col, mask),
            Stream::E => self.set_e_mask(row, col, mask),
            Stream::F => self.set_f_mask(row, col, mask),
            Stream::Tmp => unreachable!(),
        }
    }

    fn transition_for(stream: Stream, bit: u16) -> BtTransition {
        match (stream, bit) {
            (Stream::H, H_DIAG_MATCH) => BtTransition::DiagMatch,
            (Stream::H, H_DIAG_MISMATCH) => BtTransition::DiagMismatch,
            (Stream::H, H_FROM_E) => BtTransition::HFromE,
            (Stream::H, H_FROM_F) => BtTransition::HFromF,
            (Stream::H, H_TERMINATE) => BtTransition::Terminate,
            (Stream::E, E_FROM_H) => BtTransition::EFromH,
            (Stream::E, E_FROM_E) => BtTransition::EFromE,
            (Stream::F, F_FROM_H) => BtTransition::FFromH,
            (Stream::F, F_FROM_F) => BtTransition::FFromF,
            _ => unreachable!("bad transition bit {bit} for {stream:?}"),
        }
    }

    /// Legal ways into an H cell. Transitions that would cross the matrix
    /// boundary are dropped; gap transitions additionally require the gap
    /// stream to sit above the floor, so an unreachable or zero-scoring
    /// gap never masquerades as a predecessor.
    #[allow(clippy::too_many_arguments)]
    fn compute_h_mask(
        &self,
        row: usize,
        col: usize,
        refc: u8,
        readc: u8,
        readq: u8,
        sc: &Scoring,
        off: i32,
        floor: i32,
    ) -> u16 {
        let h = self.helt(row, col) + off;
        let mut mask = 0u16;
        if row > 0 && col > 0 {
            let hd = self.helt(row - 1, col - 1) + off;
            if sc.local || hd > floor {
                if bases_match(readc, refc) && h == hd + sc.match_bonus(readc, readq) {
                    mask |= H_DIAG_MATCH;
                }
                let mismatched = !bases_match(readc, refc) || readc >= BASE_N || refc >= BASE_N;
                if mismatched && h == hd - sc.mismatch_penalty(readc, refc, readq) {
                    mask |= H_DIAG_MISMATCH;
                }
            }
        }
        let e = self.eelt(row, col) + off;
        if e > floor && h == e {
            mask |= H_FROM_E;
        }
        let f = self.felt(row, col) + off;
        if f > floor && h == f {
            mask |= H_FROM_F;
        }
        if (sc.local && h == floor) || (!sc.local && row == 0) {
            mask |= H_TERMINATE;
        }
        mask
    }

    /// Legal ways into an E cell: gap open from H or gap extension from E,
    /// both one column to the left.
    fn compute_e_mask(&self, row: usize, col: usize, sc: &Scoring, off: i32, floor: i32) -> u16 {
        let e = self.eelt(row, col) + off;
        let mut mask = 0u16;
        if col > 0 {
            let hl = self.helt(row, col - 1) + off;
            if hl > floor && e == hl - sc.gap_open {
                mask |= E_FROM_H;
            }
            let el = self.eelt(row, col - 1) + off;
            if el > floor && e == el - sc.gap_extend {
                mask |= E_FROM_E;
            }
        }
        mask
    }

    /// Legal ways into an F cell: gap open from H or gap extension from F,
    /// both one row up.
    fn compute_f_mask(&self, row: usize, col: usize, sc: &Scoring, off: i32, floor: i32) -> u16 {
        let f = self.felt(row, col) + off;
        let mut mask = 0u16;
        if row > 0 {
            let hu = self.helt(row - 1, col) + off;
            if hu > floor && f == hu - sc.gap_open {
                mask |= F_FROM_H;
            }
            let fu = self.felt(row - 1, col) + off;
            if fu > floor && f == fu - sc.gap_extend {
                mask |= F_FROM_F;
            }
        }
        mask
    }
}

/// One consuming backtrace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// Diagonal step with equal characters.
    Match,
    /// Diagonal step with differing characters or an N.
    Mismatch,
    /// Reference character consumed with no read character (gap in the
    /// read).
    ReadGap,
    /// Read character consumed with no reference character (gap in the
    /// reference).
    RefGap,
}

/// An edit anchored at the matrix cell where it was taken. For diagonal
/// edits the read index is `row - 1` and the window offset `col - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub row: usize,
    pub col: usize,
    pub kind: EditKind,
}

/// One finished backtrace, edits in read order.
#[derive(Debug, Clone)]
pub struct Backtrace {
    /// True score of the end cell.
    pub score: i32,
    /// Cell the walk started from (alignment end).
    pub end_row: usize,
    pub end_col: usize,
    /// Cell the walk terminated at (alignment start).
    pub start_row: usize,
    pub start_col: usize,
    pub edits: Vec<Edit>,
}

/// Walk one backtrace from `start` toward the origin.
///
/// Fails in-band: a cell whose options decayed away, a collision with an
/// already-reported cell (core rejection), or more than `n_ceil` N
/// positions all return `None` and leave the decayed masks in place so the
/// next candidate takes a different path.
#[allow(clippy::too_many_arguments)]
pub fn backtrace_from<R: RngCore>(
    data: &mut StripedData,
    read: &[u8],
    quals: &[u8],
    rf: &[u8],
    sc: &Scoring,
    start: (usize, usize),
    score_offset: i32,
    floor_score: i32,
    n_ceil: usize,
    rng: &mut R,
    met: &mut AlignMetrics,
) -> Option<Backtrace> {
    let (mut row, mut col) = start;
    let mut stream = Stream::H;
    let mut edits: Vec<Edit> = Vec::with_capacity(read.len());
    let mut n_used = 0usize;
    let mut last_cell = (usize::MAX, usize::MAX);
    let score = data.matrix.helt(row, col) + score_offset;

    loop {
        met.btcell += 1;
        // Stream switches stay in the same cell; the reported-through
        // check applies only on first arrival at a cell.
        let fresh = (row, col) != last_cell;
        last_cell = (row, col);
        let readc = if row > 0 { read[row - 1].min(BASE_N) } else { BASE_N };
        let readq = if row > 0 { quals[row - 1] } else { 0 };
        let refc = if col > 0 { rf[col - 1].min(BASE_N) } else { BASE_N };

        let dec = data.matrix.analyze_cell(
            row,
            col,
            stream,
            refc,
            readc,
            readq,
            sc,
            score_offset,
            floor_score,
            rng,
        );
        if fresh && dec.reported_through {
            met.corerej += 1;
            return None;
        }
        if dec.empty {
            if dec.terminal {
                break;
            }
            return None;
        }
        let Some(next) = dec.next else {
            return None;
        };
        match next {
            BtTransition::DiagMatch | BtTransition::DiagMismatch => {
                if readc >= BASE_N || refc >= BASE_N {
                    n_used += 1;
                }
                let kind = if next == BtTransition::DiagMatch {
                    EditKind::Match
                } else {
                    EditKind::Mismatch
                };
                edits.push(Edit { row, col, kind });
                row -= 1;
                col -= 1;
                stream = Stream::H;
            }
            BtTransition::HFromE => stream = Stream::E,
            BtTransition::HFromF => stream = Stream::F,
            BtTransition::Terminate => break,
            BtTransition::EFromH | BtTransition::EFromE => {
                edits.push(Edit {
                    row,
                    col,
                    kind: EditKind::ReadGap,
                });
                col -= 1;
                stream = if next == BtTransition::EFromH {
                    Stream::H
                } else {
                    Stream::E
                };
            }
            BtTransition::FFromH | BtTransition::FFromF => {
                edits.push(Edit {
                    row,
                    col,
                    kind: EditKind::RefGap,
                });
                row -= 1;
                stream = if next == BtTransition::FFromH {
                    Stream::H
                } else {
                    Stream::F
                };
            }
        }
        if n_used > n_ceil {
            met.nrej += 1;
            return None;
        }
    }

    edits.reverse();
    Some(Backtrace {
        score,
        end_row: start.0,
        end_col: start.1,
        start_row: row,
        start_col: col,
        edits,
    })
}

/// Candidate end cells for the backtrace, best first in scan order.
///
/// Local mode scans the whole matrix for cells matching the best score;
/// end-to-end mode only the final row can end an alignment, and that row
/// is read straight out of the striped H vectors through the last-row
/// locators carried in [`StripedData`].
pub fn gather_end_cells(
    data: &StripedData,
    fill: &FillResult,
    sc: &Scoring,
    score_offset: i32,
    met: &mut AlignMetrics,
) -> Vec<(usize, usize)> {
    let m = &data.matrix;
    let mut cands = Vec::new();
    if sc.local {
        if fill.best_score <= 0 {
            return cands;
        }
        for col in 1..m.ncol() {
            for row in 1..m.nrow() {
                met.gathcell += 1;
                if m.helt(row, col) + score_offset == fill.best_score {
                    met.gathsol += 1;
                    cands.push((row, col));
                }
            }
        }
    } else {
        // The final row occupies lane `last_word` of vector row
        // `last_iter` in every column.
        let row = m.nrow() - 1;
        debug_assert_eq!(data.last_iter, row % m.nvecrow());
        debug_assert_eq!(data.last_word, row / m.nvecrow());
        for col in 0..m.ncol() {
            met.gathcell += 1;
            let v = m.hvec(data.last_iter, col);
            let h = if m.wperv() == 16 {
                v.u8_lane(data.last_word) as i32
            } else {
                v.i16_lane(data.last_word) as i32
            };
            debug_assert_eq!(h, m.helt(row, col));
            if h + score_offset == fill.best_score {
                met.gathsol += 1;
                cands.push((row, col));
            }
        }
    }
    cands
}

/// A finished alignment: the backtrace plus its CIGAR rendering.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub score: i32,
    pub cigar: Vec<(u8, i32)>,
    pub backtrace: Backtrace,
}

/// One-shot driver tying fill, gather and backtrace together.
///
/// Owns the reusable [`StripedData`] and a per-thread metrics bundle. In
/// local mode the fill runs with byte lanes first and falls back to 16-bit
/// lanes on saturation.
pub struct StripedAligner {
    scoring: Scoring,
    data: StripedData,
    metrics: AlignMetrics,
}

impl StripedAligner {
    pub fn new(scoring: Scoring, tally: Arc<MemTally>) -> Self {
        StripedAligner {
            scoring,
            data: StripedData::new(tally),
            metrics: AlignMetrics::new(),
        }
    }

    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }

    pub fn metrics(&self) -> &AlignMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut AlignMetrics {
        &mut self.metrics
    }

    /// Matrix state left by the last `align` call, for callers that want
    /// to inspect cells or masks afterwards.
    pub fn data(&self) -> &StripedData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut StripedData {
        &mut self.data
    }

    /// Align `read` against the reference window `rf`, returning one
    /// optimal alignment chosen uniformly at random among the equally
    /// optimal paths, or `None` when every candidate backtrace fails.
    pub fn align<R: RngCore>(
        &mut self,
        read: &[u8],
        quals: &[u8],
        rf: &[u8],
        rng: &mut R,
    ) -> Option<Alignment> {
        if read.is_empty() || rf.is_empty() || read.len() != quals.len() {
            return None;
        }
        self.metrics.dp += 1;

        let mut wperv = if self.scoring.local { 16 } else { 8 };
        let fill = loop {
            self.data.init(read, quals, rf.len(), &self.scoring, wperv);
            let res = fill_striped(&mut self.data, rf, &self.scoring, &mut self.metrics);
            if res.saturated && wperv == 16 {
                self.metrics.dpsat += 1;
                log::debug!(
                    "byte fill saturated near ({}, {}); refilling with 16-bit lanes",
                    res.best_row,
                    res.best_col
                );
                wperv = 8;
                continue;
            }
            break res;
        };

        let floor = if self.scoring.local { 0 } else { NEG_I16 };
        let off = -self.data.bias;
        let cands = gather_end_cells(&self.data, &fill, &self.scoring, off, &mut self.metrics);
        if cands.is_empty() {
            self.metrics.dpfail += 1;
            return None;
        }

        let n_ceil = self.scoring.n_ceil(read.len());
        for (row, col) in cands {
            self.metrics.bt += 1;
            let bt = backtrace_from(
                &mut self.data,
                read,
                quals,
                rf,
                &self.scoring,
                (row, col),
                off,
                floor,
                n_ceil,
                rng,
                &mut self.metrics,
            );
            match bt {
                Some(bt) => {
                    self.metrics.btsucc += 1;
                    self.metrics.dpsucc += 1;
                    let cigar = cigar::edits_to_cigar(&bt.edits);
                    return Some(Alignment {
                        score: bt.score,
                        cigar,
                        backtrace: bt,
                    });
                }
                None => self.metrics.btfail += 1,
            }
        }
        log::debug!("all candidate end cells failed backtrace");
        self.metrics.dpfail += 1;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn nth_set_bit_walks_low_to_high() {
        let mask = 0b10110u16;
        assert_eq!(nth_set_bit(mask, 0), 0b00010);
        assert_eq!(nth_set_bit(mask, 1), 0b00100);
        assert_eq!(nth_set_bit(mask, 2), 0b10000);
    }

    #[test]
    fn all_mismatch_local_cell_only_terminates() {
        // AAAA vs TTTT, match 1, mismatch 1, local: every H is zero and
        // the terminate bit must be the sole legal option.
        let sc = Scoring {
            bonus: 1,
            mm_min: 1,
            mm_max: 1,
            ..Scoring::local()
        };
        let read = [0u8, 0, 0, 0];
        let quals = [40u8; 4];
        let rf = [3u8, 3, 3, 3];
        let mut data = StripedData::new(Arc::new(MemTally::new()));
        data.init(&read, &quals, rf.len(), &sc, 16);
        let mut met = AlignMetrics::new();
        let res = fill_striped(&mut data, &rf, &sc, &mut met);
        assert_eq!(res.best_score, 0);

        let mut rng = StdRng::seed_from_u64(7);
        for (row, col) in [(1, 1), (2, 3), (4, 4)] {
            let dec = data.matrix.analyze_cell(
                row,
                col,
                Stream::H,
                rf[col - 1],
                read[row - 1],
                quals[row - 1],
                &sc,
                -data.bias,
                0,
                &mut rng,
            );
            assert!(!dec.empty);
            assert!(!dec.branch);
            assert_eq!(dec.next, Some(BtTransition::Terminate));
        }
    }

    #[test]
    fn mask_decays_one_bit_per_call_until_empty() {
        let sc = Scoring {
            bonus: 2,
            mm_min: 4,
            mm_max: 4,
            local: false,
            ..Scoring::local()
        };
        // ACGT vs ACCGT: H(2,3) is reachable both diagonally and through
        // E, so its mask starts with two bits.
        let read = [0u8, 1, 2, 3];
        let quals = [40u8; 4];
        let rf = [0u8, 1, 1, 2, 3];
        let mut data = StripedData::new(Arc::new(MemTally::new()));
        data.init(&read, &quals, rf.len(), &sc, 8);
        let mut met = AlignMetrics::new();
        fill_striped(&mut data, &rf, &sc, &mut met);

        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = Vec::new();
        for _ in 0..2 {
            let dec = data.matrix.analyze_cell(
                2, 3, Stream::H, rf[2], read[1], quals[1], &sc, 0, NEG_I16, &mut rng,
            );
            assert!(!dec.empty);
            seen.push(dec.next.unwrap());
        }
        assert!(seen.contains(&BtTransition::DiagMatch));
        assert!(seen.contains(&BtTransition::HFromE));
        // Third call: decayed to empty, and not a legal terminal.
        let dec = data.matrix.analyze_cell(
            2, 3, Stream::H, rf[2], read[1], quals[1], &sc, 0, NEG_I16, &mut rng,
        );
        assert!(dec.empty);
        assert!(!dec.terminal);
    }
}
