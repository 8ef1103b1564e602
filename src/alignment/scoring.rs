//! Scoring scheme consumed by the fill and the backtrace analyzer.
//!
//! Bases are encoded 0=A, 1=C, 2=G, 3=T, 4=N. Gap costs follow the
//! first-char convention: a gap of length L costs
//! `gap_open + (L - 1) * gap_extend`.

/// Encoded ambiguous base.
pub const BASE_N: u8 = 4;

/// True when two encoded bases are an unambiguous match. N never matches.
#[inline]
pub fn bases_match(readc: u8, refc: u8) -> bool {
    readc == refc && readc < BASE_N
}

/// Affine-gap scoring scheme with a quality-ramped mismatch penalty.
#[derive(Debug, Clone)]
pub struct Scoring {
    /// Bonus for an unambiguous match.
    pub bonus: i32,
    /// Mismatch penalty at base quality 0.
    pub mm_min: i32,
    /// Mismatch penalty at base quality 40 and above.
    pub mm_max: i32,
    /// Penalty when either character is N.
    pub n_penalty: i32,
    /// Cost of a length-1 gap.
    pub gap_open: i32,
    /// Cost of each gap position after the first.
    pub gap_extend: i32,
    /// Constant term of the N ceiling.
    pub n_ceil_const: f32,
    /// Per-read-base term of the N ceiling.
    pub n_ceil_linear: f32,
    /// Local mode: H clamps at zero and alignments may end at any cell
    /// whose H equals the floor. Otherwise alignment is end-to-end in the
    /// read with affine-gap ladders on the boundary row and column.
    pub local: bool,
}

impl Scoring {
    /// Default local-mode scheme.
    pub fn local() -> Self {
        Scoring {
            bonus: 2,
            mm_min: 2,
            mm_max: 6,
            n_penalty: 1,
            gap_open: 5,
            gap_extend: 3,
            n_ceil_const: 0.0,
            n_ceil_linear: 0.15,
            local: true,
        }
    }

    /// Default end-to-end scheme. Matches score zero; everything else is
    /// a penalty.
    pub fn global() -> Self {
        Scoring {
            bonus: 0,
            local: false,
            ..Scoring::local()
        }
    }

    /// Bonus for aligning `readc` against an equal reference character.
    /// Quality is accepted for interface symmetry and currently ignored.
    #[inline]
    pub fn match_bonus(&self, _readc: u8, _readq: u8) -> i32 {
        self.bonus
    }

    /// Penalty for aligning `readc` against `refc` when they differ or
    /// either is N. Quality ramps the penalty between `mm_min` (q=0) and
    /// `mm_max` (q>=40).
    #[inline]
    pub fn mismatch_penalty(&self, readc: u8, refc: u8, readq: u8) -> i32 {
        if readc >= BASE_N || refc >= BASE_N {
            self.n_penalty
        } else {
            let q = readq.min(40) as i32;
            self.mm_min + (self.mm_max - self.mm_min) * q / 40
        }
    }

    /// Signed score contribution of aligning `readc` against `refc`.
    #[inline]
    pub fn score(&self, readc: u8, refc: u8, readq: u8) -> i32 {
        if bases_match(readc, refc) {
            self.match_bonus(readc, readq)
        } else {
            -self.mismatch_penalty(readc, refc, readq)
        }
    }

    /// Maximum number of N positions tolerated in an alignment of a read
    /// of the given length.
    #[inline]
    pub fn n_ceil(&self, read_len: usize) -> usize {
        let ceil = self.n_ceil_const + self.n_ceil_linear * read_len as f32;
        (ceil as usize).min(read_len)
    }

    /// Largest bonus any cell transition can add.
    #[inline]
    pub fn max_bonus(&self) -> i32 {
        self.bonus.max(0)
    }

    /// Largest penalty any cell transition can subtract. This is the bias
    /// used for unsigned byte lanes.
    #[inline]
    pub fn max_penalty(&self) -> i32 {
        self.mm_min
            .max(self.mm_max)
            .max(self.n_penalty)
            .max(self.gap_open)
            .max(self.gap_extend)
    }
}
