//! Striped affine-gap DP core with a randomized backtrace.
//!
//! This crate holds the matrix machinery a vectorized Smith-Waterman
//! aligner fills and a backtrace walks: a packed, 16-byte-aligned buffer of
//! E/F/H/TMP score vectors in a striped layout, a bit-packed per-cell table
//! of still-legal backward transitions, and a cell analyzer that picks one
//! of the equally optimal predecessors uniformly at random. A scalar
//! reference fill and a one-shot driver ([`StripedAligner`]) tie the pieces
//! together for one query against one reference window; seeding, read
//! iteration and output formatting live in the outer aligner.

pub mod alignment;

pub use alignment::{
    AlignMetrics, AlignedVectorBuffer, Alignment, Backtrace, BtTransition, CellDecision, Edit,
    EditKind, FillResult, MaskTable, MemCategory, MemTally, Scoring, SharedAlignMetrics, Stream,
    StripedAligner, StripedData, StripedMatrix, V128,
};
