//! Striped DP core: matrix layout, backtrace masks, randomized backtrace.

pub mod backtrace;
pub mod cigar;
pub mod fill;
pub mod mask;
pub mod matrix;
pub mod mem_tally;
pub mod metrics;
pub mod scoring;
pub mod striped_data;
pub mod vector_buf;

pub use backtrace::{
    backtrace_from, gather_end_cells, Alignment, Backtrace, BtTransition, CellDecision, Edit,
    EditKind, StripedAligner,
};
pub use fill::{fill_striped, FillResult, NEG_I16};
pub use mask::MaskTable;
pub use matrix::{Stream, StripedMatrix, NVEC_PER_CELL};
pub use mem_tally::{MemCategory, MemTally};
pub use metrics::{AlignMetrics, SharedAlignMetrics};
pub use scoring::{bases_match, Scoring, BASE_N};
pub use striped_data::{StripedData, PROFILE_CLASSES};
pub use vector_buf::{AlignedVectorBuffer, V128};
