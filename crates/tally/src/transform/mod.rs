//! Event stream transforms: interval algebra, label filters and chunking.
//!
//! All transforms are pure functions over owned event lists.

pub mod chunk;
pub mod intervals;
pub mod labels;

pub use chunk::{chunk, ChunkSummary, LabelChunk};
pub use intervals::{filter_period_intersect, period_union, union};
pub use labels::{exclude_labels, include_labels};
