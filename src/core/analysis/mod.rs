//! Pure log analysis: no I/O, no async.

pub mod comparison;
pub mod gaps;

pub use comparison::{Comparison, TimeZoneSetting, compare_curves, index_type_of};
pub use gaps::{find_gaps, parse_time_gap};
