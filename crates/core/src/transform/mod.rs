//! Bidirectional transform between nested document trees and flat rows.

pub mod flatten;
pub mod merge;
pub mod reconstruct;
pub mod row;

pub use flatten::{flatten, flatten_checked, shape_mismatches, Flattened};
pub use merge::merge_locale;
pub use reconstruct::reconstruct;
pub use row::FieldValueRow;
