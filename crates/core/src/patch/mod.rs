//! Structural partial updates applied to reconstructed documents.

pub mod apply;
pub mod types;

pub use apply::{apply_one, apply_patches, apply_patches_in_scope, PatchOutcome};
pub use types::{Patch, PatchError, PatchErrorReason};
