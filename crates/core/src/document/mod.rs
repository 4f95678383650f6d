pub mod model;
pub mod path;

pub use model::{DocumentContent, DocumentRecord, DocumentVersion, VersionAction};
pub use path::{derive_path, slugify};
