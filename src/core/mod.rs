pub mod diff;
pub mod engine;
pub mod hash_index;

pub use diff::{compute_deletions, compute_uploads, strip_etag, DeletionRequest, ObjectIdentifier};
pub use engine::{SyncConfig, SyncEngine, SyncPlan, SyncReport};
pub use hash_index::{build_local_index, hash_bytes, hash_directory, hash_file, list_files};
