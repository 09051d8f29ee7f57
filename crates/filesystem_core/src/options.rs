//! Builder for [`crate::FileSystemManager`], grounded on `pkg/fs/options.go`'s
//! functional-option pattern, adapted to the more usual Rust builder-struct
//! idiom (owning `Arc<dyn Trait>` clients rather than connection strings —
//! wiring those up is `filestore_config`'s job).

use std::sync::Arc;

use coordination_store::CoordinationStore;
use object_store::ObjectStore;

pub struct FileSystemManagerOptions {
    pub(crate) coordination: Arc<dyn CoordinationStore>,
    pub(crate) objects: Arc<dyn ObjectStore>,
}

impl FileSystemManagerOptions {
    pub fn new(coordination: Arc<dyn CoordinationStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            coordination,
            objects,
        }
    }
}
