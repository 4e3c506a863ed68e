pub mod comparator;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod path;
pub mod probe;
pub mod scanner;
pub mod transfer;
pub mod workers;

pub use comparator::{mismatch, CopyReason, FileComparator, SyncAction};
pub use engine::{FailureRecord, ScanMode, SyncEngine, SyncReport};
pub use error::{ErrorKind, SyncError};
pub use inventory::{FileInventory, InventoryEntry};
pub use path::{concat_path, PATH_SIZE};
pub use probe::{probe, EntryAttributes, EntryKind, Fingerprint};
pub use scanner::{scan_tree, ScanOutcome, TreeWalker};
pub use transfer::{CopyOutcome, SyncExecutor};
pub use workers::{scan_parallel, Message, ProcessContext, TreeId, WorkerRole, WorkerState};
