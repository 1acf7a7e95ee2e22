pub mod accessor;
pub mod error;
pub mod lock;
pub mod storage;
pub mod testing;

pub use accessor::{LockRecord, StorageAccessor};
pub use error::LockError;
pub use lock::{LockProvider, SimpleLock};
pub use storage::{StorageBasedLockProvider, StorageLock};
