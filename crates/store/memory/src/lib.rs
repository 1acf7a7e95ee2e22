mod accessor;

pub use accessor::MemoryStorageAccessor;
