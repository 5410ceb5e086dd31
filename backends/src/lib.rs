pub mod backend;
pub mod local;
pub mod lock;
pub mod memory;
pub mod retry;

pub use backend::{Backend, ObjectInfo};
pub use local::LocalBackend;
pub use lock::LockFile;
pub use memory::MemoryBackend;
pub use retry::{retry_with_backoff, RetryConfig, Retryable};
