//! Sink implementations
//!
//! Terminal sinks write formatted events somewhere; stage sinks (batch,
//! async, fanout) wrap other sinks.

pub mod async_dispatch;
pub mod batch;
pub mod console;
pub mod fanout;
pub mod file;
pub mod memory;
pub mod rotating_file;

pub use async_dispatch::AsyncSink;
pub use batch::{BatchSink, DEFAULT_BATCH_INTERVAL, DEFAULT_BATCH_SIZE};
pub use console::ConsoleSink;
pub use fanout::FanoutSink;
pub use file::FileSink;
pub use memory::MemorySink;
pub use rotating_file::{
    RotatingFileSink, RotationPolicy, RotationStrategy, DEFAULT_BACKUP_COUNT, DEFAULT_MAX_BYTES,
};
