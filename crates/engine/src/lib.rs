pub mod config;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use policy::{LowerBound, RunMode, StopMode, SyncError, SyncPolicy};
pub use registry::{register, register_all, Registered, Registration};
pub use scheduler::{IterationSummary, LoopState, Pacing, PollScheduler};
pub use source::{MessageSource, SourceError};
pub use store::{PostStore, StoreError};
