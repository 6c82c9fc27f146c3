//! The node storage service
//!
//! One instance per cluster node:
//! - Volume registry with free-space placement
//! - Bounded admission queues for blob puts and gets
//! - Tag index with newest-timestamp-wins reconciliation
//! - Background disk-space and tag-index monitors

pub mod monitor;
pub mod queue;
pub mod server;
pub mod tags;
pub mod volume;

pub use queue::{Admission, ClientId, WorkQueue};
pub use server::{BlobTarget, ClientToken, NodeHandle, NodeService};
pub use tags::{TagEntry, TagIndex};
pub use volume::Volume;
