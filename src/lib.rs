//! # blobnode
//!
//! The per-node storage service of a distributed filesystem for large
//! immutable blobs and small versioned tags. One instance runs on each
//! cluster node and owns the node's local volumes.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!  put/get listeners  │        Node Service          │  disk-space monitor
//!  (external) ───────▶│  volume registry             │◀── tag refresher
//!                     │  put queue / get queue       │
//!                     │  tag index                   │
//!                     └──────────────┬───────────────┘
//!                                    │
//!                     ┌──────────────▼───────────────┐
//!                     │ <root>/vol0/{blob,tag}/aa/bb │
//!                     │ <root>/vol1/{blob,tag}/aa/bb │
//!                     └──────────────────────────────┘
//! ```
//!
//! All node state lives in one serialized service task. Blob transfers are
//! admitted through bounded queues and handed off to the external put/get
//! listeners as `(local path, url)` targets; the admission slot is held
//! until the requesting client goes away. Tag writes are two-phase: data
//! lands under a `!partial.` name and is promoted to its final name with an
//! atomic rename on commit.
//!
//! ## Usage
//!
//! ```bash
//! blobnode --node-name node1 --data-root /srv/blobnode
//! ```

pub mod common;
pub mod node;

// Re-export commonly used types
pub use common::{Error, NodeConfig, Result};
pub use node::{ClientToken, NodeHandle, NodeService};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
