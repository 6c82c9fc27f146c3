//! Common utilities and types shared across blobnode

pub mod config;
pub mod error;
pub mod layout;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use layout::{ObjectKind, Timestamp};
