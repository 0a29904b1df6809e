//! Core types shared by the workflow and the binary.
//!
//! This module contains configuration, session persistence and the
//! notification queue.

mod config;
mod notification;
mod store;

pub use config::{AiConfig, Config, StorageConfig, StorageKind, ValidationConfig};
pub use notification::{Notification, NotificationCenter, NotificationKind};
pub use store::{
    DisabledBackend, FileBackend, MemoryBackend, SessionStore, StorageBackend, StorageError,
    StoreField, DEFAULT_KEY_PREFIX,
};
