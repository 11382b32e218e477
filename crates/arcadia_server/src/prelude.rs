//! Common imports used throughout the crate, mirroring the small prelude
//! convention of re-exporting frequently used standard/sync types.

pub use std::collections::HashMap;
pub use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
pub use std::sync::Arc;

pub use anyhow::{anyhow, bail, Context};
pub use tracing::{debug, error, info, instrument, warn};

/// The crate-wide fallible return type for anything at a task/process boundary.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// A bounded outbound mpsc channel of the given item type.
pub type BoundedSender<T> = tokio::sync::mpsc::Sender<T>;
/// The receiving half of a [`BoundedSender`].
pub type BoundedReceiver<T> = tokio::sync::mpsc::Receiver<T>;
/// An unbounded mpsc channel, used for control-plane messages that must never
/// be dropped (registration, deregistration).
pub type UnboundedSender<T> = tokio::sync::mpsc::UnboundedSender<T>;
/// The receiving half of an [`UnboundedSender`].
pub type UnboundedReceiver<T> = tokio::sync::mpsc::UnboundedReceiver<T>;
/// A single-use reply channel, used for request/response handoffs between tasks.
pub type OneshotSender<T> = tokio::sync::oneshot::Sender<T>;
/// The receiving half of a [`OneshotSender`].
pub type OneshotReceiver<T> = tokio::sync::oneshot::Receiver<T>;
