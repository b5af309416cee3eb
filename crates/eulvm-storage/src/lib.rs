//! Speculative-parallel state engine: the three-tier [`StateKv`], the
//! per-worker [`Slot`], and the [`WindowExecutor`] that runs a fixed-size
//! batch of transactions concurrently and merges their writes in
//! priority order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod consts;
mod kv;
mod slot;
mod tiers;
mod window;

pub use consts::StorageConfig;
pub use kv::Kv;
pub use slot::Slot;
pub use tiers::StateKv;
pub use window::WindowExecutor;
