//! Workspace facade crate.
//!
//! Exposes feature flags that map to the individual workspace crates
//! (`core-decode`, `core-runtime`) so host applications can depend on
//! `aural-workspace` and enable the documented features without wiring each
//! crate individually.

#[cfg(any(feature = "symphonia-backend", feature = "core-only"))]
pub use core_decode as decode;

#[cfg(feature = "runtime")]
pub use core_runtime as runtime;
