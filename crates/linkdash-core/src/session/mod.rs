//! Session-scoped client state
//!
//! - [`storage`]: the persistence adapter and its in-memory and file backends
//! - [`redirect`]: the post-login redirect slot kept in that storage

pub mod storage;
pub mod redirect;

pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use redirect::{is_safe_redirect, RedirectReason, RedirectRecord, RedirectStore};
