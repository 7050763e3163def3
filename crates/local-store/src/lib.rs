//! Local key-value state that survives restarts of the storefront client.
//!
//! Holds the guest cart and the session credentials under fixed key names
//! (see [`keys`]). The whole store is wiped on logout.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{Result, StorageError};
pub use file::FileLocalStore;
pub use memory::InMemoryLocalStore;
pub use store::{LocalStore, LocalStoreExt, keys};
