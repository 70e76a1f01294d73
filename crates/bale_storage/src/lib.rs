//! # Bale Storage
//!
//! Blob stores that hold segment archives.
//!
//! A store is a flat namespace of immutable, named blobs. Blobs are written
//! through a [`BlobWriter`] and only become visible once committed under a
//! name, so readers never observe a partially written segment. Stores do not
//! interpret the bytes they hold.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral use
//! - [`FileStore`] - One file per blob inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use bale_storage::{BlobStore, InMemoryStore};
//! use std::io::{Read, Write};
//!
//! let store = InMemoryStore::new();
//! let mut writer = store.create().unwrap();
//! writer.write_all(b"hello world").unwrap();
//! writer.commit("greeting").unwrap();
//!
//! let mut data = Vec::new();
//! store.open("greeting").unwrap().read_to_end(&mut data).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_name, BlobRead, BlobReader, BlobStore, BlobWriter};
