//! # Plumbline Object Database
//!
//! Typed access to a git repository through the git binary.
//!
//! [`ObjectDatabase`] keeps one `cat-file --batch` conversation open and
//! serializes every reader through it; [`Repository`] adds the commands
//! whose output is streamed through the resumable parsers: status, tree
//! diffs, tree listings and references.
//!
//! ```no_run
//! use plumbline_odb::{Commit, Repository};
//! use plumbline_process::GitConfig;
//!
//! let repo = Repository::open(GitConfig::default().with_working_dir("."));
//! let head = repo.resolve("HEAD").unwrap();
//! let commit: Commit = repo.odb().read_object(&head).unwrap();
//! println!("{}", commit.first_line());
//! ```

mod cache;
mod database;
mod error;
mod objects;
mod repository;

pub use cache::CacheStats;
pub use database::{BlobStream, ObjectDatabase};
pub use error::{OdbError, Result};
pub use objects::{Blob, Commit, DatabaseRef, Object, ObjectKind, Tag, Tree};
pub use repository::{DiffOptions, Repository, StatusOptions};
