//! # Plumbline Parse
//!
//! Resumable parsers for git plumbing output: commit, tag and tree
//! payloads, `ls-tree -z` listings, raw and name-status diffs, porcelain v2
//! status, `for-each-ref` listings and `cat-file --batch` responses.
//!
//! Every parser implements [`RecordParser`]. A parser can be fed a buffer
//! that ends anywhere, including mid-record; it consumes only whole records
//! and reports through [`ParseResult`] whether more bytes are needed.
//! [`RecordReader`] drives a parser from any [`std::io::Read`] source.
//!
//! ```
//! use plumbline_parse::{RecordParser, TreeDifferenceEntry, TreeDifferenceParser};
//!
//! let diff = TreeDifferenceParser::name_status(false)
//!     .parse_complete(b"R90\told.txt\tnew.txt\n")
//!     .unwrap();
//! assert!(matches!(diff.entries[0], TreeDifferenceEntry::Renamed(_)));
//! ```

mod batch;
mod commit;
mod diff;
mod error;
mod header;
mod identity;
mod quote;
mod reader;
mod record;
mod refs;
mod status;
mod tag;
mod tree;

pub use batch::{BatchHeader, BatchMode, BatchParser, BatchResponse};
pub use commit::{CommitData, CommitParser};
pub use diff::{
    Change, DiffFormat, MergedEntry, ParentChange, ParentChangeKind, RenamedEntry,
    TreeDifference, TreeDifferenceEntry, TreeDifferenceParser,
};
pub use error::{ParseContext, ParseError, ParseErrorKind, Result};
pub use identity::Identity;
pub use quote::unquote_path;
pub use reader::{RecordReader, DEFAULT_CHUNK_SIZE};
pub use record::{ParseResult, RecordParser};
pub use refs::{Reference, ReferenceParser, REFERENCE_FORMAT};
pub use status::{
    BranchInfo, StatusCounts, StatusEntry, StatusKind, StatusParser, StatusSnapshot,
    UnmergedEntry,
};
pub use tag::{TagData, TagParser};
pub use tree::{LsTreeParser, TreeData, TreeEntry, TreeParser};
