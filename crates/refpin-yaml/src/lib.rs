//! Format-preserving YAML editing for GitOps values files
//!
//! Reads go through a navigable tree; writes go through scalar handles and
//! replace exactly one token's bytes, so serializing an untouched document
//! gives back the input byte for byte.
//!
//! # Architecture
//!
//! ```text
//! text → parse() → Document ─┬─ root(): Node tree ─► blocks::top_level_blocks()
//!                            └─ write_scalar(handle) ─► serialize() → text
//! ```
//!
//! # Example
//!
//! ```rust
//! use refpin_yaml::{blocks, parse};
//!
//! let mut file = parse("prod:\n  gitConfig:\n    ref: main # pinned\n").unwrap();
//! let doc = file.document_mut().unwrap();
//! let handle = {
//!     let blocks = blocks::top_level_blocks(doc).unwrap();
//!     let git = blocks::get_mapping(doc, blocks.get("prod").unwrap(), "gitConfig")
//!         .unwrap()
//!         .unwrap();
//!     blocks::get_string_and_handle(doc, git, "ref").unwrap().unwrap().1
//! };
//! doc.write_scalar(handle, "1234567");
//! assert_eq!(file.serialize(), "prod:\n  gitConfig:\n    ref: '1234567' # pinned\n");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod blocks;
pub mod document;
pub mod error;
pub mod quoting;
mod scanner;

pub use blocks::{top_level_blocks, TopLevelBlocks, GLOBAL_BLOCK};
pub use document::{
    parse, Document, MapEntry, Mapping, Node, ScalarHandle, ScalarToken, Sequence, YamlFile,
};
pub use error::{Location, ParseError, YamlError, YamlResult};
pub use quoting::ScalarStyle;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for reading and editing values files
    pub use crate::blocks::{
        get_mapping, get_sequence, get_string, get_string_and_handle, get_string_at_path,
        get_string_or_global, top_level_blocks, TopLevelBlocks,
    };
    pub use crate::document::{parse, Document, Mapping, Node, ScalarHandle, YamlFile};
    pub use crate::error::{Location, ParseError, YamlError, YamlResult};
}
