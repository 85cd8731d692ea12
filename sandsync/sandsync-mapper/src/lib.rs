//! Element identifier mapping for JSX/TSX sources.
//!
//! Parses source files with tree-sitter, injects a stable identifier attribute
//! into every JSX element, and keeps a table from identifier to source location
//! so an editor can bind a rendered element back to its code.
//!
//! # Example
//!
//! ```no_run
//! use sandsync_mapper::{MapperOptions, TemplateNodeMapper};
//!
//! let mapper = TemplateNodeMapper::new(MapperOptions::default())?;
//! let result = mapper.process_file_for_mapping(
//!     "app/page.tsx",
//!     "export default function Page() { return <main />; }",
//!     None,
//! );
//! assert!(result.modified);
//! # Ok::<(), sandsync_core::SyncError>(())
//! ```

pub mod edits;
pub mod jsx;
pub mod mapper;
pub mod oid;
pub mod tree_sitter_wrapper;

pub use mapper::{MapperOptions, MappingResult, TemplateNodeMapper};
pub use oid::OidGenerator;
pub use tree_sitter_wrapper::{SourceDialect, TreeSitterWrapper};
