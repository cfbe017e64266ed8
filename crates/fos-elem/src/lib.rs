//! fOS Elem - Custom Element Loader
//!
//! Mirrors a server-side build directory into an in-memory tree, resolves
//! CommonJS-style references against it, fetches content asynchronously
//! and runs scripts through a pluggable host with memoized exports.
//!
//! Features:
//! - Resource tree built from a build manifest, with a tag registry
//! - Single-flight loading and counting joins over whole subtrees
//! - Eager (interactive) and lazy (offline) loading strategies
//! - Module resolution with directory-style and `index` fallbacks,
//!   module remaps and packaged files
//! - Content processors for HTML, CSS, JSON and JS

mod config;
mod dom;
mod elem;
mod error;
mod loader;
mod native;
pub mod path;
mod process;
mod resolve;
mod script;
mod transport;
mod tree;

pub use config::{ElemConfig, Manifest, Mode, StyleMode};
pub use dom::{ElementTree, find_matches};
pub use elem::{Bootstrap, Elem, INDEX_FILE};
pub use error::{ElemError, ScriptError, TransportError};
pub use loader::{LoadCell, LoadState, Observer};
pub use native::{Exports, NativeHost, NativeModule};
pub use process::{Content, NullStyles, StyleEntry, StyleSheets, StyleSink, rewrite_css};
pub use resolve::{DEFAULT_EXT, LocalRequire};
pub use script::{ModuleState, Resolved, ScriptHost, ScriptJob, Step};
pub use transport::{FetchRequest, FsTransport, MemoryTransport, Transport};
pub use tree::{Directory, GLOBAL_DIR, MERGE_MARKER, Node, Resource, Tree};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
