//! UnityFS bundle parsing
//!
//! - `header` - header fields and the quick-check routine
//! - `types` - table records and parse options
//! - `visitor` - the event interface and the built-in visitors
//! - `parser` - the parse stages and the parsed [`BundleFile`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use unityfs_bundle::bundle::{BundleFile, CollectingVisitor, bundle_valid};
//!
//! if bundle_valid("example.bundle") {
//!     let mut visitor = CollectingVisitor::new();
//!     let bundle = BundleFile::open("example.bundle", &mut visitor)?;
//!     for entry in bundle.entries() {
//!         println!("{} ({} bytes)", entry.name, entry.size);
//!     }
//!     let first = bundle.read_entry(&bundle.entries()[0].name)?;
//!     println!("first entry starts with {:02x?}", &first[..first.len().min(4)]);
//! }
//! # Ok::<(), unityfs_bundle::BinaryError>(())
//! ```

pub mod header;
pub mod parser;
pub mod types;
pub mod visitor;

pub use header::{
    ArchiveFlags, BundleHeader, SUPPORTED_FORMAT_VERSION, bundle_size, bundle_valid,
};
pub use parser::{BundleFile, BundleParser, TABLE_HASH_SIZE};
pub use types::{BlockInfo, BundleOptions, EntryInfo, ParseStage};
pub use visitor::{BundleVisitor, CollectingVisitor, ExtractingVisitor, NullVisitor, VisitEvent};
