//! UnityFS asset bundle reader
//!
//! Re-exports [`unityfs_bundle`] and ships the `unityfs` command-line tool.
//!
//! # Examples
//!
//! ```rust,no_run
//! use unityfs::{BundleFile, CollectingVisitor, bundle_size};
//!
//! println!("declared size: {}", bundle_size("example.bundle"));
//!
//! let mut visitor = CollectingVisitor::new();
//! let bundle = BundleFile::open("example.bundle", &mut visitor)?;
//! println!("{} blocks, {} entries", bundle.blocks().len(), bundle.entries().len());
//! # Ok::<(), unityfs::BinaryError>(())
//! ```

pub use unityfs_bundle::*;
