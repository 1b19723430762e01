//! Quick-check tests over files on disk

mod common;

use common::{BundleBuilder, two_block_bundle};
use std::io::Write;
use tempfile::NamedTempFile;
use unityfs_bundle::{bundle_size, bundle_valid};

fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_complete_bundle() {
    let data = two_block_bundle().0.build();
    let file = write_temp(&data);

    assert_eq!(bundle_size(file.path()), data.len() as i64);
    assert!(bundle_valid(file.path()));
}

#[test]
fn test_truncated_bundle() {
    let data = two_block_bundle().0.build();
    let file = write_temp(&data[..data.len() - 1]);

    assert_eq!(bundle_size(file.path()), 0);
    assert!(!bundle_valid(file.path()));
}

#[test]
fn test_truncated_header() {
    let data = two_block_bundle().0.build();
    let file = write_temp(&data[..20]);
    assert_eq!(bundle_size(file.path()), 0);
}

#[test]
fn test_declared_size_smaller_than_file() {
    let data = two_block_bundle().0.declared_size(64).build();
    let file = write_temp(&data);
    assert_eq!(bundle_size(file.path()), 64);
}

#[test]
fn test_negative_declared_size() {
    let data = BundleBuilder::new().declared_size(-5).build();
    let file = write_temp(&data);
    assert_eq!(bundle_size(file.path()), 0);
}

#[test]
fn test_wrong_signature_or_version() {
    let file = write_temp(&BundleBuilder::new().signature(b"UnityRaw").build());
    assert_eq!(bundle_size(file.path()), 0);

    let file = write_temp(&BundleBuilder::new().version(7).build());
    assert_eq!(bundle_size(file.path()), 0);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(bundle_size(dir.path().join("absent.bundle")), 0);
    assert!(!bundle_valid(dir.path().join("absent.bundle")));
}
