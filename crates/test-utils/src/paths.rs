//! Locating optional real model files for tests.
//!
//! Real HRRR/RAP files are large, so they are never checked in. Tests that
//! want one look in `TEST_DATA_DIR` and the workspace `testdata/`
//! directories and skip when nothing is found.

use std::path::PathBuf;

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// `crates/{crate_name}/testdata/`
pub fn crate_testdata_dir(crate_name: &str) -> PathBuf {
    workspace_root()
        .join("crates")
        .join(crate_name)
        .join("testdata")
}

/// Search `TEST_DATA_DIR`, `crates/grib2-parser/testdata/` and the
/// workspace `testdata/` for a file, in that order.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(test_data_dir) = std::env::var("TEST_DATA_DIR") {
        candidates.push(PathBuf::from(test_data_dir).join(name));
    }

    let root = workspace_root();
    candidates.push(crate_testdata_dir("grib2-parser").join(name));
    candidates.push(root.join("testdata").join(name));

    candidates.into_iter().find(|path| path.exists())
}

/// A temporary directory removed when dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// A temporary directory whose name starts with `prefix`.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}
