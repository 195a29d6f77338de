// ABOUTME: Deterministic path layout for package staging and unpacking
// ABOUTME: Pure path computation, performs no filesystem access

use super::{ARCHIVE_EXTENSION, BUILD_DIR, DATA_FILE, SCHEMA_FILE, TEMP_DIR};
use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Paths derived from a package file path.
///
/// Export layouts stage into `<parent>/_build`, import layouts unpack into
/// `<parent>/_temp`. Two operations on packages in the same directory share
/// the staging path, so callers must not run them concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    package: PathBuf,
    staging: PathBuf,
}

impl PackageLayout {
    /// Layout for writing a package
    pub fn for_export(package: impl AsRef<Path>) -> Result<Self> {
        Self::new(package.as_ref(), BUILD_DIR)
    }

    /// Layout for reading a package
    pub fn for_import(package: impl AsRef<Path>) -> Result<Self> {
        Self::new(package.as_ref(), TEMP_DIR)
    }

    fn new(package: &Path, staging_name: &str) -> Result<Self> {
        if package.file_name().is_none() {
            return Err(Error::invalid_path(package, "path does not name a file"));
        }

        let parent = match package.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => {
                return Err(Error::invalid_path(
                    package,
                    "path has no parent directory (use ./file for the current directory)",
                ))
            }
        };

        Ok(Self {
            package: package.to_path_buf(),
            staging: parent.join(staging_name),
        })
    }

    pub fn package_path(&self) -> &Path {
        &self.package
    }

    /// `_build` for exports, `_temp` for imports
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Package path with its extension swapped for the archive extension
    pub fn archive_intermediate_path(&self) -> PathBuf {
        self.package.with_extension(ARCHIVE_EXTENSION)
    }

    pub fn schema_file_path(&self) -> PathBuf {
        self.staging.join(SCHEMA_FILE)
    }

    /// Directory holding one table's data script
    ///
    /// The directory is named exactly after the table, so names that would
    /// resolve anywhere other than a direct child of staging are rejected.
    pub fn table_dir(&self, table: &str) -> Result<PathBuf> {
        let mut components = Path::new(table).components();
        let is_plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == table
        );

        if !is_plain {
            return Err(Error::invalid_path(
                self.staging.join(table),
                format!("table name '{}' cannot be used as a directory name", table),
            ));
        }

        Ok(self.staging.join(table))
    }

    pub fn table_data_path(&self, table: &str) -> Result<PathBuf> {
        Ok(self.table_dir(table)?.join(DATA_FILE))
    }
}
