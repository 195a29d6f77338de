// ABOUTME: Package file format module
// ABOUTME: Exports path layout computation and the tar+zstd archiver

pub mod archive;
pub mod layout;

pub use archive::{rename_no_clobber, run_blocking, Archiver, TarZstdArchiver};
pub use layout::PackageLayout;

/// Schema script at the archive root
pub const SCHEMA_FILE: &str = "schema.sql";

/// Per-table data script inside each table directory
pub const DATA_FILE: &str = "data.sql";

/// Export staging directory, next to the target package
pub const BUILD_DIR: &str = "_build";

/// Import unpack directory, next to the source package
pub const TEMP_DIR: &str = "_temp";

/// Extension of the intermediate archive written before the final rename
pub const ARCHIVE_EXTENSION: &str = "tar.zst";
