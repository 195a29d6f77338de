// ABOUTME: Directory archiver for package files (tar stream compressed with zstd)
// ABOUTME: Compresses a staging directory flattened and extracts packages safely

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Compress-directory and extract-archive operations used by the pipelines.
pub trait Archiver: Send + Sync {
    /// Archive the contents of `source_dir` without an enclosing root folder
    fn compress_dir(&self, source_dir: &Path, archive: &Path, overwrite: bool) -> Result<()>;

    /// Extract every entry of `archive` under `dest_dir`
    fn extract(&self, archive: &Path, dest_dir: &Path, overwrite: bool) -> Result<()>;
}

/// Package archiver writing `tar` streams through a `zstd` encoder.
#[derive(Debug, Clone)]
pub struct TarZstdArchiver {
    level: i32,
}

impl TarZstdArchiver {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for TarZstdArchiver {
    fn default() -> Self {
        // Fast compression; packages are written once and read once.
        Self::new(1)
    }
}

impl Archiver for TarZstdArchiver {
    fn compress_dir(&self, source_dir: &Path, archive: &Path, overwrite: bool) -> Result<()> {
        let output = open_for_write(archive, overwrite)?;

        let encoder = zstd::stream::Encoder::new(BufWriter::new(output), self.level)
            .map_err(|e| Error::archive(archive, format!("zstd encoder creation failed: {}", e)))?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let mut entries = 0usize;
        append_dir_contents(&mut builder, source_dir, Path::new(""), &mut entries)
            .map_err(|e| Error::archive(archive, e))?;

        let encoder = builder
            .into_inner()
            .map_err(|e| Error::archive(archive, format!("archive finalization failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::archive(archive, format!("zstd finalization failed: {}", e)))?
            .into_inner()
            .map_err(|e| Error::archive(archive, format!("archive flush failed: {}", e)))?;

        tracing::debug!(
            "Archived {} entries from {} to {}",
            entries,
            source_dir.display(),
            archive.display()
        );
        Ok(())
    }

    fn extract(&self, archive: &Path, dest_dir: &Path, overwrite: bool) -> Result<()> {
        let input = File::open(archive)
            .map_err(|e| Error::archive(archive, format!("cannot open package: {}", e)))?;
        let decoder = zstd::stream::Decoder::new(BufReader::new(input))
            .map_err(|e| Error::archive(archive, format!("zstd decoder creation failed: {}", e)))?;
        let mut tar = tar::Archive::new(decoder);

        fs::create_dir_all(dest_dir).map_err(|e| Error::staging(dest_dir, e))?;

        let entries = tar
            .entries()
            .map_err(|e| Error::archive(archive, format!("cannot read entries: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::archive(archive, format!("entry read failed: {}", e)))?;
            let relative: PathBuf = entry
                .path()
                .map_err(|e| Error::archive(archive, format!("entry path unreadable: {}", e)))?
                .into_owned();

            let target = dest_dir.join(&relative);
            if !overwrite && entry.header().entry_type().is_file() && target.exists() {
                return Err(Error::archive(
                    archive,
                    format!("'{}' already exists in {}", relative.display(), dest_dir.display()),
                ));
            }

            let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
                Error::archive(archive, format!("cannot extract '{}': {}", relative.display(), e))
            })?;
            if !unpacked {
                return Err(Error::archive(
                    archive,
                    format!("entry '{}' escapes the extraction directory", relative.display()),
                ));
            }
        }

        Ok(())
    }
}

fn open_for_write(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Error::archive(path, "archive already exists")
        } else {
            Error::archive(path, format!("cannot create archive: {}", e))
        }
    })
}

/// Walk `dir` in name order, adding entries relative to the archive root.
fn append_dir_contents<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    prefix: &Path,
    entries: &mut usize,
) -> std::io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|child| child.file_name());

    for child in children {
        let path = child.path();
        let name = prefix.join(child.file_name());
        let file_type = child.file_type()?;

        if file_type.is_dir() {
            builder.append_dir(&name, &path)?;
            *entries += 1;
            append_dir_contents(builder, &path, &name, entries)?;
        } else if file_type.is_file() {
            builder.append_path_with_name(&path, &name)?;
            *entries += 1;
        } else {
            tracing::debug!("Skipping non-regular entry {}", path.display());
        }
    }

    Ok(())
}

/// Run an archiver operation on tokio's blocking pool.
///
/// `archive` only names the package in the error raised if the task panics.
pub async fn run_blocking<A, F>(archiver: &A, archive: &Path, operation: F) -> Result<()>
where
    A: Archiver + Clone + 'static,
    F: FnOnce(&A) -> Result<()> + Send + 'static,
{
    let archiver = archiver.clone();
    tokio::task::spawn_blocking(move || operation(&archiver))
        .await
        .map_err(|e| Error::archive(archive, format!("archive task failed: {}", e)))?
}

/// Move `from` to `to`, failing if `to` already exists.
///
/// Uses a hard link so the existence check and the move are one atomic step;
/// falls back to a checked rename where links are unsupported.
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            fs::remove_file(from)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(Error::DestinationExists(to.to_path_buf()))
        }
        Err(e) => {
            tracing::debug!("Hard link failed ({}), falling back to rename", e);
            if to.exists() {
                return Err(Error::DestinationExists(to.to_path_buf()));
            }
            fs::rename(from, to)?;
            Ok(())
        }
    }
}
