//! Streaming archive extraction with async decompression.
//!
//! Supports tar.gz/tgz, tar.xz, tar.bz2, plain tar and ZIP.

use crate::error::{DownloadError, Result};
use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};
use async_zip::base::read::seek::ZipFileReader;
use futures_util::TryStreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::BufReader;
use tokio_tar::Archive as TarArchive;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{debug, info, trace};

/// Archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.tar.xz`
    TarXz,
    /// `.tar.bz2`
    TarBz2,
    /// `.tar`
    Tar,
    /// `.zip`
    Zip,
}

impl ArchiveType {
    /// Detect from a file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Some(Self::TarXz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Strip N path components from extracted files.
    pub strip_prefix: usize,
}

impl ExtractOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strip prefix.
    #[must_use]
    pub const fn with_strip_prefix(mut self, n: usize) -> Self {
        self.strip_prefix = n;
        self
    }
}

/// Extraction result.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Number of files extracted.
    pub files_extracted: usize,
    /// Total size in bytes.
    pub total_size: u64,
    /// Detected root directory (if single root).
    pub root_dir: Option<PathBuf>,
}

/// Async archive extractor.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    /// Create a new extractor with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create extractor with options.
    #[must_use]
    pub const fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract `archive` into `dest`, detecting the format from `file_name`.
    ///
    /// Cached artifacts keep their original names, but callers may extract a
    /// temp file, so the format is not read from `archive` itself.
    ///
    /// # Errors
    /// Returns error if the format is unknown, an entry escapes `dest`, or
    /// decompression fails.
    pub async fn extract(
        &self,
        archive: &Path,
        file_name: &str,
        dest: &Path,
    ) -> Result<ExtractionResult> {
        let archive_type = ArchiveType::from_file_name(file_name)
            .ok_or_else(|| DownloadError::Archive(format!("unknown archive type: {file_name}")))?;

        debug!(archive = ?archive, dest = ?dest, archive_type = ?archive_type, "extracting");

        fs::create_dir_all(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let result = match archive_type {
            ArchiveType::Zip => self.extract_zip(archive, dest).await?,
            ArchiveType::TarGz => {
                let reader = BufReader::new(open(archive).await?);
                self.extract_tar_reader(GzipDecoder::new(reader), dest).await?
            }
            ArchiveType::TarXz => {
                let reader = BufReader::new(open(archive).await?);
                self.extract_tar_reader(XzDecoder::new(reader), dest).await?
            }
            ArchiveType::TarBz2 => {
                let reader = BufReader::new(open(archive).await?);
                self.extract_tar_reader(BzDecoder::new(reader), dest).await?
            }
            ArchiveType::Tar => {
                let reader = BufReader::new(open(archive).await?);
                self.extract_tar_reader(reader, dest).await?
            }
        };

        info!(
            files = result.files_extracted,
            size = result.total_size,
            "extraction complete"
        );

        Ok(result)
    }

    async fn extract_zip(&self, archive: &Path, dest: &Path) -> Result<ExtractionResult> {
        let reader = BufReader::new(open(archive).await?).compat();

        let mut zip = ZipFileReader::new(reader)
            .await
            .map_err(|e| DownloadError::Archive(e.to_string()))?;

        let mut files_extracted = 0;
        let mut total_size = 0u64;

        let entry_count = zip.file().entries().len();

        for i in 0..entry_count {
            let entry = zip
                .file()
                .entries()
                .get(i)
                .ok_or_else(|| DownloadError::Archive(format!("failed to get entry {i}")))?;

            let filename = entry
                .filename()
                .as_str()
                .map_err(|e| DownloadError::Archive(format!("invalid filename: {e}")))?
                .replace('\\', "/");

            let Some(path) = self.entry_path(Path::new(&filename))? else {
                continue;
            };
            let out_path = dest.join(&path);

            let is_dir = entry
                .dir()
                .map_err(|e| DownloadError::Archive(e.to_string()))?;

            #[cfg(unix)]
            let unix_mode = entry.unix_permissions();

            if is_dir {
                fs::create_dir_all(&out_path)
                    .await
                    .map_err(|e| DownloadError::io(&out_path, e))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }

            let mut entry_reader = zip
                .reader_without_entry(i)
                .await
                .map_err(|e| DownloadError::Archive(e.to_string()))?;

            let writer = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&out_path)
                .await
                .map_err(|e| DownloadError::io(&out_path, e))?;

            let size = futures_lite::io::copy(&mut entry_reader, &mut writer.compat_write())
                .await
                .map_err(|e| DownloadError::Archive(e.to_string()))?;

            total_size += size;
            files_extracted += 1;

            #[cfg(unix)]
            if let Some(mode) = unix_mode {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(
                    &out_path,
                    std::fs::Permissions::from_mode(u32::from(mode) & 0o777),
                );
            }

            trace!(file = ?out_path, size, "extracted file");
        }

        Ok(ExtractionResult {
            files_extracted,
            total_size,
            root_dir: find_root_dir(dest).await,
        })
    }

    async fn extract_tar_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        reader: R,
        dest: &Path,
    ) -> Result<ExtractionResult> {
        let mut archive = TarArchive::new(reader);
        let mut entries = archive
            .entries()
            .map_err(|e| DownloadError::Archive(e.to_string()))?;

        let mut files_extracted = 0;
        let mut total_size = 0u64;

        while let Some(mut entry) = entries
            .try_next()
            .await
            .map_err(|e| DownloadError::Archive(e.to_string()))?
        {
            let raw = entry
                .path()
                .map_err(|e| DownloadError::Archive(e.to_string()))?
                .into_owned();
            let Some(path) = self.entry_path(&raw)? else {
                continue;
            };
            let out_path = dest.join(&path);
            let entry_type = entry.header().entry_type();

            if entry_type.is_dir() {
                fs::create_dir_all(&out_path)
                    .await
                    .map_err(|e| DownloadError::io(&out_path, e))?;
            } else if entry_type.is_file() || entry_type.is_symlink() {
                if entry_type.is_symlink() {
                    let target = entry
                        .link_name()
                        .map_err(|e| DownloadError::Archive(e.to_string()))?;
                    if let Some(target) = target {
                        check_link_target(&path, &target)?;
                    }
                }
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DownloadError::io(parent, e))?;
                }

                let size = entry.header().size().unwrap_or(0);
                entry
                    .unpack(&out_path)
                    .await
                    .map_err(|e| DownloadError::Archive(e.to_string()))?;

                if entry_type.is_file() {
                    total_size += size;
                    files_extracted += 1;
                }

                trace!(file = ?out_path, size, "extracted entry");
            }
        }

        Ok(ExtractionResult {
            files_extracted,
            total_size,
            root_dir: find_root_dir(dest).await,
        })
    }

    /// Sanitized, prefix-stripped relative path for an entry. `None` when
    /// nothing is left after stripping.
    fn entry_path(&self, raw: &Path) -> Result<Option<PathBuf>> {
        let mut parts = Vec::new();
        for component in raw.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(DownloadError::Archive(format!(
                        "path escape attempt: {}",
                        raw.display()
                    )));
                }
            }
        }
        let stripped: PathBuf = parts.into_iter().skip(self.options.strip_prefix).collect();
        Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
    }
}

/// Reject symlinks that point outside the extraction root.
fn check_link_target(entry: &Path, target: &Path) -> Result<()> {
    if target.is_absolute() {
        return Err(DownloadError::Archive(format!(
            "absolute symlink target: {} -> {}",
            entry.display(),
            target.display()
        )));
    }
    let mut depth = entry.components().count().saturating_sub(1) as i64;
    for component in target.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return Err(DownloadError::Archive(format!(
                "symlink escapes archive root: {} -> {}",
                entry.display(),
                target.display()
            )));
        }
    }
    Ok(())
}

async fn open(archive: &Path) -> Result<File> {
    File::open(archive)
        .await
        .map_err(|e| DownloadError::io(archive, e))
}

/// Find single root directory in destination.
async fn find_root_dir(dest: &Path) -> Option<PathBuf> {
    let mut read_dir = fs::read_dir(dest).await.ok()?;
    let mut entries = Vec::new();

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        entries.push(entry);
        if entries.len() > 1 {
            return None;
        }
    }

    if entries.len() == 1 && entries[0].file_type().await.ok()?.is_dir() {
        Some(entries[0].path())
    } else {
        None
    }
}
