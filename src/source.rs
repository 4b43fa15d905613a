use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::s3::error::{Result, UploadError};

/// Where the upload reads from: `--file` or `--dir`, never both
#[derive(Debug, Clone, Default)]
pub struct SourceSpec {
    pub file: Option<PathBuf>,
    pub dir: Option<PathBuf>,
}

/// A local file tree mirrored from the filesystem
///
/// Relative paths are relative to the parent of a single-file root, or to the
/// directory root itself; they determine the destination keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNode {
    File {
        relative: PathBuf,
        absolute: PathBuf,
        size: u64,
    },
    Directory {
        relative: PathBuf,
        absolute: PathBuf,
        children: Vec<FileNode>,
    },
}

impl FileNode {
    pub fn absolute(&self) -> &Path {
        match self {
            Self::File { absolute, .. } | Self::Directory { absolute, .. } => absolute,
        }
    }

    pub fn relative(&self) -> &Path {
        match self {
            Self::File { relative, .. } | Self::Directory { relative, .. } => relative,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// Number of regular files in the subtree
    pub fn file_count(&self) -> usize {
        match self {
            Self::File { .. } => 1,
            Self::Directory { children, .. } => children.iter().map(Self::file_count).sum(),
        }
    }

    /// Total size of all regular files in the subtree
    pub fn total_size(&self) -> u64 {
        match self {
            Self::File { size, .. } => *size,
            Self::Directory { children, .. } => children.iter().map(Self::total_size).sum(),
        }
    }
}

/// Pick the configured source path and resolve it, checking it is the kind asked for
pub fn resolve_source(spec: &SourceSpec) -> Result<FileNode> {
    match (&spec.file, &spec.dir) {
        (Some(_), Some(_)) => Err(UploadError::config(
            "--file and --dir are mutually exclusive, set only one source",
        )),
        (None, None) => Err(UploadError::config(
            "no source configured, set --file or --dir",
        )),
        (Some(file), None) => {
            let node = resolve(file)?;
            if !node.is_file() {
                return Err(UploadError::InvalidSourceType {
                    path: file.clone(),
                    expected: "regular file",
                });
            }
            Ok(node)
        }
        (None, Some(dir)) => {
            let node = resolve(dir)?;
            if node.is_file() {
                return Err(UploadError::InvalidSourceType {
                    path: dir.clone(),
                    expected: "directory",
                });
            }
            Ok(node)
        }
    }
}

/// Classify `path` and build the tree rooted at it
pub fn resolve(path: &Path) -> Result<FileNode> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(UploadError::config(format!("cannot stat {}: {}", path.display(), e))),
    };

    let absolute = std::path::absolute(path)
        .map_err(|e| UploadError::config(format!("cannot resolve {}: {}", path.display(), e)))?;

    if metadata.is_file() {
        let relative = absolute
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| UploadError::InvalidSourceType {
                path: path.to_path_buf(),
                expected: "regular file or directory",
            })?;
        debug!("Resolved single file source {}", absolute.display());
        Ok(FileNode::File {
            relative,
            absolute,
            size: metadata.len(),
        })
    } else if metadata.is_dir() {
        let node = scan_dir(&absolute, PathBuf::new())?;
        debug!(
            "Resolved directory source {} ({} files)",
            absolute.display(),
            node.file_count()
        );
        Ok(node)
    } else {
        Err(UploadError::InvalidSourceType {
            path: path.to_path_buf(),
            expected: "regular file or directory",
        })
    }
}

/// Children are sorted by file name so traversal order is reproducible
fn scan_dir(absolute: &Path, relative: PathBuf) -> Result<FileNode> {
    let mut children = Vec::new();

    for entry in WalkDir::new(absolute)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(absolute).to_path_buf();
            UploadError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let child_relative = relative.join(entry.file_name());
        let file_type = entry.file_type();

        if file_type.is_dir() {
            children.push(scan_dir(entry.path(), child_relative)?);
        } else if file_type.is_file() {
            let size = entry
                .metadata()
                .map_err(|e| {
                    UploadError::config(format!("cannot stat {}: {}", entry.path().display(), e))
                })?
                .len();
            children.push(FileNode::File {
                relative: child_relative,
                absolute: entry.path().to_path_buf(),
                size,
            });
        } else {
            warn!("Skipping special file {}", entry.path().display());
        }
    }

    Ok(FileNode::Directory {
        relative,
        absolute: absolute.to_path_buf(),
        children,
    })
}
