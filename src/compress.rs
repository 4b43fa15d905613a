//! Gzip pre-processing of a source tree.
//!
//! The tree is mirrored under a destination root. Files matching an exclusion
//! pattern are copied verbatim; every other file is gzip-encoded in place of
//! the original bytes, keeping its name so destination keys do not change.

use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::s3::error::{Result, UploadError};
use crate::source::FileNode;

/// Precompiled exclusion patterns, each matched against the whole path string
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    patterns: Vec<Regex>,
}

impl ExclusionSet {
    /// Compile the patterns once per run
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first pattern that is not a valid regex
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| UploadError::config(format!("invalid exclude pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True when any pattern matches the full path, not just a substring of it
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

/// Mirror `tree` under `dest_root`, gzip-encoding every non-excluded file
///
/// Returns the mirrored tree and the bytes saved, `original - written`, summed
/// bottom-up. Savings are negative when gzip output is larger than its input.
/// The first I/O failure aborts the pass; files already written stay under
/// `dest_root` for the caller to discard.
pub fn compress(tree: &FileNode, exclusions: &ExclusionSet, dest_root: &Path) -> Result<(FileNode, i64)> {
    match tree {
        FileNode::File { relative, absolute, .. } => {
            let target = dest_root.join(relative);
            let (read, written) = if exclusions.is_excluded(absolute) {
                debug!("Copying excluded file {}", absolute.display());
                let copied =
                    fs::copy(absolute, &target).map_err(|e| UploadError::compression_io(absolute, e))?;
                (copied, copied)
            } else {
                gzip_file(absolute, &target)?
            };
            let savings = read as i64 - written as i64;
            debug!(
                "{} -> {} ({} bytes saved)",
                relative.display(),
                target.display(),
                savings
            );

            Ok((
                FileNode::File {
                    relative: relative.clone(),
                    absolute: target,
                    size: written,
                },
                savings,
            ))
        }
        FileNode::Directory {
            relative, children, ..
        } => {
            let target = dest_root.join(relative);
            fs::create_dir_all(&target).map_err(|e| UploadError::compression_io(&target, e))?;

            let mut mirrored = Vec::with_capacity(children.len());
            let mut savings = 0i64;
            for child in children {
                let (node, saved) = compress(child, exclusions, dest_root)?;
                mirrored.push(node);
                savings += saved;
            }

            Ok((
                FileNode::Directory {
                    relative: relative.clone(),
                    absolute: target,
                    children: mirrored,
                },
                savings,
            ))
        }
    }
}

/// Gzip `source` into `target`
///
/// Returns `(bytes read, bytes written)` as seen by this pass, not the sizes
/// recorded when the tree was scanned.
pub fn gzip_file(source: &Path, target: &Path) -> Result<(u64, u64)> {
    let input = File::open(source).map_err(|e| UploadError::compression_io(source, e))?;
    let output = File::create(target).map_err(|e| UploadError::compression_io(target, e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let read = io::copy(&mut BufReader::new(input), &mut encoder)
        .map_err(|e| UploadError::compression_io(source, e))?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|e| UploadError::compression_io(target, e))?;

    let written = fs::metadata(target)
        .map_err(|e| UploadError::compression_io(target, e))?
        .len();
    Ok((read, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::resolve;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_exclusion_is_full_match() {
        let set = ExclusionSet::new(&[r"^.*\.log$", r".*/vendor/.*"]).unwrap();

        assert!(set.is_excluded(Path::new("/src/b.log")));
        assert!(set.is_excluded(Path::new("/src/vendor/lib.js")));
        assert!(!set.is_excluded(Path::new("/src/b.log.txt")));

        // A bare fragment only matches when it covers the whole path
        let fragment = ExclusionSet::new(&["log"]).unwrap();
        assert!(!fragment.is_excluded(Path::new("/src/b.log")));
        assert!(fragment.is_excluded(Path::new("log")));
    }

    #[test]
    fn test_alternation_is_anchored_as_a_whole() {
        let set = ExclusionSet::new(&[r"a|.*\.png"]).unwrap();
        assert!(set.is_excluded(Path::new("/img/x.png")));
        assert!(!set.is_excluded(Path::new("/a/x.txt")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = ExclusionSet::new(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn test_compress_single_file_round_trips() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = src.path().join("a.txt");
        fs::write(&file, b"aaaaaaaaaa").unwrap();

        let tree = resolve(&file).unwrap();
        let (mirrored, savings) = compress(&tree, &ExclusionSet::default(), dest.path()).unwrap();

        let FileNode::File { absolute, size, .. } = &mirrored else {
            panic!("expected file");
        };
        assert_eq!(absolute, &dest.path().join("a.txt"));
        assert_eq!(gunzip(absolute), b"aaaaaaaaaa");
        // Ten bytes are too few for gzip to win, the header alone is larger
        assert_eq!(savings, 10 - *size as i64);
        assert!(savings < 0);
    }

    #[test]
    fn test_compress_directory_with_exclusions() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let text = "hello world ".repeat(200);
        fs::write(src.path().join("a.txt"), &text).unwrap();
        fs::write(src.path().join("b.log"), b"raw log line\n").unwrap();
        fs::create_dir(src.path().join("nested")).unwrap();
        fs::write(src.path().join("nested/c.txt"), &text).unwrap();

        let tree = resolve(src.path()).unwrap();
        let exclusions = ExclusionSet::new(&[r"^.*\.log$"]).unwrap();
        let (mirrored, savings) = compress(&tree, &exclusions, dest.path()).unwrap();

        assert_eq!(gunzip(&dest.path().join("a.txt")), text.as_bytes());
        assert_eq!(gunzip(&dest.path().join("nested/c.txt")), text.as_bytes());
        assert_eq!(
            fs::read(dest.path().join("b.log")).unwrap(),
            b"raw log line\n"
        );

        // Directory savings are the sum over its files; the copied log saves nothing
        let a_written = fs::metadata(dest.path().join("a.txt")).unwrap().len() as i64;
        let c_written = fs::metadata(dest.path().join("nested/c.txt")).unwrap().len() as i64;
        let expected = (text.len() as i64 - a_written) + (text.len() as i64 - c_written);
        assert_eq!(savings, expected);
        assert!(savings > 0);

        assert_eq!(mirrored.file_count(), 3);
        assert_eq!(mirrored.absolute(), dest.path());
        assert_eq!(mirrored.relative(), PathBuf::new());
    }

    #[test]
    fn test_compress_is_deterministic() {
        let src = TempDir::new().unwrap();
        for name in ["z.txt", "m.txt", "a.txt"] {
            fs::write(src.path().join(name), name.repeat(300)).unwrap();
        }
        let tree = resolve(src.path()).unwrap();

        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let (_, s1) = compress(&tree, &ExclusionSet::default(), first.path()).unwrap();
        let (_, s2) = compress(&tree, &ExclusionSet::default(), second.path()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_empty_file_still_gzips() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = src.path().join("empty.txt");
        fs::write(&file, b"").unwrap();

        let (mirrored, _) = compress(&resolve(&file).unwrap(), &ExclusionSet::default(), dest.path()).unwrap();
        assert!(gunzip(mirrored.absolute()).is_empty());
    }

    #[test]
    fn test_unreadable_file_aborts_pass() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), b"aaaa").unwrap();
        let tree = resolve(src.path()).unwrap();

        // Remove the file after the tree was built so the read fails
        fs::remove_file(src.path().join("a.txt")).unwrap();

        let err = compress(&tree, &ExclusionSet::default(), dest.path()).unwrap_err();
        match err {
            UploadError::CompressionIo { path, .. } => {
                assert_eq!(path, src.path().join("a.txt"));
            }
            other => panic!("expected compression error, got {:?}", other),
        }
    }

    #[test]
    fn test_savings_use_bytes_read_not_scanned_size() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        fs::write(src.path().join("b.log"), b"b").unwrap();
        let tree = resolve(src.path()).unwrap();

        // Both files grow after the scan recorded one byte each
        let body = "x".repeat(4096);
        fs::write(src.path().join("a.txt"), &body).unwrap();
        fs::write(src.path().join("b.log"), &body).unwrap();

        let exclusions = ExclusionSet::new(&[r".*\.log"]).unwrap();
        let (mirrored, savings) = compress(&tree, &exclusions, dest.path()).unwrap();

        let FileNode::Directory { children, .. } = &mirrored else {
            panic!("expected directory");
        };
        let gzipped = fs::metadata(children[0].absolute()).unwrap().len() as i64;
        assert_eq!(fs::metadata(children[1].absolute()).unwrap().len(), 4096);
        // The copied file saves nothing, the gzipped one saves what was really read
        assert_eq!(savings, 4096 - gzipped);
        assert!(savings > 0);
    }
}
