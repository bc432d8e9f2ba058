//! Unpacking of uploaded build archives
//!
//! A template build arrives as a gzip-compressed tarball whose root holds a
//! `build/` directory. It is unpacked into a [`ScratchWorkspace`], a
//! temporary directory that is removed when the workspace is dropped, so
//! every exit path of an upload releases the disk space it used.

use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tempfile::TempDir;

use crate::error::ArchiveError;

/// Directory expected at the root of every build archive
pub const BUILD_ROOT: &str = "build";

/// Temporary directory holding one extracted archive
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
    files: usize,
}

impl ScratchWorkspace {
    /// Extract a `.tar.gz` stream into a fresh temporary directory
    pub fn unpack<R: Read>(reader: R) -> Result<Self, ArchiveError> {
        let dir = tempfile::Builder::new()
            .prefix("template_upload_")
            .tempdir()
            .map_err(ArchiveError::Workspace)?;

        let files = extract_tar_gz(reader, dir.path())?;
        Ok(Self { dir, files })
    }

    /// Root of the extracted tree
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of regular files written during extraction
    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Location of the `build/` directory, failing if the archive had none
    pub fn build_root(&self) -> Result<PathBuf, ArchiveError> {
        let root = self.dir.path().join(BUILD_ROOT);
        if root.is_dir() {
            Ok(root)
        } else {
            Err(ArchiveError::MissingBuildRoot {
                dir: BUILD_ROOT.to_string(),
            })
        }
    }
}

/// Extract a gzip-compressed tarball below `dest`, returning the number of
/// regular files written.
///
/// Only directories and regular files are materialised. Links, devices and
/// other special entries are ignored. Any entry whose path is absolute or
/// contains `..` aborts the extraction.
pub fn extract_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<usize, ArchiveError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut written = 0;

    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let mut entry = entry.map_err(ArchiveError::Malformed)?;
        let raw_path = entry.path().map_err(ArchiveError::Malformed)?.into_owned();

        let Some(relative) = sanitize(&raw_path)? else {
            continue;
        };
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(ArchiveError::Workspace)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(ArchiveError::Workspace)?;
                }
                entry.unpack(&target).map_err(ArchiveError::Malformed)?;
                written += 1;
            }
            _ => {}
        }
    }

    Ok(written)
}

/// Normalise an entry path to a relative path inside the workspace.
/// Returns `None` for entries that name the archive root itself (`./`).
fn sanitize(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath {
                    path: path.display().to_string(),
                });
            }
        }
    }

    Ok((!clean.as_os_str().is_empty()).then_some(clean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use tar::{Builder, Header};

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (path, content) in files {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn raw_entry_tarball(name: &[u8], content: &[u8]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        let mut header = Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_preserves_relative_paths() {
        let archive = tarball(&[
            ("build/index.html", b"<html></html>".as_slice()),
            ("./build/_app/start.js", b"console.log(1)".as_slice()),
        ]);

        let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();
        assert_eq!(workspace.file_count(), 2);

        let root = workspace.build_root().unwrap();
        assert_eq!(fs::read(root.join("index.html")).unwrap(), b"<html></html>");
        assert_eq!(fs::read(root.join("_app/start.js")).unwrap(), b"console.log(1)");
    }

    #[test]
    fn test_missing_build_root() {
        let archive = tarball(&[("dist/index.html", b"x".as_slice())]);
        let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();
        assert!(matches!(
            workspace.build_root(),
            Err(ArchiveError::MissingBuildRoot { .. })
        ));
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let archive = tarball(&[("build/a.txt", b"a".as_slice())]);
        let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let archive = raw_entry_tarball(b"../escape.txt", b"nope");
        let result = ScratchWorkspace::unpack(&archive[..]);
        assert!(matches!(result, Err(ArchiveError::UnsafePath { .. })));
    }

    #[test]
    fn test_rejects_absolute_path() {
        let archive = raw_entry_tarball(b"/tmp/escape.txt", b"nope");
        let result = ScratchWorkspace::unpack(&archive[..]);
        assert!(matches!(result, Err(ArchiveError::UnsafePath { .. })));
    }

    #[test]
    fn test_malformed_input() {
        let result = ScratchWorkspace::unpack(&b"definitely not gzip"[..]);
        assert!(matches!(result, Err(ArchiveError::Malformed(_))));
    }
}
