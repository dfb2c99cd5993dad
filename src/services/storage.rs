//! The tool's private corner of the music library.
//!
//! Everything this module creates, moves or deletes lives under
//! `{music_dir}/{managed_subdir}/{kind}`. Every mutation goes through
//! [`ManagedPath`], which refuses paths that escape the managed root, so user
//! files elsewhere in the library can never be touched.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::PlaylistKind;
use crate::track::{LibraryTrack, NormalizedKey, TrackCandidate};

/// Provenance manifest kept in each kind directory.
pub const MANIFEST_FILE: &str = ".discovery-sync.json";
const MANIFEST_TMP_FILE: &str = ".discovery-sync.json.tmp";

/// Keeps names well under the usual 255 byte limit once a suffix is added.
const MAX_STEM_BYTES: usize = 180;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Refusing to touch {path}: outside managed directory {root}")]
    OutsideBoundary { path: PathBuf, root: PathBuf },

    #[error("File system error during {operation} on {path}: {error_message}")]
    FileSystem {
        operation: String,
        path: String,
        error_message: String,
    },
}

impl StorageError {
    fn fs(operation: &str, path: &Path, error: impl std::fmt::Display) -> Self {
        StorageError::FileSystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            error_message: error.to_string(),
        }
    }
}

/// Resolve `.` and `..` without touching the file system.
///
/// `..` at the root stays at the root, the same way the kernel treats `/..`.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// A path proven to be strictly inside the managed root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedPath(PathBuf);

impl ManagedPath {
    pub fn new(root: &Path, candidate: &Path) -> Result<Self, StorageError> {
        let root = normalize_lexically(root);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let normalized = normalize_lexically(&joined);

        if normalized != root && normalized.starts_with(&root) {
            Ok(Self(normalized))
        } else {
            Err(StorageError::OutsideBoundary {
                path: normalized,
                root,
            })
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// A file this tool placed in managed storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedFile {
    pub kind: PlaylistKind,
    /// Relative to the kind directory.
    pub relative: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub title: String,
    pub artist: String,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
}

/// Strip characters that are invalid in file names on common file systems.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();

    // No hidden files, and Windows shares dislike trailing dots.
    let trimmed = cleaned
        .trim()
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .to_string();

    if trimmed.len() <= MAX_STEM_BYTES {
        return trimmed;
    }
    let mut end = MAX_STEM_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].trim_end().to_string()
}

pub fn file_stem_for(candidate: &TrackCandidate) -> String {
    let stem = sanitize_filename(&format!("{} - {}", candidate.artist, candidate.title));
    if stem.is_empty() {
        format!("track-{}", candidate.rank + 1)
    } else {
        stem
    }
}

pub struct ManagedStorage {
    music_root: PathBuf,
    root: PathBuf,
}

impl ManagedStorage {
    pub fn new(music_root: impl Into<PathBuf>, managed_subdir: &str) -> Self {
        let music_root = normalize_lexically(&music_root.into());
        let root = normalize_lexically(&music_root.join(managed_subdir));
        Self { music_root, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: PlaylistKind) -> Result<ManagedPath, StorageError> {
        ManagedPath::new(&self.root, Path::new(kind.slug()))
    }

    /// Kind directory relative to the music root, when it lives under it.
    pub fn kind_dir_in_library(&self, kind: PlaylistKind) -> Option<PathBuf> {
        let dir = self.kind_dir(kind).ok()?;
        dir.as_path()
            .strip_prefix(&self.music_root)
            .ok()
            .map(Path::to_path_buf)
    }

    pub fn path_of(&self, file: &ManagedFile) -> Result<ManagedPath, StorageError> {
        // Checked against the kind directory, so `../jams/x` from mix is refused too.
        let dir = self.kind_dir(file.kind)?;
        ManagedPath::new(dir.as_path(), &file.relative)
    }

    /// Move a downloaded file into the kind directory and record its provenance.
    pub fn stage(
        &self,
        kind: PlaylistKind,
        downloaded: &Path,
        candidate: &TrackCandidate,
        run_id: &str,
    ) -> Result<ManagedFile, StorageError> {
        let dir = self.kind_dir(kind)?;
        std::fs::create_dir_all(dir.as_path())
            .map_err(|e| StorageError::fs("create directory", dir.as_path(), e))?;

        let extension = downloaded
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let stem = file_stem_for(candidate);

        let mut file_name = format!("{stem}.{extension}");
        let mut suffix = 2;
        while dir.as_path().join(&file_name).exists() {
            file_name = format!("{stem} ({suffix}).{extension}");
            suffix += 1;
        }

        let destination = ManagedPath::new(dir.as_path(), Path::new(&file_name))?;
        move_file(downloaded, destination.as_path())?;

        let mut manifest = self.read_manifest(kind)?;
        manifest.files.insert(
            file_name.clone(),
            ManifestEntry {
                run_id: run_id.to_string(),
                title: candidate.title.clone(),
                artist: candidate.artist.clone(),
                staged_at: Utc::now(),
            },
        );
        self.write_manifest(kind, &manifest)?;

        log::debug!("Staged {} as {}", candidate, destination.as_path().display());

        Ok(ManagedFile {
            kind,
            relative: PathBuf::from(file_name),
        })
    }

    /// Every file in the kind directory, whether or not the manifest knows it.
    pub fn list_all(&self, kind: PlaylistKind) -> Result<Vec<ManagedFile>, StorageError> {
        let dir = self.kind_dir(kind)?;
        if !dir.as_path().exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir.as_path()).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::fs("list directory", dir.as_path(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir.as_path()) else {
                continue;
            };
            if relative == Path::new(MANIFEST_FILE) || relative == Path::new(MANIFEST_TMP_FILE) {
                continue;
            }
            files.push(ManagedFile {
                kind,
                relative: relative.to_path_buf(),
            });
        }

        files.sort();
        Ok(files)
    }

    /// Delete every file of `kind` not in `keep`. Returns what was removed.
    pub fn retain(
        &self,
        kind: PlaylistKind,
        keep: &HashSet<ManagedFile>,
    ) -> Result<Vec<ManagedFile>, StorageError> {
        let stale: Vec<ManagedFile> = self
            .list_all(kind)?
            .into_iter()
            .filter(|f| !keep.contains(f))
            .collect();

        self.remove_files(kind, &stale)?;
        Ok(stale)
    }

    /// Remove files staged by a run that didn't commit.
    pub fn discard(&self, files: &[ManagedFile]) -> Result<(), StorageError> {
        for kind in PlaylistKind::ALL {
            let of_kind: Vec<ManagedFile> =
                files.iter().filter(|f| f.kind == kind).cloned().collect();
            if !of_kind.is_empty() {
                self.remove_files(kind, &of_kind)?;
            }
        }
        Ok(())
    }

    fn remove_files(&self, kind: PlaylistKind, files: &[ManagedFile]) -> Result<(), StorageError> {
        if files.is_empty() {
            return Ok(());
        }

        for file in files {
            let path = self.path_of(file)?;
            match std::fs::remove_file(path.as_path()) {
                Ok(()) => log::debug!("Removed managed file {}", path.as_path().display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::fs("remove file", path.as_path(), e)),
            }
        }

        let mut manifest = self.read_manifest(kind)?;
        let before = manifest.files.len();
        for file in files {
            manifest.files.remove(&file.relative.to_string_lossy().into_owned());
        }
        if manifest.files.len() != before {
            self.write_manifest(kind, &manifest)?;
        }
        Ok(())
    }

    /// Map a path reported by the server (absolute, or relative to the music
    /// root) to a managed file of `kind`.
    pub fn resolve_server_path(&self, kind: PlaylistKind, server_path: &str) -> Option<ManagedFile> {
        let path = Path::new(server_path);
        let absolute = if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&self.music_root.join(path))
        };

        let dir = self.kind_dir(kind).ok()?;
        let relative = absolute.strip_prefix(dir.as_path()).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }

        Some(ManagedFile {
            kind,
            relative: relative.to_path_buf(),
        })
    }

    /// Find the managed file backing a library track, if any.
    ///
    /// Servers that report tag-derived paths instead of real ones are covered
    /// by looking the track up in the manifest.
    pub fn resolve_library_track(
        &self,
        kind: PlaylistKind,
        track: &LibraryTrack,
    ) -> Option<ManagedFile> {
        if let Some(file) = track
            .path
            .as_deref()
            .and_then(|p| self.resolve_server_path(kind, p))
        {
            return Some(file);
        }

        let key = track.key();
        let manifest = self.read_manifest(kind).ok()?;
        manifest
            .files
            .iter()
            .find(|(_, entry)| NormalizedKey::new(&entry.title, &entry.artist) == key)
            .map(|(name, _)| ManagedFile {
                kind,
                relative: PathBuf::from(name),
            })
    }

    pub fn read_manifest(&self, kind: PlaylistKind) -> Result<Manifest, StorageError> {
        let path = ManagedPath::new(self.kind_dir(kind)?.as_path(), Path::new(MANIFEST_FILE))?;
        let contents = match std::fs::read_to_string(path.as_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::default()),
            Err(e) => return Err(StorageError::fs("read manifest", path.as_path(), e)),
        };

        match serde_json::from_str(&contents) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable manifest {}: {}",
                    path.as_path().display(),
                    e
                );
                Ok(Manifest::default())
            }
        }
    }

    fn write_manifest(&self, kind: PlaylistKind, manifest: &Manifest) -> Result<(), StorageError> {
        let dir = self.kind_dir(kind)?;
        let path = ManagedPath::new(dir.as_path(), Path::new(MANIFEST_FILE))?;
        let tmp = ManagedPath::new(dir.as_path(), Path::new(MANIFEST_TMP_FILE))?;

        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| StorageError::fs("serialize manifest", path.as_path(), e))?;
        std::fs::write(tmp.as_path(), json)
            .map_err(|e| StorageError::fs("write manifest", tmp.as_path(), e))?;
        std::fs::rename(tmp.as_path(), path.as_path())
            .map_err(|e| StorageError::fs("replace manifest", path.as_path(), e))?;
        Ok(())
    }
}

/// Rename, falling back to copy + delete across file systems.
fn move_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    log::debug!("Rename failed, copying file across filesystems");
    std::fs::copy(from, to).map_err(|e| {
        StorageError::fs(
            "copy file",
            Path::new(&format!("{} -> {}", from.display(), to.display())),
            e,
        )
    })?;
    std::fs::remove_file(from).map_err(|e| StorageError::fs("remove file", from, e))?;
    Ok(())
}
