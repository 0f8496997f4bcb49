use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{TicId, ToiNumber};
use crate::error::AtlasError;

pub const CATALOG_CACHE_FNAME: &str = "cached_tic_database.csv";
pub const MANIFEST_FNAME: &str = "cache_manifest.json";

/// Version of the per-target directory layout. Bump when any artifact's
/// on-disk format changes.
pub const CACHE_LAYOUT_VERSION: u32 = 1;

const TOI_DIR_PREFIX: &str = "toi";

#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
    catalog_cache: Utf8PathBuf,
}

impl Store {
    /// Data under the current directory, catalog under `~/.cache/tess-atlas`.
    pub fn new() -> Result<Self, AtlasError> {
        let cwd = std::env::current_dir().map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        let data_root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| AtlasError::Filesystem("invalid data root path".to_string()))?;
        let catalog_cache = default_cache_dir()?.join(CATALOG_CACHE_FNAME);
        Ok(Self {
            data_root,
            catalog_cache,
        })
    }

    pub fn new_with_paths(data_root: Utf8PathBuf, catalog_cache: Utf8PathBuf) -> Self {
        Self {
            data_root,
            catalog_cache,
        }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn catalog_cache_path(&self) -> &Utf8Path {
        &self.catalog_cache
    }

    /// `<data_root>/toi_<toi>_files`
    pub fn toi_dir(&self, toi: ToiNumber) -> Utf8PathBuf {
        self.data_root
            .join(format!("{TOI_DIR_PREFIX}_{}_files", toi.get()))
    }

    pub fn manifest_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(MANIFEST_FNAME)
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), AtlasError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(format!("create {path}: {err}")))
    }

    /// Removes a target directory; `Ok(false)` if there was none.
    pub fn clear_dir(path: &Utf8Path) -> Result<bool, AtlasError> {
        if !Self::is_dir(path) {
            return Ok(false);
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(format!("remove {path}: {err}")))?;
        Ok(true)
    }

    pub fn is_file(path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn is_dir(path: &Utf8Path) -> bool {
        path.as_std_path().is_dir()
    }

    pub fn file_modified(path: &Utf8Path) -> Option<DateTime<Utc>> {
        fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AtlasError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".tess-atlas")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), AtlasError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_manifest(dir: &Utf8Path, manifest: &CacheManifest) -> Result<(), AtlasError> {
        Self::write_json(&Self::manifest_path(dir), manifest)
    }

    /// `Ok(None)` when the directory predates manifests.
    pub fn read_manifest(dir: &Utf8Path) -> Result<Option<CacheManifest>, AtlasError> {
        let path = Self::manifest_path(dir);
        if !Self::is_file(&path) {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| AtlasError::CacheCorrupt {
                path,
                message: err.to_string(),
            })
    }
}

/// Describes who wrote a target directory and with which layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub schema_version: u32,
    pub toi: ToiNumber,
    pub tic: TicId,
    pub planet_count: usize,
    pub has_inference: bool,
    pub saved_at: String,
    pub tool: String,
}

impl CacheManifest {
    pub fn new(toi: ToiNumber, tic: TicId, planet_count: usize, has_inference: bool) -> Self {
        Self {
            schema_version: CACHE_LAYOUT_VERSION,
            toi,
            tic,
            planet_count,
            has_inference,
            saved_at: Utc::now().to_rfc3339(),
            tool: format!("tess-atlas/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn is_current(&self) -> bool {
        self.schema_version == CACHE_LAYOUT_VERSION
    }
}

fn default_cache_dir() -> Result<Utf8PathBuf, AtlasError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("tess-atlas")).ok()
        })
        .ok_or_else(|| AtlasError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/data"),
            Utf8PathBuf::from("/cache/cached_tic_database.csv"),
        );
        let dir = store.toi_dir(ToiNumber::new(103));
        assert_eq!(dir, Utf8PathBuf::from("/data/toi_103_files"));
        assert!(Store::manifest_path(&dir).ends_with("toi_103_files/cache_manifest.json"));
    }

    #[test]
    fn atomic_write_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("file.txt");
        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), "second");
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        assert!(Store::read_manifest(&root).unwrap().is_none());

        let manifest = CacheManifest::new(ToiNumber::new(5), TicId::new(77), 2, false);
        Store::write_manifest(&root, &manifest).unwrap();
        let loaded = Store::read_manifest(&root).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.is_current());
    }
}
