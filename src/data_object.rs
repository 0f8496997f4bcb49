use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::TicId;
use crate::error::AtlasError;
use crate::store::Store;

/// An artifact cached under a target's directory.
///
/// Each implementor owns its own file(s), so presence of one artifact says
/// nothing about another.
pub trait DataObject: Sized {
    /// Remote collaborator the artifact is built from.
    type Source: ?Sized;

    fn build_from_remote(source: &Self::Source, tic: TicId) -> Result<Self, AtlasError>;

    /// Fails with [`AtlasError::CacheMissing`] or [`AtlasError::CacheCorrupt`].
    fn build_from_local(dir: &Utf8Path) -> Result<Self, AtlasError>;

    /// Overwrites any previous version.
    fn persist(&self, dir: &Utf8Path) -> Result<(), AtlasError>;

    fn expected_file_path(dir: &Utf8Path) -> Utf8PathBuf;

    fn is_cached(dir: &Utf8Path) -> bool {
        Store::is_file(&Self::expected_file_path(dir))
    }
}

/// Path of an artifact that must exist before it can be loaded.
pub(crate) fn existing_file(path: Utf8PathBuf) -> Result<Utf8PathBuf, AtlasError> {
    if Store::is_file(&path) {
        Ok(path)
    } else {
        Err(AtlasError::CacheMissing(path))
    }
}

pub(crate) fn corrupt(path: &Utf8Path, err: impl std::fmt::Display) -> AtlasError {
    AtlasError::CacheCorrupt {
        path: path.to_owned(),
        message: err.to_string(),
    }
}
