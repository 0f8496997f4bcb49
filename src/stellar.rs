use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::data_object::{DataObject, corrupt, existing_file};
use crate::domain::TicId;
use crate::error::AtlasError;
use crate::mast::{StellarParameters, StellarSource};
use crate::store::Store;

pub const STELLAR_FNAME: &str = "stellar_data.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StellarData {
    pub tic: TicId,
    #[serde(flatten)]
    pub parameters: StellarParameters,
}

impl StellarData {
    pub fn new(tic: TicId, parameters: StellarParameters) -> Self {
        Self { tic, parameters }
    }
}

impl DataObject for StellarData {
    type Source = dyn StellarSource;

    fn build_from_remote(source: &Self::Source, tic: TicId) -> Result<Self, AtlasError> {
        Ok(Self::new(tic, source.lookup(tic)?))
    }

    fn build_from_local(dir: &Utf8Path) -> Result<Self, AtlasError> {
        let path = existing_file(Self::expected_file_path(dir))?;
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| corrupt(&path, err))?;
        serde_json::from_str(&content).map_err(|err| corrupt(&path, err))
    }

    fn persist(&self, dir: &Utf8Path) -> Result<(), AtlasError> {
        Store::write_json(&Self::expected_file_path(dir), self)
    }

    fn expected_file_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(STELLAR_FNAME)
    }
}
