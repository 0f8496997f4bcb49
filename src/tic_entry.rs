use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::candidate::{CandidateSummary, PlanetCandidate};
use crate::catalog::CatalogTable;
use crate::data_object::{DataObject, corrupt, existing_file};
use crate::database::TicDatabase;
use crate::domain::{TicId, ToiNumber};
use crate::error::AtlasError;
use crate::exofop::tic_url;
use crate::inference::{InferenceData, Trace};
use crate::lightcurve::LightCurveData;
use crate::mast::{LightcurveSource, StellarSource};
use crate::stellar::StellarData;
use crate::store::{CacheManifest, Store};

pub const TIC_DATA_FNAME: &str = "tic_data.csv";

/// Everything an entry is built from.
#[derive(Clone)]
pub struct EntrySources {
    pub store: Store,
    pub database: Arc<TicDatabase>,
    pub lightcurves: Arc<dyn LightcurveSource>,
    pub stellar: Arc<dyn StellarSource>,
}

/// All cached data of one target and its planet candidates.
#[derive(Debug)]
pub struct TicEntry {
    tic_number: TicId,
    toi_number: ToiNumber,
    tic_data: CatalogTable,
    candidates: Vec<PlanetCandidate>,
    lightcurve: Arc<LightCurveData>,
    stellar_data: Arc<StellarData>,
    inference_data: Option<InferenceData>,
    outdir: Utf8PathBuf,
    loaded_from_cache: bool,
}

impl TicEntry {
    /// Loads the target from its directory when every mandatory file is
    /// there, otherwise builds it from the remote sources. Either way the
    /// directory is written back, which restores a missing manifest.
    ///
    /// `catalog_rows`, when non-empty, replaces the catalog lookup.
    pub fn resolve(
        toi: ToiNumber,
        catalog_rows: Option<CatalogTable>,
        sources: &EntrySources,
    ) -> Result<Self, AtlasError> {
        let outdir = sources.store.toi_dir(toi);
        if Self::cached_files_present(&outdir)? {
            info!(toi = toi.get(), path = %outdir, "loading target from cache");
            let entry = Self::build_from_local_cache(toi, &outdir)?;
            entry.create_directory_and_persist_partial()?;
            return Ok(entry);
        }

        info!(toi = toi.get(), "building target from remote sources");
        let catalog_rows = catalog_rows.filter(|rows| !rows.is_empty());
        let entry = Self::build_from_remote(toi, catalog_rows, sources)?;
        entry.create_directory_and_persist_partial()?;
        Ok(entry)
    }

    pub fn cached_files_present(dir: &Utf8Path) -> Result<bool, AtlasError> {
        if !Store::is_dir(dir) {
            return Ok(false);
        }
        let mandatory = Store::is_file(&dir.join(TIC_DATA_FNAME))
            && LightCurveData::is_cached(dir)
            && StellarData::is_cached(dir);
        if !mandatory {
            return Ok(false);
        }
        match Store::read_manifest(dir)? {
            Some(manifest) if !manifest.is_current() => {
                warn!(
                    path = %dir,
                    found = manifest.schema_version,
                    "cache layout version mismatch, rebuilding"
                );
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    pub fn build_from_remote(
        toi: ToiNumber,
        catalog_rows: Option<CatalogTable>,
        sources: &EntrySources,
    ) -> Result<Self, AtlasError> {
        let tic_data = match catalog_rows {
            Some(rows) => rows,
            None => sources.database.rows_for_targets(&[toi])?,
        };
        let tic = tic_data
            .first()
            .ok_or_else(|| AtlasError::NoData(format!("no catalog rows for TOI {toi}")))?
            .tic_id()?;
        let lightcurve = LightCurveData::build_from_remote(sources.lightcurves.as_ref(), tic)?;
        let stellar_data = StellarData::build_from_remote(sources.stellar.as_ref(), tic)?;
        Self::assemble(
            toi,
            tic,
            tic_data,
            lightcurve,
            stellar_data,
            None,
            sources.store.toi_dir(toi),
            false,
        )
    }

    pub fn build_from_local_cache(toi: ToiNumber, dir: &Utf8Path) -> Result<Self, AtlasError> {
        let path = existing_file(dir.join(TIC_DATA_FNAME))?;
        let tic_data = CatalogTable::read_csv(&path).map_err(|err| corrupt(&path, err))?;
        let tic = tic_data
            .first()
            .ok_or_else(|| AtlasError::NoData(format!("{path} has no rows")))?
            .tic_id()
            .map_err(|err| corrupt(&path, err))?;
        let lightcurve = LightCurveData::build_from_local(dir)?;
        let stellar_data = StellarData::build_from_local(dir)?;
        let inference_data = if InferenceData::is_cached(dir) {
            Some(InferenceData::build_from_local(dir)?)
        } else {
            None
        };
        Self::assemble(
            toi,
            tic,
            tic_data,
            lightcurve,
            stellar_data,
            inference_data,
            dir.to_owned(),
            true,
        )
        .map_err(|err| corrupt(&path, err))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        toi: ToiNumber,
        tic: TicId,
        tic_data: CatalogTable,
        lightcurve: LightCurveData,
        stellar_data: StellarData,
        inference_data: Option<InferenceData>,
        outdir: Utf8PathBuf,
        loaded_from_cache: bool,
    ) -> Result<Self, AtlasError> {
        let lightcurve = Arc::new(lightcurve);
        let candidates = tic_data
            .rows()
            .map(|row| PlanetCandidate::from_catalog_row(&row, Arc::clone(&lightcurve)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            tic_number: tic,
            toi_number: toi,
            tic_data,
            candidates,
            lightcurve,
            stellar_data: Arc::new(stellar_data),
            inference_data,
            outdir,
            loaded_from_cache,
        })
    }

    /// Creates the target directory and writes every artifact held so far.
    pub fn create_directory_and_persist_partial(&self) -> Result<(), AtlasError> {
        Store::ensure_dir(&self.outdir)?;
        self.tic_data.write_csv(&self.outdir.join(TIC_DATA_FNAME))?;
        self.lightcurve.persist(&self.outdir)?;
        self.stellar_data.persist(&self.outdir)?;
        if let Some(inference) = &self.inference_data {
            inference.persist(&self.outdir)?;
        }
        self.write_manifest()
    }

    /// Stores and persists the posterior of a finished inference run.
    pub fn attach_inference_result(&mut self, trace: Trace) -> Result<(), AtlasError> {
        if self.inference_data.is_some() {
            return Err(AtlasError::InferenceAlreadyAttached(self.toi_number.get()));
        }
        let inference = InferenceData::new(trace);
        Store::ensure_dir(&self.outdir)?;
        inference.persist(&self.outdir)?;
        self.inference_data = Some(inference);
        self.write_manifest()
    }

    fn write_manifest(&self) -> Result<(), AtlasError> {
        let manifest = CacheManifest::new(
            self.toi_number,
            self.tic_number,
            self.planet_count(),
            self.inference_data.is_some(),
        );
        Store::write_manifest(&self.outdir, &manifest)
    }

    pub fn summary_table(&self) -> Vec<CandidateSummary> {
        self.candidates.iter().map(PlanetCandidate::summary).collect()
    }

    pub fn exofop_url(&self) -> String {
        tic_url(self.tic_number)
    }

    pub fn planet_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn outdir(&self) -> &Utf8Path {
        &self.outdir
    }

    pub fn tic_number(&self) -> TicId {
        self.tic_number
    }

    pub fn toi_number(&self) -> ToiNumber {
        self.toi_number
    }

    pub fn tic_data(&self) -> &CatalogTable {
        &self.tic_data
    }

    pub fn candidates(&self) -> &[PlanetCandidate] {
        &self.candidates
    }

    pub fn lightcurve(&self) -> &Arc<LightCurveData> {
        &self.lightcurve
    }

    pub fn stellar_data(&self) -> &Arc<StellarData> {
        &self.stellar_data
    }

    pub fn inference_data(&self) -> Option<&InferenceData> {
        self.inference_data.as_ref()
    }

    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }
}
