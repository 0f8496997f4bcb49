use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::candidate::CandidateSummary;
use crate::config::ResolvedConfig;
use crate::database::{TicDatabase, lightcurve_available_ids, rows_for_targets};
use crate::domain::{TicId, ToiCategory, ToiNumber};
use crate::error::AtlasError;
use crate::exofop::{ExofopClient, tic_url};
use crate::inference::ParameterSummary;
use crate::mast::{LightcurveSource, StellarParameters, StellarSource};
use crate::slurm::{JobPlan, JobRequest, JobSubmitter, TargetList, setup_jobs};
use crate::store::{CacheManifest, Store};
use crate::tic_entry::{EntrySources, TicEntry};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Refresh the catalog, then rebuild the target directory.
    pub clean: bool,
    /// Rebuild the target directory from the cached catalog.
    pub rebuild: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResult {
    pub rows: usize,
    pub targets: usize,
    pub with_lightcurve: usize,
    pub cache_path: String,
    pub refreshed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToisResult {
    pub category: ToiCategory,
    pub require_lightcurve: bool,
    pub toi_numbers: Vec<ToiNumber>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub toi: ToiNumber,
    pub tic: TicId,
    pub exofop_url: String,
    pub outdir: String,
    pub loaded_from_cache: bool,
    pub planet_count: usize,
    pub lightcurve_points: usize,
    pub candidates: Vec<CandidateSummary>,
    pub stellar: StellarParameters,
    pub inference: Option<Vec<ParameterSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub toi: ToiNumber,
    pub tic: TicId,
    pub exofop_url: String,
    pub outdir: String,
    pub catalog_rows: usize,
    pub cached: bool,
    pub manifest: Option<CacheManifest>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App {
    config: ResolvedConfig,
    store: Store,
    database: Arc<TicDatabase>,
    lightcurves: Arc<dyn LightcurveSource>,
    stellar: Arc<dyn StellarSource>,
}

impl App {
    pub fn new(
        config: ResolvedConfig,
        store: Store,
        exofop: Arc<dyn ExofopClient>,
        lightcurves: Arc<dyn LightcurveSource>,
        stellar: Arc<dyn StellarSource>,
    ) -> Self {
        let database = Arc::new(TicDatabase::new(
            store.catalog_cache_path().to_owned(),
            exofop,
            Arc::clone(&lightcurves),
        ));
        Self {
            config,
            store,
            database,
            lightcurves,
            stellar,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn database(&self) -> &Arc<TicDatabase> {
        &self.database
    }

    pub fn sources(&self) -> EntrySources {
        EntrySources {
            store: self.store.clone(),
            database: Arc::clone(&self.database),
            lightcurves: Arc::clone(&self.lightcurves),
            stellar: Arc::clone(&self.stellar),
        }
    }

    pub fn catalog(&self, clean: bool, sink: &dyn ProgressSink) -> Result<CatalogResult, AtlasError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; loading TOI catalog".to_string(),
            elapsed: None,
        });
        let table = self.database.fetch_or_load_catalog(clean, sink)?;
        Ok(CatalogResult {
            rows: table.len(),
            targets: lightcurve_available_ids(&table, false).len(),
            with_lightcurve: lightcurve_available_ids(&table, true).len(),
            cache_path: self.database.cache_file().to_string(),
            refreshed: clean,
        })
    }

    pub fn tois(
        &self,
        category: ToiCategory,
        require_lightcurve: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ToisResult, AtlasError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; listing {category} TOIs"),
            elapsed: None,
        });
        let toi_numbers = match category {
            ToiCategory::All => self
                .database
                .lightcurve_available_ids(require_lightcurve)?
                .into_iter()
                .collect(),
            _ => self.database.categories(require_lightcurve)?.get(category),
        };
        Ok(ToisResult {
            category,
            require_lightcurve,
            toi_numbers,
        })
    }

    /// Resolves one target, from its cache directory when valid.
    pub fn fetch(
        &self,
        toi: ToiNumber,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, AtlasError> {
        let start = Instant::now();
        let mut rows = None;
        if options.clean {
            let table = self.database.fetch_or_load_catalog(true, sink)?;
            rows = Some(rows_for_targets(&table, &[toi])?);
        }
        if (options.clean || options.rebuild) && Store::clear_dir(&self.store.toi_dir(toi))? {
            sink.event(ProgressEvent {
                message: format!("phase=Clean; removed cached files of TOI {toi}"),
                elapsed: None,
            });
        }

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; resolving TOI {toi}"),
            elapsed: None,
        });
        let entry = TicEntry::resolve(toi, rows, &self.sources())?;
        let action = if entry.loaded_from_cache() {
            "loaded from cache"
        } else {
            "built from remote"
        };
        sink.event(ProgressEvent {
            message: format!("phase=Done; TOI {toi} {action}"),
            elapsed: Some(start.elapsed()),
        });
        Ok(fetch_result(&entry))
    }

    pub fn info(&self, toi: ToiNumber, sink: &dyn ProgressSink) -> Result<InfoResult, AtlasError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up TOI {toi}"),
            elapsed: None,
        });
        let rows = self.database.rows_for_targets(&[toi])?;
        let tic = rows
            .first()
            .ok_or_else(|| AtlasError::NoData(format!("no catalog rows for TOI {toi}")))?
            .tic_id()?;
        let outdir = self.store.toi_dir(toi);
        let cached = TicEntry::cached_files_present(&outdir)?;
        let manifest = Store::read_manifest(&outdir).ok().flatten();
        Ok(InfoResult {
            toi,
            tic,
            exofop_url: tic_url(tic),
            outdir: outdir.to_string(),
            catalog_rows: rows.len(),
            cached,
            manifest,
        })
    }

    pub fn jobs(
        &self,
        request: JobRequest,
        submitter: &dyn JobSubmitter,
        sink: &dyn ProgressSink,
    ) -> Result<JobPlan, AtlasError> {
        if request.clean {
            // one refresh here; the array tasks only rebuild their own directory
            self.database.fetch_or_load_catalog(true, sink)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Store; writing job scripts to {}", request.outdir),
            elapsed: None,
        });
        setup_jobs(&request, submitter)
    }

    /// Job request defaults from the `slurm` config section.
    pub fn job_request(
        &self,
        targets: TargetList,
        outdir: Utf8PathBuf,
        submit: bool,
        clean: bool,
    ) -> JobRequest {
        JobRequest {
            targets,
            outdir,
            settings: self.config.slurm.clone(),
            submit,
            clean,
        }
    }
}

fn fetch_result(entry: &TicEntry) -> FetchResult {
    FetchResult {
        toi: entry.toi_number(),
        tic: entry.tic_number(),
        exofop_url: entry.exofop_url(),
        outdir: entry.outdir().to_string(),
        loaded_from_cache: entry.loaded_from_cache(),
        planet_count: entry.planet_count(),
        lightcurve_points: entry.lightcurve().len(),
        candidates: entry.summary_table(),
        stellar: entry.stellar_data().parameters.clone(),
        inference: entry.inference_data().map(|data| data.summary()),
    }
}
