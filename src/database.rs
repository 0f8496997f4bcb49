use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{
    COL_LIGHTCURVE_AVAILABLE, COL_MULTIPLANET, COL_PERIOD, COL_PLANET_COUNT, COL_SINGLE_TRANSIT,
    COL_TIC_ID, COL_TOI, COL_TOI_INT, CatalogTable, format_flag,
};
use crate::domain::{TicId, ToiCategory, ToiId, ToiNumber};
use crate::error::AtlasError;
use crate::exofop::ExofopClient;
use crate::mast::LightcurveSource;
use crate::store::Store;

/// A target counts as observed once the search lists more than one product.
pub const MIN_LIGHTCURVE_PRODUCTS: usize = 2;

/// TOI numbers grouped for batch processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToiCategories {
    pub multi: Vec<ToiNumber>,
    pub single: Vec<ToiNumber>,
    pub norm: Vec<ToiNumber>,
}

impl ToiCategories {
    pub fn get(&self, category: ToiCategory) -> Vec<ToiNumber> {
        match category {
            ToiCategory::Multi => self.multi.clone(),
            ToiCategory::Single => self.single.clone(),
            ToiCategory::Norm => self.norm.clone(),
            ToiCategory::All => {
                let all = self
                    .multi
                    .iter()
                    .chain(&self.single)
                    .chain(&self.norm)
                    .copied()
                    .collect::<BTreeSet<_>>();
                all.into_iter().collect()
            }
        }
    }
}

/// Process-wide accessor for the TOI catalog.
///
/// The first successful load is memoized until [`TicDatabase::invalidate`]
/// or a forced refresh replaces it.
pub struct TicDatabase {
    cache_file: Utf8PathBuf,
    exofop: Arc<dyn ExofopClient>,
    lightcurves: Arc<dyn LightcurveSource>,
    memo: Mutex<Option<Arc<CatalogTable>>>,
}

impl TicDatabase {
    pub fn new(
        cache_file: Utf8PathBuf,
        exofop: Arc<dyn ExofopClient>,
        lightcurves: Arc<dyn LightcurveSource>,
    ) -> Self {
        Self {
            cache_file,
            exofop,
            lightcurves,
            memo: Mutex::new(None),
        }
    }

    pub fn cache_file(&self) -> &Utf8Path {
        &self.cache_file
    }

    pub fn invalidate(&self) {
        *self.memo.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn fetch_or_load_catalog(
        &self,
        force_refresh: bool,
        sink: &dyn ProgressSink,
    ) -> Result<Arc<CatalogTable>, AtlasError> {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        if !force_refresh {
            if let Some(table) = memo.as_ref() {
                return Ok(Arc::clone(table));
            }
            if Store::is_file(&self.cache_file) {
                let modified = Store::file_modified(&self.cache_file)
                    .map(|time| time.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                debug!(path = %self.cache_file, %modified, "loading cached TOI catalog");
                let table = Arc::new(CatalogTable::read_csv(&self.cache_file)?);
                *memo = Some(Arc::clone(&table));
                return Ok(table);
            }
        }

        info!("downloading TOI catalog from ExoFOP");
        sink.event(ProgressEvent {
            message: "phase=Fetch; downloading TOI catalog".to_string(),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let content = self.exofop.download_catalog()?;
        let mut table = CatalogTable::from_csv_str(&content)?;
        sink.event(ProgressEvent {
            message: format!("exofop.response rows={}", table.len()),
            elapsed: Some(start.elapsed()),
        });

        derive_flags(&mut table, self.lightcurves.as_ref(), sink)?;
        sink.event(ProgressEvent {
            message: "phase=Store; writing catalog cache".to_string(),
            elapsed: None,
        });
        table.write_csv(&self.cache_file)?;

        let table = Arc::new(table);
        *memo = Some(Arc::clone(&table));
        Ok(table)
    }

    pub fn catalog(&self) -> Result<Arc<CatalogTable>, AtlasError> {
        self.fetch_or_load_catalog(false, &NoProgress)
    }

    pub fn tic_id_for_toi(&self, toi: ToiNumber) -> Result<TicId, AtlasError> {
        let table = self.catalog()?;
        tic_id_for_toi(&table, toi)
    }

    /// Every catalog row of the targets hosting `tois`, each target's rows
    /// ordered by candidate id.
    pub fn rows_for_targets(&self, tois: &[ToiNumber]) -> Result<CatalogTable, AtlasError> {
        let table = self.catalog()?;
        rows_for_targets(&table, tois)
    }

    pub fn lightcurve_available_ids(
        &self,
        require_lightcurve: bool,
    ) -> Result<BTreeSet<ToiNumber>, AtlasError> {
        let table = self.catalog()?;
        Ok(lightcurve_available_ids(&table, require_lightcurve))
    }

    /// Categories of the targets with a usable light curve.
    pub fn toi_numbers_by_category(&self) -> Result<ToiCategories, AtlasError> {
        self.categories(true)
    }

    pub fn categories(&self, require_lightcurve: bool) -> Result<ToiCategories, AtlasError> {
        let table = self.catalog()?;
        Ok(toi_numbers_by_category(&table, require_lightcurve))
    }
}

struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Adds the integer/candidate split of the TOI and the per-row flags.
pub fn derive_flags(
    table: &mut CatalogTable,
    lightcurves: &dyn LightcurveSource,
    sink: &dyn ProgressSink,
) -> Result<(), AtlasError> {
    table.require_column(COL_TOI)?;
    table.require_column(COL_TIC_ID)?;
    table.require_column(COL_PERIOD)?;

    let ids = table
        .rows()
        .map(|row| row.toi_id())
        .collect::<Result<Vec<ToiId>, _>>()?;
    let tics = table
        .rows()
        .map(|row| row.tic_id())
        .collect::<Result<Vec<TicId>, _>>()?;
    let single = table
        .rows()
        .map(|row| row.f64(COL_PERIOD).is_none_or(|period| period <= 0.0))
        .collect::<Vec<_>>();

    let mut per_number = HashMap::<ToiNumber, usize>::new();
    for id in &ids {
        *per_number.entry(id.number()).or_default() += 1;
    }

    let distinct_tics = tics.iter().copied().collect::<BTreeSet<_>>();
    let mut available = HashMap::<TicId, bool>::new();
    let start = std::time::Instant::now();
    for (index, tic) in distinct_tics.iter().enumerate() {
        let products = lightcurves.search(*tic)?;
        available.insert(*tic, products.len() >= MIN_LIGHTCURVE_PRODUCTS);
        sink.event(ProgressEvent {
            message: format!(
                "lightcurve.search {}/{} tic={tic} products={}",
                index + 1,
                distinct_tics.len(),
                products.len()
            ),
            elapsed: Some(start.elapsed()),
        });
    }

    table.set_column(
        COL_TOI_INT,
        ids.iter().map(|id| id.number().to_string()),
    )?;
    table.set_column(
        COL_PLANET_COUNT,
        ids.iter().map(|id| id.candidate().to_string()),
    )?;
    table.set_column(
        COL_MULTIPLANET,
        ids.iter().map(|id| format_flag(per_number[&id.number()] > 1)),
    )?;
    table.set_column(COL_SINGLE_TRANSIT, single.into_iter().map(format_flag))?;
    table.set_column(
        COL_LIGHTCURVE_AVAILABLE,
        tics.iter().map(|tic| format_flag(available[tic])),
    )?;
    Ok(())
}

pub fn tic_id_for_toi(table: &CatalogTable, toi: ToiNumber) -> Result<TicId, AtlasError> {
    let first = toi.first_candidate();
    table
        .rows()
        .find(|row| row.toi_id().is_ok_and(|id| id == first))
        .ok_or_else(|| AtlasError::NoData(format!("TOI {first} is not in the catalog")))?
        .tic_id()
}

pub fn rows_for_targets(
    table: &CatalogTable,
    tois: &[ToiNumber],
) -> Result<CatalogTable, AtlasError> {
    let mut tics = Vec::new();
    for toi in tois {
        match tic_id_for_toi(table, *toi) {
            Ok(tic) if !tics.contains(&tic) => tics.push(tic),
            Ok(_) => {}
            Err(AtlasError::NoData(message)) => warn!(toi = toi.get(), "{message}"),
            Err(err) => return Err(err),
        }
    }

    let mut result = CatalogTable::new(table.columns().to_vec());
    for tic in &tics {
        let rows = table
            .filter(|row| row.tic_id().is_ok_and(|id| id == *tic))
            .sorted_by_toi();
        result.extend(&rows)?;
    }
    if result.is_empty() {
        let requested = tois
            .iter()
            .map(|toi| toi.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AtlasError::NoData(format!(
            "TOI data for TOIs [{requested}] does not exist"
        )));
    }
    Ok(result)
}

pub fn lightcurve_available_ids(
    table: &CatalogTable,
    require_lightcurve: bool,
) -> BTreeSet<ToiNumber> {
    table
        .rows()
        .filter(|row| !require_lightcurve || row.flag(COL_LIGHTCURVE_AVAILABLE))
        .filter_map(|row| row.toi_number().ok())
        .collect()
}

pub fn toi_numbers_by_category(table: &CatalogTable, require_lightcurve: bool) -> ToiCategories {
    let mut flags = BTreeMap::<ToiNumber, (bool, bool)>::new();
    for row in table.rows() {
        if require_lightcurve && !row.flag(COL_LIGHTCURVE_AVAILABLE) {
            continue;
        }
        let Ok(toi) = row.toi_number() else {
            continue;
        };
        let entry = flags.entry(toi).or_default();
        entry.0 |= row.flag(COL_MULTIPLANET);
        entry.1 |= row.flag(COL_SINGLE_TRANSIT);
    }

    let mut categories = ToiCategories::default();
    for (toi, (multi, single)) in flags {
        if multi {
            categories.multi.push(toi);
        }
        if single {
            categories.single.push(toi);
        }
        if !multi && !single {
            categories.norm.push(toi);
        }
    }
    categories
}
