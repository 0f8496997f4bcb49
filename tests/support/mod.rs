#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use tess_atlas::database::TicDatabase;
use tess_atlas::domain::TicId;
use tess_atlas::error::AtlasError;
use tess_atlas::exofop::ExofopClient;
use tess_atlas::mast::{
    LightcurvePoint, LightcurveProduct, LightcurveSource, StellarParameters, StellarSource,
};
use tess_atlas::store::Store;
use tess_atlas::tic_entry::EntrySources;

/// Two candidates on TIC 111 (listed out of order), a single transit on
/// TIC 222 and a target without light curve on TIC 333.
pub const CATALOG: &str = "\
TIC ID,TOI,Period (days),Epoch (BJD),Duration (hours),Depth (ppm),Planet SNR,Comments
111,101.02,7.5,2458330.0,2.4,800,9.1,\"outer, maybe\"
111,101.01,3.1,2458326.0,3.0,1500,12.5,
222,102.01,,2458340.0,5.0,600,8.0,
333,103.01,2.2,2458350.0,1.0,300,7.5,
";

#[derive(Default)]
pub struct MockExofop {
    pub calls: Mutex<usize>,
}

impl ExofopClient for MockExofop {
    fn download_catalog(&self) -> Result<String, AtlasError> {
        *self.calls.lock().unwrap() += 1;
        Ok(CATALOG.to_string())
    }
}

impl MockExofop {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MockMast {
    pub searches: Mutex<usize>,
    pub downloads: Mutex<usize>,
    pub lookups: Mutex<usize>,
}

impl MockMast {
    pub fn downloads(&self) -> usize {
        *self.downloads.lock().unwrap()
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

impl LightcurveSource for MockMast {
    fn search(&self, tic: TicId) -> Result<Vec<LightcurveProduct>, AtlasError> {
        *self.searches.lock().unwrap() += 1;
        let count = if tic.get() == 333 { 0 } else { 2 };
        Ok((0..count)
            .map(|sector| LightcurveProduct {
                obs_id: format!("tess-s{sector:04}-{tic}"),
                sector: Some(sector + 1),
                exptime: Some(120.0),
            })
            .collect())
    }

    /// Half-day cadence from BTJD 1320 to 1350 with one gap.
    fn download(&self, _tic: TicId) -> Result<Vec<LightcurvePoint>, AtlasError> {
        *self.downloads.lock().unwrap() += 1;
        Ok((0..=60)
            .map(|index| LightcurvePoint {
                time: Some(1320.0 + f64::from(index) * 0.5),
                flux: if index == 7 {
                    None
                } else {
                    Some(1000.0 + f64::from(index % 3))
                },
                flux_err: Some(0.5),
            })
            .collect())
    }
}

impl StellarSource for MockMast {
    fn lookup(&self, _tic: TicId) -> Result<StellarParameters, AtlasError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(StellarParameters {
            teff: Some(5750.0),
            radius: Some(1.02),
            mass: Some(0.98),
            ..StellarParameters::default()
        })
    }
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

pub fn store(root: &Utf8Path) -> Store {
    Store::new_with_paths(root.join("data"), root.join("cache").join("cached_tic_database.csv"))
}

pub struct Harness {
    pub exofop: Arc<MockExofop>,
    pub mast: Arc<MockMast>,
    pub sources: EntrySources,
}

pub fn harness(root: &Utf8Path) -> Harness {
    let exofop = Arc::new(MockExofop::default());
    let mast = Arc::new(MockMast::default());
    let store = store(root);
    let database = Arc::new(TicDatabase::new(
        store.catalog_cache_path().to_owned(),
        exofop.clone(),
        mast.clone(),
    ));
    let sources = EntrySources {
        store,
        database,
        lightcurves: mast.clone(),
        stellar: mast.clone(),
    };
    Harness {
        exofop,
        mast,
        sources,
    }
}
