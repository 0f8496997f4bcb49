mod support;

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8Path;

use tess_atlas::app::{App, FetchOptions};
use tess_atlas::catalog::{COL_MULTIPLANET, CatalogTable};
use tess_atlas::config::{Config, ConfigLoader};
use tess_atlas::domain::{TicId, ToiCategory, ToiNumber};
use tess_atlas::error::AtlasError;
use tess_atlas::output::JsonOutput;
use tess_atlas::slurm::{JobSubmitter, TargetList};

use support::{MockExofop, MockMast, store, temp_root};

fn app(root: &Utf8Path) -> (App, Arc<MockExofop>, Arc<MockMast>) {
    let exofop = Arc::new(MockExofop::default());
    let mast = Arc::new(MockMast::default());
    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    let app = App::new(config, store(root), exofop.clone(), mast.clone(), mast.clone());
    (app, exofop, mast)
}

#[derive(Default)]
struct MockSubmitter {
    scripts: Mutex<Vec<String>>,
}

impl JobSubmitter for MockSubmitter {
    fn submit(&self, script: &Utf8Path) -> Result<String, AtlasError> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok("setup=1 analysis=2".to_string())
    }
}

#[test]
fn catalog_is_cached_with_extra_columns() {
    let (_temp, root) = temp_root();
    let (app, exofop, _) = app(&root);
    let result = app.catalog(false, &JsonOutput).unwrap();
    assert_eq!(result.rows, 4);
    assert_eq!(result.targets, 3);
    assert_eq!(result.with_lightcurve, 2);

    let cached = CatalogTable::read_csv(app.store().catalog_cache_path()).unwrap();
    assert_eq!(cached.row(0).unwrap().get("Comments"), Some("outer, maybe"));
    assert!(cached.row(0).unwrap().flag(COL_MULTIPLANET));

    app.catalog(false, &JsonOutput).unwrap();
    assert_eq!(exofop.calls(), 1);
    let refreshed = app.catalog(true, &JsonOutput).unwrap();
    assert!(refreshed.refreshed);
    assert_eq!(exofop.calls(), 2);
}

#[test]
fn tois_by_category() {
    let (_temp, root) = temp_root();
    let (app, _, _) = app(&root);

    let all = app.tois(ToiCategory::All, true, &JsonOutput).unwrap();
    assert_eq!(all.toi_numbers, vec![ToiNumber::new(101), ToiNumber::new(102)]);
    let everything = app.tois(ToiCategory::All, false, &JsonOutput).unwrap();
    assert_eq!(everything.toi_numbers.len(), 3);

    let multi = app.tois(ToiCategory::Multi, true, &JsonOutput).unwrap();
    assert_eq!(multi.toi_numbers, vec![ToiNumber::new(101)]);
    let single = app.tois(ToiCategory::Single, true, &JsonOutput).unwrap();
    assert_eq!(single.toi_numbers, vec![ToiNumber::new(102)]);
    let norm = app.tois(ToiCategory::Norm, false, &JsonOutput).unwrap();
    assert_eq!(norm.toi_numbers, vec![ToiNumber::new(103)]);
}

#[test]
fn fetch_prefers_cache_and_clean_rebuilds() {
    let (_temp, root) = temp_root();
    let (app, exofop, mast) = app(&root);

    let first = app.fetch(ToiNumber::new(101), FetchOptions::default(), &JsonOutput).unwrap();
    assert!(!first.loaded_from_cache);
    assert_eq!(first.tic, TicId::new(111));
    assert_eq!(first.planet_count, 2);
    assert_eq!(first.stellar.teff, Some(5750.0));

    let second = app.fetch(ToiNumber::new(101), FetchOptions::default(), &JsonOutput).unwrap();
    assert!(second.loaded_from_cache);
    assert_eq!(second.candidates, first.candidates);
    assert_eq!(mast.downloads(), 1);

    let clean = FetchOptions {
        clean: true,
        ..FetchOptions::default()
    };
    let cleaned = app.fetch(ToiNumber::new(101), clean, &JsonOutput).unwrap();
    assert!(!cleaned.loaded_from_cache);
    assert_eq!(exofop.calls(), 2);
    assert_eq!(mast.downloads(), 2);
}

#[test]
fn rebuild_keeps_the_cached_catalog() {
    let (_temp, root) = temp_root();
    let (app, exofop, mast) = app(&root);

    app.fetch(ToiNumber::new(101), FetchOptions::default(), &JsonOutput)
        .unwrap();
    let rebuild = FetchOptions {
        rebuild: true,
        ..FetchOptions::default()
    };
    let rebuilt = app.fetch(ToiNumber::new(101), rebuild, &JsonOutput).unwrap();
    assert!(!rebuilt.loaded_from_cache);
    assert_eq!(rebuilt.planet_count, 2);
    assert_eq!(exofop.calls(), 1);
    assert_eq!(mast.downloads(), 2);
}

#[test]
fn info_reports_cache_status() {
    let (_temp, root) = temp_root();
    let (app, _, _) = app(&root);

    let before = app.info(ToiNumber::new(102), &JsonOutput).unwrap();
    assert!(!before.cached);
    assert!(before.manifest.is_none());
    assert_eq!(before.tic, TicId::new(222));
    assert_eq!(before.catalog_rows, 1);

    app.fetch(ToiNumber::new(102), FetchOptions::default(), &JsonOutput).unwrap();
    let after = app.info(ToiNumber::new(102), &JsonOutput).unwrap();
    assert!(after.cached);
    assert_eq!(after.manifest.unwrap().planet_count, 1);

    assert_matches!(
        app.info(ToiNumber::new(9999), &JsonOutput),
        Err(AtlasError::NoData(_))
    );
}

#[test]
fn jobs_are_written_and_submitted() {
    let (_temp, root) = temp_root();
    let (app, exofop, _) = app(&root);
    let outdir = root.join("jobs");
    let submitter = MockSubmitter::default();

    let mut request = app.job_request(
        TargetList::Numbers(vec![ToiNumber::new(101), ToiNumber::new(102)]),
        outdir.clone(),
        true,
        true,
    );
    request.settings.module_loads = "module load python/3.11".to_string();
    let plan = app.jobs(request, &submitter, &JsonOutput).unwrap();

    assert!(plan.submitted);
    assert_eq!(plan.submit_output.as_deref(), Some("setup=1 analysis=2"));
    assert_eq!(
        *submitter.scripts.lock().unwrap(),
        vec![outdir.join("submit.sh").to_string()]
    );
    let setup = std::fs::read_to_string(&plan.setup_script).unwrap();
    assert!(setup.contains("module load python/3.11"));
    assert!(setup.contains("tess-atlas fetch --toi $TOI --rebuild"));
    assert!(!setup.contains("--clean"));
    // the catalog is refreshed once for the whole batch
    assert_eq!(exofop.calls(), 1);
    let analysis = std::fs::read_to_string(&plan.analysis_script).unwrap();
    assert!(analysis.contains("run_toi $TOI"));
}

#[test]
fn jobs_without_clean_leave_the_catalog_alone() {
    let (_temp, root) = temp_root();
    let (app, exofop, _) = app(&root);
    let request = app.job_request(
        TargetList::Numbers(vec![ToiNumber::new(101)]),
        root.join("jobs"),
        false,
        false,
    );
    let plan = app.jobs(request, &MockSubmitter::default(), &JsonOutput).unwrap();
    assert!(!plan.submitted);
    assert_eq!(exofop.calls(), 0);
    let setup = std::fs::read_to_string(&plan.setup_script).unwrap();
    assert!(setup.trim_end().ends_with("tess-atlas fetch --toi $TOI"));
}
