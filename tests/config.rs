use camino::Utf8Path;

use tess_atlas::config::{Config, ConfigLoader, SlurmSection};

#[test]
fn config_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("tess-atlas.json");
    std::fs::write(
        &path,
        r#"{
  "schema_version": 1,
  "data_root": "/scratch/atlas",
  "catalog_cache": "/scratch/cache",
  "lightcurve_url": "https://lc.example.org/{tic}.csv",
  "slurm": { "time": "10:00:00", "partition": "skylake", "cpus": 4 }
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.slurm.time, "10:00:00");
    assert_eq!(resolved.slurm.partition.as_deref(), Some("skylake"));
    assert_eq!(resolved.slurm.cpus, 4);
    assert_eq!(resolved.slurm.mem, "2000MB");
    assert_eq!(resolved.slurm.analysis_command, "run_toi");

    let store = resolved.store().unwrap();
    assert_eq!(store.data_root(), Utf8Path::new("/scratch/atlas"));
    assert_eq!(
        store.catalog_cache_path(),
        Utf8Path::new("/scratch/cache/cached_tic_database.csv")
    );
}

#[test]
fn unsupported_schema_version() {
    let config = Config {
        schema_version: Some(2),
        slurm: Some(SlurmSection::default()),
        ..Config::default()
    };
    assert!(ConfigLoader::resolve_config(config).is_err());
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert!(matches!(err, tess_atlas::error::AtlasError::ConfigParse(_)));
}
