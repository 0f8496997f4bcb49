use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::store::{CATALOG_CACHE_FNAME, Store};

pub const DEFAULT_CONFIG_FNAME: &str = "tess-atlas.json";
pub const EXOFOP_URL: &str = "https://exofop.ipac.caltech.edu/tess/";
pub const DEFAULT_CATALOG_URL: &str =
    "https://exofop.ipac.caltech.edu/tess/download_toi.php?sort=toi&output=csv";
pub const DEFAULT_MAST_URL: &str = "https://mast.stsci.edu/api/v0/invoke";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub catalog_cache: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub mast_url: Option<String>,
    #[serde(default)]
    pub lightcurve_url: Option<String>,
    #[serde(default)]
    pub slurm: Option<SlurmSection>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SlurmSection {
    #[serde(default)]
    pub module_loads: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub mem: Option<String>,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub analysis_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlurmSettings {
    pub module_loads: String,
    pub time: String,
    pub mem: String,
    pub cpus: u32,
    pub partition: Option<String>,
    pub account: Option<String>,
    pub analysis_command: String,
}

impl Default for SlurmSettings {
    fn default() -> Self {
        Self {
            module_loads: String::new(),
            time: "04:00:00".to_string(),
            mem: "2000MB".to_string(),
            cpus: 1,
            partition: None,
            account: None,
            analysis_command: "run_toi".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_root: Option<Utf8PathBuf>,
    pub catalog_cache: Option<Utf8PathBuf>,
    pub catalog_url: String,
    pub mast_url: String,
    pub lightcurve_url: Option<String>,
    pub slurm: SlurmSettings,
}

impl ResolvedConfig {
    /// Store rooted at the configured paths, falling back to the defaults.
    pub fn store(&self) -> Result<Store, AtlasError> {
        let defaults = Store::new()?;
        let data_root = self
            .data_root
            .clone()
            .unwrap_or_else(|| defaults.data_root().to_owned());
        let catalog_cache = match &self.catalog_cache {
            Some(path) if path.extension() == Some("csv") => path.clone(),
            Some(dir) => dir.join(CATALOG_CACHE_FNAME),
            None => defaults.catalog_cache_path().to_owned(),
        };
        Ok(Store::new_with_paths(data_root, catalog_cache))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `tess-atlas.json` in the current directory when it
    /// exists; otherwise every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AtlasError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FNAME),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AtlasError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AtlasError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AtlasError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(AtlasError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let lightcurve_url = config
            .lightcurve_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &lightcurve_url {
            if !url.contains("{tic}") {
                return Err(AtlasError::ConfigParse(
                    "lightcurve_url must contain a {tic} placeholder".to_string(),
                ));
            }
        }

        let defaults = SlurmSettings::default();
        let slurm = match config.slurm {
            Some(section) => SlurmSettings {
                module_loads: section.module_loads.unwrap_or(defaults.module_loads),
                time: section.time.unwrap_or(defaults.time),
                mem: section.mem.unwrap_or(defaults.mem),
                cpus: section.cpus.unwrap_or(defaults.cpus),
                partition: section.partition,
                account: section.account,
                analysis_command: section
                    .analysis_command
                    .unwrap_or(defaults.analysis_command),
            },
            None => defaults,
        };

        Ok(ResolvedConfig {
            schema_version,
            data_root: config.data_root.map(Utf8PathBuf::from),
            catalog_cache: config.catalog_cache.map(Utf8PathBuf::from),
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            mast_url: config
                .mast_url
                .unwrap_or_else(|| DEFAULT_MAST_URL.to_string()),
            lightcurve_url,
            slurm,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_empty() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(resolved.mast_url, DEFAULT_MAST_URL);
        assert!(resolved.lightcurve_url.is_none());
        assert_eq!(resolved.slurm, SlurmSettings::default());
    }

    #[test]
    fn lightcurve_url_needs_placeholder() {
        let config = Config {
            lightcurve_url: Some("https://example.org/lc".to_string()),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, AtlasError::ConfigParse(_));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::resolve(Some("/nonexistent/tess-atlas.json")).unwrap_err();
        assert_matches!(err, AtlasError::ConfigRead(_));
    }
}
