use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AtlasError {
    #[error("invalid TOI number: {0}")]
    InvalidToi(String),

    #[error("invalid TIC id: {0}")]
    InvalidTic(String),

    #[error("no data: {0}")]
    #[diagnostic(help("check the TOI number, or refresh the catalog with --clean"))]
    NoData(String),

    #[error("cached file missing: {0}")]
    #[diagnostic(help("rebuild the entry from remote sources with `fetch --rebuild`"))]
    CacheMissing(Utf8PathBuf),

    #[error("cached file corrupt at {path}: {message}")]
    #[diagnostic(help("rebuild the entry from remote sources with `fetch --rebuild`"))]
    CacheCorrupt { path: Utf8PathBuf, message: String },

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("catalog is missing column {0:?}")]
    MissingColumn(String),

    #[error("ExoFOP request failed: {0}")]
    ExofopHttp(String),

    #[error("ExoFOP returned status {status}: {message}")]
    ExofopStatus { status: u16, message: String },

    #[error("MAST request failed: {0}")]
    MastHttp(String),

    #[error("MAST returned status {status}: {message}")]
    MastStatus { status: u16, message: String },

    #[error("light curve request failed: {0}")]
    LightcurveHttp(String),

    #[error("light curve source returned status {status}: {message}")]
    LightcurveStatus { status: u16, message: String },

    #[error("data source not configured: {0}")]
    SourceNotConfigured(String),

    #[error("invalid inference trace: {0}")]
    InvalidTrace(String),

    #[error("inference result already attached for TOI {0}")]
    InferenceAlreadyAttached(u32),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("job submission failed: {0}")]
    JobSubmission(String),
}
