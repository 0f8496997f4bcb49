use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::data_object::{DataObject, corrupt, existing_file};
use crate::domain::TicId;
use crate::error::AtlasError;
use crate::store::Store;

pub const INFERENCE_FNAME: &str = "inference_samples.csv";

/// Posterior draws produced by an external sampler, one vector per
/// parameter; every vector holds the same number of draws.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    parameters: Vec<(String, Vec<f64>)>,
}

impl Trace {
    pub fn new(parameters: Vec<(String, Vec<f64>)>) -> Result<Self, AtlasError> {
        if parameters.is_empty() {
            return Err(AtlasError::InvalidTrace("trace has no parameters".to_string()));
        }
        let draws = parameters[0].1.len();
        for (name, samples) in &parameters {
            if name.trim().is_empty() {
                return Err(AtlasError::InvalidTrace("empty parameter name".to_string()));
            }
            if samples.len() != draws {
                return Err(AtlasError::InvalidTrace(format!(
                    "parameter {name} has {} draws, expected {draws}",
                    samples.len()
                )));
            }
        }
        let mut names = parameters.iter().map(|(name, _)| name).collect::<Vec<_>>();
        names.sort();
        names.dedup();
        if names.len() != parameters.len() {
            return Err(AtlasError::InvalidTrace(
                "duplicate parameter names".to_string(),
            ));
        }
        Ok(Self { parameters })
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }

    pub fn samples(&self, name: &str) -> Option<&[f64]> {
        self.parameters
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, samples)| samples.as_slice())
    }

    pub fn draws(&self) -> usize {
        self.parameters[0].1.len()
    }
}

/// Supplies the trace of a finished inference run for a target.
pub trait TraceSource: Send + Sync {
    fn trace(&self, tic: TicId) -> Result<Trace, AtlasError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceData {
    trace: Trace,
}

impl InferenceData {
    pub fn new(trace: Trace) -> Self {
        Self { trace }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn summary(&self) -> Vec<ParameterSummary> {
        self.trace
            .parameters
            .iter()
            .map(|(name, samples)| {
                let count = samples.len().max(1) as f64;
                let mean = samples.iter().sum::<f64>() / count;
                let variance =
                    samples.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
                ParameterSummary {
                    name: name.clone(),
                    mean,
                    std: variance.sqrt(),
                }
            })
            .collect()
    }
}

impl DataObject for InferenceData {
    type Source = dyn TraceSource;

    fn build_from_remote(source: &Self::Source, tic: TicId) -> Result<Self, AtlasError> {
        source.trace(tic).map(Self::new)
    }

    fn build_from_local(dir: &Utf8Path) -> Result<Self, AtlasError> {
        let path = existing_file(Self::expected_file_path(dir))?;
        let mut reader =
            csv::Reader::from_path(path.as_std_path()).map_err(|err| corrupt(&path, err))?;
        let names = reader
            .headers()
            .map_err(|err| corrupt(&path, err))?
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        let mut columns = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record.map_err(|err| corrupt(&path, err))?;
            for (column, value) in columns.iter_mut().zip(record.iter()) {
                let value = value.parse::<f64>().map_err(|err| corrupt(&path, err))?;
                column.push(value);
            }
        }
        let trace = Trace::new(names.into_iter().zip(columns).collect())
            .map_err(|err| corrupt(&path, err))?;
        Ok(Self::new(trace))
    }

    fn persist(&self, dir: &Utf8Path) -> Result<(), AtlasError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.trace.parameter_names())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        for draw in 0..self.trace.draws() {
            let row = self
                .trace
                .parameters
                .iter()
                .map(|(_, samples)| samples[draw].to_string());
            writer
                .write_record(row)
                .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&Self::expected_file_path(dir), &bytes)
    }

    fn expected_file_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(INFERENCE_FNAME)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn trace() -> Trace {
        Trace::new(vec![
            ("period".to_string(), vec![1.0, 2.0, 3.0]),
            ("r".to_string(), vec![0.5, 0.5, 0.5]),
        ])
        .unwrap()
    }

    #[test]
    fn ragged_trace_is_rejected() {
        let err = Trace::new(vec![
            ("a".to_string(), vec![1.0]),
            ("b".to_string(), vec![1.0, 2.0]),
        ])
        .unwrap_err();
        assert_matches!(err, AtlasError::InvalidTrace(_));
    }

    #[test]
    fn summary_reports_mean_and_std() {
        let summary = InferenceData::new(trace()).summary();
        assert_eq!(summary[0].name, "period");
        assert_eq!(summary[0].mean, 2.0);
        assert!((summary[0].std - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(summary[1].std, 0.0);
    }

    #[test]
    fn persist_then_load_keeps_order() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let data = InferenceData::new(trace());
        data.persist(&dir).unwrap();
        let loaded = InferenceData::build_from_local(&dir).unwrap();
        assert_eq!(loaded, data);
        assert_eq!(
            loaded.trace().parameter_names().collect::<Vec<_>>(),
            vec!["period", "r"]
        );
    }
}
