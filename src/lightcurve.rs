use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_object::{DataObject, corrupt, existing_file};
use crate::domain::TicId;
use crate::error::AtlasError;
use crate::mast::{LightcurvePoint, LightcurveSource};
use crate::store::Store;

pub const LIGHTCURVE_FNAME: &str = "lightcurve.csv";

/// Median-normalized light curve, flux in parts per thousand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightCurveData {
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub flux_err: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sample {
    time: f64,
    flux: f64,
    flux_err: f64,
}

impl LightCurveData {
    /// Drops gaps, sorts by time and normalizes by the median flux.
    pub fn from_raw(points: &[LightcurvePoint]) -> Result<Self, AtlasError> {
        let mut samples = points
            .iter()
            .filter_map(|point| match (point.time, point.flux, point.flux_err) {
                (Some(time), Some(flux), Some(flux_err))
                    if time.is_finite() && flux.is_finite() && flux_err.is_finite() =>
                {
                    Some((time, flux, flux_err))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        if samples.is_empty() {
            return Err(AtlasError::NoData(
                "light curve has no finite samples".to_string(),
            ));
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let median = median(samples.iter().map(|sample| sample.1).collect());
        if median == 0.0 {
            return Err(AtlasError::NoData(
                "light curve median flux is zero".to_string(),
            ));
        }
        let mut data = LightCurveData::default();
        for (time, flux, flux_err) in samples {
            data.time.push(time);
            data.flux.push((flux / median - 1.0) * 1e3);
            data.flux_err.push(flux_err / median * 1e3);
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn tmin(&self) -> Option<f64> {
        self.time.first().copied()
    }

    pub fn tmax(&self) -> Option<f64> {
        self.time.last().copied()
    }
}

impl DataObject for LightCurveData {
    type Source = dyn LightcurveSource;

    fn build_from_remote(source: &Self::Source, tic: TicId) -> Result<Self, AtlasError> {
        let points = source.download(tic)?;
        debug!(tic = tic.get(), samples = points.len(), "downloaded light curve");
        Self::from_raw(&points)
    }

    fn build_from_local(dir: &Utf8Path) -> Result<Self, AtlasError> {
        let path = existing_file(Self::expected_file_path(dir))?;
        let mut reader =
            csv::Reader::from_path(path.as_std_path()).map_err(|err| corrupt(&path, err))?;
        let mut data = LightCurveData::default();
        for sample in reader.deserialize::<Sample>() {
            let sample = sample.map_err(|err| corrupt(&path, err))?;
            data.time.push(sample.time);
            data.flux.push(sample.flux);
            data.flux_err.push(sample.flux_err);
        }
        if data.is_empty() {
            return Err(corrupt(&path, "no samples"));
        }
        Ok(data)
    }

    fn persist(&self, dir: &Utf8Path) -> Result<(), AtlasError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for ((time, flux), flux_err) in self.time.iter().zip(&self.flux).zip(&self.flux_err) {
            writer
                .serialize(Sample {
                    time: *time,
                    flux: *flux,
                    flux_err: *flux_err,
                })
                .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| AtlasError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&Self::expected_file_path(dir), &bytes)
    }

    fn expected_file_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(LIGHTCURVE_FNAME)
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
