use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{COL_DEPTH, COL_DURATION, COL_EPOCH, COL_PERIOD, COL_SNR, CatalogRow};
use crate::domain::{TicId, ToiId};
use crate::error::AtlasError;
use crate::lightcurve::LightCurveData;

/// BJD offset used by TESS time stamps (BTJD).
pub const TESS_BJD_OFFSET: f64 = 2_457_000.0;

/// One transiting-planet candidate of a target.
#[derive(Debug, Clone)]
pub struct PlanetCandidate {
    pub toi_id: ToiId,
    pub tic_id: TicId,
    /// Days; estimated from the light-curve span for single transits.
    pub period: f64,
    /// Mid-transit time of the first transit, BTJD.
    pub t0: f64,
    /// Parts per thousand.
    pub depth: Option<f64>,
    /// Days.
    pub duration: Option<f64>,
    pub snr: Option<f64>,
    pub has_data_only_for_single_transit: bool,
    pub num_periods: u32,
    /// Mid-transit time of the last transit covered by the light curve.
    pub tmax: f64,
    lightcurve: Arc<LightCurveData>,
}

/// Flat view of a candidate for tables and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub toi: String,
    pub tic: TicId,
    pub period: f64,
    pub t0: f64,
    pub depth: Option<f64>,
    pub duration: Option<f64>,
    pub snr: Option<f64>,
    pub single_transit: bool,
    pub num_periods: u32,
    pub tmax: f64,
}

impl PlanetCandidate {
    pub fn from_catalog_row(
        row: &CatalogRow<'_>,
        lightcurve: Arc<LightCurveData>,
    ) -> Result<Self, AtlasError> {
        let toi_id = row.toi_id()?;
        let tic_id = row.tic_id()?;
        let epoch = row.f64(COL_EPOCH).ok_or_else(|| {
            AtlasError::CatalogParse(format!("TOI {toi_id} has no transit epoch"))
        })?;
        let t0 = epoch - TESS_BJD_OFFSET;
        let lc_tmax = lightcurve.tmax().unwrap_or(t0);

        let catalog_period = row.f64(COL_PERIOD).filter(|period| *period > 0.0);
        let (period, num_periods, tmax, single) = match catalog_period {
            Some(period) => {
                let num_periods = ((lc_tmax - t0) / period).floor().max(0.0) as u32;
                (period, num_periods, t0 + f64::from(num_periods) * period, false)
            }
            None => (lc_tmax - t0, 0, t0, true),
        };

        Ok(Self {
            toi_id,
            tic_id,
            period,
            t0,
            depth: row.f64(COL_DEPTH).map(|ppm| ppm * 1e-3),
            duration: row.f64(COL_DURATION).map(|hours| hours / 24.0),
            snr: row.f64(COL_SNR),
            has_data_only_for_single_transit: single,
            num_periods,
            tmax,
            lightcurve,
        })
    }

    pub fn lightcurve(&self) -> &Arc<LightCurveData> {
        &self.lightcurve
    }

    /// Mid-transit times covered by the light curve.
    pub fn transit_times(&self) -> Vec<f64> {
        if self.has_data_only_for_single_transit {
            return vec![self.t0];
        }
        (0..=self.num_periods)
            .map(|index| self.t0 + f64::from(index) * self.period)
            .collect()
    }

    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            toi: self.toi_id.to_string(),
            tic: self.tic_id,
            period: self.period,
            t0: self.t0,
            depth: self.depth,
            duration: self.duration,
            snr: self.snr,
            single_transit: self.has_data_only_for_single_transit,
            num_periods: self.num_periods,
            tmax: self.tmax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogTable;

    const ROWS: &str = "\
TIC ID,TOI,Period (days),Epoch (BJD),Duration (hours),Depth (ppm),Planet SNR
100,200.01,2.0,2458325.0,3.0,1500,12.5
100,200.02,0,2458326.0,6.0,,7.0
";

    fn lightcurve() -> Arc<LightCurveData> {
        Arc::new(LightCurveData {
            time: vec![1320.0, 1331.0],
            flux: vec![0.0, 0.0],
            flux_err: vec![1.0, 1.0],
        })
    }

    #[test]
    fn periodic_candidate_counts_transits() {
        let table = CatalogTable::from_csv_str(ROWS).unwrap();
        let candidate =
            PlanetCandidate::from_catalog_row(&table.row(0).unwrap(), lightcurve()).unwrap();
        assert_eq!(candidate.toi_id.to_string(), "200.01");
        assert_eq!(candidate.t0, 1325.0);
        assert_eq!(candidate.num_periods, 3);
        assert_eq!(candidate.tmax, 1331.0);
        assert_eq!(candidate.depth, Some(1.5));
        assert_eq!(candidate.duration, Some(0.125));
        assert_eq!(candidate.transit_times(), vec![1325.0, 1327.0, 1329.0, 1331.0]);
        assert!(!candidate.has_data_only_for_single_transit);
    }

    #[test]
    fn single_transit_estimates_period_from_light_curve() {
        let table = CatalogTable::from_csv_str(ROWS).unwrap();
        let candidate =
            PlanetCandidate::from_catalog_row(&table.row(1).unwrap(), lightcurve()).unwrap();
        assert!(candidate.has_data_only_for_single_transit);
        assert_eq!(candidate.period, 5.0);
        assert_eq!(candidate.num_periods, 0);
        assert_eq!(candidate.tmax, candidate.t0);
        assert_eq!(candidate.depth, None);
        assert_eq!(candidate.transit_times(), vec![1326.0]);
    }
}
