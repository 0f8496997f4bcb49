use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::DEFAULT_MAST_URL;
use crate::domain::TicId;
use crate::error::AtlasError;

pub const LIGHTCURVE_MISSION: &str = "TESS";
pub const LIGHTCURVE_PIPELINE: &str = "SPOC";

/// One light-curve product listed by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightcurveProduct {
    pub obs_id: String,
    pub sector: Option<u32>,
    pub exptime: Option<f64>,
}

/// Raw sample as served by the download endpoint; gaps are empty cells.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LightcurvePoint {
    pub time: Option<f64>,
    pub flux: Option<f64>,
    pub flux_err: Option<f64>,
}

/// TIC catalog parameters of a star; every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StellarParameters {
    pub teff: Option<f64>,
    pub teff_err: Option<f64>,
    pub logg: Option<f64>,
    pub logg_err: Option<f64>,
    pub radius: Option<f64>,
    pub radius_err: Option<f64>,
    pub mass: Option<f64>,
    pub mass_err: Option<f64>,
    pub density: Option<f64>,
    pub density_err: Option<f64>,
    pub tmag: Option<f64>,
    pub distance: Option<f64>,
}

pub trait LightcurveSource: Send + Sync {
    /// Products for `tic` from the TESS mission's SPOC pipeline.
    fn search(&self, tic: TicId) -> Result<Vec<LightcurveProduct>, AtlasError>;
    /// Stitched samples of every sector available for `tic`.
    fn download(&self, tic: TicId) -> Result<Vec<LightcurvePoint>, AtlasError>;
}

pub trait StellarSource: Send + Sync {
    fn lookup(&self, tic: TicId) -> Result<StellarParameters, AtlasError>;
}

#[derive(Clone)]
pub struct MastHttpClient {
    client: Client,
    invoke_url: String,
    lightcurve_url: Option<String>,
}

impl MastHttpClient {
    pub fn new() -> Result<Self, AtlasError> {
        Self::with_urls(DEFAULT_MAST_URL, None)
    }

    /// `lightcurve_url` must contain a `{tic}` placeholder.
    pub fn with_urls(invoke_url: &str, lightcurve_url: Option<&str>) -> Result<Self, AtlasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tess-atlas/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AtlasError::MastHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| AtlasError::MastHttp(err.to_string()))?;
        Ok(Self {
            client,
            invoke_url: invoke_url.to_string(),
            lightcurve_url: lightcurve_url.map(|url| url.to_string()),
        })
    }

    fn invoke(&self, request: &Value) -> Result<Vec<Value>, AtlasError> {
        debug!(service = ?request.get("service"), "mast.request");
        let response = self
            .client
            .post(&self.invoke_url)
            .form(&[("request", request.to_string())])
            .send()
            .map_err(|err| AtlasError::MastHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "MAST request failed".to_string());
            return Err(AtlasError::MastStatus { status, message });
        }
        let body: Value = response
            .json()
            .map_err(|err| AtlasError::MastHttp(err.to_string()))?;
        parse_invoke_rows(body)
    }
}

impl LightcurveSource for MastHttpClient {
    fn search(&self, tic: TicId) -> Result<Vec<LightcurveProduct>, AtlasError> {
        let request = json!({
            "service": "Mast.Caom.Filtered",
            "format": "json",
            "params": {
                "columns": "*",
                "filters": [
                    {"paramName": "target_name", "values": [tic.to_string()]},
                    {"paramName": "obs_collection", "values": [LIGHTCURVE_MISSION]},
                    {"paramName": "provenance_name", "values": [LIGHTCURVE_PIPELINE]},
                    {"paramName": "dataproduct_type", "values": ["timeseries"]},
                ],
            },
        });
        let rows = self.invoke(&request)?;
        Ok(rows.iter().filter_map(parse_product).collect())
    }

    fn download(&self, tic: TicId) -> Result<Vec<LightcurvePoint>, AtlasError> {
        let template = self
            .lightcurve_url
            .as_deref()
            .ok_or_else(|| AtlasError::SourceNotConfigured("lightcurve_url".to_string()))?;
        let url = template.replace("{tic}", &tic.to_string());
        debug!(%url, "lightcurve.request");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| AtlasError::LightcurveHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "light curve request failed".to_string());
            return Err(AtlasError::LightcurveStatus { status, message });
        }
        let content = response
            .text()
            .map_err(|err| AtlasError::LightcurveHttp(err.to_string()))?;
        parse_lightcurve_csv(&content)
    }
}

impl StellarSource for MastHttpClient {
    fn lookup(&self, tic: TicId) -> Result<StellarParameters, AtlasError> {
        let request = json!({
            "service": "Mast.Catalogs.Filtered.Tic",
            "format": "json",
            "params": {
                "columns": "*",
                "filters": [
                    {"paramName": "ID", "values": [tic.to_string()]},
                ],
            },
        });
        let rows = self.invoke(&request)?;
        let row = rows
            .first()
            .ok_or_else(|| AtlasError::NoData(format!("TIC {tic} not found in the TIC catalog")))?;
        Ok(parse_stellar(row))
    }
}

fn parse_invoke_rows(body: Value) -> Result<Vec<Value>, AtlasError> {
    let status = body
        .get("status")
        .and_then(|value| value.as_str())
        .unwrap_or("COMPLETE");
    if status != "COMPLETE" {
        let message = body
            .get("msg")
            .and_then(|value| value.as_str())
            .unwrap_or(status)
            .to_string();
        return Err(AtlasError::MastHttp(message));
    }
    match body.get("data") {
        Some(Value::Array(rows)) => Ok(rows.clone()),
        _ => Err(AtlasError::MastHttp(
            "response is missing the data array".to_string(),
        )),
    }
}

fn parse_product(row: &Value) -> Option<LightcurveProduct> {
    let obs_id = row.get("obs_id").and_then(|value| value.as_str())?;
    Some(LightcurveProduct {
        obs_id: obs_id.to_string(),
        sector: row
            .get("sequence_number")
            .and_then(|value| value.as_u64())
            .and_then(|value| u32::try_from(value).ok()),
        exptime: row.get("t_exptime").and_then(|value| value.as_f64()),
    })
}

fn parse_stellar(row: &Value) -> StellarParameters {
    let number = |key: &str| row.get(key).and_then(|value| value.as_f64());
    StellarParameters {
        teff: number("Teff"),
        teff_err: number("e_Teff"),
        logg: number("logg"),
        logg_err: number("e_logg"),
        radius: number("rad"),
        radius_err: number("e_rad"),
        mass: number("mass"),
        mass_err: number("e_mass"),
        density: number("rho"),
        density_err: number("e_rho"),
        tmag: number("Tmag"),
        distance: number("d"),
    }
}

pub fn parse_lightcurve_csv(content: &str) -> Result<Vec<LightcurvePoint>, AtlasError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader
        .deserialize::<LightcurvePoint>()
        .map(|record| record.map_err(|err| AtlasError::LightcurveHttp(err.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn invoke_rows_require_complete_status() {
        let body = json!({"status": "ERROR", "msg": "bad filter", "data": []});
        assert_matches!(parse_invoke_rows(body), Err(AtlasError::MastHttp(message)) if message == "bad filter");

        let body = json!({"status": "COMPLETE", "data": [{"obs_id": "a"}]});
        assert_eq!(parse_invoke_rows(body).unwrap().len(), 1);
    }

    #[test]
    fn products_skip_rows_without_obs_id() {
        let rows = vec![
            json!({"obs_id": "tess2018206045859-s0001", "sequence_number": 1, "t_exptime": 120.0}),
            json!({"target_name": "123"}),
        ];
        let products = rows.iter().filter_map(parse_product).collect::<Vec<_>>();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].sector, Some(1));
        assert_eq!(products[0].exptime, Some(120.0));
    }

    #[test]
    fn stellar_fields_map_from_tic_columns() {
        let row = json!({"Teff": 5700.0, "e_Teff": 120.0, "rad": 1.02, "d": 95.3, "mass": null});
        let params = parse_stellar(&row);
        assert_eq!(params.teff, Some(5700.0));
        assert_eq!(params.teff_err, Some(120.0));
        assert_eq!(params.radius, Some(1.02));
        assert_eq!(params.distance, Some(95.3));
        assert_eq!(params.mass, None);
    }

    #[test]
    fn lightcurve_csv_accepts_gaps() {
        let points = parse_lightcurve_csv("time,flux,flux_err\n1.0,100.0,0.5\n2.0,,\n").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].flux, None);
    }
}
