use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CatalogResult, FetchResult, InfoResult, ProgressEvent, ProgressSink, ToisResult};
use crate::slurm::JobPlan;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_catalog(result: &CatalogResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tois(result: &ToisResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_jobs(result: &JobPlan) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr, e.g. `[Fetch] resolving TOI 103 (12 ms)`.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let message = event.message.trim();
        let line = match parse_phase(message) {
            Some((phase, payload)) => format!("[{phase}] {payload}"),
            None => message.to_string(),
        };
        let mut stderr = io::stderr();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stderr, "{line} ({} ms)", elapsed.as_millis()),
            None => writeln!(stderr, "{line}"),
        };
    }
}

fn parse_phase(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (phase, payload) = rest.split_once(';')?;
    Some((phase.trim(), payload.trim()))
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_catalog(result: &CatalogResult) {
        let action = if result.refreshed { "refreshed" } else { "loaded" };
        println!("TOI catalog {action}: {}", result.cache_path);
        println!("  rows:             {}", result.rows);
        println!("  targets:          {}", result.targets);
        println!("  with light curve: {}", result.with_lightcurve);
    }

    pub fn print_tois(result: &ToisResult) {
        for toi in &result.toi_numbers {
            println!("{toi}");
        }
    }

    pub fn print_fetch(result: &FetchResult) {
        let source = if result.loaded_from_cache {
            "cache"
        } else {
            "remote"
        };
        println!(
            "TOI {} (TIC {}) from {source}, {} candidate(s)",
            result.toi, result.tic, result.planet_count
        );
        println!("  files:   {}", result.outdir);
        println!("  exofop:  {}", result.exofop_url);
        println!("  samples: {}", result.lightcurve_points);
        println!(
            "  {:<8} {:>12} {:>12} {:>9} {:>9} {:>7} {:>4}",
            "toi", "period [d]", "t0 [btjd]", "depth", "dur [d]", "snr", "n"
        );
        for candidate in &result.candidates {
            let marker = if candidate.single_transit { "*" } else { "" };
            println!(
                "  {:<8} {:>12.5} {:>12.5} {:>9} {:>9} {:>7} {:>4}{marker}",
                candidate.toi,
                candidate.period,
                candidate.t0,
                optional(candidate.depth, 3),
                optional(candidate.duration, 4),
                optional(candidate.snr, 1),
                candidate.num_periods,
            );
        }
        if result.candidates.iter().any(|c| c.single_transit) {
            println!("  * single transit, period estimated from the light curve");
        }
        if let Some(summary) = &result.inference {
            println!("  posterior:");
            for parameter in summary {
                println!(
                    "    {:<12} {:>12.5} +/- {:.5}",
                    parameter.name, parameter.mean, parameter.std
                );
            }
        }
    }

    pub fn print_info(result: &InfoResult) {
        println!("TOI {}", result.toi);
        println!("  tic:          {}", result.tic);
        println!("  exofop:       {}", result.exofop_url);
        println!("  catalog rows: {}", result.catalog_rows);
        println!("  directory:    {}", result.outdir);
        println!("  cached:       {}", if result.cached { "yes" } else { "no" });
        if let Some(manifest) = &result.manifest {
            println!("  saved at:     {} by {}", manifest.saved_at, manifest.tool);
        }
    }

    pub fn print_jobs(plan: &JobPlan) {
        println!(
            "Wrote jobs for {} TOI(s) to {}",
            plan.toi_numbers.len(),
            plan.outdir
        );
        println!("  setup:    {}", plan.setup_script);
        println!("  analysis: {}", plan.analysis_script);
        match &plan.submit_output {
            Some(output) => println!("  submitted: {output}"),
            None => println!("  submit with: bash {}", plan.submit_script),
        }
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value
        .map(|value| format!("{value:.precision$}"))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_prefix_is_split() {
        assert_eq!(
            parse_phase("phase=Fetch; resolving TOI 103"),
            Some(("Fetch", "resolving TOI 103"))
        );
        assert_eq!(parse_phase("lightcurve.search 1/2"), None);
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(optional(None, 2), "-");
        assert_eq!(optional(Some(1.23456), 2), "1.23");
    }
}
