use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tess_atlas::app::{App, FetchOptions, ProgressSink};
use tess_atlas::config::ConfigLoader;
use tess_atlas::domain::{ToiCategory, ToiNumber};
use tess_atlas::error::AtlasError;
use tess_atlas::exofop::ExofopHttpClient;
use tess_atlas::mast::MastHttpClient;
use tess_atlas::output::{JsonOutput, OutputMode, StderrProgress, TextOutput};
use tess_atlas::slurm::{SystemJobSubmitter, TargetList};
use tess_atlas::store::Store;

#[derive(Parser)]
#[command(name = "tess-atlas")]
#[command(about = "Cache TESS TOI catalog data per target and generate SLURM analysis jobs")]
#[command(version, author)]
struct Cli {
    /// JSON config file (default: ./tess-atlas.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory holding the per-target `toi_<n>_files` directories
    #[arg(long, global = true)]
    data_root: Option<Utf8PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch or refresh the TOI catalog")]
    Catalog(CatalogArgs),
    #[command(about = "List TOI numbers by category")]
    Tois(ToisArgs),
    #[command(about = "Fetch and cache all data of one target")]
    Fetch(FetchArgs),
    #[command(about = "Show catalog and cache status of one target")]
    Info(InfoArgs),
    #[command(about = "Generate (and optionally submit) SLURM jobs for many TOIs")]
    Jobs(JobsArgs),
}

#[derive(Args)]
struct CatalogArgs {
    /// Re-download the catalog even when cached
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct ToisArgs {
    #[arg(long, value_enum, default_value_t = ToiCategory::All)]
    category: ToiCategory,

    #[arg(long)]
    include_without_lightcurve: bool,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    toi: ToiNumber,

    /// Refresh the catalog and rebuild the target from remote sources
    #[arg(long)]
    clean: bool,

    /// Rebuild the target from remote sources using the cached catalog
    #[arg(long, conflicts_with = "clean")]
    rebuild: bool,
}

#[derive(Args)]
struct InfoArgs {
    #[arg(long)]
    toi: ToiNumber,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("targets").required(true).args(["toi_number", "toi_csv"])))]
struct JobsArgs {
    #[arg(long, num_args = 1..)]
    toi_number: Vec<ToiNumber>,

    /// CSV file with a `toi_numbers` column
    #[arg(long)]
    toi_csv: Option<Utf8PathBuf>,

    #[arg(long)]
    outdir: Utf8PathBuf,

    /// Shell line loading the environment, e.g. "module load python"
    #[arg(long)]
    module_loads: Option<String>,

    #[arg(long)]
    submit: bool,

    /// Refresh the catalog once, then have every setup job pass --rebuild
    #[arg(long)]
    clean: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<AtlasError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AtlasError) -> u8 {
    match error {
        AtlasError::NoData(_) | AtlasError::CacheMissing(_) => 2,
        AtlasError::ExofopHttp(_)
        | AtlasError::ExofopStatus { .. }
        | AtlasError::MastHttp(_)
        | AtlasError::MastStatus { .. }
        | AtlasError::LightcurveHttp(_)
        | AtlasError::LightcurveStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(data_root) = cli.data_root {
        config.data_root = Some(data_root);
    }
    let store: Store = config.store()?;
    let exofop = ExofopHttpClient::with_url(&config.catalog_url)?;
    let mast = Arc::new(MastHttpClient::with_urls(
        &config.mast_url,
        config.lightcurve_url.as_deref(),
    )?);
    let app = App::new(config, store, Arc::new(exofop), mast.clone(), mast);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &StderrProgress,
    };

    match cli.command {
        Commands::Catalog(args) => {
            let result = app.catalog(args.clean, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_catalog(&result).into_diagnostic()?,
                OutputMode::Human => TextOutput::print_catalog(&result),
            }
        }
        Commands::Tois(args) => {
            let result = app.tois(args.category, !args.include_without_lightcurve, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_tois(&result).into_diagnostic()?,
                OutputMode::Human => TextOutput::print_tois(&result),
            }
        }
        Commands::Fetch(args) => {
            let result = app.fetch(
                args.toi,
                FetchOptions {
                    clean: args.clean,
                    rebuild: args.rebuild,
                },
                sink,
            )?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic()?,
                OutputMode::Human => TextOutput::print_fetch(&result),
            }
        }
        Commands::Info(args) => {
            let result = app.info(args.toi, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result).into_diagnostic()?,
                OutputMode::Human => TextOutput::print_info(&result),
            }
        }
        Commands::Jobs(args) => {
            let targets = match args.toi_csv {
                Some(path) => TargetList::Csv(path),
                None => TargetList::Numbers(args.toi_number),
            };
            let mut request = app.job_request(targets, args.outdir, args.submit, args.clean);
            if let Some(module_loads) = args.module_loads {
                request.settings.module_loads = module_loads;
            }
            let plan = app.jobs(request, &SystemJobSubmitter::new(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_jobs(&plan).into_diagnostic()?,
                OutputMode::Human => TextOutput::print_jobs(&plan),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn jobs_needs_a_target_list() {
        let err = Cli::try_parse_from(["tess-atlas", "jobs", "--outdir", "out"]);
        assert!(err.is_err());
        let cli =
            Cli::try_parse_from(["tess-atlas", "jobs", "--toi-number", "101", "102", "--outdir", "out"])
                .unwrap();
        let Commands::Jobs(args) = cli.command else {
            panic!("expected jobs");
        };
        assert_eq!(args.toi_number, vec![ToiNumber::new(101), ToiNumber::new(102)]);
    }

    #[test]
    fn fetch_clean_and_rebuild_are_exclusive() {
        let cli = Cli::try_parse_from(["tess-atlas", "fetch", "--toi", "101", "--rebuild"]).unwrap();
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert!(args.rebuild);
        assert!(!args.clean);
        let both =
            Cli::try_parse_from(["tess-atlas", "fetch", "--toi", "101", "--clean", "--rebuild"]);
        assert!(both.is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(map_exit_code(&AtlasError::NoData("x".to_string())), 2);
        assert_eq!(map_exit_code(&AtlasError::MastHttp("x".to_string())), 3);
        assert_eq!(map_exit_code(&AtlasError::InvalidToi("x".to_string())), 1);
    }
}
