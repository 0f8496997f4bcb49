use std::fs;
use std::path::PathBuf;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SlurmSettings;
use crate::domain::ToiNumber;
use crate::error::AtlasError;
use crate::store::Store;

pub const TOI_NUMBERS_COLUMN: &str = "toi_numbers";
pub const TOI_LIST_FNAME: &str = "toi_list.txt";
pub const SETUP_SCRIPT_FNAME: &str = "slurm_setup_job.sh";
pub const ANALYSIS_SCRIPT_FNAME: &str = "slurm_analysis_job.sh";
pub const SUBMIT_SCRIPT_FNAME: &str = "submit.sh";
pub const SETUP_LOG_DIR: &str = "log_setup";
pub const ANALYSIS_LOG_DIR: &str = "log_analysis";

/// Where the TOI numbers of a batch come from.
#[derive(Debug, Clone)]
pub enum TargetList {
    Numbers(Vec<ToiNumber>),
    Csv(Utf8PathBuf),
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub targets: TargetList,
    pub outdir: Utf8PathBuf,
    pub settings: SlurmSettings,
    pub submit: bool,
    /// Setup tasks rebuild their target directory; the catalog is refreshed
    /// once by the caller, not per task.
    pub clean: bool,
}

/// Files written for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct JobPlan {
    pub toi_numbers: Vec<ToiNumber>,
    pub outdir: String,
    pub toi_list: String,
    pub setup_script: String,
    pub analysis_script: String,
    pub submit_script: String,
    pub submitted: bool,
    pub submit_output: Option<String>,
}

pub trait JobSubmitter {
    /// Runs `submit.sh` and returns what it printed.
    fn submit(&self, script: &Utf8Path) -> Result<String, AtlasError>;
}

/// Submits through the local `bash` and `sbatch`.
pub struct SystemJobSubmitter {
    sbatch: Option<PathBuf>,
}

impl SystemJobSubmitter {
    pub fn new() -> Self {
        Self {
            sbatch: find_in_path("sbatch"),
        }
    }
}

impl Default for SystemJobSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSubmitter for SystemJobSubmitter {
    fn submit(&self, script: &Utf8Path) -> Result<String, AtlasError> {
        if self.sbatch.is_none() {
            return Err(AtlasError::MissingTool("sbatch".to_string()));
        }
        let mut cmd = Command::new("bash");
        cmd.arg(script.as_std_path());
        if let Some(dir) = script.parent().filter(|dir| !dir.as_str().is_empty()) {
            cmd.current_dir(dir.as_std_path());
        }
        let output = cmd
            .output()
            .map_err(|err| AtlasError::JobSubmission(format!("bash failed to start: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AtlasError::JobSubmission(format!(
                "{script} exited with {}: {stderr}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Reads the `toi_numbers` column of a CSV file.
pub fn load_toi_numbers(path: &Utf8Path) -> Result<Vec<ToiNumber>, AtlasError> {
    let mut reader = csv::Reader::from_path(path.as_std_path())
        .map_err(|err| AtlasError::Filesystem(format!("read {path}: {err}")))?;
    let column = reader
        .headers()
        .map_err(|err| AtlasError::CatalogParse(err.to_string()))?
        .iter()
        .position(|name| name.trim() == TOI_NUMBERS_COLUMN)
        .ok_or_else(|| AtlasError::MissingColumn(TOI_NUMBERS_COLUMN.to_string()))?;

    let mut tois = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| AtlasError::CatalogParse(err.to_string()))?;
        let Some(value) = record.get(column).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        // pandas writes integer columns with gaps as floats
        let value = value.strip_suffix(".0").unwrap_or(value);
        tois.push(value.parse()?);
    }
    Ok(tois)
}

/// Writes the setup and analysis array jobs for a batch of TOIs and
/// optionally submits them.
pub fn setup_jobs(
    request: &JobRequest,
    submitter: &dyn JobSubmitter,
) -> Result<JobPlan, AtlasError> {
    let toi_numbers = match &request.targets {
        TargetList::Numbers(numbers) => numbers.clone(),
        TargetList::Csv(path) => load_toi_numbers(path)?,
    };
    if toi_numbers.is_empty() {
        return Err(AtlasError::NoData("no TOI numbers to schedule".to_string()));
    }

    let outdir = request.outdir.clone();
    Store::ensure_dir(&outdir)?;
    Store::ensure_dir(&outdir.join(SETUP_LOG_DIR))?;
    Store::ensure_dir(&outdir.join(ANALYSIS_LOG_DIR))?;

    let toi_list = outdir.join(TOI_LIST_FNAME);
    let listing = toi_numbers
        .iter()
        .map(|toi| format!("{toi}\n"))
        .collect::<String>();
    Store::write_bytes_atomic(&toi_list, listing.as_bytes())?;

    let mut fetch = "tess-atlas fetch --toi $TOI".to_string();
    if request.clean {
        fetch.push_str(" --rebuild");
    }
    let analysis = format!("{} $TOI", request.settings.analysis_command);

    let setup_script = outdir.join(SETUP_SCRIPT_FNAME);
    let analysis_script = outdir.join(ANALYSIS_SCRIPT_FNAME);
    let submit_script = outdir.join(SUBMIT_SCRIPT_FNAME);
    write_script(
        &setup_script,
        &array_job(
            "setup",
            &outdir.join(SETUP_LOG_DIR),
            &toi_list,
            toi_numbers.len(),
            &request.settings,
            &fetch,
        ),
    )?;
    write_script(
        &analysis_script,
        &array_job(
            "analysis",
            &outdir.join(ANALYSIS_LOG_DIR),
            &toi_list,
            toi_numbers.len(),
            &request.settings,
            &analysis,
        ),
    )?;
    write_script(
        &submit_script,
        &submit_chain(&setup_script, &analysis_script),
    )?;
    info!(
        tois = toi_numbers.len(),
        path = %outdir,
        "wrote SLURM job scripts"
    );

    let submit_output = if request.submit {
        let output = submitter.submit(&submit_script)?;
        info!(%output, "submitted jobs");
        Some(output)
    } else {
        None
    };

    Ok(JobPlan {
        toi_numbers,
        outdir: outdir.to_string(),
        toi_list: toi_list.to_string(),
        setup_script: setup_script.to_string(),
        analysis_script: analysis_script.to_string(),
        submit_script: submit_script.to_string(),
        submitted: submit_output.is_some(),
        submit_output,
    })
}

fn array_job(
    name: &str,
    log_dir: &Utf8Path,
    toi_list: &Utf8Path,
    count: usize,
    settings: &SlurmSettings,
    command: &str,
) -> String {
    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("#SBATCH --job-name=tess_atlas_{name}\n"));
    script.push_str(&format!("#SBATCH --output={log_dir}/{name}_%A_%a.log\n"));
    script.push_str(&format!("#SBATCH --array=0-{}\n", count.saturating_sub(1)));
    script.push_str(&format!("#SBATCH --time={}\n", settings.time));
    script.push_str(&format!("#SBATCH --mem={}\n", settings.mem));
    script.push_str(&format!("#SBATCH --cpus-per-task={}\n", settings.cpus));
    if let Some(partition) = &settings.partition {
        script.push_str(&format!("#SBATCH --partition={partition}\n"));
    }
    if let Some(account) = &settings.account {
        script.push_str(&format!("#SBATCH --account={account}\n"));
    }
    script.push('\n');
    if !settings.module_loads.trim().is_empty() {
        script.push_str(settings.module_loads.trim());
        script.push('\n');
    }
    script.push_str(&format!("mapfile -t TOIS < {toi_list}\n"));
    script.push_str("TOI=${TOIS[$SLURM_ARRAY_TASK_ID]}\n");
    script.push_str(&format!("echo \"{name} TOI $TOI\"\n"));
    script.push_str(command);
    script.push('\n');
    script
}

fn submit_chain(setup: &Utf8Path, analysis: &Utf8Path) -> String {
    format!(
        "#!/bin/bash\n\
         set -e\n\
         SETUP_ID=$(sbatch --parsable {setup})\n\
         ANALYSIS_ID=$(sbatch --parsable --dependency=aftercomplete:$SETUP_ID {analysis})\n\
         echo \"setup=$SETUP_ID analysis=$ANALYSIS_ID\"\n"
    )
}

fn write_script(path: &Utf8Path, content: &str) -> Result<(), AtlasError> {
    Store::write_bytes_atomic(path, content.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = fs::set_permissions(path.as_std_path(), fs::Permissions::from_mode(0o755)) {
            warn!(%path, %err, "could not mark script executable");
        }
    }
    Ok(())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
