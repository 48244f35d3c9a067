/// Sequential driver: one supervised run per problem size, stopping at the
/// first run that does not complete with exit code 0.
use crate::config::{JobConfig, StallwatchConfig};
use crate::console;
use crate::export;
use crate::report::RunReport;
use crate::run_spec::RunSpec;
use crate::signals::Interrupt;
use crate::supervisor::{RunObserver, Supervisor, SupervisorError};

/// One attempted run.
#[derive(Debug)]
pub struct RunRecord {
    pub size: u32,
    pub report: RunReport,
}

#[derive(Debug, Default)]
pub struct HarnessSummary {
    pub runs: Vec<RunRecord>,
    /// Sizes never attempted because an earlier run failed or was interrupted.
    pub skipped: Vec<u32>,
}

impl HarnessSummary {
    /// True when every requested size ran and completed with exit code 0.
    pub fn success(&self) -> bool {
        !self.runs.is_empty()
            && self.skipped.is_empty()
            && self.runs.iter().all(|r| r.report.succeeded())
    }
}

/// Expand `{size}` and `{env:NAME}` placeholders in the job arguments.
///
/// `{env:NAME}` resolves against the job's own env overrides, never the
/// supervisor's environment. Unknown names are left untouched.
pub fn build_args(job: &JobConfig, size: u32) -> Vec<String> {
    let size = size.to_string();
    job.args
        .iter()
        .map(|arg| {
            let mut expanded = arg.replace("{size}", &size);
            for (name, value) in &job.env {
                expanded = expanded.replace(&format!("{{env:{name}}}"), value);
            }
            expanded
        })
        .collect()
}

pub fn build_run_spec(config: &StallwatchConfig, size: u32) -> RunSpec {
    let mut spec = RunSpec::new(config.job.command.as_str(), config.stall_timeout())
        .args(build_args(&config.job, size));
    for (name, value) in &config.job.env {
        spec = spec.env(name.as_str(), value.as_str());
    }
    if let Some(dir) = &config.job.working_dir {
        spec = spec.working_dir(dir.clone());
    }
    spec
}

/// Run each size in order. Spawn failures and contract violations abort
/// the sequence with an error; every other failure short-circuits it.
pub async fn run_sizes(
    config: &StallwatchConfig,
    sizes: &[u32],
    interrupt: &Interrupt,
    observer: &mut dyn RunObserver,
) -> Result<HarnessSummary, SupervisorError> {
    let settings = config.supervisor_settings();
    let mut summary = HarnessSummary::default();

    for (index, &size) in sizes.iter().enumerate() {
        if interrupt.is_triggered() {
            tracing::warn!(size, "interrupted, skipping remaining runs");
            summary.skipped = sizes[index..].to_vec();
            break;
        }

        let spec = build_run_spec(config, size);
        console::print_run_banner(index, sizes.len(), size);
        tracing::info!(size, command = %spec.command_line(), "starting supervised run");

        let mut supervisor = Supervisor::new(settings.clone(), interrupt.clone());
        let report = supervisor.run(&spec, observer).await?;
        console::print_status(&report);

        if let Some(dir) = &config.harness.report_dir {
            let path = export::report_path(dir, size);
            if let Err(e) = export::write_report(&path, &report) {
                tracing::warn!(error = %e, "failed to export run report");
            }
        }

        let succeeded = report.succeeded();
        summary.runs.push(RunRecord { size, report });
        if !succeeded {
            summary.skipped = sizes[index + 1..].to_vec();
            if index == 0 && sizes.len() > 1 {
                println!("Even the baseline size {size} failed!");
            }
            if !summary.skipped.is_empty() {
                tracing::info!(skipped = ?summary.skipped, "run failed, skipping larger sizes");
            }
            break;
        }
    }

    Ok(summary)
}
