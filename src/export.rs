/// Report export: writes a sealed run report as pretty JSON.
///
/// Uses atomic write pattern: write to a temp file in the target directory
/// then rename, so readers never see a partial report.
use crate::report::RunReport;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ExportError {
    Serialize { source: serde_json::Error },
    Write { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Serialize { source } => {
                write!(f, "failed to serialize run report: {}", source)
            }
            ExportError::Write { path, source } => {
                write!(f, "failed to write run report {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Serialize { source } => Some(source),
            ExportError::Write { source, .. } => Some(source),
        }
    }
}

/// `{dir}/run-{size}.json`
pub fn report_path(dir: &Path, size: u32) -> PathBuf {
    dir.join(format!("run-{size}.json"))
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<(), ExportError> {
    let json =
        serde_json::to_string_pretty(report).map_err(|e| ExportError::Serialize { source: e })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let write_err = |source: std::io::Error| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::debug!(path = %path.display(), "run report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunOutcome;
    use chrono::Utc;
    use std::time::Duration;

    fn sealed_report() -> RunReport {
        let mut report = RunReport::new("sh -c exit", Some(7), Utc::now());
        report
            .push_line("starting db query", Duration::from_millis(500), None)
            .unwrap();
        report
            .seal(RunOutcome::Completed { exit_code: 0 }, Duration::from_secs(1))
            .unwrap();
        report
    }

    #[test]
    fn test_report_path_naming() {
        assert_eq!(
            report_path(Path::new("/tmp/reports"), 21),
            PathBuf::from("/tmp/reports/run-21.json")
        );
    }

    #[test]
    fn test_write_creates_dir_and_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(&dir.path().join("nested"), 20);
        write_report(&path, &sealed_report()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["outcome"]["kind"], "completed");
        assert_eq!(json["outcome"]["exit_code"], 0);
        assert_eq!(json["events"][0]["text"], "starting db query");
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path(), 20);
        write_report(&path, &sealed_report()).unwrap();
        write_report(&path, &sealed_report()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_into_file_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_report(&blocker.join("run-1.json"), &sealed_report()).unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
    }
}
