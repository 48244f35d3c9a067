/// Milestone detection: map extraction-job output lines to named phases.
///
/// Patterns are matched as case-insensitive substrings, first match wins.
/// The table order is part of the contract: a line such as
/// "db query finished, extracting" is a `QueryFinished`, not an
/// `ExtractionPhase`.
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::LazyLock;

/// Named phase boundaries of the extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    QueryStarted,
    QueryFinished,
    BuildStarted,
    StaticDataLoaded,
    ExtractionPhase,
}

impl Phase {
    /// Banner printed under the triggering line in the live stream.
    pub fn banner(self, line: &str) -> String {
        match self {
            Phase::QueryStarted => "DATABASE QUERY PHASE STARTED".to_string(),
            Phase::QueryFinished => "DATABASE QUERY COMPLETED".to_string(),
            Phase::BuildStarted => "DATA BUILDING STARTED".to_string(),
            Phase::StaticDataLoaded => "STATIC DATA LOADED".to_string(),
            Phase::ExtractionPhase => format!("EXTRACTION PHASE: {}", line.trim()),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::QueryStarted => "query_started",
            Phase::QueryFinished => "query_finished",
            Phase::BuildStarted => "build_started",
            Phase::StaticDataLoaded => "static_data_loaded",
            Phase::ExtractionPhase => "extraction_phase",
        };
        f.write_str(name)
    }
}

/// Ordered (pattern, phase) rules.
pub const RULES: &[(&str, Phase)] = &[
    ("starting db query", Phase::QueryStarted),
    ("db query finished", Phase::QueryFinished),
    ("building data from scratch", Phase::BuildStarted),
    ("loaded static_data", Phase::StaticDataLoaded),
    ("extracting", Phase::ExtractionPhase),
];

static COMPILED_RULES: LazyLock<Vec<(Regex, Phase)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|(pattern, phase)| {
            let regex = RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()
                .expect("escaped literal is a valid regex");
            (regex, *phase)
        })
        .collect()
});

/// Classify one output line. Unmatched lines yield `None`.
pub fn classify(line: &str) -> Option<Phase> {
    for (pattern, phase) in COMPILED_RULES.iter() {
        if pattern.is_match(line) {
            tracing::trace!(pattern = %pattern, %phase, "milestone pattern matched");
            return Some(*phase);
        }
    }
    None
}
