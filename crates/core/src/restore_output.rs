//! Classification of restore-tool stderr.
//!
//! `pg_restore` exits non-zero for many restores that actually succeeded:
//! it counts warnings such as unknown configuration parameters or objects
//! that already exist as errors. The exit code alone is therefore
//! not trusted. Each stderr line is classified instead, and the restore is
//! failed only when a genuinely fatal line is present.

use std::sync::OnceLock;

use regex::RegexSet;
use serde::Serialize;

/// Classification of a single stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    /// Empty or whitespace-only.
    Blank,
    /// A known warning or progress message.
    Benign,
    /// Output that carries no error marker and matches no known pattern.
    Noise,
    /// A fatal error; fails the restore.
    Fatal,
}

/// Patterns for benign `pg_restore` chatter. Matched case-insensitively.
const BENIGN_PATTERNS: &[&str] = &[
    // Summary line printed when errors were ignored.
    r"warning: errors ignored on restore: \d+",
    r"^pg_restore: warning:",
    // Settings emitted by a newer pg_dump than the target server knows.
    r"unrecognized configuration parameter",
    r"^command was:",
    // Connection and progress chatter with --verbose.
    r"^pg_restore: (connecting|creating|processing|dropping|executing|restoring|setting|launching|finished|implied data-only)",
    r"^pg_restore: from toc entry",
    // Objects the target already has, e.g. the `public` schema. "does not
    // exist" is never benign: `--if-exists` silences drop-time notices, so
    // what remains is a load into a missing object.
    r#"(relation|schema|extension|function|type|sequence|index|constraint|trigger|view) "?[^"]*"? already exists"#,
    r"must be owner of (extension|schema)",
];

fn benign_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        let patterns: Vec<String> = BENIGN_PATTERNS.iter().map(|p| format!("(?i){p}")).collect();
        RegexSet::new(patterns).expect("benign restore patterns are valid regexes")
    })
}

/// Classify one line of restore stderr.
///
/// Precedence: blank, then fatal-and-error markers together, then benign
/// patterns, then any remaining line mentioning `error`.
pub fn classify_line(line: &str) -> LineClass {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineClass::Blank;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("fatal") && lower.contains("error:") {
        return LineClass::Fatal;
    }
    if benign_set().is_match(trimmed) {
        return LineClass::Benign;
    }
    if lower.contains("error") {
        return LineClass::Fatal;
    }

    LineClass::Noise
}

/// Aggregate assessment of a restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreAssessment {
    pub exit_code: i32,
    pub fatal_lines: Vec<String>,
    pub benign_lines: usize,
    pub noise_lines: usize,
}

impl RestoreAssessment {
    /// The restore failed iff at least one fatal line was seen.
    ///
    /// Deliberately independent of the exit code in both directions.
    pub fn is_failure(&self) -> bool {
        !self.fatal_lines.is_empty()
    }

    /// Human-readable summary for `error_message`.
    pub fn failure_summary(&self) -> String {
        format!(
            "restore tool reported {} fatal error(s) (exit code {}): {}",
            self.fatal_lines.len(),
            self.exit_code,
            self.fatal_lines.join(" | ")
        )
    }
}

/// Classify every line of `stderr` from a restore that exited with `exit_code`.
pub fn assess(exit_code: i32, stderr: &str) -> RestoreAssessment {
    let mut assessment = RestoreAssessment {
        exit_code,
        ..Default::default()
    };

    for line in stderr.lines() {
        match classify_line(line) {
            LineClass::Blank => {}
            LineClass::Benign => assessment.benign_lines += 1,
            LineClass::Noise => assessment.noise_lines += 1,
            LineClass::Fatal => assessment.fatal_lines.push(line.trim().to_string()),
        }
    }

    assessment
}
