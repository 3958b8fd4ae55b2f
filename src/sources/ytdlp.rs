use std::process::Command;

use regex::RegexSet;
use tracing::{debug, info};

use crate::sources::traits::{ExtractionError, ExtractionParams, MediaExtractor};

/// Error messages that mean "nothing to fetch here" rather than a fault
const UNAVAILABLE_PATTERNS: &[&str] = &[
    r"(?i)video unavailable",
    r"(?i)not available in your country",
    r"(?i)geo[- ]?restrict",
    r"(?i)requested format is not available",
    r"(?i)no video formats found",
    r"(?i)does not pass filter",
    r"(?i)this live event will begin",
    r"(?i)premieres in",
];

/// How many trailing stderr lines are kept in error messages
const STDERR_TAIL_LINES: usize = 5;

/// Extraction backend driven through the `yt-dlp` command line.
pub struct YtDlp {
    binary: String,
    unavailable: RegexSet,
}

impl YtDlp {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            unavailable: RegexSet::new(UNAVAILABLE_PATTERNS)
                .unwrap_or_else(|_| RegexSet::empty()),
        }
    }

    /// Build command arguments
    fn build_args(source_url: &str, params: &ExtractionParams) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--output".to_string(),
            params.output_template.clone(),
        ];

        if let Some(filter) = &params.match_filter {
            args.push("--match-filter".to_string());
            args.push(filter.clone());
        }

        if let Some(format) = &params.format {
            args.push("--format".to_string());
            args.push(format.clone());
        }

        if !params.format_sort.is_empty() {
            args.push("--format-sort".to_string());
            args.push(params.format_sort.join(","));
        }

        if params.thumbnail_only {
            args.push("--write-thumbnail".to_string());
            args.push("--skip-download".to_string());
        }

        // Anything after "--" is a URL, even if it starts with a dash
        args.push("--".to_string());
        args.push(source_url.to_string());
        args
    }

    fn classify_failure(&self, code: Option<i32>, stderr: &str) -> ExtractionError {
        let message = stderr_tail(stderr);

        if self.unavailable.is_match(stderr) {
            return ExtractionError::Unavailable(message);
        }

        ExtractionError::Failed {
            code: code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            message,
        }
    }
}

impl MediaExtractor for YtDlp {
    fn extract(&self, source_url: &str, params: &ExtractionParams) -> Result<(), ExtractionError> {
        let args = Self::build_args(source_url, params);
        debug!(binary = %self.binary, ?args, "running extraction backend");

        let output = Command::new(&self.binary).args(&args).output()?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            // Match-filter rejections finish successfully and leave no file behind
            if !stderr.trim().is_empty() {
                debug!(stderr = %stderr_tail(&stderr), "extraction backend warnings");
            }
            return Ok(());
        }

        let error = self.classify_failure(output.status.code(), &stderr);
        info!(url = %source_url, %error, "extraction backend failed");
        Err(error)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
