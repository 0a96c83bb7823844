use std::io::Write;
use std::path::PathBuf;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Already formatted.
    Unchanged,
    /// Rewritten, or flagged in check/diff mode.
    Changed,
    /// Could not be read, formatted, or written back.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Tally of a formatting run. Counts are kept as files are recorded so the
/// summary never re-walks the entries.
#[derive(Debug, Default)]
pub struct Report {
    entries: Vec<FileReport>,
    changed: usize,
    unchanged: usize,
    failed: usize,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Changed => self.changed += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
        self.entries.push(FileReport { path, outcome });
    }

    pub fn entries(&self) -> &[FileReport] {
        &self.entries
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn changed(&self) -> usize {
        self.changed
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn has_changes(&self) -> bool {
        self.changed > 0
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} file(s) processed", self.total())];
        if self.changed > 0 {
            parts.push(format!("{} reformatted", self.changed));
        }
        if self.unchanged > 0 {
            parts.push(format!("{} unchanged", self.unchanged));
        }
        if self.failed > 0 {
            parts.push(format!("{} error(s)", self.failed));
        }
        parts.join(", ")
    }

    /// Print the summary to stderr, colored by the worst outcome present.
    pub fn print_summary(&self, color: bool) {
        let choice = if color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        let mut stream = StandardStream::stderr(choice);
        let mut spec = ColorSpec::new();
        if self.has_failures() {
            spec.set_fg(Some(Color::Red));
        } else if self.has_changes() {
            spec.set_fg(Some(Color::Yellow));
        } else {
            spec.set_fg(Some(Color::Green));
        }
        let _ = stream.set_color(&spec);
        let _ = writeln!(stream, "{}", self.summary());
        let _ = stream.reset();
    }

    pub fn print_failures(&self) {
        for entry in &self.entries {
            if let FileOutcome::Failed(reason) = &entry.outcome {
                eprintln!("error: {}: {}", entry.path.display(), reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_and_summary() {
        let mut report = Report::new();
        report.record(PathBuf::from("a.sql"), FileOutcome::Changed);
        report.record(PathBuf::from("b.sql"), FileOutcome::Unchanged);
        report.record(
            PathBuf::from("c.sql"),
            FileOutcome::Failed("read error".to_string()),
        );

        assert_eq!(report.total(), 3);
        assert_eq!(report.changed(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.has_failures());
        assert!(report.has_changes());
        assert_eq!(
            report.summary(),
            "3 file(s) processed, 1 reformatted, 1 unchanged, 1 error(s)"
        );
    }

    #[test]
    fn test_empty_report() {
        let report = Report::new();
        assert_eq!(report.total(), 0);
        assert!(!report.has_failures());
        assert!(!report.has_changes());
        assert_eq!(report.summary(), "0 file(s) processed");
    }
}
