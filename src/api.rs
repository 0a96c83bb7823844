use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Result;
use crate::formatter::format_tree;
use crate::options::{FormatterKind, Mode};
use crate::parser::parse;
use crate::preprocess::preprocess;
use crate::report::{FileOutcome, Report};
use crate::tokenizer::tokenize;

/// Format a T-SQL string according to the given mode.
/// This is the core API function.
pub fn format_string(source: &str, mode: &Mode) -> Result<String> {
    let tokens = tokenize(source);
    let mut tree = parse(&tokens);
    // The structural rewrites feed the pretty-printer only; the identity
    // and obfuscating renderers reproduce what was actually written.
    if mode.formatter == FormatterKind::Standard {
        preprocess(&mut tree);
    }
    format_tree(&tree, mode.formatter, &mode.options)
}

/// Run the formatter on a collection of files.
pub fn run(files: &[PathBuf], mode: &Mode) -> Report {
    let matching_paths = get_matching_paths(files, mode);
    let mut report = Report::new();

    let bar = if mode.no_progressbar || mode.quiet || matching_paths.len() <= 1 {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(matching_paths.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {wide_msg}")
        {
            bar.set_style(style);
        }
        bar
    };

    for path in &matching_paths {
        bar.set_message(path.display().to_string());
        let outcome = format_file(path, mode);
        if mode.verbose && !mode.quiet {
            let label = match outcome {
                FileOutcome::Unchanged => "unchanged",
                FileOutcome::Changed => {
                    if mode.check || mode.diff {
                        "would reformat"
                    } else {
                        "reformatted"
                    }
                }
                FileOutcome::Failed(_) => "error",
            };
            bar.suspend(|| eprintln!("{}: {}", label, path.display()));
        }
        report.record(path.clone(), outcome);
        bar.inc(1);
    }
    bar.finish_and_clear();

    report
}

/// Format a single file.
fn format_file(path: &Path, mode: &Mode) -> FileOutcome {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => return FileOutcome::Failed(format!("read error: {}", e)),
    };

    let formatted = match format_string(&source, mode) {
        Ok(f) => f,
        Err(e) => return FileOutcome::Failed(e.to_string()),
    };

    if source == formatted {
        return FileOutcome::Unchanged;
    }

    if mode.check || mode.diff {
        if mode.diff {
            print_diff(path, &source, &formatted);
        }
        return FileOutcome::Changed;
    }

    match std::fs::write(path, &formatted) {
        Ok(_) => FileOutcome::Changed,
        Err(e) => FileOutcome::Failed(format!("write error: {}", e)),
    }
}

/// Get all SQL file paths that match the given inputs.
pub fn get_matching_paths(paths: &[PathBuf], mode: &Mode) -> Vec<PathBuf> {
    let extensions = mode.sql_extensions();
    let mut result = HashSet::new();

    for path in paths {
        if path.is_file() {
            // Explicitly named files bypass the extension filter's
            // directory-walk defaults but must still look like SQL.
            if is_sql_file(path, extensions) {
                result.insert(path.clone());
            }
        } else if path.is_dir() {
            collect_sql_files(path, extensions, &mode.exclude, &mut result);
        }
    }

    let mut sorted: Vec<PathBuf> = result.into_iter().collect();
    sorted.sort();
    sorted
}

/// Check if a file has a SQL extension.
fn is_sql_file(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| extensions.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Recursively collect SQL files from a directory.
fn collect_sql_files(
    dir: &Path,
    extensions: &[&str],
    exclude: &[String],
    result: &mut HashSet<PathBuf>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.starts_with('.') {
            continue;
        }
        if exclude.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(&name))
                .unwrap_or(false)
        }) {
            continue;
        }

        if path.is_dir() {
            collect_sql_files(&path, extensions, exclude, result);
        } else if is_sql_file(&path, extensions) {
            result.insert(path);
        }
    }
}

/// Print a unified diff between original and formatted content.
fn print_diff(path: &Path, original: &str, formatted: &str) {
    use similar::{ChangeTag, TextDiff};

    eprintln!("--- {}", path.display());
    eprintln!("+++ {}", path.display());

    let diff = TextDiff::from_lines(original, formatted);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        eprint!("{}{}", sign, change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_simple_select() {
        let mode = Mode::default();
        let result = format_string("SELECT a, b FROM t", &mode).unwrap();
        assert_eq!(result, "SELECT\n\ta\n\t,b\nFROM t;\n");
    }

    #[test]
    fn test_format_identity_is_lossless() {
        let mut mode = Mode::default();
        mode.formatter = FormatterKind::Identity;
        let source = "select  /* c */ a,\n\tb from t -- tail\n";
        let result = format_string(source, &mode).unwrap();
        assert_eq!(result, source);
    }

    #[test]
    fn test_identity_bypasses_rewrites() {
        // Inputs the structural passes would touch still round-trip
        // byte for byte through the passthrough renderer.
        let mut mode = Mode::default();
        mode.formatter = FormatterKind::Identity;
        for source in [
            "SELECT TOP 10 a FROM t",
            "SELECT a FROM t WHERE x <> 1",
            "CREATE PROCEDURE dbo.p AS SELECT 1",
            "IF @x = 1 SELECT 1",
        ] {
            assert_eq!(format_string(source, &mode).unwrap(), source);
        }
    }

    #[test]
    fn test_format_empty_string() {
        let mode = Mode::default();
        let result = format_string("", &mode).unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn test_is_sql_file() {
        let exts = ["sql", "ddl", "dml", "tsql"];
        assert!(is_sql_file(Path::new("query.sql"), &exts));
        assert!(is_sql_file(Path::new("schema.DDL"), &exts));
        assert!(is_sql_file(Path::new("proc.tsql"), &exts));
        assert!(!is_sql_file(Path::new("readme.md"), &exts));
        assert!(!is_sql_file(Path::new("plain"), &exts));
    }

    #[test]
    fn test_get_matching_paths_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("a.sql");
        let skip = dir.path().join("gen_b.sql");
        let other = dir.path().join("c.txt");
        std::fs::write(&keep, "SELECT 1").unwrap();
        std::fs::write(&skip, "SELECT 2").unwrap();
        std::fs::write(&other, "not sql").unwrap();

        let mut mode = Mode::default();
        mode.exclude = vec!["gen_*".to_string()];
        let paths = get_matching_paths(&[dir.path().to_path_buf()], &mode);
        assert_eq!(paths, vec![keep]);
    }

    #[test]
    fn test_run_check_mode_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("q.sql");
        std::fs::write(&file, "SELECT a, b FROM t").unwrap();

        let mut mode = Mode::default();
        mode.check = true;
        mode.no_progressbar = true;
        let report = run(&[file.clone()], &mode);

        assert_eq!(report.changed(), 1);
        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "SELECT a, b FROM t");
    }

    #[test]
    fn test_run_writes_formatted_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("q.sql");
        std::fs::write(&file, "SELECT a, b FROM t").unwrap();

        let mut mode = Mode::default();
        mode.no_progressbar = true;
        let report = run(&[file.clone()], &mode);

        assert_eq!(report.changed(), 1);
        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "SELECT\n\ta\n\t,b\nFROM t;\n");

        // Second run is a fixed point.
        let report = run(&[file.clone()], &mode);
        assert_eq!(report.unchanged(), 1);
    }
}
