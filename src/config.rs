use std::path::{Path, PathBuf};

use crate::error::TsqlfmtError;
use crate::options::{FormatOptions, Mode};

/// Load formatter configuration from a tsqlfmt.toml file.
/// Searches parent directories of the input files if no config path is
/// given, then falls back to the user configuration directory.
pub fn load_config(files: &[PathBuf], config_path: Option<&Path>) -> Result<Mode, TsqlfmtError> {
    let mut mode = Mode::default();

    let config_file = match config_path {
        Some(path) => {
            if path.exists() {
                Some(path.to_path_buf())
            } else {
                return Err(TsqlfmtError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
        }
        None => find_config_file(files),
    };

    if let Some(path) = config_file {
        mode.options = load_options_from_path(&path)?;
    }

    Ok(mode)
}

/// Search for a tsqlfmt.toml in the common parent directories of the given
/// files, then in the per-user config directory.
fn find_config_file(files: &[PathBuf]) -> Option<PathBuf> {
    for parent in get_common_parents(files) {
        let config = parent.join("tsqlfmt.toml");
        if config.exists() {
            return Some(config);
        }
    }

    let user_config = dirs::config_dir()?.join("tsqlfmt").join("tsqlfmt.toml");
    if user_config.exists() {
        return Some(user_config);
    }
    None
}

/// Get the common parent directories of the given file paths, ordered
/// from most specific to least specific.
fn get_common_parents(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut parents = Vec::new();

    for file in files {
        let parent = if file.is_dir() {
            file.clone()
        } else {
            file.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        };

        // Walk up to root
        let mut current = Some(parent.as_path());
        while let Some(dir) = current {
            let dir_buf = dir.to_path_buf();
            if !parents.contains(&dir_buf) {
                parents.push(dir_buf);
            }
            current = dir.parent();
        }
    }

    parents
}

/// Load and parse a TOML config file into formatter options.
/// A `[tsqlfmt]` table is honored so the file can double as a section of a
/// larger config; otherwise the top-level keys are used directly.
pub fn load_options_from_path(path: &Path) -> Result<FormatOptions, TsqlfmtError> {
    let content = std::fs::read_to_string(path)?;
    let parsed: toml::Value = content
        .parse()
        .map_err(|e| TsqlfmtError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    let section = match parsed.get("tsqlfmt") {
        Some(section) => section.clone(),
        None => parsed,
    };

    section.try_into().map_err(|e: toml::de::Error| {
        TsqlfmtError::Config(format!("Invalid option in {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_missing_explicit_config_errors() {
        let result = load_config(&[], Some(Path::new("/nonexistent/tsqlfmt.toml")));
        assert!(matches!(result, Err(TsqlfmtError::Config(_))));
    }

    #[test]
    fn test_load_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsqlfmt.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "indent = \"    \"").unwrap();
        writeln!(f, "uppercase_keywords = false").unwrap();

        let options = load_options_from_path(&path).unwrap();
        assert_eq!(options.indent, "    ");
        assert!(!options.uppercase_keywords);
        assert!(options.expand_comma_lists);
    }

    #[test]
    fn test_load_sectioned_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsqlfmt.toml");
        std::fs::write(&path, "[tsqlfmt]\nmax_line_width = 100\n").unwrap();

        let options = load_options_from_path(&path).unwrap();
        assert_eq!(options.max_line_width, 100);
    }

    #[test]
    fn test_discovery_walks_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("tsqlfmt.toml"), "trailing_commas = true\n").unwrap();
        let sql = nested.join("query.sql");
        std::fs::write(&sql, "SELECT 1").unwrap();

        let mode = load_config(&[sql], None).unwrap();
        assert!(mode.options.trailing_commas);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsqlfmt.toml");
        std::fs::write(&path, "line_length = 88\n").unwrap();

        assert!(load_options_from_path(&path).is_err());
    }
}
