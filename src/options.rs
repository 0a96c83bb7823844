use serde::Deserialize;

/// Which renderer to run over the parse tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterKind {
    /// Configurable pretty-printer.
    #[default]
    Standard,
    /// Byte-for-byte reproduction of the parsed input.
    Identity,
    /// Whitespace collapsed to the minimum needed for re-tokenization.
    Obfuscating,
}

/// All knobs consulted by the standard formatter. The identity and
/// obfuscating formatters ignore this entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatOptions {
    /// One indent level. "\t" or some run of spaces.
    #[serde(default = "default_indent")]
    pub indent: String,

    /// Display width assumed for a tab when measuring line length.
    #[serde(default = "default_spaces_per_tab")]
    pub spaces_per_tab: usize,

    /// Hard column cap; a line reaching it wraps even without a
    /// semantic reason to break.
    #[serde(default = "default_max_line_width")]
    pub max_line_width: usize,

    #[serde(default = "default_true")]
    pub expand_comma_lists: bool,

    #[serde(default)]
    pub trailing_commas: bool,

    #[serde(default)]
    pub space_after_expanded_comma: bool,

    #[serde(default = "default_true")]
    pub expand_boolean_expressions: bool,

    #[serde(default = "default_true")]
    pub expand_case_statements: bool,

    #[serde(default = "default_true")]
    pub expand_between_conditions: bool,

    #[serde(default)]
    pub expand_in_lists: bool,

    #[serde(default)]
    pub break_join_on_sections: bool,

    #[serde(default = "default_true")]
    pub uppercase_keywords: bool,

    /// Remap non-canonical keyword spellings (PROC, TRAN, EXEC, ...) to
    /// their canonical forms before casing.
    #[serde(default)]
    pub keyword_standardization: bool,

    /// Emit class-tagged HTML spans instead of plain text.
    #[serde(default)]
    pub html_coloring: bool,

    /// Line breaks between consecutive statements.
    #[serde(default = "default_statement_breaks")]
    pub new_statement_line_breaks: usize,

    /// Line breaks between consecutive clauses of one statement.
    #[serde(default = "default_clause_breaks")]
    pub new_clause_line_breaks: usize,
}

fn default_indent() -> String {
    "\t".to_string()
}
fn default_spaces_per_tab() -> usize {
    4
}
fn default_max_line_width() -> usize {
    999
}
fn default_true() -> bool {
    true
}
fn default_statement_breaks() -> usize {
    2
}
fn default_clause_breaks() -> usize {
    1
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            spaces_per_tab: default_spaces_per_tab(),
            max_line_width: default_max_line_width(),
            expand_comma_lists: true,
            trailing_commas: false,
            space_after_expanded_comma: false,
            expand_boolean_expressions: true,
            expand_case_statements: true,
            expand_between_conditions: true,
            expand_in_lists: false,
            break_join_on_sections: false,
            uppercase_keywords: true,
            keyword_standardization: false,
            html_coloring: false,
            new_statement_line_breaks: 2,
            new_clause_line_breaks: 1,
        }
    }
}

/// Mode holds the full runtime configuration: formatter options plus the
/// flags that drive file processing and output.
#[derive(Debug, Clone, Default)]
pub struct Mode {
    pub options: FormatOptions,
    pub formatter: FormatterKind,

    /// Report whether files would change, without writing.
    pub check: bool,

    /// Print a unified diff instead of writing.
    pub diff: bool,

    /// Glob patterns to exclude when walking directories.
    pub exclude: Vec<String>,

    pub verbose: bool,
    pub quiet: bool,
    pub no_progressbar: bool,
    pub no_color: bool,
    pub force_color: bool,
}

impl Mode {
    /// Whether color output is enabled.
    pub fn color(&self) -> bool {
        if self.force_color {
            return true;
        }
        if self.no_color {
            return false;
        }
        if std::env::var("NO_COLOR").is_ok() {
            return false;
        }
        true
    }

    /// SQL file extensions to process.
    pub fn sql_extensions(&self) -> &[&str] {
        &["sql", "ddl", "dml", "tsql"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = FormatOptions::default();
        assert_eq!(options.indent, "\t");
        assert_eq!(options.max_line_width, 999);
        assert!(options.expand_comma_lists);
        assert!(!options.trailing_commas);
        assert!(options.uppercase_keywords);
        assert!(!options.keyword_standardization);
        assert_eq!(options.new_statement_line_breaks, 2);
        assert_eq!(options.new_clause_line_breaks, 1);
    }

    #[test]
    fn test_deserialize_partial_table() {
        let options: FormatOptions =
            toml::from_str("max_line_width = 120\ntrailing_commas = true\n").unwrap();
        assert_eq!(options.max_line_width, 120);
        assert!(options.trailing_commas);
        // Everything else keeps its default.
        assert!(options.expand_comma_lists);
        assert_eq!(options.indent, "\t");
    }

    #[test]
    fn test_deserialize_rejects_unknown_key() {
        let result: Result<FormatOptions, _> = toml::from_str("line_len = 80\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_color_logic() {
        let mut mode = Mode::default();
        mode.no_color = true;
        assert!(!mode.color());

        mode.force_color = true;
        assert!(mode.color());
    }
}
