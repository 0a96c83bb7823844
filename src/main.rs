use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use tsqlfmt::options::{FormatterKind, Mode};

/// tsqlfmt - A Transact-SQL formatter.
/// Parses losslessly, then pretty-prints, passes through, or minifies.
#[derive(Parser, Debug)]
#[command(name = "tsqlfmt", version, about)]
struct Cli {
    /// Files or directories to format. Use "-" to read from stdin.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Renderer to run over the parse tree.
    #[arg(short = 'f', long, value_enum, default_value_t = FormatterName::Standard)]
    formatter: FormatterName,

    /// Check formatting without writing changes.
    #[arg(long)]
    check: bool,

    /// Show formatting diff.
    #[arg(long)]
    diff: bool,

    /// Glob patterns to exclude.
    #[arg(long)]
    exclude: Vec<String>,

    /// Path to config file (tsqlfmt.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Indent with N spaces instead of a tab.
    #[arg(long, value_name = "N")]
    spaces: Option<usize>,

    /// Hard wrap column.
    #[arg(long, value_name = "WIDTH")]
    max_line_width: Option<usize>,

    /// Put commas at the end of the line instead of the start.
    #[arg(long)]
    trailing_commas: bool,

    /// Insert a space after each leading comma.
    #[arg(long)]
    space_after_expanded_comma: bool,

    /// Keep comma-separated lists on one line.
    #[arg(long)]
    no_expand_comma_lists: bool,

    /// Keep AND/OR conditions on one line.
    #[arg(long)]
    no_expand_boolean_expressions: bool,

    /// Keep CASE expressions on one line.
    #[arg(long)]
    no_expand_case_statements: bool,

    /// Keep BETWEEN conditions on one line.
    #[arg(long)]
    no_expand_between_conditions: bool,

    /// Break IN (...) lists one element per line.
    #[arg(long)]
    expand_in_lists: bool,

    /// Break before ON in JOIN clauses.
    #[arg(long)]
    break_join_on_sections: bool,

    /// Lowercase keywords instead of uppercasing them.
    #[arg(long)]
    lowercase_keywords: bool,

    /// Remap keyword shorthand (EXEC, PROC, TRAN, ...) to canonical forms.
    #[arg(long)]
    standardize_keywords: bool,

    /// Emit class-tagged HTML instead of plain text.
    #[arg(long)]
    html: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only).
    #[arg(short, long)]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progressbar: bool,

    /// Disable color output.
    #[arg(long)]
    no_color: bool,

    /// Force color output.
    #[arg(long)]
    force_color: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatterName {
    Standard,
    Identity,
    Obfuscating,
}

impl From<FormatterName> for FormatterKind {
    fn from(name: FormatterName) -> Self {
        match name {
            FormatterName::Standard => FormatterKind::Standard,
            FormatterName::Identity => FormatterKind::Identity,
            FormatterName::Obfuscating => FormatterKind::Obfuscating,
        }
    }
}

fn build_mode(cli: &Cli) -> anyhow::Result<Mode> {
    let mut mode = tsqlfmt::load_config(&cli.files, cli.config.as_deref())
        .context("failed to load configuration")?;

    mode.formatter = cli.formatter.into();
    mode.check = cli.check;
    mode.diff = cli.diff;
    if !cli.exclude.is_empty() {
        mode.exclude = cli.exclude.clone();
    }
    mode.verbose = cli.verbose;
    mode.quiet = cli.quiet;
    mode.no_progressbar = cli.no_progressbar;
    mode.no_color = cli.no_color;
    mode.force_color = cli.force_color;

    let options = &mut mode.options;
    if let Some(spaces) = cli.spaces {
        options.indent = " ".repeat(spaces);
        options.spaces_per_tab = spaces;
    }
    if let Some(width) = cli.max_line_width {
        options.max_line_width = width;
    }
    if cli.trailing_commas {
        options.trailing_commas = true;
    }
    if cli.space_after_expanded_comma {
        options.space_after_expanded_comma = true;
    }
    if cli.no_expand_comma_lists {
        options.expand_comma_lists = false;
    }
    if cli.no_expand_boolean_expressions {
        options.expand_boolean_expressions = false;
    }
    if cli.no_expand_case_statements {
        options.expand_case_statements = false;
    }
    if cli.no_expand_between_conditions {
        options.expand_between_conditions = false;
    }
    if cli.expand_in_lists {
        options.expand_in_lists = true;
    }
    if cli.break_join_on_sections {
        options.break_join_on_sections = true;
    }
    if cli.lowercase_keywords {
        options.uppercase_keywords = false;
    }
    if cli.standardize_keywords {
        options.keyword_standardization = true;
    }
    if cli.html {
        options.html_coloring = true;
    }

    Ok(mode)
}

fn try_main(cli: &Cli) -> anyhow::Result<i32> {
    let mode = build_mode(cli)?;

    let is_stdin = cli.files.len() == 1 && cli.files[0].to_string_lossy() == "-";
    if is_stdin {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read stdin")?;
        let formatted = tsqlfmt::format_string(&source, &mode)?;
        let mut stdout = std::io::stdout();
        stdout.write_all(formatted.as_bytes())?;
        stdout.flush()?;
        return Ok(0);
    }

    let report = tsqlfmt::run(&cli.files, &mode);

    report.print_failures();
    if !mode.quiet {
        report.print_summary(mode.color());
    }

    if report.has_failures() {
        Ok(2)
    } else if mode.check && report.has_changes() {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn main() {
    let cli = Cli::parse();
    match try_main(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    }
}
