pub mod api;
pub mod config;
pub mod error;
pub mod formatter;
pub mod keywords;
pub mod options;
pub mod parser;
pub mod preprocess;
pub mod report;
pub mod token;
pub mod tokenizer;
pub mod tree;

// Re-export the main public API
pub use api::{format_string, get_matching_paths, run};
pub use config::load_config;
pub use error::TsqlfmtError;
pub use formatter::format_tree;
pub use formatter::standard::PARSE_ERROR_WARNING;
pub use options::{FormatOptions, FormatterKind, Mode};
