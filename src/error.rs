use thiserror::Error;

/// User-facing errors.
///
/// Unrecognized SQL is never an error at this level: the parser tags the
/// offending nodes and formatting proceeds. The variants here cover bad
/// configuration, I/O, and internal invariant violations.
#[derive(Error, Debug)]
pub enum TsqlfmtError {
    #[error("tsqlfmt config error: {0}")]
    Config(String),

    /// Indent level not restored symmetrically, or a node shape the
    /// renderer has no rule for. Always a bug, never a user condition.
    #[error("tsqlfmt internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TsqlfmtError>;
