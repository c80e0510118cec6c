//! Error types for package loading.

use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while loading package description files.
pub enum PackageError {
    #[error("YAML parse error: {0}")]
    /// YAML parsing failed.
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    /// Filesystem I/O failed.
    Io(#[from] std::io::Error),

    #[error("package '{package}' declares an invalid command: {source}")]
    /// A command signature in a package could not be parsed.
    InvalidCommand {
        /// The package being loaded.
        package: String,
        /// The signature error.
        #[source]
        source: latex_core::LatexCoreError,
    },

    #[error("column type '{0}' must be a single letter")]
    /// A `column_types` entry was not a single alphabetic character.
    InvalidColumnType(String),

    #[error("unknown package '{0}'")]
    /// No package of that name was found in the registry, its search paths or the bundled set.
    UnknownPackage(String),

    #[error("require cycle detected involving '{0}'")]
    /// A `requires` chain formed a cycle.
    RequireCycle(String),
}

/// Convenience alias for results returned by `latex-core-packages`.
pub type Result<T> = std::result::Result<T, PackageError>;
