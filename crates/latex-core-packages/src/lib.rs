#![warn(missing_docs)]
//! `latex-core-packages` - YAML package descriptions for `latex-core`.
//!
//! A package description lists the commands (as argument signature strings), environments,
//! categories, sectioning levels and key-value vocabularies a LaTeX package or document class
//! adds. [`PackageRegistry`] loads descriptions from explicit YAML, from search paths
//! (`<name>.yaml`) or from the bundled set, and serves them to `latex-core` as a
//! [`PackageProvider`](latex_core::PackageProvider).
//!
//! ```rust
//! use latex_core::{AnalysisConfig, LatexDocument};
//! use latex_core_packages::PackageRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(PackageRegistry::bundled());
//! let mut doc = LatexDocument::new(AnalysisConfig::default(), registry).unwrap();
//! doc.load("\\usepackage{amsmath}\n\\begin{align}\nx &= \\text{one}\n\\end{align}");
//! doc.wait_for_checker();
//! assert!(doc.all_errors().is_empty());
//! ```

pub mod definition;
pub mod error;
pub mod registry;

pub use definition::{CommandEntry, EnvironmentEntry, PackageDefinition};
pub use error::{PackageError, Result};
pub use registry::{PackageRegistry, bundled_names};
