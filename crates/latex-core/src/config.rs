//! Analysis configuration.

use crate::error::Result;
use regex::Regex;
use serde::Deserialize;

/// Default pattern for TODO markers in comments. Group 1 is the note text.
pub const DEFAULT_TODO_PATTERN: &str = r"^%\s*(?:TODO|todo|FIXME|fixme)\b:?\s*(.*)$";

/// Default pattern for `% !TeX key = value` magic comments. Groups: key, value.
pub const DEFAULT_MAGIC_COMMENT_PATTERN: &str = r"^%\s*!(?i:tex)\s+([^=]+?)\s*=\s*(.*?)\s*$";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Tuning knobs of the structure patcher and the syntax checker.
pub struct AnalysisConfig {
    /// Maximum number of lines the patcher walks backward to find the start of an open
    /// multi-line construct.
    pub back_search_limit: usize,
    /// Whether the document spawns the syntax checker worker.
    pub syntax_check: bool,
    /// Whether delimiter math produces highlight markers.
    pub math_highlight: bool,
    /// Regex applied to comment text to detect TODO notes.
    pub todo_pattern: String,
    /// Regex applied to comment text to detect magic comments.
    pub magic_comment_pattern: String,
    /// Packages contributed by the master/child document group.
    pub inherited_packages: Vec<String>,
    /// Thread name of the checker worker.
    pub worker_name: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            back_search_limit: 10,
            syntax_check: true,
            math_highlight: true,
            todo_pattern: DEFAULT_TODO_PATTERN.to_string(),
            magic_comment_pattern: DEFAULT_MAGIC_COMMENT_PATTERN.to_string(),
            inherited_packages: Vec::new(),
            worker_name: "latex-syntax-check".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Set the back-search limit.
    pub fn with_back_search_limit(mut self, limit: usize) -> Self {
        self.back_search_limit = limit;
        self
    }

    /// Enable or disable the checker worker.
    pub fn with_syntax_check(mut self, enabled: bool) -> Self {
        self.syntax_check = enabled;
        self
    }

    /// Enable or disable math highlight markers.
    pub fn with_math_highlight(mut self, enabled: bool) -> Self {
        self.math_highlight = enabled;
        self
    }

    /// Add a package inherited from the document group.
    pub fn with_inherited_package(mut self, name: impl Into<String>) -> Self {
        self.inherited_packages.push(name.into());
        self
    }

    /// Set the TODO pattern.
    pub fn with_todo_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.todo_pattern = pattern.into();
        self
    }

    pub(crate) fn compile_patterns(&self) -> Result<(Regex, Regex)> {
        Ok((
            Regex::new(&self.todo_pattern)?,
            Regex::new(&self.magic_comment_pattern)?,
        ))
    }
}
