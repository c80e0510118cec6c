//! Environments tracked by the syntax checker.

use crate::buffer::LineHandle;
use crate::database::{CommandDatabase, category};

/// Name of the baseline environment at the bottom of every stack.
pub const BASELINE: &str = "normal";

/// Name used for environments opened by math delimiters (`$`, `\(`, ...).
pub const DELIMITER_MATH: &str = "math";

/// An open `\begin{...}` or math-delimiter context.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Environment name (`math` for delimiter math).
    pub name: String,
    /// Name as written; for delimiter math the opening delimiter.
    pub original_name: String,
    /// Declared tabular column count, or -1 when columns are not counted.
    pub id: i32,
    /// Brace nesting level of the `\begin`.
    pub level: usize,
    /// Line holding the `\begin`.
    pub line: Option<LineHandle>,
    /// Ticket of that line when the environment was opened.
    pub ticket: u64,
    /// Number of cell separators seen in the current row.
    pub excess_col: i32,
    /// Column of the `\begin` (or delimiter).
    pub start_column: usize,
}

impl Environment {
    /// Create an environment opened at `start_column` of `line`.
    pub fn new(name: impl Into<String>, line: Option<LineHandle>, start_column: usize) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            name,
            id: -1,
            level: 0,
            ticket: line.as_ref().map_or(0, LineHandle::ticket),
            line,
            excess_col: 0,
            start_column,
        }
    }

    /// Returns `true` for environments opened by a math delimiter.
    pub fn is_delimiter_math(&self) -> bool {
        self.name == DELIMITER_MATH && self.original_name != DELIMITER_MATH
    }

    /// Length of the opening construct (`\begin{name}` or the delimiter).
    pub fn opening_length(&self) -> usize {
        if self.is_delimiter_math() {
            self.original_name.len()
        } else {
            "\\begin{}".len() + self.original_name.len()
        }
    }
}

// The ticket is bookkeeping; two snapshots describing the same open constructs are equal.
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.original_name == other.original_name
            && self.id == other.id
            && self.level == other.level
            && self.excess_col == other.excess_col
            && self.start_column == other.start_column
            && match (&self.line, &other.line) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for Environment {}

/// The stack of open environments at a line boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEnvironment(Vec<Environment>);

impl Default for StackEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl StackEnvironment {
    /// A stack holding only the baseline environment.
    pub fn new() -> Self {
        Self(vec![Environment::new(BASELINE, None, 0)])
    }

    /// Innermost environment (the baseline when nothing is open).
    pub fn top(&self) -> &Environment {
        &self.0[self.0.len() - 1]
    }

    /// Mutable innermost environment.
    pub fn top_mut(&mut self) -> &mut Environment {
        let last = self.0.len() - 1;
        &mut self.0[last]
    }

    /// Open an environment.
    pub fn push(&mut self, env: Environment) {
        self.0.push(env);
    }

    /// Close the innermost environment. The baseline is never popped.
    pub fn pop(&mut self) -> Option<Environment> {
        if self.0.len() > 1 { self.0.pop() } else { None }
    }

    /// Number of open environments above the baseline.
    pub fn open_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Returns `true` if only the baseline is on the stack.
    pub fn is_baseline(&self) -> bool {
        self.0.len() == 1
    }

    /// Environments above the baseline, outermost first.
    pub fn open(&self) -> &[Environment] {
        &self.0[1..]
    }

    /// All environments including the baseline.
    pub fn iter(&self) -> std::slice::Iter<'_, Environment> {
        self.0.iter()
    }

    /// Returns `true` if any open environment is (or aliases) `target`.
    pub fn contains(&self, db: &CommandDatabase, target: &str) -> bool {
        self.open().iter().any(|env| db.environment_is(&env.name, target))
    }

    /// Returns `true` inside math.
    pub fn in_math(&self, db: &CommandDatabase) -> bool {
        self.contains(db, category::MATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_is_never_popped() {
        let mut stack = StackEnvironment::new();
        assert!(stack.pop().is_none());
        stack.push(Environment::new("itemize", None, 0));
        assert_eq!(stack.open_count(), 1);
        assert_eq!(stack.pop().map(|e| e.name), Some("itemize".to_string()));
        assert!(stack.is_baseline());
        assert_eq!(stack.top().name, BASELINE);
    }

    #[test]
    fn test_equality_ignores_ticket() {
        let line = LineHandle::new("\\begin{x}");
        let a = Environment::new("x", Some(line.clone()), 0);
        line.bump_ticket();
        let b = Environment::new("x", Some(line.clone()), 0);
        assert_ne!(a.ticket, b.ticket);
        assert_eq!(a, b);

        let other = Environment::new("x", Some(LineHandle::new("\\begin{x}")), 0);
        assert_ne!(a, other);
    }

    #[test]
    fn test_math_detection_uses_aliases() {
        let db = CommandDatabase::builtin();
        let mut stack = StackEnvironment::new();
        assert!(!stack.in_math(&db));
        stack.push(Environment::new("equation", None, 0));
        assert!(stack.in_math(&db));
    }
}
