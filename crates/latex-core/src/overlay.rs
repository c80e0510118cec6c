//! Per-line syntax error overlays.

/// Display format ids attached to overlay entries.
pub mod format {
    /// Regular error underline.
    pub const ERROR: u32 = 0;
    /// Inline math highlight (`$...$`, `\(...\)`).
    pub const INLINE_MATH: u32 = 1;
    /// Display math highlight (`$$...$$`, `\[...\]`).
    pub const DISPLAY_MATH: u32 = 2;
}

/// Kind of a syntax problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    /// `\begin{x}` with an unknown `x`.
    UnrecognizedEnvironment,
    /// A command in no category of the database.
    UnrecognizedCommand,
    /// A math-only command outside math.
    MathCommandOutsideMath,
    /// A tabular-only command outside a tabular environment.
    TabularCommandOutsideTabular,
    /// A tabbing-only command outside `tabbing`.
    TabularCommandOutsideTabbing,
    /// More cells in a row than the column definition declares.
    TooManyColumns,
    /// Fewer cells in a row than the column definition declares.
    TooFewColumns,
    /// A row rule (`\hline`) before the previous row was terminated.
    MissingLinebreak,
    /// `\end{x}` that does not close the innermost open environment.
    ClosingUnopenedEnvironment,
    /// An environment still open at the end of the document.
    EnvironmentNotClosed,
    /// A key not accepted by a key-value argument.
    UnrecognizedKey,
    /// A value not accepted for a key.
    UnrecognizedKeyValue,
    /// A command used outside the environment it belongs to (`\item` outside lists).
    CommandOutsideSuitableEnvironment,
    /// Presentation-only marker (math highlighting); not an error.
    Highlight,
}

impl SyntaxErrorKind {
    /// Returns `false` for [`SyntaxErrorKind::Highlight`].
    pub fn is_error(self) -> bool {
        self != Self::Highlight
    }

    /// Human-readable message.
    pub fn message(self) -> &'static str {
        match self {
            Self::UnrecognizedEnvironment => "unrecognized environment",
            Self::UnrecognizedCommand => "unrecognized command",
            Self::MathCommandOutsideMath => "math command outside math environment",
            Self::TabularCommandOutsideTabular => "tabular command outside tabular environment",
            Self::TabularCommandOutsideTabbing => "tabbing command outside tabbing environment",
            Self::TooManyColumns => "more columns than defined",
            Self::TooFewColumns => "fewer columns than defined",
            Self::MissingLinebreak => "missing line break before row rule",
            Self::ClosingUnopenedEnvironment => "closing environment which has not been opened",
            Self::EnvironmentNotClosed => "environment not closed",
            Self::UnrecognizedKey => "unrecognized key",
            Self::UnrecognizedKeyValue => "unrecognized value for key",
            Self::CommandOutsideSuitableEnvironment => "command outside suitable environment",
            Self::Highlight => "",
        }
    }
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// One overlay entry of a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxError {
    /// Start column (byte offset).
    pub start: usize,
    /// Length in bytes.
    pub length: usize,
    /// What is wrong.
    pub kind: SyntaxErrorKind,
    /// Display format id (see [`format`]).
    pub format: u32,
    /// Added by the end-of-document pass rather than by checking this line.
    pub synthetic: bool,
}

impl SyntaxError {
    /// Create an error with the default format.
    pub fn new(kind: SyntaxErrorKind, start: usize, length: usize) -> Self {
        Self {
            start,
            length,
            kind,
            format: format::ERROR,
            synthetic: false,
        }
    }

    /// Create a highlight marker with a display format.
    pub fn highlight(start: usize, length: usize, format: u32) -> Self {
        Self {
            start,
            length,
            kind: SyntaxErrorKind::Highlight,
            format,
            synthetic: false,
        }
    }

    /// Exclusive end column.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Returns `true` unless this is a highlight marker.
    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }
}
