//! Token model.
//!
//! Tokens are produced per line by the [`lexer`](crate::lexer). A token only describes a span of
//! its own line; constructs that are still open at the end of a line (an unclosed argument, a
//! command still waiting for arguments, a verbatim environment) are carried to the next line in a
//! [`TokenStack`] (the line's *remainder*).
//!
//! Columns are byte offsets into the line text.

use std::sync::Arc;

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A run of letters and digits.
    Word,
    /// A control sequence (`\name`, or `\` followed by a single non-letter).
    Command,
    /// A single punctuation character (`.`, `,`, `=`, `*`, ...).
    Punctuation,
    /// A special character with TeX meaning (`&`, `~`, `^`, `_`, `#`).
    Symbol,
    /// An inline (`$`) or display (`$$`) math delimiter.
    Math,
    /// `{` that did not close on this line (only seen in remainders).
    OpenBrace,
    /// `}` without a matching `{`.
    CloseBrace,
    /// `[` opening an optional argument that did not close on this line.
    OpenSquare,
    /// `(` opening a parenthesized argument that did not close on this line.
    OpenParen,
    /// A complete `{...}` group (or the part of it on this line).
    Braces,
    /// A complete `[...]` argument (or the part of it on this line).
    Squares,
    /// A complete `(...)` argument (or the part of it on this line).
    Parens,
    /// The key of a `key=value` item inside a key-value argument.
    KeyValKey,
    /// The value of a `key=value` item inside a key-value argument.
    KeyValValue,
    /// A `%` comment up to the end of the line.
    Comment,
    /// Verbatim content (`\verb`, verbatim environments).
    Verbatim,
}

impl TokenKind {
    /// Returns `true` for the collapsed argument kinds (`Braces`, `Squares`, `Parens`).
    pub fn is_group(self) -> bool {
        matches!(self, Self::Braces | Self::Squares | Self::Parens)
    }

    /// Returns `true` for still-open bracket kinds (remainder entries).
    pub fn is_open(self) -> bool {
        matches!(self, Self::OpenBrace | Self::OpenSquare | Self::OpenParen)
    }
}

/// Semantic role of a token, derived from the argument signature of the command owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TokenSubtype {
    /// No semantic role.
    #[default]
    None,
    /// An argument without a more specific role.
    Generic,
    /// Running text.
    Text,
    /// A sectioning title.
    Title,
    /// A short (table of contents) title.
    ShortTitle,
    /// A label definition (`\label{x}`).
    Label,
    /// A label reference (`\ref{x}`).
    LabelRef,
    /// A bibliography item definition (`\bibitem{x}`).
    NewBibItem,
    /// A citation key list (`\cite{x,y}`).
    BibRef,
    /// An included file (`\include{x}`).
    File,
    /// A bibliography database file (`\bibliography{x}`).
    BibFile,
    /// An image file.
    ImageFile,
    /// A package name list (`\usepackage{x}`).
    Package,
    /// Package or class options.
    PackageOption,
    /// A document class name.
    DocumentClass,
    /// The name being defined (`\newcommand{\x}`, `\newenvironment{x}`).
    DefinedName,
    /// Argument count of a definition (`[2]`, `#1`).
    DefArgCount,
    /// Default value of the first optional argument of a definition.
    DefaultArg,
    /// Body of a definition; dominates every nested argument.
    Definition,
    /// Environment name after `\begin`.
    BeginEnv,
    /// Environment name after `\end`.
    EndEnv,
    /// Tabular column definition.
    ColDef,
    /// A `key=value` list.
    KeyValArg,
    /// Math content outside a math environment (`\ensuremath{...}`).
    Formula,
    /// TODO note text.
    Todo,
    /// The environment name of `\newtheorem`.
    NewTheorem,
    /// A URL.
    Url,
    /// A length.
    Width,
    /// A color name.
    Color,
    /// Float placement specifier.
    Placement,
    /// An argument with command-specific syntax that is not checked.
    SpecialArg,
}

impl TokenSubtype {
    /// Map a signature placeholder name (`{title}`, `[short title]`, ...) to a subtype.
    pub fn from_placeholder(name: &str) -> Self {
        match name.trim() {
            "text" | "content" | "caption" => Self::Text,
            "title" => Self::Title,
            "short title" | "short" => Self::ShortTitle,
            "label" => Self::Label,
            "ref" | "refs" => Self::LabelRef,
            "bibid" => Self::NewBibItem,
            "keys" | "keylist" | "cite" => Self::BibRef,
            "file" | "files" => Self::File,
            "bibfile" | "bibfiles" => Self::BibFile,
            "imagefile" => Self::ImageFile,
            "package" | "packages" => Self::Package,
            "options" => Self::PackageOption,
            "class" => Self::DocumentClass,
            "cmd" | "envname" | "name" | "counter" => Self::DefinedName,
            "args" => Self::DefArgCount,
            "default" => Self::DefaultArg,
            "def" | "begdef" | "enddef" => Self::Definition,
            "beginenv" => Self::BeginEnv,
            "endenv" => Self::EndEnv,
            "cols" | "preamble" => Self::ColDef,
            "keyvals" => Self::KeyValArg,
            "formula" | "math" => Self::Formula,
            "todo" => Self::Todo,
            "theorem" => Self::NewTheorem,
            "URL" | "url" => Self::Url,
            "width" | "length" => Self::Width,
            "color" => Self::Color,
            "placement" | "pos" => Self::Placement,
            "special" => Self::SpecialArg,
            _ => Self::Generic,
        }
    }

    /// Subtypes whose content is never checked for command validity.
    pub fn suppresses_checking(self) -> bool {
        matches!(
            self,
            Self::Definition
                | Self::DefinedName
                | Self::DefArgCount
                | Self::DefaultArg
                | Self::Label
                | Self::LabelRef
                | Self::NewBibItem
                | Self::BibRef
                | Self::File
                | Self::BibFile
                | Self::ImageFile
                | Self::Package
                | Self::PackageOption
                | Self::DocumentClass
                | Self::BeginEnv
                | Self::EndEnv
                | Self::ColDef
                | Self::KeyValArg
                | Self::NewTheorem
                | Self::Url
                | Self::Color
                | Self::Placement
                | Self::SpecialArg
        )
    }
}

/// A lexical unit of one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Lexical class.
    pub kind: TokenKind,
    /// Semantic role (argument subtype, or the subtype of the enclosing argument).
    pub subtype: TokenSubtype,
    /// Start column (byte offset).
    pub start: usize,
    /// Length in bytes.
    pub length: usize,
    /// Brace nesting level at the token.
    pub level: usize,
    /// Argument position within the owning command's signature. For a command waiting for
    /// arguments in a remainder, the number of arguments already consumed.
    pub arg_index: usize,
    /// The command owning this argument token, if any.
    pub command: Option<Arc<str>>,
}

impl Token {
    /// Create a token without semantic role.
    pub fn new(kind: TokenKind, start: usize, length: usize) -> Self {
        Self {
            kind,
            subtype: TokenSubtype::None,
            start,
            length,
            level: 0,
            arg_index: 0,
            command: None,
        }
    }

    /// Exclusive end column.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Returns `true` if `column` lies inside this token.
    pub fn contains(&self, column: usize) -> bool {
        column >= self.start && column < self.end()
    }

    /// The token's text within its line (empty if the span is out of bounds).
    pub fn text<'a>(&self, line: &'a str) -> &'a str {
        line.get(self.start..self.end()).unwrap_or("")
    }

    /// The text inside a group token, without its delimiters.
    ///
    /// Groups continuing from a previous line start at column 0 without an opening delimiter,
    /// and groups still open at the end of the line have no closing delimiter.
    pub fn inner_text<'a>(&self, line: &'a str) -> &'a str {
        let text = self.text(line);
        let text = match text.chars().next() {
            Some('{' | '[' | '(') => &text[1..],
            _ => text,
        };
        match text.chars().last() {
            Some('}' | ']' | ')') => &text[..text.len() - 1],
            _ => text,
        }
    }

    /// The owning command name, or `""`.
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or("")
    }

    /// Returns `true` if this token is an argument of `command`.
    pub fn belongs_to(&self, command: &str) -> bool {
        self.command.as_deref() == Some(command)
    }
}

/// The token stack carried across a line boundary (the line's remainder).
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct TokenStack(Vec<Token>);

impl TokenStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no construct is open.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of open constructs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Top of the stack.
    pub fn top(&self) -> Option<&Token> {
        self.0.last()
    }

    /// Mutable top of the stack.
    pub fn top_mut(&mut self) -> Option<&mut Token> {
        self.0.last_mut()
    }

    /// Push a construct.
    pub fn push(&mut self, token: Token) {
        self.0.push(token);
    }

    /// Pop the innermost construct.
    pub fn pop(&mut self) -> Option<Token> {
        self.0.pop()
    }

    /// Iterate from the bottom of the stack.
    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.0.iter()
    }

    /// Returns `true` if the innermost open argument is a definition body.
    pub fn top_is_definition(&self) -> bool {
        self.0
            .iter()
            .rev()
            .find(|t| t.kind.is_open())
            .is_some_and(|t| t.subtype == TokenSubtype::Definition)
    }

    /// Returns `true` if a verbatim environment is open.
    pub fn in_verbatim(&self) -> bool {
        self.top().is_some_and(|t| t.kind == TokenKind::Verbatim)
    }

    /// Number of open brace/square groups.
    pub fn group_depth(&self) -> usize {
        self.0.iter().filter(|t| t.kind.is_open()).count()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub(crate) fn position_of_last(&self, kind: TokenKind) -> Option<usize> {
        self.0.iter().rposition(|t| t.kind == kind)
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&Token) -> bool) {
        self.0.retain(f);
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Token] {
        &mut self.0
    }
}

impl FromIterator<Token> for TokenStack {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TokenStack {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Tokens of one line, shared between the patcher and readers of the line cookies.
pub type TokenList = Arc<[Token]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_text_strips_present_delimiters_only() {
        let line = "\\section{Intro}";
        let group = Token::new(TokenKind::Braces, 8, 7);
        assert_eq!(group.inner_text(line), "Intro");

        let continued = Token::new(TokenKind::Braces, 0, 5);
        assert_eq!(continued.inner_text("tail} rest"), "tail");

        let open_at_eol = Token::new(TokenKind::Braces, 4, 6);
        assert_eq!(open_at_eol.inner_text("abc {start"), "start");
    }

    #[test]
    fn test_top_is_definition_looks_at_innermost_group() {
        let mut stack = TokenStack::new();
        let mut open = Token::new(TokenKind::OpenBrace, 0, 0);
        open.subtype = TokenSubtype::Definition;
        stack.push(open);
        assert!(stack.top_is_definition());

        stack.push(Token::new(TokenKind::Command, 0, 0));
        assert!(stack.top_is_definition());

        stack.push(Token::new(TokenKind::OpenBrace, 0, 0));
        assert!(!stack.top_is_definition());
    }

    #[test]
    fn test_placeholder_mapping() {
        assert_eq!(TokenSubtype::from_placeholder("title"), TokenSubtype::Title);
        assert_eq!(TokenSubtype::from_placeholder("cols"), TokenSubtype::ColDef);
        assert_eq!(TokenSubtype::from_placeholder("whatever"), TokenSubtype::Generic);
        assert!(TokenSubtype::Definition.suppresses_checking());
        assert!(!TokenSubtype::Text.suppresses_checking());
    }
}
