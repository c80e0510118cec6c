//! Command argument signatures.
//!
//! Signatures are written the way package description files write them:
//!
//! ```text
//! \section[short title]{title}
//! \newcommand{cmd}[args][default]{def}
//! \begin{tabular}[pos]{cols}
//! ```
//!
//! Placeholder names map to [`TokenSubtype`]s via [`TokenSubtype::from_placeholder`].
//! `\begin{name}` with a literal environment name (anything except the `beginenv`/`envname`
//! placeholders) declares the arguments following `\begin{name}`.

use crate::error::{LatexCoreError, Result};
use crate::token::TokenSubtype;

/// Bracket style of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgDelimiter {
    /// `{...}`, mandatory.
    Brace,
    /// `[...]`, optional.
    Square,
    /// `(...)`, optional.
    Paren,
}

impl ArgDelimiter {
    /// Opening character.
    pub fn open(self) -> char {
        match self {
            Self::Brace => '{',
            Self::Square => '[',
            Self::Paren => '(',
        }
    }

    /// Closing character.
    pub fn close(self) -> char {
        match self {
            Self::Brace => '}',
            Self::Square => ']',
            Self::Paren => ')',
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgSpec {
    /// Bracket style.
    pub delimiter: ArgDelimiter,
    /// Role of the argument content.
    pub subtype: TokenSubtype,
}

impl ArgSpec {
    /// Create an argument spec.
    pub fn new(delimiter: ArgDelimiter, subtype: TokenSubtype) -> Self {
        Self { delimiter, subtype }
    }

    /// Optional arguments may be omitted.
    pub fn is_optional(&self) -> bool {
        self.delimiter != ArgDelimiter::Brace
    }
}

/// A command (or environment) name with its declared arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSignature {
    /// Command name including the backslash, or `\begin{env}` for environment arguments.
    pub name: String,
    /// Declared arguments in order.
    pub args: Vec<ArgSpec>,
}

impl CommandSignature {
    /// Create a signature without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, delimiter: ArgDelimiter, subtype: TokenSubtype) -> Self {
        self.args.push(ArgSpec::new(delimiter, subtype));
        self
    }

    /// Signature of a user command defined with `arity` arguments.
    ///
    /// If `optional_first` is set (a default value was given), the first argument is optional.
    pub fn user_command(name: impl Into<String>, arity: usize, optional_first: bool) -> Self {
        let mut sig = Self::new(name);
        for i in 0..arity {
            let delimiter = if i == 0 && optional_first {
                ArgDelimiter::Square
            } else {
                ArgDelimiter::Brace
            };
            sig.args.push(ArgSpec::new(delimiter, TokenSubtype::Generic));
        }
        sig
    }

    /// Returns `true` if this signature declares the arguments of `\begin{env}`.
    pub fn is_environment(&self) -> bool {
        self.name.starts_with("\\begin{")
    }

    /// Number of mandatory arguments.
    pub fn mandatory_count(&self) -> usize {
        self.args.iter().filter(|a| !a.is_optional()).count()
    }

    /// Returns `true` if all arguments from `index` on are optional.
    pub fn only_optional_from(&self, index: usize) -> bool {
        self.args.iter().skip(index).all(ArgSpec::is_optional)
    }

    /// Find the argument a `delimiter` bracket binds to, starting at `from`.
    ///
    /// Optional arguments before the match may be skipped; a mandatory argument may not.
    pub fn next_arg(&self, from: usize, delimiter: ArgDelimiter) -> Option<usize> {
        for (i, arg) in self.args.iter().enumerate().skip(from) {
            if arg.delimiter == delimiter {
                return Some(i);
            }
            if !arg.is_optional() {
                return None;
            }
        }
        None
    }

    /// Index of the next mandatory argument at or after `from`, if only optional ones precede it.
    pub fn next_mandatory(&self, from: usize) -> Option<usize> {
        self.next_arg(from, ArgDelimiter::Brace)
    }

    /// Parse a signature string.
    pub fn parse(signature: &str) -> Result<Self> {
        let invalid = |reason| LatexCoreError::InvalidSignature {
            signature: signature.to_string(),
            reason,
        };

        let text = signature.trim();
        if !text.starts_with('\\') {
            return Err(invalid("must start with a backslash"));
        }

        let mut chars = text.char_indices().skip(1).peekable();
        let mut name_end = 1;
        match chars.peek() {
            Some(&(_, c)) if c.is_ascii_alphabetic() || c == '@' => {
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_alphabetic() || c == '@' {
                        name_end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(&(i, '*')) = chars.peek() {
                    name_end = i + 1;
                    chars.next();
                }
            }
            Some(&(i, c)) => {
                name_end = i + c.len_utf8();
                chars.next();
            }
            None => return Err(invalid("missing command name")),
        }

        let mut name = text[..name_end].to_string();
        let mut rest = &text[name_end..];

        if name == "\\begin" || name == "\\end" {
            if let Some(body) = rest.strip_prefix('{') {
                let close = body.find('}').ok_or_else(|| invalid("unclosed argument"))?;
                let env = body[..close].trim();
                let is_placeholder = matches!(env, "beginenv" | "endenv" | "envname");
                if !is_placeholder && name == "\\begin" {
                    name = format!("\\begin{{{env}}}");
                    rest = &body[close + 1..];
                }
            }
        }

        let mut sig = Self::new(name);
        let mut rest = rest.trim_start();
        while let Some(open) = rest.chars().next() {
            let delimiter = match open {
                '{' => ArgDelimiter::Brace,
                '[' => ArgDelimiter::Square,
                '(' => ArgDelimiter::Paren,
                _ => return Err(invalid("unexpected character between arguments")),
            };
            let body = &rest[1..];
            let close = matching_close(body, delimiter).ok_or_else(|| invalid("unclosed argument"))?;
            let subtype = TokenSubtype::from_placeholder(&body[..close]);
            sig.args.push(ArgSpec::new(delimiter, subtype));
            rest = body[close + 1..].trim_start();
        }

        Ok(sig)
    }
}

fn matching_close(body: &str, delimiter: ArgDelimiter) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        if c == delimiter.open() {
            depth += 1;
        } else if c == delimiter.close() {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section_signature() {
        let sig = CommandSignature::parse("\\section[short title]{title}").unwrap();
        assert_eq!(sig.name, "\\section");
        assert_eq!(sig.args.len(), 2);
        assert_eq!(sig.args[0].delimiter, ArgDelimiter::Square);
        assert_eq!(sig.args[0].subtype, TokenSubtype::ShortTitle);
        assert_eq!(sig.args[1].subtype, TokenSubtype::Title);
        assert_eq!(sig.mandatory_count(), 1);
    }

    #[test]
    fn test_parse_environment_signature() {
        let sig = CommandSignature::parse("\\begin{tabular}[pos]{cols}").unwrap();
        assert_eq!(sig.name, "\\begin{tabular}");
        assert!(sig.is_environment());
        assert_eq!(sig.args[1].subtype, TokenSubtype::ColDef);

        let generic = CommandSignature::parse("\\begin{beginenv}").unwrap();
        assert_eq!(generic.name, "\\begin");
        assert_eq!(generic.args[0].subtype, TokenSubtype::BeginEnv);
    }

    #[test]
    fn test_parse_starred_and_symbol_commands() {
        let sig = CommandSignature::parse("\\section*{title}").unwrap();
        assert_eq!(sig.name, "\\section*");

        let sig = CommandSignature::parse("\\\\[length]").unwrap();
        assert_eq!(sig.name, "\\\\");
        assert!(sig.only_optional_from(0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CommandSignature::parse("section{x}").is_err());
        assert!(CommandSignature::parse("\\section{x").is_err());
        assert!(CommandSignature::parse("\\section x").is_err());
    }

    #[test]
    fn test_next_arg_skips_optional_only() {
        let sig = CommandSignature::parse("\\newcommand{cmd}[args][default]{def}").unwrap();
        assert_eq!(sig.next_arg(1, ArgDelimiter::Brace), Some(3));
        assert_eq!(sig.next_arg(1, ArgDelimiter::Square), Some(1));
        assert_eq!(sig.next_arg(0, ArgDelimiter::Square), None);
    }
}
