//! Per-line lexer.
//!
//! [`lex_line`] turns one line of LaTeX into tokens, given the remainder left by the previous
//! line. It is a pure function of its inputs: re-lexing a single line after an edit is enough, and
//! following lines only need re-lexing when the outgoing remainder differs from the cached one.
//!
//! # Arguments
//!
//! Commands with a [`CommandSignature`](crate::signature::CommandSignature) become *pending* on
//! the token stack. Brackets following a pending command bind to its declared arguments (optional
//! arguments may be skipped, mandatory ones may not) and produce collapsed group tokens
//! ([`TokenKind::Braces`], [`TokenKind::Squares`], [`TokenKind::Parens`]) carrying the argument's
//! [`TokenSubtype`] and the owning command. Tokens inside an argument inherit its subtype; a
//! [`TokenSubtype::Definition`] anywhere on the stack dominates.
//!
//! # Remainder
//!
//! Whatever is open at the end of the line (argument groups, a command still waiting for a
//! mandatory argument, a verbatim environment) is returned as the outgoing remainder. Remainder
//! tokens are normalized to column 0 and length 0, so remainders compare equal iff they describe
//! the same open constructs.

use crate::database::{CommandDatabase, category};
use crate::signature::ArgDelimiter;
use crate::token::{Token, TokenKind, TokenStack, TokenSubtype};
use std::cmp::Reverse;
use std::sync::Arc;

/// Result of lexing one line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LexedLine {
    /// Tokens ordered by start column (longer tokens first on ties).
    pub tokens: Vec<Token>,
    /// Constructs still open at the end of the line.
    pub remainder: TokenStack,
    /// Column of the `%` starting a comment, if any.
    pub comment_start: Option<usize>,
}

/// Lex one line against the remainder of the previous line.
pub fn lex_line(text: &str, incoming: &TokenStack, db: &CommandDatabase) -> LexedLine {
    Lexer {
        text,
        db,
        stack: incoming.clone(),
        tokens: Vec::new(),
        pos: 0,
        comment_start: None,
    }
    .run()
}

struct Lexer<'a> {
    text: &'a str,
    db: &'a CommandDatabase,
    stack: TokenStack,
    tokens: Vec<Token>,
    pos: usize,
    comment_start: Option<usize>,
}

struct Context {
    subtype: TokenSubtype,
    command: Option<Arc<str>>,
    arg_index: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> LexedLine {
        while self.pos < self.text.len() {
            if self.stack.in_verbatim() {
                self.verbatim_environment();
                continue;
            }
            let Some(c) = self.char_at(self.pos) else {
                break;
            };
            match c {
                '%' => {
                    let len = self.text.len() - self.pos;
                    self.emit(Token::new(TokenKind::Comment, self.pos, len));
                    self.comment_start = Some(self.pos);
                    self.pos = self.text.len();
                }
                '\\' => self.command(),
                '{' => self.open_brace(),
                '}' => self.close_brace(),
                '[' => self.open_optional(ArgDelimiter::Square),
                ']' => self.close_optional(ArgDelimiter::Square),
                '(' => self.open_optional(ArgDelimiter::Paren),
                ')' => self.close_optional(ArgDelimiter::Paren),
                '$' => {
                    let len = if self.text[self.pos + 1..].starts_with('$') { 2 } else { 1 };
                    self.plain(TokenKind::Math, len);
                }
                '#' => self.parameter(),
                '&' | '~' | '^' | '_' => self.plain(TokenKind::Symbol, 1),
                c if c.is_whitespace() => self.pos += c.len_utf8(),
                c if c.is_alphanumeric() => {
                    let len = self.text[self.pos..]
                        .char_indices()
                        .find(|(_, c)| !c.is_alphanumeric())
                        .map_or(self.text.len() - self.pos, |(i, _)| i);
                    self.plain(TokenKind::Word, len);
                }
                c => self.plain(TokenKind::Punctuation, c.len_utf8()),
            }
        }
        self.finish()
    }

    fn char_at(&self, at: usize) -> Option<char> {
        self.text.get(at..).and_then(|s| s.chars().next())
    }

    fn context(&self) -> Context {
        let mut definition = false;
        let mut context = Context {
            subtype: TokenSubtype::None,
            command: None,
            arg_index: 0,
        };
        for t in self.stack.iter().filter(|t| t.kind.is_open()) {
            if t.subtype == TokenSubtype::Definition {
                definition = true;
            }
            if t.subtype != TokenSubtype::None {
                context.subtype = t.subtype;
                context.command = t.command.clone();
                context.arg_index = t.arg_index;
            }
        }
        if definition {
            context.subtype = TokenSubtype::Definition;
        }
        context
    }

    /// Push a token, filling in level and the enclosing argument context.
    fn emit(&mut self, mut token: Token) {
        token.level = self.stack.group_depth();
        if token.subtype == TokenSubtype::None && token.command.is_none() {
            let context = self.context();
            token.subtype = context.subtype;
            token.command = context.command;
            token.arg_index = context.arg_index;
        }
        self.tokens.push(token);
    }

    /// Emit a token that does not take part in argument binding.
    fn plain(&mut self, kind: TokenKind, len: usize) {
        self.end_pending();
        self.emit(Token::new(kind, self.pos, len));
        self.pos += len;
    }

    fn end_pending(&mut self) {
        while self.stack.top().is_some_and(|t| t.kind == TokenKind::Command) {
            self.stack.pop();
        }
    }

    /// Bind a bracket to the next matching argument of the pending command.
    ///
    /// Returns the owning command, the argument index and its subtype.
    fn bind_argument(&mut self, delimiter: ArgDelimiter) -> Option<(Arc<str>, usize, TokenSubtype)> {
        let db = self.db;
        let top = self.stack.top_mut()?;
        if top.kind != TokenKind::Command {
            return None;
        }
        let name = top.command.clone()?;
        let sig = db.signature(&name)?;
        let index = sig.next_arg(top.arg_index, delimiter)?;
        top.arg_index = index + 1;
        Some((name, index, sig.args[index].subtype))
    }

    /// The expected subtype of the next mandatory argument of the pending command.
    fn pending_mandatory(&self) -> Option<(Arc<str>, usize, TokenSubtype)> {
        let top = self.stack.top().filter(|t| t.kind == TokenKind::Command)?;
        let name = top.command.clone()?;
        let sig = self.db.signature(&name)?;
        let index = sig.next_mandatory(top.arg_index)?;
        Some((name, index, sig.args[index].subtype))
    }

    fn command(&mut self) {
        let text = self.text;
        let start = self.pos;
        let after = start + 1;
        let mut end = match self.char_at(after) {
            Some(c) if c.is_ascii_alphabetic() || c == '@' => self.text[after..]
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphabetic() || *c == '@'))
                .map_or(self.text.len(), |(i, _)| after + i),
            Some(c) => after + c.len_utf8(),
            None => after,
        };
        if self.text[end..].starts_with('*') {
            let starred = format!("{}*", &self.text[start..end]);
            if self.db.signature(&starred).is_some() || self.db.is_known_command(&starred) {
                end += 1;
            }
        }
        let name = &text[start..end];
        self.pos = end;

        if let Some((owner, index, TokenSubtype::DefinedName)) = self.pending_mandatory() {
            let mut token = Token::new(TokenKind::Command, start, end - start);
            token.subtype = TokenSubtype::DefinedName;
            token.command = Some(owner.clone());
            token.arg_index = index;
            self.emit(token);
            self.advance_pending(index + 1);
            return;
        }

        self.end_pending();
        let context_subtype = self.context().subtype;
        self.emit(Token::new(TokenKind::Command, start, end - start));

        if self.db.in_category(category::VERBATIM, name) {
            self.inline_verbatim();
            return;
        }
        let takes_args = self
            .db
            .signature(name)
            .is_some_and(|sig| !sig.args.is_empty());
        if takes_args {
            let mut pending = Token::new(TokenKind::Command, start, end - start);
            pending.level = self.stack.group_depth();
            pending.command = Some(Arc::from(name));
            if context_subtype == TokenSubtype::Definition {
                pending.subtype = TokenSubtype::Definition;
            }
            self.stack.push(pending);
        }
    }

    /// Move the pending command to argument `next`, dropping it once all arguments are bound.
    fn advance_pending(&mut self, next: usize) {
        let db = self.db;
        let Some(top) = self.stack.top_mut() else {
            return;
        };
        top.arg_index = next;
        let complete = top
            .command
            .as_deref()
            .and_then(|name| db.signature(name))
            .is_none_or(|sig| next >= sig.args.len());
        if complete {
            self.stack.pop();
        }
    }

    /// `\verb<d>...<d>`: everything up to the closing delimiter (or the line end) is verbatim.
    fn inline_verbatim(&mut self) {
        let Some(delimiter) = self.char_at(self.pos) else {
            return;
        };
        if delimiter.is_whitespace() || delimiter.is_ascii_alphabetic() {
            return;
        }
        let body = self.pos + delimiter.len_utf8();
        let end = self.text[body..]
            .find(delimiter)
            .map_or(self.text.len(), |i| body + i + delimiter.len_utf8());
        self.emit(Token::new(TokenKind::Verbatim, self.pos, end - self.pos));
        self.pos = end;
    }

    fn verbatim_environment(&mut self) {
        let env = self
            .stack
            .top()
            .and_then(|t| t.command.clone())
            .unwrap_or_else(|| Arc::from(""));
        let needle = format!("\\end{{{env}}}");
        let rest = &self.text[self.pos..];
        let (len, closed) = match rest.find(&needle) {
            Some(offset) => (offset, true),
            None => (rest.len(), false),
        };
        if len > 0 {
            self.emit(Token::new(TokenKind::Verbatim, self.pos, len));
        }
        self.pos += len;
        if closed {
            self.stack.pop();
        }
    }

    /// `#n` parameter markers; between a definition's name and body they count arguments.
    fn parameter(&mut self) {
        let len = match self.char_at(self.pos + 1) {
            Some(c) if c.is_ascii_digit() => 2,
            _ => 1,
        };
        if len == 2 {
            if let Some((owner, index, TokenSubtype::Definition)) = self.pending_mandatory() {
                let mut token = Token::new(TokenKind::Symbol, self.pos, len);
                token.subtype = TokenSubtype::DefArgCount;
                token.command = Some(owner);
                token.arg_index = index;
                self.emit(token);
                self.pos += len;
                return;
            }
        }
        self.plain(TokenKind::Symbol, len);
    }

    fn open_group(&mut self, kind: TokenKind, binding: Option<(Arc<str>, usize, TokenSubtype)>) {
        let in_definition = self.context().subtype == TokenSubtype::Definition;
        let mut open = Token::new(kind, self.pos, 1);
        open.level = self.stack.group_depth();
        if let Some((owner, index, subtype)) = binding {
            open.subtype = if in_definition {
                TokenSubtype::Definition
            } else {
                subtype
            };
            open.command = Some(owner);
            open.arg_index = index;
        }
        self.stack.push(open);
        self.pos += 1;
    }

    fn open_brace(&mut self) {
        let binding = self.bind_argument(ArgDelimiter::Brace);
        if binding.is_none() {
            self.end_pending();
        }
        self.open_group(TokenKind::OpenBrace, binding);
    }

    fn close_brace(&mut self) {
        let Some(index) = self.stack.position_of_last(TokenKind::OpenBrace) else {
            self.plain(TokenKind::CloseBrace, 1);
            return;
        };
        while self.stack.len() > index + 1 {
            if let Some(inner) = self.stack.pop() {
                if inner.kind.is_open() {
                    self.emit_group(inner, self.pos, false);
                }
            }
        }
        let end = self.pos + 1;
        self.pos = end;
        if let Some(group) = self.stack.pop() {
            self.finish_group(group, end);
        }
    }

    fn open_optional(&mut self, delimiter: ArgDelimiter) {
        let kind = match delimiter {
            ArgDelimiter::Paren => TokenKind::OpenParen,
            _ => TokenKind::OpenSquare,
        };
        match self.bind_argument(delimiter) {
            Some(binding) => self.open_group(kind, Some(binding)),
            None => self.plain(TokenKind::Punctuation, 1),
        }
    }

    fn close_optional(&mut self, delimiter: ArgDelimiter) {
        let kind = match delimiter {
            ArgDelimiter::Paren => TokenKind::OpenParen,
            _ => TokenKind::OpenSquare,
        };
        let innermost = self
            .stack
            .iter()
            .rev()
            .find(|t| t.kind != TokenKind::Command)
            .map(|t| t.kind);
        if innermost != Some(kind) {
            self.plain(TokenKind::Punctuation, 1);
            return;
        }
        self.end_pending();
        let end = self.pos + 1;
        self.pos = end;
        if let Some(group) = self.stack.pop() {
            self.finish_group(group, end);
        }
    }

    /// Close an argument group at `end` and advance its owner.
    fn finish_group(&mut self, open: Token, end: usize) {
        let mut closed = open.clone();
        closed.length = end.saturating_sub(open.start);
        self.emit_group(open, end, true);
        self.after_argument(&closed);
    }

    /// Emit the collapsed token for an argument group ending at `end`.
    fn emit_group(&mut self, open: Token, end: usize, closed: bool) {
        let kind = match open.kind {
            TokenKind::OpenSquare => TokenKind::Squares,
            TokenKind::OpenParen => TokenKind::Parens,
            _ => TokenKind::Braces,
        };
        let opened_here = open.length > 0;
        if end <= open.start {
            return;
        }
        let mut group = Token::new(kind, open.start, end - open.start);
        group.level = open.level;
        group.subtype = open.subtype;
        group.command = open.command.clone();
        group.arg_index = open.arg_index;

        if group.subtype == TokenSubtype::KeyValArg {
            let inner_start = open.start + usize::from(opened_here);
            let inner_end = end - usize::from(closed);
            if inner_start < inner_end {
                self.split_keyvals(&group, inner_start, inner_end);
            }
        }
        self.tokens.push(group);
    }

    /// Split a key-value list into `KeyValKey`/`KeyValValue` tokens.
    fn split_keyvals(&mut self, group: &Token, start: usize, end: usize) {
        let content = &self.text[start..end];
        let mut item_start = 0;
        let mut depth = 0usize;
        let mut items = Vec::new();
        for (i, c) in content.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    items.push((item_start, i));
                    item_start = i + 1;
                }
                _ => {}
            }
        }
        items.push((item_start, content.len()));

        for (from, to) in items {
            let item = &content[from..to];
            let eq = find_top_level(item, '=');
            let (key_part, value_part) = match eq {
                Some(i) => (&item[..i], Some((from + i + 1, &item[i + 1..]))),
                None => (item, None),
            };
            if let Some((offset, len)) = trimmed_span(key_part) {
                self.push_keyval(group, TokenKind::KeyValKey, start + from + offset, len);
            }
            if let Some((value_from, value)) = value_part {
                if let Some((offset, len)) = trimmed_span(value) {
                    self.push_keyval(group, TokenKind::KeyValValue, start + value_from + offset, len);
                }
            }
        }
    }

    fn push_keyval(&mut self, group: &Token, kind: TokenKind, start: usize, len: usize) {
        let mut token = Token::new(kind, start, len);
        token.subtype = TokenSubtype::KeyValArg;
        token.level = group.level + 1;
        token.command = group.command.clone();
        token.arg_index = group.arg_index;
        self.tokens.push(token);
    }

    /// Bookkeeping after an argument group closed.
    fn after_argument(&mut self, group: &Token) {
        let Some(owner) = group.command.as_deref() else {
            return;
        };
        if !self.stack.top().is_some_and(|t| t.belongs_to(owner) && t.kind == TokenKind::Command) {
            return;
        }
        if group.subtype == TokenSubtype::BeginEnv && owner == "\\begin" {
            let env = group.inner_text(self.text).trim().to_string();
            self.stack.pop();
            if self.db.in_category(category::VERBATIM_ENV, &env) {
                let mut verbatim = Token::new(TokenKind::Verbatim, 0, 0);
                verbatim.command = Some(Arc::from(env.as_str()));
                self.stack.push(verbatim);
            } else if self
                .db
                .environment_signature(&env)
                .is_some_and(|sig| !sig.args.is_empty())
            {
                let mut pending = Token::new(TokenKind::Command, group.start, 0);
                pending.level = group.level;
                pending.command = Some(Arc::from(format!("\\begin{{{env}}}").as_str()));
                self.stack.push(pending);
            }
            return;
        }
        let next = self.stack.top().map_or(0, |t| t.arg_index);
        self.advance_pending(next);
    }

    fn finish(mut self) -> LexedLine {
        let end = self.comment_start.unwrap_or(self.text.len());
        let open: Vec<Token> = self
            .stack
            .iter()
            .filter(|t| t.kind.is_open())
            .cloned()
            .collect();
        for group in open {
            self.emit_group(group, end, false);
        }

        let db = self.db;
        while let Some(top) = self.stack.top() {
            if top.kind != TokenKind::Command {
                break;
            }
            let only_optional = top
                .command
                .as_deref()
                .and_then(|name| db.signature(name))
                .is_none_or(|sig| sig.only_optional_from(top.arg_index));
            if !only_optional {
                break;
            }
            self.stack.pop();
        }

        for t in self.stack.as_mut_slice() {
            t.start = 0;
            t.length = 0;
        }
        self.tokens.sort_by_key(|t| (t.start, Reverse(t.length)));

        LexedLine {
            tokens: self.tokens,
            remainder: self.stack,
            comment_start: self.comment_start,
        }
    }
}

fn find_top_level(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == needle && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Offset and length of `text` without surrounding whitespace, or `None` if blank.
fn trimmed_span(text: &str) -> Option<(usize, usize)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let offset = text.len() - text.trim_start().len();
    Some((offset, trimmed.len()))
}
