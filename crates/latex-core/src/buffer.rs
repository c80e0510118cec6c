//! Line handles, per-line cookies and the line buffer.
//!
//! A [`LineHandle`] is a reference-counted line. Derived data (tokens, remainder, checker
//! environment snapshot, syntax overlay) lives next to the text in the line's cookies, guarded by
//! a per-line read/write lock; that lock is the only synchronization between the edit path and the
//! checker worker.
//!
//! Every text change bumps the line's *ticket*. Asynchronous results stamped with an older ticket
//! are stale and get discarded. Removing a line marks it removed and bumps the ticket, so queued
//! work holding a clone of the handle is discarded the same way.

use crate::environment::StackEnvironment;
use crate::error::{LatexCoreError, Result};
use crate::overlay::SyntaxError;
use crate::token::{TokenList, TokenStack};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_LINE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a line, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(u64);

impl LineId {
    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Names of the cookie slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieKind {
    /// Lexer output.
    Tokens,
    /// Outgoing lexer remainder.
    Remainder,
    /// Outgoing checker environment stack.
    Environments,
    /// Column of the comment start.
    CommentStart,
    /// Syntax error overlay.
    Overlay,
}

/// Derived per-line data.
#[derive(Debug, Clone, Default)]
pub struct LineCookies {
    /// Tokens of the line, as produced by the last lex.
    pub tokens: Option<TokenList>,
    /// Remainder left at the end of the line.
    pub remainder: Option<TokenStack>,
    /// Environment stack at the end of the line, as computed by the checker.
    pub environments: Option<StackEnvironment>,
    /// Column of the `%` starting a comment.
    pub comment_start: Option<usize>,
    /// Syntax errors and highlight markers.
    pub overlay: Vec<SyntaxError>,
}

impl LineCookies {
    /// Returns `true` if the slot holds a value.
    pub fn has(&self, kind: CookieKind) -> bool {
        match kind {
            CookieKind::Tokens => self.tokens.is_some(),
            CookieKind::Remainder => self.remainder.is_some(),
            CookieKind::Environments => self.environments.is_some(),
            CookieKind::CommentStart => self.comment_start.is_some(),
            CookieKind::Overlay => !self.overlay.is_empty(),
        }
    }

    /// Empty the slot.
    pub fn clear(&mut self, kind: CookieKind) {
        match kind {
            CookieKind::Tokens => self.tokens = None,
            CookieKind::Remainder => self.remainder = None,
            CookieKind::Environments => self.environments = None,
            CookieKind::CommentStart => self.comment_start = None,
            CookieKind::Overlay => self.overlay.clear(),
        }
    }
}

/// Text and cookies of a line.
#[derive(Debug, Default)]
pub struct LineState {
    /// Line text without the line terminator.
    pub text: String,
    /// Derived data.
    pub cookies: LineCookies,
}

#[derive(Debug)]
struct Line {
    id: LineId,
    ticket: AtomicU64,
    removed: AtomicBool,
    state: RwLock<LineState>,
}

/// A shared, reference-counted line.
#[derive(Debug, Clone)]
pub struct LineHandle(Arc<Line>);

impl LineHandle {
    /// Create a detached line.
    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::new(Line {
            id: LineId(NEXT_LINE_ID.fetch_add(1, Ordering::Relaxed)),
            ticket: AtomicU64::new(0),
            removed: AtomicBool::new(false),
            state: RwLock::new(LineState {
                text: text.into(),
                cookies: LineCookies::default(),
            }),
        }))
    }

    /// Stable line id.
    pub fn id(&self) -> LineId {
        self.0.id
    }

    /// Current edit ticket.
    pub fn ticket(&self) -> u64 {
        self.0.ticket.load(Ordering::Acquire)
    }

    /// Advance the edit ticket, invalidating queued asynchronous work.
    pub fn bump_ticket(&self) -> u64 {
        self.0.ticket.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns `true` once the line was removed from its buffer.
    pub fn is_removed(&self) -> bool {
        self.0.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.0.removed.store(true, Ordering::Release);
        self.bump_ticket();
    }

    /// A copy of the line text.
    pub fn text(&self) -> String {
        self.0.state.read().text.clone()
    }

    /// Replace the text and bump the ticket. Cookies are kept until the line is re-analyzed.
    pub fn set_text(&self, text: impl Into<String>) {
        let mut state = self.0.state.write();
        state.text = text.into();
        self.bump_ticket();
    }

    /// Read access to text and cookies.
    pub fn read(&self) -> RwLockReadGuard<'_, LineState> {
        self.0.state.read()
    }

    /// Write access to text and cookies.
    pub fn write(&self) -> RwLockWriteGuard<'_, LineState> {
        self.0.state.write()
    }

    /// Returns `true` if the cookie slot holds a value.
    pub fn has_cookie(&self, kind: CookieKind) -> bool {
        self.0.state.read().cookies.has(kind)
    }

    /// Empty a cookie slot.
    pub fn clear_cookie(&self, kind: CookieKind) {
        self.0.state.write().cookies.clear(kind);
    }

    /// Cached tokens.
    pub fn tokens(&self) -> Option<TokenList> {
        self.0.state.read().cookies.tokens.clone()
    }

    /// Cached outgoing remainder.
    pub fn remainder(&self) -> Option<TokenStack> {
        self.0.state.read().cookies.remainder.clone()
    }

    /// Cached outgoing environment stack.
    pub fn environments(&self) -> Option<StackEnvironment> {
        self.0.state.read().cookies.environments.clone()
    }

    /// Current overlay.
    pub fn overlay(&self) -> Vec<SyntaxError> {
        self.0.state.read().cookies.overlay.clone()
    }

    /// Returns `true` if both handles refer to the same line.
    pub fn ptr_eq(&self, other: &LineHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for LineHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for LineHandle {}

impl std::hash::Hash for LineHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// Read access to an ordered set of lines.
pub trait LineSource: Send + Sync {
    /// Number of lines.
    fn line_count(&self) -> usize;

    /// The line at `index`.
    fn line(&self, index: usize) -> Option<LineHandle>;

    /// Current index of `handle`, searching near `hint` first.
    fn index_of(&self, handle: &LineHandle, hint: Option<usize>) -> Option<usize>;
}

/// A vector of lines shared between the edit path and the checker worker.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    lines: Arc<RwLock<Vec<LineHandle>>>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `text` split into lines.
    pub fn from_text(text: &str) -> Self {
        let buffer = Self::new();
        buffer.set_text(text);
        buffer
    }

    /// Replace the whole content. All previous lines are marked removed.
    pub fn set_text(&self, text: &str) {
        let new_lines: Vec<LineHandle> = split_lines(text).map(LineHandle::new).collect();
        let old = std::mem::replace(&mut *self.lines.write(), new_lines);
        for line in old {
            line.mark_removed();
        }
    }

    /// All line handles.
    pub fn handles(&self) -> Vec<LineHandle> {
        self.lines.read().clone()
    }

    /// Text of the line at `index`.
    pub fn text(&self, index: usize) -> Result<String> {
        self.checked_line(index).map(|line| line.text())
    }

    /// The whole content joined with `\n`.
    pub fn to_text(&self) -> String {
        let lines = self.lines.read();
        let mut out = String::new();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&line.read().text);
        }
        out
    }

    /// Insert lines before `index` (`index == line_count` appends).
    pub fn insert_lines(&self, index: usize, texts: &[&str]) -> Result<Vec<LineHandle>> {
        let mut lines = self.lines.write();
        if index > lines.len() {
            return Err(LatexCoreError::LineOutOfRange {
                index,
                line_count: lines.len(),
            });
        }
        let inserted: Vec<LineHandle> = texts.iter().map(|t| LineHandle::new(*t)).collect();
        lines.splice(index..index, inserted.iter().cloned());
        Ok(inserted)
    }

    /// Remove `count` lines starting at `start` and return them (marked removed).
    pub fn remove_lines(&self, start: usize, count: usize) -> Result<Vec<LineHandle>> {
        let mut lines = self.lines.write();
        let end = start.saturating_add(count);
        if end > lines.len() {
            return Err(LatexCoreError::LineOutOfRange {
                index: end.saturating_sub(1),
                line_count: lines.len(),
            });
        }
        let removed: Vec<LineHandle> = lines.drain(start..end).collect();
        for line in &removed {
            line.mark_removed();
        }
        Ok(removed)
    }

    /// Replace the text of one line, keeping its identity.
    pub fn replace_line(&self, index: usize, text: &str) -> Result<LineHandle> {
        let line = self.checked_line(index)?;
        line.set_text(text);
        Ok(line)
    }

    /// Replace `count` lines at `start` with `texts`.
    ///
    /// Lines are updated in place where both ranges overlap; the rest is inserted or removed.
    /// Returns the removed lines.
    pub fn replace_lines(&self, start: usize, count: usize, texts: &[&str]) -> Result<Vec<LineHandle>> {
        let shared = count.min(texts.len());
        {
            let lines = self.lines.read();
            if start.saturating_add(count) > lines.len() {
                return Err(LatexCoreError::LineOutOfRange {
                    index: start.saturating_add(count).saturating_sub(1),
                    line_count: lines.len(),
                });
            }
            for (offset, text) in texts.iter().take(shared).enumerate() {
                lines[start + offset].set_text(*text);
            }
        }
        if texts.len() > shared {
            self.insert_lines(start + shared, &texts[shared..])?;
            Ok(Vec::new())
        } else {
            self.remove_lines(start + shared, count - shared)
        }
    }

    fn checked_line(&self, index: usize) -> Result<LineHandle> {
        let lines = self.lines.read();
        lines
            .get(index)
            .cloned()
            .ok_or(LatexCoreError::LineOutOfRange {
                index,
                line_count: lines.len(),
            })
    }
}

impl LineSource for LineBuffer {
    fn line_count(&self) -> usize {
        self.lines.read().len()
    }

    fn line(&self, index: usize) -> Option<LineHandle> {
        self.lines.read().get(index).cloned()
    }

    fn index_of(&self, handle: &LineHandle, hint: Option<usize>) -> Option<usize> {
        if handle.is_removed() {
            return None;
        }
        let lines = self.lines.read();
        let hint = hint.unwrap_or(0).min(lines.len().saturating_sub(1));
        for distance in 0..=8usize {
            for candidate in [hint.checked_add(distance), hint.checked_sub(distance)]
                .into_iter()
                .flatten()
            {
                if lines.get(candidate).is_some_and(|l| l.ptr_eq(handle)) {
                    return Some(candidate);
                }
            }
        }
        lines.iter().position(|l| l.ptr_eq(handle))
    }
}

/// Split text into lines on `\n`, dropping a trailing `\r`.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edits_keep_identity_and_bump_tickets() {
        let buffer = LineBuffer::from_text("a\nb\nc");
        assert_eq!(buffer.line_count(), 3);
        let b = buffer.line(1).unwrap();
        let ticket = b.ticket();

        buffer.replace_line(1, "B").unwrap();
        assert!(b.ticket() > ticket);
        assert_eq!(b.text(), "B");

        buffer.insert_lines(0, &["x"]).unwrap();
        assert_eq!(buffer.index_of(&b, Some(1)), Some(2));

        let removed = buffer.remove_lines(2, 1).unwrap();
        assert!(removed[0].is_removed());
        assert_eq!(buffer.index_of(&b, None), None);
        assert_eq!(buffer.to_text(), "x\na\nc");
    }

    #[test]
    fn test_replace_lines_grows_and_shrinks() {
        let buffer = LineBuffer::from_text("a\nb\nc");
        let first = buffer.line(0).unwrap();
        buffer.replace_lines(0, 2, &["1", "2", "3"]).unwrap();
        assert_eq!(buffer.to_text(), "1\n2\n3\nc");
        assert!(buffer.line(0).unwrap().ptr_eq(&first));

        let removed = buffer.replace_lines(1, 3, &["z"]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(buffer.to_text(), "1\nz");
    }

    #[test]
    fn test_out_of_range_edits_fail() {
        let buffer = LineBuffer::from_text("a");
        assert!(buffer.insert_lines(3, &["x"]).is_err());
        assert!(buffer.remove_lines(0, 2).is_err());
        assert!(buffer.replace_line(1, "x").is_err());
    }

    #[test]
    fn test_cookies_can_be_cleared() {
        let line = LineHandle::new("x");
        line.write().cookies.remainder = Some(TokenStack::new());
        assert!(line.has_cookie(CookieKind::Remainder));
        line.clear_cookie(CookieKind::Remainder);
        assert!(!line.has_cookie(CookieKind::Remainder));
    }
}
