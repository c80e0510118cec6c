//! Document facade.
//!
//! [`LatexDocument`] ties the line buffer, the structure patcher and the syntax checker together
//! and drives them the way an editor would: every edit is applied to the buffer, the touched range
//! is patched synchronously, and the scanned lines are queued for checking on the worker thread.

use crate::buffer::{LineBuffer, LineHandle, LineSource};
use crate::checker::{CheckerEvent, SyntaxChecker};
use crate::config::AnalysisConfig;
use crate::database::CommandDatabase;
use crate::error::Result;
use crate::overlay::SyntaxError;
use crate::package::PackageProvider;
use crate::patcher::{PatchOutcome, StructurePatcher};
use crate::structure::{OutlineItem, StructureEvent, StructureTree};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Changes observers of a [`LatexDocument`] are told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// The outline changed.
    Structure(StructureEvent),
    /// Packages or user definitions changed; completion lists need refreshing.
    CompleterNeedsUpdate,
    /// The set of bibliography files changed.
    BibliographyFilesChanged,
    /// A new command database was published to the checker.
    CommandDatabaseChanged,
}

/// Document event callback type.
pub type DocumentEventCallback = Box<dyn FnMut(&DocumentEvent) + Send>;

/// An analyzed LaTeX document.
///
/// # Example
///
/// ```rust
/// use latex_core::{AnalysisConfig, LatexDocument, NoPackages};
/// use std::sync::Arc;
///
/// let mut doc = LatexDocument::new(AnalysisConfig::default(), Arc::new(NoPackages)).unwrap();
/// doc.load("\\section{Intro}\n\\begin{equation}\nx = 1");
/// doc.wait_for_checker();
///
/// assert_eq!(doc.outline()[0].title, "Intro");
/// assert_eq!(doc.all_errors().len(), 1);
/// ```
pub struct LatexDocument {
    buffer: LineBuffer,
    patcher: StructurePatcher,
    checker: Option<SyntaxChecker>,
    callbacks: Vec<DocumentEventCallback>,
}

impl LatexDocument {
    /// Create an empty document over the built-in database.
    pub fn new(config: AnalysisConfig, provider: Arc<dyn PackageProvider>) -> Result<Self> {
        Self::with_base(config, Arc::new(CommandDatabase::builtin()), provider)
    }

    /// Create an empty document over a custom base database.
    pub fn with_base(
        config: AnalysisConfig,
        base: Arc<CommandDatabase>,
        provider: Arc<dyn PackageProvider>,
    ) -> Result<Self> {
        let buffer = LineBuffer::new();
        let patcher = StructurePatcher::new(config.clone(), base, provider)?;
        let checker = if config.syntax_check {
            Some(SyntaxChecker::spawn(
                Arc::new(buffer.clone()),
                patcher.database(),
                &config,
            )?)
        } else {
            None
        };
        Ok(Self {
            buffer,
            patcher,
            checker,
            callbacks: Vec::new(),
        })
    }

    /// Subscribe to document events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&DocumentEvent) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Receive checker events on the worker thread.
    pub fn set_checker_listener(&self, listener: impl Fn(&CheckerEvent) + Send + Sync + 'static) {
        if let Some(checker) = &self.checker {
            checker.set_listener(listener);
        }
    }

    /// Replace the whole content and analyze it from scratch.
    pub fn load(&mut self, text: &str) {
        let old = self.buffer.handles();
        self.buffer.set_text(text);
        self.patcher.lines_removed(&old);

        let line_count = self.buffer.line_count();
        let first = self.patcher.patch(&self.buffer, 0, line_count);
        self.emit_structure();
        let mut bibliography_changed = first.bibliography_changed;
        if first.rerun_suggested {
            debug!("packages or definitions found, re-patching document");
            let second = self.patcher.patch(&self.buffer, 0, line_count);
            self.emit_structure();
            bibliography_changed |= second.bibliography_changed;
            self.notify(&DocumentEvent::CompleterNeedsUpdate);
        }
        if let Some(checker) = &self.checker {
            checker.publish_database(self.patcher.database());
            checker.recheck(0, line_count);
        }
        self.notify(&DocumentEvent::CommandDatabaseChanged);
        if bibliography_changed {
            self.notify(&DocumentEvent::BibliographyFilesChanged);
        }
    }

    /// Insert lines before `index`.
    pub fn insert_lines(&mut self, index: usize, texts: &[&str]) -> Result<()> {
        self.buffer.insert_lines(index, texts)?;
        self.after_edit(index, texts.len(), &[]);
        Ok(())
    }

    /// Remove `count` lines starting at `start`.
    pub fn remove_lines(&mut self, start: usize, count: usize) -> Result<()> {
        let removed = self.buffer.remove_lines(start, count)?;
        self.after_edit(start, 1, &removed);
        Ok(())
    }

    /// Replace the text of one line.
    pub fn replace_line(&mut self, index: usize, text: &str) -> Result<()> {
        self.buffer.replace_line(index, text)?;
        self.after_edit(index, 1, &[]);
        Ok(())
    }

    /// Replace `count` lines at `start` with `texts`.
    pub fn replace_lines(&mut self, start: usize, count: usize, texts: &[&str]) -> Result<()> {
        let removed = self.buffer.replace_lines(start, count, texts)?;
        self.after_edit(start, texts.len(), &removed);
        Ok(())
    }

    fn after_edit(&mut self, start: usize, count: usize, removed: &[LineHandle]) {
        self.patcher.lines_removed(removed);
        let outcome = self.patcher.patch(&self.buffer, start, count);
        self.emit_structure();
        if outcome.rerun_suggested {
            self.rerun();
        } else if let Some(checker) = &self.checker {
            checker.recheck(outcome.scanned.start, outcome.scanned.len());
        }
        if outcome.bibliography_changed {
            self.notify(&DocumentEvent::BibliographyFilesChanged);
        }
    }

    /// The database changed: re-patch everything, publish it, and re-check every line.
    fn rerun(&mut self) {
        let line_count = self.buffer.line_count();
        debug!(line_count, "command database changed, re-analyzing document");
        let PatchOutcome {
            bibliography_changed,
            ..
        } = self.patcher.patch(&self.buffer, 0, line_count);
        self.emit_structure();
        if let Some(checker) = &self.checker {
            checker.publish_database(self.patcher.database());
            checker.recheck(0, line_count);
        }
        self.notify(&DocumentEvent::CompleterNeedsUpdate);
        self.notify(&DocumentEvent::CommandDatabaseChanged);
        if bibliography_changed {
            self.notify(&DocumentEvent::BibliographyFilesChanged);
        }
    }

    fn emit_structure(&mut self) {
        for event in self.patcher.take_events() {
            self.notify(&DocumentEvent::Structure(event));
        }
    }

    fn notify(&mut self, event: &DocumentEvent) {
        for callback in &mut self.callbacks {
            callback(event);
        }
    }

    /// Block until the checker has processed every queued line.
    pub fn wait_for_checker(&self) {
        if let Some(checker) = &self.checker {
            checker.wait_idle();
        }
    }

    /// Like [`wait_for_checker`](Self::wait_for_checker) with a timeout.
    pub fn wait_for_checker_timeout(&self, timeout: Duration) -> bool {
        self.checker
            .as_ref()
            .is_none_or(|checker| checker.wait_idle_timeout(timeout))
    }

    /// Errors of one line (highlight markers excluded).
    pub fn errors(&self, line: usize) -> Result<Vec<SyntaxError>> {
        let handle = self.line(line)?;
        Ok(handle.overlay().into_iter().filter(SyntaxError::is_error).collect())
    }

    /// The whole overlay of one line, highlight markers included.
    pub fn overlay(&self, line: usize) -> Result<Vec<SyntaxError>> {
        Ok(self.line(line)?.overlay())
    }

    /// All errors with their line index, in document order.
    pub fn all_errors(&self) -> Vec<(usize, SyntaxError)> {
        self.buffer
            .handles()
            .into_iter()
            .enumerate()
            .flat_map(|(index, line)| {
                line.overlay()
                    .into_iter()
                    .filter(SyntaxError::is_error)
                    .map(move |e| (index, e))
            })
            .collect()
    }

    fn line(&self, index: usize) -> Result<LineHandle> {
        self.buffer
            .line(index)
            .ok_or(crate::error::LatexCoreError::LineOutOfRange {
                index,
                line_count: self.buffer.line_count(),
            })
    }

    /// The outline in display order.
    pub fn outline(&self) -> Vec<OutlineItem> {
        self.patcher.tree().outline()
    }

    /// The outline tree.
    pub fn tree(&self) -> &StructureTree {
        self.patcher.tree()
    }

    /// The structure patcher, for fact queries (labels, packages, definitions, ...).
    pub fn patcher(&self) -> &StructurePatcher {
        &self.patcher
    }

    /// The current command database.
    pub fn database(&self) -> Arc<CommandDatabase> {
        self.patcher.database()
    }

    /// The line buffer.
    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.buffer.to_text()
    }
}
