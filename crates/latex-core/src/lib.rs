#![warn(missing_docs)]
//! LaTeX Core - Incremental LaTeX Structure and Syntax Analysis
//!
//! # Overview
//!
//! `latex-core` is a headless analysis engine for LaTeX sources. It keeps an outline and a set of
//! per-line syntax overlays up to date while a document is edited, doing only as much work as an
//! edit requires.
//!
//! # Core Features
//!
//! - **Per-line Lexing**: each line is lexed against the remainder left by the previous line, so
//!   multi-line arguments and verbatim environments need no whole-document pass
//! - **Command Database**: argument signatures and categories for the LaTeX kernel, packages and
//!   document-level definitions, rebuilt as an immutable value when the package set changes
//! - **Incremental Outline**: sections, includes, labels, TODOs, blocks and magic comments are
//!   re-derived for the edited range only; unaffected outline nodes keep their identity
//! - **Background Checking**: environment nesting, tabular column counts, math context and
//!   command validity are checked on a worker thread, rippling forward only while the
//!   environment stack at line boundaries keeps changing
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  LatexDocument (edits, events, queries)     │  ← Public API
//! ├──────────────────────┬──────────────────────┤
//! │  StructurePatcher    │  SyntaxChecker       │  ← Analysis
//! │  (outline, facts)    │  (worker thread)     │
//! ├──────────────────────┴──────────────────────┤
//! │  Lexer + CommandDatabase                    │  ← Tokens
//! ├─────────────────────────────────────────────┤
//! │  LineBuffer (line handles + cookies)        │  ← Text
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use latex_core::{AnalysisConfig, LatexDocument, NoPackages, StructureKind, SyntaxErrorKind};
//! use std::sync::Arc;
//!
//! let mut doc = LatexDocument::new(AnalysisConfig::default(), Arc::new(NoPackages)).unwrap();
//! doc.load("\\section{Intro}\n\\begin{tabular}{ll}\na & b & c \\\\\n\\end{tabular}");
//! doc.wait_for_checker();
//!
//! let outline = doc.outline();
//! assert_eq!(outline[0].kind, StructureKind::Section);
//! assert_eq!(outline[0].title, "Intro");
//!
//! let errors = doc.errors(2).unwrap();
//! assert_eq!(errors[0].kind, SyntaxErrorKind::TooManyColumns);
//! ```
//!
//! # Module Description
//!
//! - [`token`] - Token model and the token stack carried across lines
//! - [`lexer`] - Per-line lexer
//! - [`signature`] - Command argument signatures
//! - [`database`] - Command database
//! - [`package`] - Package descriptions and providers
//! - [`buffer`] - Line handles, cookies and the shared line buffer
//! - [`structure`] - Outline tree
//! - [`patcher`] - Incremental structure patcher
//! - [`checker`] - Background syntax checker
//! - [`document`] - Document facade
//!
//! # Columns
//!
//! All columns and lengths are byte offsets into the line text.

pub mod buffer;
mod builtin;
pub mod checker;
pub mod config;
pub mod database;
pub mod document;
pub mod environment;
pub mod error;
pub mod lexer;
pub mod overlay;
pub mod package;
pub mod patcher;
pub mod signature;
pub mod structure;
pub mod token;

pub use buffer::{CookieKind, LineBuffer, LineCookies, LineHandle, LineId, LineSource, LineState};
pub use checker::{CheckRequest, CheckerEvent, CheckerListener, LineContext, SyntaxChecker, check_line};
pub use config::AnalysisConfig;
pub use database::{CommandDatabase, DefinitionKind, UserDefinition, category};
pub use document::{DocumentEvent, DocumentEventCallback, LatexDocument};
pub use environment::{Environment, StackEnvironment};
pub use error::{LatexCoreError, Result};
pub use lexer::{LexedLine, lex_line};
pub use overlay::{SyntaxError, SyntaxErrorKind};
pub use package::{LatexPackage, NoPackages, PackageProvider, StaticPackages, resolve_packages};
pub use patcher::{Occurrence, PatchOutcome, StructurePatcher, UsedPackage};
pub use signature::{ArgDelimiter, ArgSpec, CommandSignature};
pub use structure::{
    ContextFlags, OutlineItem, OverviewCategory, StructureEntry, StructureEvent, StructureId,
    StructureKind, StructureTree,
};
pub use token::{Token, TokenKind, TokenList, TokenStack, TokenSubtype};
