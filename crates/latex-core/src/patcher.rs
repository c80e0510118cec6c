//! Incremental structure patcher.
//!
//! [`StructurePatcher::patch`] re-derives the outline for an edited line range:
//!
//! 1. walk backward (bounded by [`AnalysisConfig::back_search_limit`]) while the previous line
//!    ends inside an open construct, so a construct is always re-read from its first line;
//! 2. re-lex the range, extending it while a line's outgoing remainder differs from the cached one;
//! 3. extract per-line facts (packages, definitions, labels, references, bibliography) and outline
//!    entries (sections, includes, labels, TODOs, blocks, magic comments, bibliography items);
//! 4. recompute the `\appendix` / `\end{document}` sentinels;
//! 5. merge the new entries into the tree, keeping the identity of unaffected and matching nodes;
//! 6. rebuild the command database when the package or definition set changed.
//!
//! The rebuilt database is reported through [`PatchOutcome::rerun_suggested`]: lines lexed before
//! the change may need another pass, and the checker needs the new database.

use crate::buffer::{LineHandle, LineId, LineSource};
use crate::config::AnalysisConfig;
use crate::database::{CommandDatabase, DefinitionKind, UserDefinition, category};
use crate::error::Result;
use crate::lexer::lex_line;
use crate::package::{PackageProvider, resolve_packages};
use crate::structure::{
    ContextFlags, OverviewCategory, StructureEntry, StructureEvent, StructureId, StructureKind,
    StructureTree,
};
use crate::token::{Token, TokenKind, TokenStack, TokenSubtype};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace};

/// What a call to [`StructurePatcher::patch`] did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchOutcome {
    /// The package or definition set changed and the command database was rebuilt.
    pub rerun_suggested: bool,
    /// The set of bibliography files changed.
    pub bibliography_changed: bool,
    /// Lines that were re-lexed and re-extracted.
    pub scanned: Range<usize>,
}

/// A package loaded by `\usepackage` (or a document class, as `class-<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsedPackage {
    /// Package name.
    pub name: String,
    /// Options given in the optional argument.
    pub options: Vec<String>,
}

/// A label or reference occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// The label name.
    pub name: String,
    /// Line holding it.
    pub line: LineHandle,
    /// Column of the command.
    pub column: usize,
}

#[derive(Debug, Clone, Default)]
struct LineFacts {
    line_index: usize,
    packages: Vec<UsedPackage>,
    definitions: Vec<UserDefinition>,
    labels: Vec<(String, usize)>,
    references: Vec<(String, usize)>,
    bib_items: Vec<String>,
    bib_files: Vec<String>,
    includes: Vec<String>,
    appendix: Option<usize>,
    end_document: Option<usize>,
}

impl LineFacts {
    fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.definitions.is_empty()
            && self.labels.is_empty()
            && self.references.is_empty()
            && self.bib_items.is_empty()
            && self.bib_files.is_empty()
            && self.includes.is_empty()
            && self.appendix.is_none()
            && self.end_document.is_none()
    }
}

#[derive(Debug, Clone)]
struct Extracted {
    kind: StructureKind,
    category: Option<OverviewCategory>,
    title: String,
    level: i32,
    column: usize,
    line: LineHandle,
    line_index: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sentinels {
    appendix: Option<(usize, usize)>,
    end_document: Option<(usize, usize)>,
}

impl Sentinels {
    fn flags(&self, line: usize, column: usize) -> ContextFlags {
        ContextFlags {
            in_appendix: self.appendix.is_some_and(|a| (line, column) > a),
            beyond_end: self.end_document.is_some_and(|e| (line, column) > e),
        }
    }
}

/// Maintains the outline, per-line facts and the command database of one document.
pub struct StructurePatcher {
    config: AnalysisConfig,
    todo_pattern: Regex,
    magic_pattern: Regex,
    base: Arc<CommandDatabase>,
    provider: Arc<dyn PackageProvider>,
    database: Arc<CommandDatabase>,
    tree: StructureTree,
    facts: HashMap<LineId, (LineHandle, LineFacts)>,
    packages: BTreeSet<String>,
    definitions: BTreeSet<UserDefinition>,
    bib_files: BTreeSet<String>,
    sentinels: Sentinels,
}

impl StructurePatcher {
    /// Create a patcher over a base database and a package provider.
    pub fn new(
        config: AnalysisConfig,
        base: Arc<CommandDatabase>,
        provider: Arc<dyn PackageProvider>,
    ) -> Result<Self> {
        let (todo_pattern, magic_pattern) = config.compile_patterns()?;
        let packages: BTreeSet<String> = config.inherited_packages.iter().cloned().collect();
        let mut patcher = Self {
            config,
            todo_pattern,
            magic_pattern,
            database: Arc::clone(&base),
            base,
            provider,
            tree: StructureTree::new(),
            facts: HashMap::new(),
            packages,
            definitions: BTreeSet::new(),
            bib_files: BTreeSet::new(),
            sentinels: Sentinels::default(),
        };
        patcher.rebuild_database();
        Ok(patcher)
    }

    /// The current command database.
    pub fn database(&self) -> Arc<CommandDatabase> {
        Arc::clone(&self.database)
    }

    /// The outline tree.
    pub fn tree(&self) -> &StructureTree {
        &self.tree
    }

    /// Drain the structural change events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<StructureEvent> {
        self.tree.take_events()
    }

    /// Forget the facts of removed lines. Their outline entries go away on the next patch.
    pub fn lines_removed(&mut self, removed: &[LineHandle]) {
        for line in removed {
            self.facts.remove(&line.id());
        }
        trace!(count = removed.len(), "purged facts of removed lines");
    }

    /// Re-analyze `count` lines starting at `start`.
    pub fn patch(&mut self, lines: &dyn LineSource, start: usize, count: usize) -> PatchOutcome {
        let line_count = lines.line_count();
        self.refresh_positions(lines);
        if line_count == 0 {
            self.merge_sections(lines, 0..0, Vec::new());
            for category in OverviewCategory::ALL {
                self.merge_overview(category, 0..0, Vec::new());
            }
            self.tree.sync_overviews();
            return self.finish(0..0);
        }

        let start = start.min(line_count - 1);
        let mut end = start.saturating_add(count.max(1)).min(line_count);

        let mut scan_start = start;
        let mut steps = 0;
        while scan_start > 0 && steps < self.config.back_search_limit {
            let open = lines
                .line(scan_start - 1)
                .and_then(|l| l.remainder())
                .is_some_and(|r| !r.is_empty());
            if !open {
                break;
            }
            scan_start -= 1;
            steps += 1;
        }

        let db = Arc::clone(&self.database);
        let mut incoming = if scan_start == 0 {
            TokenStack::new()
        } else {
            lines
                .line(scan_start - 1)
                .and_then(|l| l.remainder())
                .unwrap_or_default()
        };
        let mut index = scan_start;
        while index < end {
            let Some(line) = lines.line(index) else {
                break;
            };
            let (remainder, changed) = relex(&line, &incoming, &db);
            incoming = remainder;
            if index + 1 == end && changed && end < line_count {
                end += 1;
            }
            index += 1;
        }
        let range = scan_start..end;
        debug!(
            start,
            count,
            scan_start,
            scan_end = end,
            "patching structure"
        );

        let mut sections = Vec::new();
        let mut overviews: HashMap<OverviewCategory, Vec<Extracted>> = HashMap::new();
        for index in range.clone() {
            let Some(line) = lines.line(index) else {
                continue;
            };
            let (facts, found) = self.extract_line(lines, index, &line, &db);
            if facts.is_empty() {
                self.facts.remove(&line.id());
            } else {
                self.facts.insert(line.id(), (line.clone(), facts));
            }
            for entry in found {
                match entry.category {
                    Some(category) => overviews.entry(category).or_default().push(entry),
                    None => sections.push(entry),
                }
            }
        }

        self.sentinels = self.compute_sentinels(lines);
        self.merge_sections(lines, range.clone(), sections);
        for category in OverviewCategory::ALL {
            let new = overviews.remove(&category).unwrap_or_default();
            self.merge_overview(category, range.clone(), new);
        }
        self.refresh_context_flags();
        self.tree.sync_overviews();

        self.finish(range)
    }

    fn finish(&mut self, scanned: Range<usize>) -> PatchOutcome {
        let mut packages: BTreeSet<String> = self.config.inherited_packages.iter().cloned().collect();
        let mut definitions = BTreeSet::new();
        let mut bib_files = BTreeSet::new();
        for (_, facts) in self.facts.values() {
            packages.extend(facts.packages.iter().map(|p| p.name.clone()));
            definitions.extend(facts.definitions.iter().cloned());
            bib_files.extend(facts.bib_files.iter().cloned());
        }

        let rerun_suggested = packages != self.packages || definitions != self.definitions;
        if rerun_suggested {
            self.packages = packages;
            self.definitions = definitions;
            self.rebuild_database();
        }
        let bibliography_changed = bib_files != self.bib_files;
        self.bib_files = bib_files;

        PatchOutcome {
            rerun_suggested,
            bibliography_changed,
            scanned,
        }
    }

    fn rebuild_database(&mut self) {
        let resolved = resolve_packages(
            self.provider.as_ref(),
            self.packages.iter().map(String::as_str),
        );
        let db = CommandDatabase::assemble(&self.base, resolved.iter(), self.definitions.iter());
        debug!(
            packages = resolved.len(),
            definitions = self.definitions.len(),
            "rebuilt command database"
        );
        self.database = Arc::new(db);
    }

    /// Resolve the current line index of every entry, carrying the shift of the previous entry
    /// as the search hint.
    fn refresh_positions(&mut self, lines: &dyn LineSource) {
        let mut delta: isize = 0;
        for id in self.tree.descendants(self.tree.root()) {
            if self.tree.is_overview(id) {
                continue;
            }
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            let Some(line) = entry.line.clone() else {
                continue;
            };
            let cached = entry.cached_line;
            let hint = (cached as isize + delta).max(0) as usize;
            if let Some(index) = lines.index_of(&line, Some(hint)) {
                delta = index as isize - cached as isize;
                if let Some(entry) = self.tree.get_mut_silent(id) {
                    entry.cached_line = index;
                }
            }
        }
    }

    fn compute_sentinels(&self, lines: &dyn LineSource) -> Sentinels {
        let mut sentinels = Sentinels::default();
        for (line, facts) in self.facts.values() {
            let Some(index) = lines.index_of(line, Some(facts.line_index)) else {
                continue;
            };
            if let Some(column) = facts.appendix {
                let at = (index, column);
                if sentinels.appendix.is_none_or(|a| at < a) {
                    sentinels.appendix = Some(at);
                }
            }
            if let Some(column) = facts.end_document {
                let at = (index, column);
                if sentinels.end_document.is_none_or(|e| at < e) {
                    sentinels.end_document = Some(at);
                }
            }
        }
        sentinels
    }

    fn refresh_context_flags(&mut self) {
        for id in self.tree.descendants(self.tree.root()) {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            if entry.line.is_none() {
                continue;
            }
            let flags = self.sentinels.flags(entry.cached_line, entry.column);
            if entry.context != flags {
                self.tree.update(id, |e| e.context = flags);
            }
        }
    }

    /// Merge new section/include entries into the tree (depth-first walk of the old tree).
    fn merge_sections(&mut self, lines: &dyn LineSource, range: Range<usize>, new: Vec<Extracted>) {
        let root = self.tree.root();
        let old: Vec<StructureId> = self
            .tree
            .descendants(root)
            .into_iter()
            .filter(|id| {
                !self.tree.is_overview(*id)
                    && self.tree.get(*id).is_some_and(|e| e.category.is_none())
            })
            .collect();

        let mut parents: Vec<(i32, StructureId)> = Vec::new();
        let mut pending = new.into_iter().peekable();
        for id in old {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            let position = entry
                .line
                .as_ref()
                .and_then(|l| lines.index_of(l, Some(entry.cached_line)));
            let Some(line_index) = position else {
                self.tree.remove_splice(id);
                continue;
            };
            if line_index < range.start {
                self.place(id, &mut parents);
                continue;
            }
            while let Some(next) = pending.next_if(|n| n.line_index < line_index) {
                self.insert_section(next, &mut parents);
            }
            if line_index < range.end {
                match pending.next_if(|n| n.line_index == line_index) {
                    Some(next) => {
                        let flags = self.sentinels.flags(next.line_index, next.column);
                        self.tree.update(id, |e| {
                            e.kind = next.kind;
                            e.title = next.title;
                            e.level = next.level;
                            e.column = next.column;
                            e.context = flags;
                            e.line = Some(next.line);
                            e.cached_line = next.line_index;
                        });
                        self.place(id, &mut parents);
                    }
                    None => self.tree.remove_splice(id),
                }
            } else {
                self.place(id, &mut parents);
            }
        }
        for next in pending {
            self.insert_section(next, &mut parents);
        }
    }

    fn desired_parent(&self, kind: StructureKind, level: i32, parents: &mut Vec<(i32, StructureId)>) -> StructureId {
        if kind == StructureKind::Section {
            while parents.last().is_some_and(|(l, _)| *l >= level) {
                parents.pop();
            }
        }
        parents.last().map_or(self.tree.root(), |(_, id)| *id)
    }

    /// Move an entry under the parent its level calls for, if it is not there already.
    fn place(&mut self, id: StructureId, parents: &mut Vec<(i32, StructureId)>) {
        let Some(entry) = self.tree.get(id) else {
            return;
        };
        let (kind, level) = (entry.kind, entry.level);
        let parent = self.desired_parent(kind, level, parents);
        if self.tree.parent(id) != Some(parent) {
            self.tree.detach(id);
            let slot = self.sorted_slot(parent, id);
            self.tree.attach(parent, slot, id);
        }
        if kind == StructureKind::Section {
            parents.push((level, id));
        }
    }

    fn insert_section(&mut self, new: Extracted, parents: &mut Vec<(i32, StructureId)>) {
        let parent = self.desired_parent(new.kind, new.level, parents);
        let (kind, level) = (new.kind, new.level);
        let id = self.tree.allocate(self.entry_from(new));
        let slot = self.sorted_slot(parent, id);
        self.tree.attach(parent, slot, id);
        if kind == StructureKind::Section {
            parents.push((level, id));
        }
    }

    fn entry_from(&self, new: Extracted) -> StructureEntry {
        let mut entry = StructureEntry::new(new.kind, new.title);
        entry.level = new.level;
        entry.column = new.column;
        entry.category = new.category;
        entry.context = self.sentinels.flags(new.line_index, new.column);
        entry.cached_line = new.line_index;
        entry.line = Some(new.line);
        entry
    }

    /// Sibling index keeping children of `parent` ordered by (line, column).
    fn sorted_slot(&self, parent: StructureId, id: StructureId) -> usize {
        let key = |id: StructureId| {
            self.tree
                .get(id)
                .map_or((0, 0), |e| (e.cached_line, e.column))
        };
        let own = key(id);
        let children = self.tree.children(parent);
        let limit = if parent == self.tree.root() {
            self.tree.section_slots()
        } else {
            children.len()
        };
        let removed = |id: StructureId| {
            self.tree
                .get(id)
                .and_then(|e| e.line.as_ref())
                .is_some_and(LineHandle::is_removed)
        };
        children[..limit]
            .iter()
            .position(|c| !removed(*c) && key(*c) > own)
            .unwrap_or(limit)
    }

    /// Merge a flat overview list; new entries take the slots of the entries they replace.
    fn merge_overview(&mut self, category: OverviewCategory, range: Range<usize>, new: Vec<Extracted>) {
        let container = self.tree.overview(category);
        let old = self.tree.children(container).to_vec();
        let mut pending = new.into_iter().peekable();
        let mut insert_at = 0;
        for id in old {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            let removed = entry.line.as_ref().is_none_or(LineHandle::is_removed);
            let line_index = entry.cached_line;
            if removed {
                self.tree.remove_subtree(id);
                continue;
            }
            if line_index < range.start {
                insert_at = self.tree.index_in_parent(id).map_or(insert_at, |i| i + 1);
                continue;
            }
            while let Some(next) = pending.next_if(|n| n.line_index < line_index) {
                let node = self.tree.allocate(self.entry_from(next));
                self.tree.attach(container, insert_at, node);
                insert_at += 1;
            }
            if line_index < range.end {
                match pending.next_if(|n| n.line_index == line_index) {
                    Some(next) => {
                        let flags = self.sentinels.flags(next.line_index, next.column);
                        self.tree.update(id, |e| {
                            e.title = next.title;
                            e.column = next.column;
                            e.context = flags;
                            e.line = Some(next.line);
                        });
                    }
                    None => {
                        self.tree.remove_subtree(id);
                        continue;
                    }
                }
            }
            insert_at = self.tree.index_in_parent(id).map_or(insert_at, |i| i + 1);
        }
        for next in pending {
            let node = self.tree.allocate(self.entry_from(next));
            self.tree.attach(container, insert_at, node);
            insert_at += 1;
        }
    }

    fn extract_line(
        &self,
        lines: &dyn LineSource,
        index: usize,
        line: &LineHandle,
        db: &CommandDatabase,
    ) -> (LineFacts, Vec<Extracted>) {
        let (text, tokens) = {
            let state = line.read();
            (
                state.text.clone(),
                state.cookies.tokens.clone().unwrap_or_else(|| Arc::from(Vec::new())),
            )
        };
        let mut facts = LineFacts {
            line_index: index,
            ..LineFacts::default()
        };
        let mut found: Vec<Found> = Vec::new();

        for (ti, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Comment => self.extract_comment(token.text(&text), token.start, &mut found),
                TokenKind::Command
                    if !matches!(
                        token.subtype,
                        TokenSubtype::Definition | TokenSubtype::DefinedName
                    ) =>
                {
                    let name = token.text(&text);
                    let args = args_of(&tokens, ti, name);
                    if let Some(level) = db.structure_level(name) {
                        let title = self.section_title(lines, index, line, name, &args, &text);
                        found.push((StructureKind::Section, None, title, level, token.start));
                    }
                    let categories: Vec<&str> = db.categories_of(name).collect();
                    for cat in categories {
                        extract_semantic(cat, name, token, &args, &text, &mut facts, &mut found);
                    }
                }
                TokenKind::Braces
                    if token.subtype == TokenSubtype::BeginEnv && token.belongs_to("\\begin") =>
                {
                    let env = token.inner_text(&text).trim();
                    if db.in_category(category::BLOCK_ENV, env) {
                        let owner = format!("\\begin{{{env}}}");
                        let title = tokens[ti + 1..]
                            .iter()
                            .find(|t| t.kind.is_group() && t.level == token.level && t.belongs_to(&owner))
                            .map_or_else(|| env.to_string(), |t| t.inner_text(&text).trim().to_string());
                        found.push((
                            StructureKind::Block,
                            Some(OverviewCategory::Block),
                            title,
                            0,
                            token.start,
                        ));
                    }
                }
                TokenKind::Braces
                    if token.subtype == TokenSubtype::EndEnv
                        && token.belongs_to("\\end")
                        && token.inner_text(&text).trim() == "document" =>
                {
                    facts.end_document.get_or_insert(token.start);
                }
                _ => {}
            }
        }

        found.sort_by_key(|f| f.4);
        let extracted = found
            .into_iter()
            .map(|(kind, category, title, level, column)| Extracted {
                kind,
                category,
                title,
                level,
                column,
                line: line.clone(),
                line_index: index,
            })
            .collect();
        (facts, extracted)
    }

    fn extract_comment(
        &self,
        comment: &str,
        column: usize,
        found: &mut Vec<Found>,
    ) {
        if let Some(caps) = self.magic_pattern.captures(comment) {
            let key = caps.get(1).map_or("", |m| m.as_str().trim());
            let value = caps.get(2).map_or("", |m| m.as_str().trim());
            found.push((
                StructureKind::MagicComment,
                Some(OverviewCategory::MagicComment),
                format!("{key} = {value}"),
                0,
                column,
            ));
        } else if let Some(caps) = self.todo_pattern.captures(comment) {
            let note = caps
                .get(1)
                .map_or(comment, |m| m.as_str())
                .trim()
                .to_string();
            found.push((StructureKind::Todo, Some(OverviewCategory::Todo), note, 0, column));
        }
    }

    /// Title of a sectioning command, gathered across continuation lines.
    fn section_title(
        &self,
        lines: &dyn LineSource,
        index: usize,
        line: &LineHandle,
        command: &str,
        args: &[&Token],
        text: &str,
    ) -> String {
        let mut parts = Vec::new();
        if let Some(title) = args.iter().find(|t| t.subtype == TokenSubtype::Title) {
            parts.push(title.inner_text(text).trim().to_string());
        }
        let mut open = line
            .remainder()
            .is_some_and(|r| continues_title(&r, command, parts.is_empty()));
        let mut next = index + 1;
        while open && next <= index + self.config.back_search_limit {
            let Some(cont) = lines.line(next) else {
                break;
            };
            let cont_text = cont.text();
            let title = cont.tokens().and_then(|tokens| {
                tokens
                    .iter()
                    .find(|t| {
                        t.kind.is_group() && t.subtype == TokenSubtype::Title && t.belongs_to(command)
                    })
                    .map(|t| t.inner_text(&cont_text).trim().to_string())
            });
            let found = title.is_some();
            parts.extend(title);
            open = cont
                .remainder()
                .is_some_and(|r| continues_title(&r, command, !found && parts.is_empty()));
            next += 1;
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }

    /// Packages in use (including inherited ones).
    pub fn used_packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// Packages with their options, in no particular order.
    pub fn package_uses(&self) -> Vec<UsedPackage> {
        self.facts
            .values()
            .flat_map(|(_, f)| f.packages.iter().cloned())
            .collect()
    }

    /// Commands and environments defined in the document.
    pub fn user_definitions(&self) -> &BTreeSet<UserDefinition> {
        &self.definitions
    }

    /// Defined labels.
    pub fn labels(&self) -> BTreeSet<String> {
        self.facts
            .values()
            .flat_map(|(_, f)| f.labels.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    /// Referenced labels.
    pub fn references(&self) -> BTreeSet<String> {
        self.facts
            .values()
            .flat_map(|(_, f)| f.references.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    /// Bibliography item keys defined with `\bibitem`.
    pub fn bib_items(&self) -> BTreeSet<String> {
        self.facts
            .values()
            .flat_map(|(_, f)| f.bib_items.iter().cloned())
            .collect()
    }

    /// Bibliography database files.
    pub fn bib_files(&self) -> &BTreeSet<String> {
        &self.bib_files
    }

    /// Included files.
    pub fn includes(&self) -> BTreeSet<String> {
        self.facts
            .values()
            .flat_map(|(_, f)| f.includes.iter().cloned())
            .collect()
    }

    /// All definitions of a label (more than one means a duplicate label).
    pub fn label_occurrences(&self, name: &str) -> Vec<Occurrence> {
        self.facts
            .values()
            .flat_map(|(line, f)| {
                f.labels
                    .iter()
                    .filter(|(n, _)| n == name)
                    .map(|(n, column)| Occurrence {
                        name: n.clone(),
                        line: line.clone(),
                        column: *column,
                    })
            })
            .collect()
    }
}

/// Re-lex one line; returns the new remainder and whether it differs from the cached one.
fn relex(line: &LineHandle, incoming: &TokenStack, db: &CommandDatabase) -> (TokenStack, bool) {
    let mut state = line.write();
    let lexed = lex_line(&state.text, incoming, db);
    let changed = state.cookies.remainder.as_ref() != Some(&lexed.remainder);
    state.cookies.tokens = Some(Arc::from(lexed.tokens));
    state.cookies.remainder = Some(lexed.remainder.clone());
    state.cookies.comment_start = lexed.comment_start;
    (lexed.remainder, changed)
}

/// Returns `true` if a remainder leaves the title of `command` open (or, when `before_title`,
/// the command still waiting for it).
fn continues_title(remainder: &TokenStack, command: &str, before_title: bool) -> bool {
    remainder.iter().any(|t| {
        t.belongs_to(command)
            && ((t.kind.is_open() && t.subtype == TokenSubtype::Title)
                || (before_title && t.kind == TokenKind::Command))
    })
}

/// Argument tokens following the command at `index`.
fn args_of<'t>(tokens: &'t [Token], index: usize, name: &str) -> Vec<&'t Token> {
    let cmd = &tokens[index];
    let mut out = Vec::new();
    for t in &tokens[index + 1..] {
        if t.start < cmd.end() {
            continue;
        }
        let is_arg = t.kind.is_group()
            || matches!(t.subtype, TokenSubtype::DefinedName | TokenSubtype::DefArgCount);
        if t.level == cmd.level && t.belongs_to(name) && is_arg {
            out.push(t);
            continue;
        }
        if t.level <= cmd.level {
            break;
        }
    }
    out
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn arg_text<'a>(args: &[&Token], subtype: TokenSubtype, text: &'a str) -> Option<&'a str> {
    args.iter()
        .find(|t| t.subtype == subtype)
        .map(|t| t.inner_text(text).trim())
}

/// Name of the thing being defined (a bare command or the content of a group).
fn defined_name(args: &[&Token], text: &str) -> Option<String> {
    let token = args.iter().find(|t| t.subtype == TokenSubtype::DefinedName)?;
    let name = if token.kind == TokenKind::Command {
        token.text(text)
    } else {
        token.inner_text(text).trim()
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Argument count of a definition: `[n]` or the number of `#n` markers.
fn definition_arity(args: &[&Token], text: &str) -> usize {
    if let Some(count) = args
        .iter()
        .find(|t| t.subtype == TokenSubtype::DefArgCount && t.kind.is_group())
        .and_then(|t| t.inner_text(text).trim().parse().ok())
    {
        return count;
    }
    args.iter()
        .filter(|t| t.subtype == TokenSubtype::DefArgCount && t.kind == TokenKind::Symbol)
        .filter_map(|t| t.text(text).get(1..).and_then(|d| d.parse::<usize>().ok()))
        .max()
        .unwrap_or(0)
}

fn begin_names(definition: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = definition;
    while let Some(at) = rest.find("\\begin{") {
        let after = &rest[at + "\\begin{".len()..];
        let Some(close) = after.find('}') else {
            break;
        };
        out.push(after[..close].trim().to_string());
        rest = &after[close..];
    }
    out
}

type Found = (StructureKind, Option<OverviewCategory>, String, i32, usize);

fn extract_semantic(
    cat: &str,
    name: &str,
    token: &Token,
    args: &[&Token],
    text: &str,
    facts: &mut LineFacts,
    found: &mut Vec<Found>,
) {
    let column = token.start;
    match cat {
        category::LABEL => {
            for label in arg_text(args, TokenSubtype::Label, text).into_iter().flat_map(split_list) {
                facts.labels.push((label.to_string(), column));
                found.push((
                    StructureKind::Label,
                    Some(OverviewCategory::Label),
                    label.to_string(),
                    0,
                    column,
                ));
            }
        }
        category::REF => {
            for label in arg_text(args, TokenSubtype::LabelRef, text).into_iter().flat_map(split_list) {
                facts.references.push((label.to_string(), column));
            }
        }
        category::INCLUDE => {
            if let Some(file) = arg_text(args, TokenSubtype::File, text).filter(|f| !f.is_empty()) {
                facts.includes.push(file.to_string());
                found.push((StructureKind::Include, None, file.to_string(), 0, column));
            }
        }
        category::USEPACKAGE | category::DOCUMENTCLASS => {
            let options: Vec<String> = arg_text(args, TokenSubtype::PackageOption, text)
                .into_iter()
                .flat_map(split_list)
                .map(str::to_string)
                .collect();
            let (subtype, prefix) = if cat == category::DOCUMENTCLASS {
                (TokenSubtype::DocumentClass, "class-")
            } else {
                (TokenSubtype::Package, "")
            };
            for package in arg_text(args, subtype, text).into_iter().flat_map(split_list) {
                facts.packages.push(UsedPackage {
                    name: format!("{prefix}{package}"),
                    options: options.clone(),
                });
            }
        }
        category::BIBITEM => {
            if let Some(key) = arg_text(args, TokenSubtype::NewBibItem, text).filter(|k| !k.is_empty()) {
                facts.bib_items.push(key.to_string());
                found.push((
                    StructureKind::Bibtex,
                    Some(OverviewCategory::Bibtex),
                    key.to_string(),
                    0,
                    column,
                ));
            }
        }
        category::BIBLIOGRAPHY => {
            for file in arg_text(args, TokenSubtype::BibFile, text).into_iter().flat_map(split_list) {
                facts.bib_files.push(file.to_string());
            }
        }
        category::TODO => {
            if let Some(note) = arg_text(args, TokenSubtype::Todo, text) {
                found.push((
                    StructureKind::Todo,
                    Some(OverviewCategory::Todo),
                    note.to_string(),
                    0,
                    column,
                ));
            }
        }
        category::APPENDIX => {
            facts.appendix.get_or_insert(column);
        }
        category::DEFINITION | category::MATH_DEFINITION => {
            if let Some(defined) = defined_name(args, text).filter(|n| n.starts_with('\\')) {
                let kind = if cat == category::DEFINITION {
                    DefinitionKind::Command
                } else {
                    DefinitionKind::MathCommand
                };
                let optional = args.iter().any(|t| t.subtype == TokenSubtype::DefaultArg);
                facts.definitions.push(
                    UserDefinition::new(kind, defined).with_arity(definition_arity(args, text), optional),
                );
            }
        }
        category::ENV_DEFINITION => {
            if let Some(env) = defined_name(args, text) {
                let optional = args.iter().any(|t| t.subtype == TokenSubtype::DefaultArg);
                let mut def = UserDefinition::new(DefinitionKind::Environment, env)
                    .with_arity(definition_arity(args, text), optional);
                if let Some(body) = arg_text(args, TokenSubtype::Definition, text) {
                    for alias in begin_names(body) {
                        def = def.with_alias(alias);
                    }
                }
                facts.definitions.push(def);
            }
        }
        category::THEOREM => {
            if let Some(env) = arg_text(args, TokenSubtype::NewTheorem, text).filter(|e| !e.is_empty()) {
                facts
                    .definitions
                    .push(UserDefinition::new(DefinitionKind::Environment, env));
            }
        }
        category::COUNTER => {
            if let Some(counter) = defined_name(args, text) {
                facts
                    .definitions
                    .push(UserDefinition::command(format!("\\the{counter}")));
            }
        }
        category::IF_DEFINITION => {
            if let Some(defined) = defined_name(args, text) {
                if let Some(base) = defined.strip_prefix("\\if") {
                    facts
                        .definitions
                        .push(UserDefinition::command(format!("\\{base}true")));
                    facts
                        .definitions
                        .push(UserDefinition::command(format!("\\{base}false")));
                }
                facts.definitions.push(UserDefinition::command(defined));
            }
        }
        category::LENGTH => {
            if let Some(defined) = defined_name(args, text).filter(|n| n.starts_with('\\')) {
                facts.definitions.push(UserDefinition::command(defined));
            }
        }
        category::COLUMN_TYPE => {
            if let Some(column_type) = defined_name(args, text) {
                facts.definitions.push(
                    UserDefinition::new(DefinitionKind::ColumnType, column_type)
                        .with_arity(definition_arity(args, text), false),
                );
            }
        }
        _ => {
            trace!(command = name, category = cat, "no structural role");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::LineBuffer;
    use crate::package::NoPackages;
    use pretty_assertions::assert_eq;

    fn patcher() -> StructurePatcher {
        StructurePatcher::new(
            AnalysisConfig::default(),
            Arc::new(CommandDatabase::builtin()),
            Arc::new(NoPackages),
        )
        .unwrap()
    }

    fn titles(patcher: &StructurePatcher) -> Vec<(String, usize)> {
        patcher
            .tree()
            .outline()
            .into_iter()
            .map(|i| (i.title, i.depth))
            .collect()
    }

    #[test]
    fn test_sections_nest_by_level() {
        let buffer = LineBuffer::from_text(
            "\\section{A}\n\\subsection{A1}\n\\subsubsection{A1a}\n\\section{B}\n\\input{b}",
        );
        let mut p = patcher();
        p.patch(&buffer, 0, buffer.line_count());
        assert_eq!(
            titles(&p),
            vec![
                ("A".to_string(), 0),
                ("A1".to_string(), 1),
                ("A1a".to_string(), 2),
                ("B".to_string(), 0),
                ("b".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_multi_line_title_is_gathered() {
        let buffer = LineBuffer::from_text("\\section{A very\nlong title}\ntext");
        let mut p = patcher();
        p.patch(&buffer, 0, 3);
        assert_eq!(titles(&p), vec![("A very long title".to_string(), 0)]);

        buffer.replace_line(1, "short}").unwrap();
        p.patch(&buffer, 1, 1);
        assert_eq!(titles(&p), vec![("A very short".to_string(), 0)]);
    }

    #[test]
    fn test_remainder_change_extends_range() {
        let buffer = LineBuffer::from_text("a\n\\section{B}\nc");
        let mut p = patcher();
        p.patch(&buffer, 0, 3);
        buffer.replace_line(0, "\\textbf{a").unwrap();
        let outcome = p.patch(&buffer, 0, 1);
        assert!(outcome.scanned.end >= 2);
    }

    #[test]
    fn test_facts_and_overviews() {
        let text = "% !TeX program = lualatex\n\\usepackage[utf8]{inputenc,foo}\n\\label{a}\\ref{b}\n% TODO: finish\n\\bibliography{refs,more}";
        let buffer = LineBuffer::from_text(text);
        let mut p = patcher();
        let outcome = p.patch(&buffer, 0, buffer.line_count());
        assert!(outcome.rerun_suggested);
        assert!(outcome.bibliography_changed);
        assert!(p.used_packages().contains("foo"));
        assert_eq!(p.labels().into_iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(p.references().into_iter().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(p.bib_files().len(), 2);
        let uses = p.package_uses();
        assert!(uses.iter().all(|u| u.options == vec!["utf8".to_string()]));

        let outline = titles(&p);
        assert_eq!(
            outline,
            vec![
                ("MAGIC_COMMENTS".to_string(), 0),
                ("program = lualatex".to_string(), 1),
                ("TODO".to_string(), 0),
                ("finish".to_string(), 1),
                ("LABELS".to_string(), 0),
                ("a".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_user_definitions() {
        let text = "\\newcommand{\\foo}[2][x]{#1#2}\n\\def\\bar#1{#1}\n\\newenvironment{myitems}{\\begin{itemize}}{\\end{itemize}}\n\\newtheorem{thm}{Theorem}\n\\newif\\ifdraft\n\\newcolumntype{L}{>{\\raggedright}p{3cm}}";
        let buffer = LineBuffer::from_text(text);
        let mut p = patcher();
        p.patch(&buffer, 0, buffer.line_count());
        let defs = p.user_definitions();
        assert!(defs.contains(
            &UserDefinition::command("\\foo").with_arity(2, true)
        ));
        assert!(defs.contains(&UserDefinition::command("\\bar").with_arity(1, false)));
        assert!(defs.contains(
            &UserDefinition::new(DefinitionKind::Environment, "myitems").with_alias("itemize")
        ));
        assert!(defs.contains(&UserDefinition::new(DefinitionKind::Environment, "thm")));
        assert!(defs.contains(&UserDefinition::command("\\drafttrue")));
        assert!(defs.contains(&UserDefinition::new(DefinitionKind::ColumnType, "L")));

        let db = p.database();
        assert!(db.in_category(category::USER, "\\foo"));
        assert!(db.environment_is("myitems", "itemize"));
        assert!(db.is_column_type('L'));
    }

    #[test]
    fn test_appendix_and_end_document_flags() {
        let text = "\\section{A}\n\\appendix\n\\section{B}\n\\end{document}\n\\section{C}";
        let buffer = LineBuffer::from_text(text);
        let mut p = patcher();
        p.patch(&buffer, 0, buffer.line_count());
        let flags: Vec<_> = p
            .tree()
            .children(p.tree().root())
            .iter()
            .map(|id| p.tree().get(*id).unwrap().context)
            .collect();
        assert!(!flags[0].in_appendix);
        assert!(flags[1].in_appendix && !flags[1].beyond_end);
        assert!(flags[2].in_appendix && flags[2].beyond_end);

        buffer.replace_line(1, "").unwrap();
        p.patch(&buffer, 1, 1);
        let b = p.tree().children(p.tree().root())[1];
        assert!(!p.tree().get(b).unwrap().context.in_appendix);
    }

    #[test]
    fn test_block_environment_entry() {
        let mut base = CommandDatabase::builtin();
        base.add_environment("block", std::iter::empty());
        base.add_command("\\begin{block}{title}", &[]).unwrap();
        base.add_to_category(category::BLOCK_ENV, "block");
        let mut p = StructurePatcher::new(AnalysisConfig::default(), Arc::new(base), Arc::new(NoPackages))
            .unwrap();
        let buffer = LineBuffer::from_text("\\begin{block}{Key idea}\nx\n\\end{block}");
        p.patch(&buffer, 0, 3);
        assert_eq!(
            titles(&p),
            vec![("BLOCKS".to_string(), 0), ("Key idea".to_string(), 1)]
        );
    }
}
