//! The document outline.
//!
//! Entries live in a [`slab`] arena and refer to each other by [`StructureId`]. The root holds
//! sections and includes in document order, followed by one container per
//! [`OverviewCategory`] (magic comments, TODOs, labels, blocks, bibliography items). A container
//! is attached to the root only while it has children.
//!
//! Every structural change is recorded as a [`StructureEvent`]; observers drain them with
//! [`StructureTree::take_events`] and replay them instead of rebuilding their own view.

use crate::buffer::LineHandle;
use slab::Slab;

/// Index of an entry in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(usize);

impl StructureId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of outline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    /// The document root.
    Root,
    /// A container for one overview category.
    Overview,
    /// A sectioning command.
    Section,
    /// An included file.
    Include,
    /// A label definition.
    Label,
    /// A bibliography item.
    Bibtex,
    /// A TODO note.
    Todo,
    /// A block environment (`\begin{block}{title}`).
    Block,
    /// A magic comment (`% !TeX key = value`).
    MagicComment,
}

/// Flat overview lists, in the order they appear under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverviewCategory {
    /// Magic comments.
    MagicComment,
    /// TODO notes.
    Todo,
    /// Labels.
    Label,
    /// Block environments.
    Block,
    /// Bibliography items.
    Bibtex,
}

impl OverviewCategory {
    /// All categories in root order.
    pub const ALL: [OverviewCategory; 5] = [
        Self::MagicComment,
        Self::Todo,
        Self::Label,
        Self::Block,
        Self::Bibtex,
    ];

    /// Entry kind stored in this category.
    pub fn entry_kind(self) -> StructureKind {
        match self {
            Self::MagicComment => StructureKind::MagicComment,
            Self::Todo => StructureKind::Todo,
            Self::Label => StructureKind::Label,
            Self::Block => StructureKind::Block,
            Self::Bibtex => StructureKind::Bibtex,
        }
    }

    /// Container title.
    pub fn title(self) -> &'static str {
        match self {
            Self::MagicComment => "MAGIC_COMMENTS",
            Self::Todo => "TODO",
            Self::Label => "LABELS",
            Self::Block => "BLOCKS",
            Self::Bibtex => "BIBLIOGRAPHY",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Position of an entry relative to the `\appendix` and `\end{document}` sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ContextFlags {
    /// After the first `\appendix`.
    pub in_appendix: bool,
    /// After the first `\end{document}`.
    pub beyond_end: bool,
}

/// An outline entry.
#[derive(Debug, Clone)]
pub struct StructureEntry {
    /// Entry kind.
    pub kind: StructureKind,
    /// Display title.
    pub title: String,
    /// Sectioning level (`\section` is 0); 0 for other kinds.
    pub level: i32,
    /// Owning line.
    pub line: Option<LineHandle>,
    /// Last known index of the owning line.
    pub cached_line: usize,
    /// Column of the construct.
    pub column: usize,
    /// Sentinel flags.
    pub context: ContextFlags,
    /// Overview category of containers and their entries.
    pub category: Option<OverviewCategory>,
    parent: Option<StructureId>,
    children: Vec<StructureId>,
}

impl StructureEntry {
    /// Create a detached entry.
    pub fn new(kind: StructureKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            level: 0,
            line: None,
            cached_line: 0,
            column: 0,
            context: ContextFlags::default(),
            category: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Parent entry.
    pub fn parent(&self) -> Option<StructureId> {
        self.parent
    }

    /// Children in order.
    pub fn children(&self) -> &[StructureId] {
        &self.children
    }

    /// Returns `true` if the content fields (not links) are equal.
    pub fn same_content(&self, other: &StructureEntry) -> bool {
        self.kind == other.kind
            && self.title == other.title
            && self.level == other.level
            && self.column == other.column
            && self.context == other.context
    }
}

/// A change of the tree, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureEvent {
    /// `node` was detached from `parent` at sibling `index`.
    Removed {
        /// Former parent.
        parent: StructureId,
        /// Former sibling index.
        index: usize,
        /// The detached node.
        node: StructureId,
    },
    /// `node` was attached to `parent` at sibling `index`.
    Inserted {
        /// New parent.
        parent: StructureId,
        /// New sibling index.
        index: usize,
        /// The attached node.
        node: StructureId,
    },
    /// Content fields of `node` changed.
    Updated {
        /// The changed node.
        node: StructureId,
    },
}

/// One item of a flattened outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    /// Entry id.
    pub id: StructureId,
    /// Entry kind.
    pub kind: StructureKind,
    /// Display title.
    pub title: String,
    /// Line index.
    pub line: usize,
    /// Tree depth below the root (root children are 0).
    pub depth: usize,
}

/// Arena-backed outline tree.
#[derive(Debug)]
pub struct StructureTree {
    nodes: Slab<StructureEntry>,
    root: StructureId,
    overviews: [StructureId; 5],
    events: Vec<StructureEvent>,
}

impl Default for StructureTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureTree {
    /// Create a tree holding only the root and the (detached) overview containers.
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let root = StructureId(nodes.insert(StructureEntry::new(StructureKind::Root, "")));
        let overviews = OverviewCategory::ALL.map(|category| {
            let mut entry = StructureEntry::new(StructureKind::Overview, category.title());
            entry.category = Some(category);
            StructureId(nodes.insert(entry))
        });
        Self {
            nodes,
            root,
            overviews,
            events: Vec::new(),
        }
    }

    /// The root entry id.
    pub fn root(&self) -> StructureId {
        self.root
    }

    /// Container of an overview category (attached only while non-empty).
    pub fn overview(&self, category: OverviewCategory) -> StructureId {
        self.overviews[category.slot()]
    }

    /// Returns `true` if `id` is an overview container.
    pub fn is_overview(&self, id: StructureId) -> bool {
        self.overviews.contains(&id)
    }

    /// Look up an entry.
    pub fn get(&self, id: StructureId) -> Option<&StructureEntry> {
        self.nodes.get(id.0)
    }

    /// Children of an entry.
    pub fn children(&self, id: StructureId) -> &[StructureId] {
        self.nodes.get(id.0).map_or(&[], |e| e.children.as_slice())
    }

    /// Parent of an entry.
    pub fn parent(&self, id: StructureId) -> Option<StructureId> {
        self.nodes.get(id.0).and_then(|e| e.parent)
    }

    /// Number of live entries, including root and containers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if only the root and containers exist.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 + self.overviews.len()
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<StructureEvent> {
        std::mem::take(&mut self.events)
    }

    /// Sibling index of an entry.
    pub fn index_in_parent(&self, id: StructureId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Number of root children that are not overview containers.
    pub(crate) fn section_slots(&self) -> usize {
        self.children(self.root)
            .iter()
            .take_while(|c| !self.is_overview(**c))
            .count()
    }

    /// Allocate a detached entry.
    pub(crate) fn allocate(&mut self, entry: StructureEntry) -> StructureId {
        StructureId(self.nodes.insert(entry))
    }

    /// Attach a detached entry to `parent` at `index`.
    pub(crate) fn attach(&mut self, parent: StructureId, index: usize, node: StructureId) {
        let Some(p) = self.nodes.get_mut(parent.0) else {
            return;
        };
        let index = index.min(p.children.len());
        p.children.insert(index, node);
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = Some(parent);
        }
        self.events.push(StructureEvent::Inserted {
            parent,
            index,
            node,
        });
    }

    /// Detach an entry from its parent. Its subtree stays intact.
    pub(crate) fn detach(&mut self, node: StructureId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let Some(index) = self.index_in_parent(node) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.remove(index);
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = None;
        }
        self.events.push(StructureEvent::Removed {
            parent,
            index,
            node,
        });
    }

    /// Delete an entry; its children move to the entry's parent at the entry's slot.
    pub(crate) fn remove_splice(&mut self, node: StructureId) {
        let parent = self.parent(node);
        let slot = self.index_in_parent(node);
        let children = self.children(node).to_vec();
        for (offset, child) in children.into_iter().enumerate() {
            self.detach(child);
            if let (Some(parent), Some(slot)) = (parent, slot) {
                self.attach(parent, slot + offset, child);
            }
        }
        self.detach(node);
        if !self.is_overview(node) && node != self.root {
            self.nodes.try_remove(node.0);
        }
    }

    /// Delete an entry together with its subtree.
    pub(crate) fn remove_subtree(&mut self, node: StructureId) {
        self.detach(node);
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if let Some(entry) = self.nodes.try_remove(id.0) {
                pending.extend(entry.children);
            }
        }
    }

    /// Apply `update` to the content of an entry, recording an event if anything changed.
    pub(crate) fn update(&mut self, id: StructureId, update: impl FnOnce(&mut StructureEntry)) {
        let Some(entry) = self.nodes.get_mut(id.0) else {
            return;
        };
        let before = entry.clone();
        update(entry);
        if !before.same_content(entry) {
            self.events.push(StructureEvent::Updated { node: id });
        }
    }

    /// Update bookkeeping fields that observers do not display.
    pub(crate) fn get_mut_silent(&mut self, id: StructureId) -> Option<&mut StructureEntry> {
        self.nodes.get_mut(id.0)
    }

    /// Attach or detach overview containers depending on whether they have children.
    pub(crate) fn sync_overviews(&mut self) {
        for category in OverviewCategory::ALL {
            let id = self.overview(category);
            let attached = self.parent(id).is_some();
            let wanted = !self.children(id).is_empty();
            if attached && !wanted {
                self.detach(id);
            } else if wanted && !attached {
                let index = self.section_slots()
                    + self.children(self.root)[self.section_slots()..]
                        .iter()
                        .filter(|c| {
                            self.get(**c)
                                .and_then(|e| e.category)
                                .is_some_and(|other| other < category)
                        })
                        .count();
                self.attach(self.root, index, id);
            }
        }
    }

    /// Depth-first pre-order traversal below `from` (excluding `from`).
    pub fn descendants(&self, from: StructureId) -> Vec<StructureId> {
        let mut out = Vec::new();
        let mut pending: Vec<StructureId> = self.children(from).iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            out.push(id);
            pending.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// The tree flattened in display order.
    pub fn outline(&self) -> Vec<OutlineItem> {
        let mut out = Vec::new();
        let mut pending: Vec<(StructureId, usize)> = self
            .children(self.root)
            .iter()
            .rev()
            .map(|c| (*c, 0))
            .collect();
        while let Some((id, depth)) = pending.pop() {
            if let Some(entry) = self.get(id) {
                out.push(OutlineItem {
                    id,
                    kind: entry.kind,
                    title: entry.title.clone(),
                    line: entry.cached_line,
                    depth,
                });
            }
            pending.extend(self.children(id).iter().rev().map(|c| (*c, depth + 1)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(tree: &mut StructureTree, title: &str) -> StructureId {
        tree.allocate(StructureEntry::new(StructureKind::Section, title))
    }

    #[test]
    fn test_remove_splice_reparents_children_in_place() {
        let mut tree = StructureTree::new();
        let root = tree.root();
        let a = section(&mut tree, "a");
        let b = section(&mut tree, "b");
        let b1 = section(&mut tree, "b1");
        let b2 = section(&mut tree, "b2");
        let c = section(&mut tree, "c");
        tree.attach(root, 0, a);
        tree.attach(root, 1, b);
        tree.attach(root, 2, c);
        tree.attach(b, 0, b1);
        tree.attach(b, 1, b2);
        tree.take_events();

        tree.remove_splice(b);
        assert_eq!(tree.children(root), &[a, b1, b2, c]);
        assert!(tree.get(b).is_none());
        let events = tree.take_events();
        assert_eq!(
            events.last(),
            Some(&StructureEvent::Removed {
                parent: root,
                index: 3,
                node: b
            })
        );
    }

    #[test]
    fn test_overviews_follow_sections_only_when_non_empty() {
        let mut tree = StructureTree::new();
        let root = tree.root();
        let s = section(&mut tree, "s");
        tree.attach(root, 0, s);
        tree.sync_overviews();
        assert_eq!(tree.children(root), &[s]);

        let label = tree.allocate(StructureEntry::new(StructureKind::Label, "l"));
        let labels = tree.overview(OverviewCategory::Label);
        tree.attach(labels, 0, label);
        let todo = tree.allocate(StructureEntry::new(StructureKind::Todo, "t"));
        let todos = tree.overview(OverviewCategory::Todo);
        tree.attach(todos, 0, todo);
        tree.sync_overviews();
        assert_eq!(tree.children(root), &[s, todos, labels]);
        assert_eq!(tree.section_slots(), 1);

        tree.remove_subtree(todo);
        tree.sync_overviews();
        assert_eq!(tree.children(root), &[s, labels]);
    }

    #[test]
    fn test_update_records_only_real_changes() {
        let mut tree = StructureTree::new();
        let s = section(&mut tree, "s");
        tree.update(s, |e| e.title = "s".to_string());
        assert!(tree.take_events().is_empty());
        tree.update(s, |e| e.title = "t".to_string());
        assert_eq!(tree.take_events(), vec![StructureEvent::Updated { node: s }]);
    }

    #[test]
    fn test_outline_depths() {
        let mut tree = StructureTree::new();
        let root = tree.root();
        let a = section(&mut tree, "a");
        let a1 = section(&mut tree, "a1");
        tree.attach(root, 0, a);
        tree.attach(a, 0, a1);
        let outline = tree.outline();
        let flat: Vec<_> = outline.iter().map(|i| (i.title.as_str(), i.depth)).collect();
        assert_eq!(flat, vec![("a", 0), ("a1", 1)]);
    }
}
