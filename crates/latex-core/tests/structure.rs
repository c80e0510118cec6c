use latex_core::{
    AnalysisConfig, CommandDatabase, DocumentEvent, LatexDocument, LineBuffer, LineSource,
    NoPackages, StructureEvent, StructureId, StructureKind, StructurePatcher, StructureTree,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn document() -> LatexDocument {
    let config = AnalysisConfig::default().with_syntax_check(false);
    LatexDocument::new(config, Arc::new(NoPackages)).unwrap()
}

fn patcher() -> StructurePatcher {
    StructurePatcher::new(
        AnalysisConfig::default(),
        Arc::new(CommandDatabase::builtin()),
        Arc::new(NoPackages),
    )
    .unwrap()
}

type Snapshot = Vec<(StructureKind, String, usize, usize)>;

fn snapshot(doc: &LatexDocument) -> Snapshot {
    doc.outline()
        .into_iter()
        .map(|item| (item.kind, item.title, item.line, item.depth))
        .collect()
}

/// Siblings are ordered by (line, column); sections nest strictly deeper than their parent.
fn assert_well_formed(tree: &StructureTree, node: StructureId) {
    let children = tree.children(node);
    let entries: Vec<_> = children
        .iter()
        .map(|c| tree.get(*c).unwrap())
        .filter(|e| e.kind == StructureKind::Section || e.kind == StructureKind::Include)
        .collect();
    for pair in entries.windows(2) {
        assert!(
            (pair[0].cached_line, pair[0].column) < (pair[1].cached_line, pair[1].column),
            "siblings out of order: {:?} / {:?}",
            pair[0].title,
            pair[1].title
        );
    }
    let parent = tree.get(node).unwrap();
    if parent.kind == StructureKind::Section {
        for entry in entries.iter().filter(|e| e.kind == StructureKind::Section) {
            assert!(entry.level > parent.level);
        }
    }
    for child in children {
        assert_eq!(tree.parent(*child), Some(node));
        assert_well_formed(tree, *child);
    }
}

#[test]
fn test_section_inserted_into_empty_document() {
    let mut doc = document();
    doc.load("\n\n\n\n");
    assert_eq!(doc.buffer().line_count(), 5);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    doc.subscribe(move |event| sink.lock().push(event.clone()));

    doc.insert_lines(5, &["\\section{Intro}"]).unwrap();

    let tree = doc.tree();
    let root = tree.root();
    assert_eq!(tree.children(root).len(), 1);
    let node = tree.children(root)[0];
    let entry = tree.get(node).unwrap();
    assert_eq!(entry.kind, StructureKind::Section);
    assert_eq!(entry.title, "Intro");
    assert_eq!(entry.level, 0);
    assert_eq!(entry.cached_line, 5);
    assert_eq!(entry.parent(), Some(root));

    assert_eq!(
        *events.lock(),
        vec![DocumentEvent::Structure(StructureEvent::Inserted {
            parent: root,
            index: 0,
            node,
        })]
    );
}

#[test]
fn test_repatching_is_idempotent() {
    let buffer = LineBuffer::from_text(
        "\\section{A}\n\\label{a}\n\\subsection{B}\n% TODO: check\n\\section{C}\n\\input{chapter}",
    );
    let mut p = patcher();
    p.patch(&buffer, 0, buffer.line_count());
    assert!(!p.take_events().is_empty());
    let before: Vec<_> = p.tree().outline();

    p.patch(&buffer, 0, buffer.line_count());
    p.patch(&buffer, 2, 2);
    assert!(p.take_events().is_empty());
    assert_eq!(p.tree().outline(), before);
}

#[test]
fn test_unaffected_nodes_keep_identity() {
    let mut doc = document();
    doc.load("\\section{A}\ntext\n\\section{B}\n\\section{C}");
    let ids: Vec<_> = doc.tree().children(doc.tree().root()).to_vec();

    doc.replace_line(2, "\\section{B2}").unwrap();
    doc.insert_lines(0, &["preamble"]).unwrap();

    let after: Vec<_> = doc.tree().children(doc.tree().root()).to_vec();
    assert_eq!(ids, after);
    let titles: Vec<_> = snapshot(&doc).into_iter().map(|s| (s.1, s.2)).collect();
    assert_eq!(
        titles,
        vec![
            ("A".to_string(), 1),
            ("B2".to_string(), 3),
            ("C".to_string(), 4)
        ]
    );
}

#[test]
fn test_removed_section_hands_children_to_parent() {
    let mut doc = document();
    doc.load("\\chapter{X}\n\\section{A}\n\\subsection{A1}\n\\subsection{A2}\n\\section{B}");
    let chapter = doc.tree().children(doc.tree().root())[0];
    let a = doc.tree().children(chapter)[0];
    let a1 = doc.tree().children(a)[0];

    doc.replace_line(1, "no longer a section").unwrap();

    let outline: Vec<_> = snapshot(&doc).into_iter().map(|s| (s.1, s.3)).collect();
    assert_eq!(
        outline,
        vec![
            ("X".to_string(), 0),
            ("A1".to_string(), 1),
            ("A2".to_string(), 1),
            ("B".to_string(), 1),
        ]
    );
    assert_eq!(doc.tree().children(chapter)[0], a1);
}

#[test]
fn test_appendix_flags_follow_the_sentinel() {
    let mut doc = document();
    doc.load("\\section{A}\n\\appendix\n\\section{B}");
    let root = doc.tree().root();
    let b = doc.tree().children(root)[1];
    assert!(doc.tree().get(b).unwrap().context.in_appendix);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    doc.subscribe(move |event| sink.lock().push(event.clone()));
    doc.remove_lines(1, 1).unwrap();

    assert!(!doc.tree().get(b).unwrap().context.in_appendix);
    assert!(
        events
            .lock()
            .contains(&DocumentEvent::Structure(StructureEvent::Updated { node: b }))
    );
}

#[test]
fn test_labels_todos_and_magic_comments() {
    let mut doc = document();
    doc.load("% !TeX spellcheck = en_US\n\\section{A}\\label{sec:a}\n% TODO: more\n\\ref{sec:a}");
    let outline: Vec<_> = snapshot(&doc)
        .into_iter()
        .map(|s| (s.0, s.1, s.3))
        .collect();
    assert_eq!(
        outline,
        vec![
            (StructureKind::Section, "A".to_string(), 0),
            (StructureKind::Overview, "MAGIC_COMMENTS".to_string(), 0),
            (StructureKind::MagicComment, "spellcheck = en_US".to_string(), 1),
            (StructureKind::Overview, "TODO".to_string(), 0),
            (StructureKind::Todo, "more".to_string(), 1),
            (StructureKind::Overview, "LABELS".to_string(), 0),
            (StructureKind::Label, "sec:a".to_string(), 1),
        ]
    );
    assert_eq!(doc.patcher().label_occurrences("sec:a").len(), 1);
    assert!(doc.patcher().references().contains("sec:a"));

    doc.replace_line(2, "plain").unwrap();
    assert!(!snapshot(&doc).iter().any(|s| s.0 == StructureKind::Todo));
}

fn random_line(rng: &mut StdRng) -> String {
    let n = rng.gen_range(0..50);
    match rng.gen_range(0..8) {
        0 => format!("\\chapter{{C{n}}}"),
        1 => format!("\\section{{S{n}}}"),
        2 => format!("\\subsection{{T{n}}}"),
        3 => format!("\\subsubsection{{U{n}}}"),
        4 => format!("\\label{{l{n}}}"),
        5 => format!("\\input{{f{n}}}"),
        _ => format!("text {n}"),
    }
}

#[test]
fn test_incremental_matches_full_analysis() {
    for seed in 0..16u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let lines: Vec<String> = (0..30).map(|_| random_line(&mut rng)).collect();
        let mut doc = document();
        doc.load(&lines.join("\n"));

        for step in 0..40 {
            let count = doc.buffer().line_count();
            match rng.gen_range(0..3) {
                0 => {
                    let line = random_line(&mut rng);
                    doc.replace_line(rng.gen_range(0..count), &line).unwrap();
                }
                1 => {
                    let line = random_line(&mut rng);
                    doc.insert_lines(rng.gen_range(0..=count), &[&line]).unwrap();
                }
                _ if count > 1 => {
                    doc.remove_lines(rng.gen_range(0..count), 1).unwrap();
                }
                _ => {}
            }

            let mut fresh = document();
            fresh.load(&doc.text());
            assert_eq!(snapshot(&doc), snapshot(&fresh), "seed {seed}, step {step}");
            assert_well_formed(doc.tree(), doc.tree().root());
        }
    }
}
