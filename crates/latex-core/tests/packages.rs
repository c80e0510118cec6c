use latex_core::{
    AnalysisConfig, CommandDatabase, DocumentEvent, LatexDocument, LatexPackage, LineBuffer,
    LineSource, StaticPackages, StructurePatcher, SyntaxErrorKind, category,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn amsmath() -> LatexPackage {
    let mut db = CommandDatabase::new();
    db.add_command("\\text{text}", &[category::MATH]).unwrap();
    db.add_command("\\eqref{ref}", &[category::NORMAL, category::REF])
        .unwrap();
    db.add_environment("align", [category::MATH]);
    LatexPackage::new("amsmath", db)
}

fn article() -> LatexPackage {
    let mut db = CommandDatabase::new();
    db.add_command("\\markboth{left}{right}", &[category::NORMAL])
        .unwrap();
    LatexPackage::new("class-article", db)
}

fn provider() -> Arc<StaticPackages> {
    let mut packages = StaticPackages::new();
    packages.insert(amsmath());
    packages.insert(article());
    Arc::new(packages)
}

#[test]
fn test_package_change_rebuilds_the_database() {
    let buffer = LineBuffer::from_text("\\usepackage{amsmath}\ntext");
    let mut patcher = StructurePatcher::new(
        AnalysisConfig::default(),
        Arc::new(CommandDatabase::builtin()),
        provider(),
    )
    .unwrap();

    let outcome = patcher.patch(&buffer, 0, buffer.line_count());
    assert!(outcome.rerun_suggested);
    assert!(patcher.database().has_package("amsmath"));
    assert!(patcher.database().is_environment("align"));

    assert!(!patcher.patch(&buffer, 0, 1).rerun_suggested);

    buffer.replace_line(0, "\\usepackage{nosuchpkg}").unwrap();
    let outcome = patcher.patch(&buffer, 0, 1);
    assert!(outcome.rerun_suggested);
    let db = patcher.database();
    assert!(!db.has_package("amsmath"));
    assert!(!db.is_environment("align"));
    assert!(patcher.used_packages().contains("nosuchpkg"));
}

#[test]
fn test_package_commands_validate_the_document() {
    let text = "\\usepackage{amsmath}\n\\begin{align}\nx \\text{if} y\n\\end{align}\nsee \\eqref{a}";
    let mut doc = LatexDocument::new(AnalysisConfig::default(), provider()).unwrap();
    doc.load(text);
    doc.wait_for_checker();
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
    assert!(doc.patcher().references().contains("a"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    doc.subscribe(move |event| sink.lock().push(event.clone()));
    doc.replace_line(0, "\\usepackage{nosuchpkg}").unwrap();
    doc.wait_for_checker();

    let kinds: Vec<_> = doc.all_errors().into_iter().map(|(l, e)| (l, e.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (1, SyntaxErrorKind::UnrecognizedEnvironment),
            (2, SyntaxErrorKind::UnrecognizedCommand),
            (4, SyntaxErrorKind::UnrecognizedCommand),
        ]
    );
    assert!(events.lock().contains(&DocumentEvent::CommandDatabaseChanged));
}

#[test]
fn test_document_class_maps_to_a_class_package() {
    let mut doc = LatexDocument::new(AnalysisConfig::default(), provider()).unwrap();
    doc.load("\\documentclass[a4paper]{article}\n\\markboth{A}{B}");
    doc.wait_for_checker();
    assert!(doc.patcher().used_packages().contains("class-article"));
    assert!(doc.database().has_package("class-article"));
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());

    doc.replace_line(0, "\\documentclass{book}").unwrap();
    doc.wait_for_checker();
    assert_eq!(doc.errors(1).unwrap()[0].kind, SyntaxErrorKind::UnrecognizedCommand);

    doc.replace_line(0, "\\documentclass[a4paper]{article}").unwrap();
    doc.wait_for_checker();
    let uses = doc.patcher().package_uses();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].options, vec!["a4paper".to_string()]);
}

#[test]
fn test_inherited_packages_apply_without_usepackage() {
    let config = AnalysisConfig::default().with_inherited_package("amsmath");
    let mut doc = LatexDocument::new(config, provider()).unwrap();
    doc.load("\\begin{align}\nx\n\\end{align}");
    doc.wait_for_checker();
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
}
