use latex_core::{
    AnalysisConfig, LatexDocument, PackageProvider, StructureKind, SyntaxErrorKind, category,
};
use latex_core_packages::{PackageError, PackageRegistry};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn kinds(doc: &LatexDocument) -> Vec<(usize, SyntaxErrorKind)> {
    doc.all_errors().into_iter().map(|(line, e)| (line, e.kind)).collect()
}

#[test]
fn test_bundled_packages_validate_a_document() {
    let registry = Arc::new(PackageRegistry::bundled());
    let mut doc = LatexDocument::new(AnalysisConfig::default(), registry.clone()).unwrap();
    doc.load(
        "\\documentclass{article}\n\
         \\usepackage{amsmath,graphicx}\n\
         \\begin{align}\n\
         x &= \\text{one} \\\\\n\
         y &= \\dfrac{1}{2}\n\
         \\end{align}\n\
         \\includegraphics[width=3cm, keepaspectratio=true]{plot.png}\n\
         \\includegraphics[widht=3cm]{plot.png}",
    );
    doc.wait_for_checker();

    assert_eq!(kinds(&doc), vec![(7, SyntaxErrorKind::UnrecognizedKey)]);
    let loaded = registry.loaded();
    assert!(loaded.contains("amsmath"));
    assert!(loaded.contains("graphicx"));
    assert!(loaded.contains("class-article"));
}

#[test]
fn test_beamer_requires_and_blocks() {
    let mut doc =
        LatexDocument::new(AnalysisConfig::default(), Arc::new(PackageRegistry::bundled()))
            .unwrap();
    doc.load(
        "\\documentclass{beamer}\n\
         \\begin{frame}{Intro}\n\
         \\begin{block}{Key idea}\n\
         \\textcolor{red}{$\\mathbb{R}$}\n\
         \\end{block}\n\
         \\end{frame}",
    );
    doc.wait_for_checker();

    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
    let db = doc.database();
    assert!(db.has_package("class-beamer"));
    assert!(db.has_package("xcolor"));
    assert!(
        doc.outline()
            .iter()
            .any(|item| item.kind == StructureKind::Block && item.title == "Key idea")
    );
}

#[test]
fn test_search_paths_load_lazily() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("mypkg.yaml"),
        "name: mypkg\ncommands:\n  - signature: '\\mycite{keys}'\n    categories: [normal]\n",
    )
    .unwrap();

    let mut registry = PackageRegistry::new();
    assert!(registry.package("mypkg").is_none());

    registry.add_search_path(dir.path());
    assert!(registry.loaded().is_empty());
    let package = registry.package("mypkg").unwrap();
    assert!(package.database.in_category(category::NORMAL, "\\mycite"));
    assert_eq!(registry.loaded().into_iter().collect::<Vec<_>>(), vec!["mypkg"]);
}

#[test]
fn test_search_paths_shadow_bundled_packages() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("amsmath.yaml"),
        "name: amsmath\nenvironments: [onlymine]\n",
    )
    .unwrap();

    let mut registry = PackageRegistry::bundled();
    registry.add_search_path(dir.path());
    let package = registry.get("amsmath").unwrap();
    assert!(package.database.is_environment("onlymine"));
    assert!(!package.database.is_environment("align"));
}

#[test]
fn test_load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anything.yaml");
    std::fs::write(&path, "name: fancy\ncommands: ['\\fancyhead[pos]{text}']\n").unwrap();

    let registry = PackageRegistry::new();
    let package = registry.load_from_path(&path).unwrap();
    assert_eq!(package.name, "fancy");
    assert!(registry.get("fancy").is_ok());

    let missing = registry.load_from_path(dir.path().join("missing.yaml"));
    assert!(matches!(missing, Err(PackageError::Io(_))));
}

#[test]
fn test_invalid_files_are_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "name: [unclosed").unwrap();

    let mut registry = PackageRegistry::new();
    registry.add_search_path(dir.path());
    assert!(matches!(registry.get("broken"), Err(PackageError::Yaml(_))));
    assert!(matches!(
        registry.get("broken"),
        Err(PackageError::UnknownPackage(_))
    ));
    assert!(registry.load_from_str("commands: [").is_err());
}

#[test]
fn test_resolve_follows_requires() {
    let registry = PackageRegistry::bundled();
    let names: Vec<String> = registry
        .resolve("todonotes")
        .unwrap()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(names, vec!["xcolor".to_string(), "todonotes".to_string()]);

    assert!(matches!(
        registry.resolve("nosuchpkg"),
        Err(PackageError::UnknownPackage(_))
    ));
}

#[test]
fn test_resolve_reports_require_cycles() {
    let registry = PackageRegistry::new();
    registry
        .load_from_str("name: first\nrequires: [second]\n")
        .unwrap();
    registry
        .load_from_str("name: second\nrequires: [first]\n")
        .unwrap();
    match registry.resolve("first") {
        Err(PackageError::RequireCycle(name)) => assert_eq!(name, "first"),
        other => panic!("expected a require cycle, got {other:?}"),
    }
}
