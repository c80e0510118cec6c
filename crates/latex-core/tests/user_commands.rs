use latex_core::{
    AnalysisConfig, DocumentEvent, LatexDocument, NoPackages, SyntaxErrorKind, category,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn loaded(text: &str) -> LatexDocument {
    let mut doc = LatexDocument::new(AnalysisConfig::default(), Arc::new(NoPackages)).unwrap();
    doc.load(text);
    doc.wait_for_checker();
    doc
}

#[test]
fn test_defined_command_is_recognized_until_its_definition_goes() {
    let mut doc = loaded("\\newcommand{\\foo}[1]{#1}\n\\foo{x}");
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
    assert!(doc.database().in_category(category::USER, "\\foo"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    doc.subscribe(move |event| sink.lock().push(event.clone()));

    doc.remove_lines(0, 1).unwrap();
    doc.wait_for_checker();

    let errors = doc.errors(0).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, SyntaxErrorKind::UnrecognizedCommand);
    assert_eq!((errors[0].start, errors[0].length), (0, 4));
    assert!(!doc.database().in_category(category::USER, "\\foo"));

    let events = events.lock();
    assert!(events.contains(&DocumentEvent::CompleterNeedsUpdate));
    assert!(events.contains(&DocumentEvent::CommandDatabaseChanged));
}

#[test]
fn test_definition_added_later_clears_the_error() {
    let mut doc = loaded("\\foo{x}");
    assert_eq!(doc.errors(0).unwrap()[0].kind, SyntaxErrorKind::UnrecognizedCommand);

    doc.insert_lines(0, &["\\newcommand{\\foo}[1]{#1}"]).unwrap();
    doc.wait_for_checker();
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
}

#[test]
fn test_user_environment_inherits_its_alias() {
    let doc = loaded(
        "\\newenvironment{steps}{\\begin{enumerate}}{\\end{enumerate}}\n\\begin{steps}\n\\item one\n\\end{steps}",
    );
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());
}

#[test]
fn test_theorem_environment() {
    let doc = loaded("\\newtheorem{lemma}{Lemma}\n\\begin{lemma}\nx\n\\end{lemma}");
    assert!(doc.all_errors().is_empty(), "{:?}", doc.all_errors());

    let doc = loaded("\\begin{lemma}\nx\n\\end{lemma}");
    let kinds: Vec<_> = doc.all_errors().into_iter().map(|(_, e)| e.kind).collect();
    assert_eq!(kinds, vec![SyntaxErrorKind::UnrecognizedEnvironment]);
}
