//! Command-line outline and syntax checker for LaTeX files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p latex-check -- thesis.tex --outline
//! cargo run -p latex-check -- thesis.tex --packages ./cwl --config analysis.yaml
//! ```
//!
//! Errors are printed as `file:line:column: message` (1-based). The process exits with status 1
//! if any error was found.
//!
//! The optional `--config` file is a YAML [`AnalysisConfig`]; missing fields keep their defaults:
//!
//! ```yaml
//! back_search_limit: 20
//! math_highlight: false
//! inherited_packages: [amsmath]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use latex_core::{AnalysisConfig, LatexDocument, LineSource, StructureKind};
use latex_core_packages::PackageRegistry;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "latex-check")]
#[command(about = "Print the outline of a LaTeX file and check its syntax")]
#[command(version)]
struct Args {
    /// LaTeX file to analyze
    file: PathBuf,

    /// Directory searched for `<package>.yaml` descriptions (repeatable)
    #[arg(short, long, value_name = "DIR")]
    packages: Vec<PathBuf>,

    /// YAML analysis configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the document outline
    #[arg(long)]
    outline: bool,

    /// Skip the syntax check
    #[arg(long)]
    no_check: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?.with_syntax_check(!args.no_check);
    let mut registry = PackageRegistry::bundled();
    for dir in &args.packages {
        registry.add_search_path(dir);
    }
    let registry = Arc::new(registry);

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mut doc = LatexDocument::new(config, registry.clone())?;
    doc.load(&text);
    doc.wait_for_checker();
    info!(
        lines = doc.buffer().line_count(),
        packages = ?registry.loaded(),
        "analysis finished"
    );

    if args.outline {
        print_outline(&doc);
    }

    let errors = doc.all_errors();
    let name = args.file.display();
    for (line, error) in &errors {
        println!("{name}:{}:{}: {}", line + 1, error.start + 1, error.kind);
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    debug!(path = %path.display(), "loading analysis config");
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("invalid config {}", path.display()))
}

fn print_outline(doc: &LatexDocument) {
    for item in doc.outline() {
        let marker = match item.kind {
            StructureKind::Root => continue,
            StructureKind::Overview => "#",
            StructureKind::Section => "§",
            StructureKind::Include => "+",
            StructureKind::Label => "@",
            StructureKind::Bibtex => "&",
            StructureKind::Todo => "!",
            StructureKind::Block => "=",
            StructureKind::MagicComment => "%",
        };
        let indent = "  ".repeat(item.depth);
        if item.kind == StructureKind::Overview {
            println!("{indent}{marker} {}", item.title);
        } else {
            println!("{indent}{marker} {} (line {})", item.title, item.line + 1);
        }
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("latex_core=debug,latex_core_packages=debug,latex_check=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
