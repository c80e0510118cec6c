//! Packages and package providers.
//!
//! A [`LatexPackage`] is a named command database fragment, usually loaded from a package
//! description file. The core never reads those files itself; it asks a [`PackageProvider`] for
//! packages by name when `\usepackage`/`\documentclass` sets change.

use crate::database::CommandDatabase;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A command database fragment contributed by one package (or document class).
#[derive(Debug, Clone, Default)]
pub struct LatexPackage {
    /// Package name (`amsmath`, `class-article`).
    pub name: String,
    /// Packages loaded by this package.
    pub requires: Vec<String>,
    /// Commands, environments and categories declared by the package.
    pub database: CommandDatabase,
}

impl LatexPackage {
    /// Create a package from a database.
    pub fn new(name: impl Into<String>, database: CommandDatabase) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            database,
        }
    }

    /// Add a required package.
    pub fn with_requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }
}

/// Resolves package names to loaded packages.
pub trait PackageProvider: Send + Sync {
    /// Look up a package. Unknown packages resolve to `None`.
    fn package(&self, name: &str) -> Option<Arc<LatexPackage>>;
}

/// A provider that knows no packages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackages;

impl PackageProvider for NoPackages {
    fn package(&self, _name: &str) -> Option<Arc<LatexPackage>> {
        None
    }
}

/// A provider backed by an in-memory map.
#[derive(Debug, Default, Clone)]
pub struct StaticPackages {
    packages: HashMap<String, Arc<LatexPackage>>,
}

impl StaticPackages {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, replacing one with the same name.
    pub fn insert(&mut self, package: LatexPackage) {
        self.packages
            .insert(package.name.clone(), Arc::new(package));
    }
}

impl PackageProvider for StaticPackages {
    fn package(&self, name: &str) -> Option<Arc<LatexPackage>> {
        self.packages.get(name).cloned()
    }
}

/// Resolve `names` and everything they require, in load order.
///
/// Each package appears once; require cycles are broken at the first repeated name.
pub fn resolve_packages<'a>(
    provider: &dyn PackageProvider,
    names: impl IntoIterator<Item = &'a str>,
) -> Vec<Arc<LatexPackage>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        resolve_into(provider, name, &mut seen, &mut out);
    }
    out
}

fn resolve_into(
    provider: &dyn PackageProvider,
    name: &str,
    seen: &mut HashSet<String>,
    out: &mut Vec<Arc<LatexPackage>>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }
    let Some(package) = provider.package(name) else {
        debug!(package = name, "package not available");
        return;
    };
    for required in &package.requires {
        resolve_into(provider, required, seen, out);
    }
    out.push(package);
}
