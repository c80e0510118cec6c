//! Package lookup over explicit loads, search paths and the bundled set.

use crate::definition::PackageDefinition;
use crate::error::{PackageError, Result};
use latex_core::{LatexPackage, PackageProvider};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Package descriptions compiled into the crate.
const BUNDLED: &[(&str, &str)] = &[
    ("amsmath", include_str!("../data/amsmath.yaml")),
    ("amssymb", include_str!("../data/amssymb.yaml")),
    ("graphicx", include_str!("../data/graphicx.yaml")),
    ("hyperref", include_str!("../data/hyperref.yaml")),
    ("xcolor", include_str!("../data/xcolor.yaml")),
    ("todonotes", include_str!("../data/todonotes.yaml")),
    ("cleveref", include_str!("../data/cleveref.yaml")),
    ("tabularx", include_str!("../data/tabularx.yaml")),
    ("booktabs", include_str!("../data/booktabs.yaml")),
    ("listings", include_str!("../data/listings.yaml")),
    ("biblatex", include_str!("../data/biblatex.yaml")),
    ("class-article", include_str!("../data/class-article.yaml")),
    ("class-book", include_str!("../data/class-book.yaml")),
    ("class-report", include_str!("../data/class-report.yaml")),
    ("class-beamer", include_str!("../data/class-beamer.yaml")),
];

/// Names of the bundled packages.
pub fn bundled_names() -> impl Iterator<Item = &'static str> {
    BUNDLED.iter().map(|(name, _)| *name)
}

#[derive(Debug, Default)]
/// A lazily loading set of packages.
///
/// Packages are looked up, in order, among explicitly loaded packages, as `<name>.yaml` in the
/// search paths, and in the bundled set (if enabled). Lookups are cached, failures included, so a
/// broken or missing file is reported once.
pub struct PackageRegistry {
    search_paths: Vec<PathBuf>,
    use_bundled: bool,
    cache: RwLock<HashMap<String, Option<Arc<LatexPackage>>>>,
}

impl PackageRegistry {
    /// Create an empty registry without bundled packages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that falls back to the bundled packages.
    pub fn bundled() -> Self {
        Self {
            use_bundled: true,
            ..Self::default()
        }
    }

    /// Adds a directory searched for `<name>.yaml` files.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
        // Earlier misses may now resolve.
        self.cache.write().retain(|_, package| package.is_some());
    }

    /// Loads a package from a YAML string, replacing any package of the same name.
    pub fn load_from_str(&self, yaml: &str) -> Result<Arc<LatexPackage>> {
        let package = Arc::new(PackageDefinition::from_yaml(yaml)?.into_package()?);
        self.cache
            .write()
            .insert(package.name.clone(), Some(Arc::clone(&package)));
        Ok(package)
    }

    /// Loads a package from a file, replacing any package of the same name.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<Arc<LatexPackage>> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        self.load_from_str(&yaml)
    }

    /// Looks a package up, loading it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<LatexPackage>> {
        if let Some(cached) = self.cache.read().get(name) {
            return cached
                .clone()
                .ok_or_else(|| PackageError::UnknownPackage(name.to_string()));
        }
        let loaded = self.locate(name);
        let entry = match &loaded {
            Ok(package) => Some(Arc::clone(package)),
            Err(PackageError::UnknownPackage(_)) => None,
            Err(err) => {
                warn!(package = name, %err, "failed to load package");
                None
            }
        };
        self.cache.write().insert(name.to_string(), entry);
        loaded
    }

    fn locate(&self, name: &str) -> Result<Arc<LatexPackage>> {
        for base in &self.search_paths {
            let candidate = base.join(format!("{name}.yaml"));
            if candidate.is_file() {
                debug!(package = name, path = %candidate.display(), "loading package file");
                let yaml = std::fs::read_to_string(&candidate)?;
                return Ok(Arc::new(PackageDefinition::from_yaml(&yaml)?.into_package()?));
            }
        }
        if self.use_bundled {
            if let Some((_, yaml)) = BUNDLED.iter().find(|(bundled, _)| *bundled == name) {
                debug!(package = name, "loading bundled package");
                return Ok(Arc::new(PackageDefinition::from_yaml(yaml)?.into_package()?));
            }
        }
        Err(PackageError::UnknownPackage(name.to_string()))
    }

    /// Names of the packages loaded so far.
    pub fn loaded(&self) -> BTreeSet<String> {
        self.cache
            .read()
            .iter()
            .filter(|(_, package)| package.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resolve a package and everything it requires, in load order.
    ///
    /// Unlike the lenient lookup used during analysis, a missing package or a require cycle is an
    /// error here.
    pub fn resolve(&self, name: &str) -> Result<Vec<Arc<LatexPackage>>> {
        let mut out = Vec::new();
        let mut visiting = Vec::new();
        self.resolve_into(name, &mut visiting, &mut out)?;
        Ok(out)
    }

    fn resolve_into(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        out: &mut Vec<Arc<LatexPackage>>,
    ) -> Result<()> {
        if visiting.iter().any(|n| n == name) {
            return Err(PackageError::RequireCycle(name.to_string()));
        }
        if out.iter().any(|p| p.name == name) {
            return Ok(());
        }
        let package = self.get(name)?;
        visiting.push(name.to_string());
        for required in &package.requires {
            self.resolve_into(required, visiting, out)?;
        }
        visiting.pop();
        out.push(package);
        Ok(())
    }
}

impl PackageProvider for PackageRegistry {
    fn package(&self, name: &str) -> Option<Arc<LatexPackage>> {
        self.get(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_bundled_package_loads() {
        let registry = PackageRegistry::bundled();
        for name in bundled_names() {
            let package = registry.get(name).unwrap();
            assert_eq!(package.name, name);
        }
    }

    #[test]
    fn test_misses_are_cached() {
        let registry = PackageRegistry::new();
        assert!(matches!(
            registry.get("amsmath"),
            Err(PackageError::UnknownPackage(_))
        ));
        assert!(registry.loaded().is_empty());
        assert_eq!(registry.cache.read().len(), 1);
    }
}
