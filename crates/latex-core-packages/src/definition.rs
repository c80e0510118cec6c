//! Serde model of a YAML package description.

use crate::error::{PackageError, Result};
use latex_core::{CommandDatabase, LatexPackage, category};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// An entry of the `commands:` list.
pub enum CommandEntry {
    /// A bare signature string; the command lands in the `normal` category.
    Signature(String),
    /// A signature with explicit categories.
    Detailed {
        /// Signature string (`\cmd[optional]{mandatory}`).
        signature: String,
        /// Categories the command belongs to.
        #[serde(default)]
        categories: Vec<String>,
    },
}

impl CommandEntry {
    fn parts(&self) -> (&str, Vec<&str>) {
        match self {
            Self::Signature(signature) => (signature.as_str(), vec![category::NORMAL]),
            Self::Detailed {
                signature,
                categories,
            } if categories.is_empty() => (signature.as_str(), vec![category::NORMAL]),
            Self::Detailed {
                signature,
                categories,
            } => (
                signature.as_str(),
                categories.iter().map(String::as_str).collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
/// An entry of the `environments:` list.
pub enum EnvironmentEntry {
    /// A plain environment name.
    Name(String),
    /// An environment behaving like other environments or categories.
    Detailed {
        /// Environment name.
        name: String,
        /// Environments or categories this one aliases (`math`, `tabular`, `itemize`, ...).
        #[serde(default)]
        aliases: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Raw YAML package description.
pub struct PackageDefinition {
    /// Package name (`amsmath`, or `class-article` for a document class).
    pub name: String,

    #[serde(default)]
    /// Packages loaded by this package.
    pub requires: Vec<String>,

    #[serde(default)]
    /// Commands with their argument signatures.
    pub commands: Vec<CommandEntry>,

    #[serde(default)]
    /// Environments.
    pub environments: Vec<EnvironmentEntry>,

    #[serde(default)]
    /// Extra category memberships, keyed by category.
    pub categories: HashMap<String, Vec<String>>,

    #[serde(default)]
    /// Sectioning levels of sectioning commands (`\section` is 0).
    pub structure: HashMap<String, i32>,

    #[serde(default)]
    /// Keys accepted by key-value arguments, keyed by command.
    pub keyvals: HashMap<String, Vec<String>>,

    #[serde(default)]
    /// Accepted values, keyed by command and then by key.
    pub values: HashMap<String, HashMap<String, Vec<String>>>,

    #[serde(default)]
    /// Extra tabular column letters.
    pub column_types: Vec<String>,

    #[serde(default)]
    /// Extra math delimiter pairs.
    pub math_delimiters: Vec<(String, String)>,
}

impl PackageDefinition {
    /// Parse a definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Build the package database.
    pub fn into_package(self) -> Result<LatexPackage> {
        let mut db = CommandDatabase::new();

        for entry in &self.commands {
            let (signature, categories) = entry.parts();
            db.add_command(signature, &categories)
                .map_err(|source| PackageError::InvalidCommand {
                    package: self.name.clone(),
                    source,
                })?;
        }

        for entry in &self.environments {
            match entry {
                EnvironmentEntry::Name(name) => db.add_environment(name, std::iter::empty()),
                EnvironmentEntry::Detailed { name, aliases } => {
                    db.add_environment(name, aliases.iter().map(String::as_str));
                }
            }
        }

        for (cat, names) in &self.categories {
            for name in names {
                db.add_to_category(cat, name);
            }
        }

        for (command, level) in &self.structure {
            db.set_structure_level(command, *level);
        }

        for (command, keys) in &self.keyvals {
            db.add_keys(command, keys.iter().map(String::as_str));
        }
        for (command, by_key) in &self.values {
            for (key, values) in by_key {
                db.add_key_values(command, key, values.iter().map(String::as_str));
            }
        }

        for column in &self.column_types {
            let mut chars = column.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_alphabetic() => db.add_column_type(c),
                _ => return Err(PackageError::InvalidColumnType(column.clone())),
            }
        }

        for (open, close) in &self.math_delimiters {
            db.add_math_delimiter(open, close);
        }

        let mut package = LatexPackage::new(self.name, db);
        package.requires = self.requires;
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_default_to_normal() {
        let yaml = r#"
name: demo
commands:
  - '\demo{text}'
  - signature: '\demoref{ref}'
    categories: [normal, '%ref']
environments:
  - demobox
  - name: demomath
    aliases: [math]
"#;
        let package = PackageDefinition::from_yaml(yaml)
            .unwrap()
            .into_package()
            .unwrap();
        let db = &package.database;
        assert!(db.in_category(category::NORMAL, "\\demo"));
        assert!(db.in_category(category::REF, "\\demoref"));
        assert!(db.is_environment("demobox"));
        assert!(db.environment_is("demomath", category::MATH));
    }

    #[test]
    fn test_invalid_entries_are_reported() {
        let bad_command = "name: demo\ncommands: ['nobackslash']";
        let err = PackageDefinition::from_yaml(bad_command)
            .unwrap()
            .into_package()
            .unwrap_err();
        assert!(matches!(err, PackageError::InvalidCommand { .. }));

        let bad_column = "name: demo\ncolumn_types: [XY]";
        let err = PackageDefinition::from_yaml(bad_column)
            .unwrap()
            .into_package()
            .unwrap_err();
        assert!(matches!(err, PackageError::InvalidColumnType(_)));

        assert!(PackageDefinition::from_yaml("commands: [").is_err());
    }
}
