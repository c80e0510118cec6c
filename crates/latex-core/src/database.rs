//! The command database.
//!
//! A [`CommandDatabase`] answers the questions the lexer, the structure patcher and the syntax
//! checker ask about commands and environments:
//!
//! - which categories a command belongs to (`normal`, `math`, `tabular`, `%label`, ...)
//! - which arguments a command takes ([`CommandSignature`])
//! - which environments exist and which categories they alias (`equation` aliases `math`)
//! - which commands are sectioning commands, and at which level
//! - which keys / values a key-value argument accepts
//!
//! A database is assembled from the built-in table, the databases of all used packages and the
//! commands defined in the document itself, then shared as an immutable `Arc` value. Changes
//! produce a new database; nothing is updated in place once published.

use crate::error::Result;
use crate::package::LatexPackage;
use crate::signature::CommandSignature;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Well-known category names.
///
/// Plain names (`normal`, `math`, `tabular`, ...) decide where a command is valid. Names starting
/// with `%` assign a semantic role used by structure extraction.
pub mod category {
    /// Commands valid everywhere.
    pub const NORMAL: &str = "normal";
    /// Commands valid only in math.
    pub const MATH: &str = "math";
    /// Commands valid only in tabular-like environments.
    pub const TABULAR: &str = "tabular";
    /// Commands valid only in `tabbing`.
    pub const TABBING: &str = "tabbing";
    /// Commands and environments defined in the document.
    pub const USER: &str = "user";
    /// `\label`-like commands.
    pub const LABEL: &str = "%label";
    /// `\ref`-like commands.
    pub const REF: &str = "%ref";
    /// `\include`/`\input`-like commands.
    pub const INCLUDE: &str = "%include";
    /// `\usepackage`-like commands.
    pub const USEPACKAGE: &str = "%usepackage";
    /// `\documentclass`.
    pub const DOCUMENTCLASS: &str = "%documentclass";
    /// `\bibitem`-like commands.
    pub const BIBITEM: &str = "%bibitem";
    /// `\bibliography`-like commands.
    pub const BIBLIOGRAPHY: &str = "%bibliography";
    /// `\todo`-like commands.
    pub const TODO: &str = "%todo";
    /// `\appendix`.
    pub const APPENDIX: &str = "%appendix";
    /// `\newcommand`-like commands.
    pub const DEFINITION: &str = "%definition";
    /// `\DeclareMathOperator`-like commands.
    pub const MATH_DEFINITION: &str = "%mathdefinition";
    /// `\newenvironment`-like commands.
    pub const ENV_DEFINITION: &str = "%envdefinition";
    /// `\newtheorem`-like commands.
    pub const THEOREM: &str = "%theorem";
    /// `\newcounter`.
    pub const COUNTER: &str = "%counter";
    /// `\newif`.
    pub const IF_DEFINITION: &str = "%ifdefinition";
    /// `\newlength`.
    pub const LENGTH: &str = "%length";
    /// `\newcolumntype`.
    pub const COLUMN_TYPE: &str = "%columntype";
    /// Inline verbatim commands (`\verb`).
    pub const VERBATIM: &str = "%verbatim";
    /// Environment names whose content is verbatim.
    pub const VERBATIM_ENV: &str = "%verbatimEnv";
    /// Environment names that produce block entries in the outline.
    pub const BLOCK_ENV: &str = "%blockEnv";
    /// Horizontal rules between tabular rows.
    pub const ROW_RULE: &str = "%rowrule";
    /// Row terminators of tabular environments.
    pub const LINEBREAK: &str = "%linebreak";
    /// Commands spanning several tabular columns; the first argument is the span.
    pub const MULTICOLUMN: &str = "%multicolumn";
}

/// What kind of thing a document-level definition introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    /// A text command (`\newcommand`, `\def`, `\newlength`, ...).
    Command,
    /// A math-only command (`\DeclareMathOperator`).
    MathCommand,
    /// An environment (`\newenvironment`, `\newtheorem`).
    Environment,
    /// A tabular column letter (`\newcolumntype`).
    ColumnType,
}

/// A command, environment or column type defined in the document itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserDefinition {
    /// Kind of definition.
    pub kind: DefinitionKind,
    /// Defined name (`\foo`, `myenv`, `L`).
    pub name: String,
    /// Number of arguments.
    pub arity: usize,
    /// Whether the first argument is optional (a default value was given).
    pub optional_first: bool,
    /// Environments aliased by a user environment (from `\begin{x}` in its begin code).
    pub aliases: Vec<String>,
}

impl UserDefinition {
    /// A user command without arguments.
    pub fn command(name: impl Into<String>) -> Self {
        Self::new(DefinitionKind::Command, name)
    }

    /// A definition of `kind` without arguments.
    pub fn new(kind: DefinitionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            arity: 0,
            optional_first: false,
            aliases: Vec::new(),
        }
    }

    /// Set the argument count.
    pub fn with_arity(mut self, arity: usize, optional_first: bool) -> Self {
        self.arity = arity;
        self.optional_first = optional_first;
        self
    }

    /// Add an aliased environment.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Category, signature and environment tables for a document.
#[derive(Debug, Clone, Default)]
pub struct CommandDatabase {
    categories: HashMap<String, HashSet<String>>,
    command_categories: HashMap<String, BTreeSet<String>>,
    signatures: HashMap<String, Arc<CommandSignature>>,
    environments: HashSet<String>,
    environment_aliases: HashMap<String, BTreeSet<String>>,
    structure_levels: HashMap<String, i32>,
    keys: HashMap<String, BTreeSet<String>>,
    values: HashMap<String, BTreeSet<String>>,
    column_types: BTreeSet<char>,
    math_delimiters: Vec<(String, String)>,
    packages: BTreeSet<String>,
}

impl CommandDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in LaTeX table.
    pub fn builtin() -> Self {
        crate::builtin::latex_document()
    }

    /// Assemble a document database from a base table, package databases and user definitions.
    pub fn assemble<'a>(
        base: &CommandDatabase,
        packages: impl IntoIterator<Item = &'a Arc<LatexPackage>>,
        user: impl IntoIterator<Item = &'a UserDefinition>,
    ) -> Self {
        let mut db = base.clone();
        for package in packages {
            db.merge(&package.database);
            db.packages.insert(package.name.clone());
        }
        db.apply_user_definitions(user);
        db
    }

    /// Register a command from a signature string in the given categories.
    pub fn add_command(&mut self, signature: &str, categories: &[&str]) -> Result<()> {
        let sig = CommandSignature::parse(signature)?;
        self.add_signature(sig, categories.iter().copied());
        Ok(())
    }

    /// Register a parsed signature in the given categories.
    ///
    /// Environment signatures (`\begin{x}`) register the environment instead of a command.
    pub fn add_signature<'a>(
        &mut self,
        signature: CommandSignature,
        categories: impl IntoIterator<Item = &'a str>,
    ) {
        if let Some(env) = signature
            .name
            .strip_prefix("\\begin{")
            .and_then(|s| s.strip_suffix('}'))
        {
            self.environments.insert(env.to_string());
        } else {
            for cat in categories {
                self.add_to_category(cat, &signature.name);
            }
        }
        if !signature.args.is_empty() || signature.is_environment() {
            self.signatures
                .insert(signature.name.clone(), Arc::new(signature));
        }
    }

    /// Add a name (command or environment) to a category.
    pub fn add_to_category(&mut self, category: &str, name: &str) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string());
        if name.starts_with('\\') {
            self.command_categories
                .entry(name.to_string())
                .or_default()
                .insert(category.to_string());
        }
    }

    /// Register an environment and the categories/environments it aliases.
    pub fn add_environment<'a>(&mut self, name: &str, aliases: impl IntoIterator<Item = &'a str>) {
        self.environments.insert(name.to_string());
        for alias in aliases {
            self.add_alias(name, alias);
        }
    }

    /// Declare that `env` behaves like `alias` (an environment name or a category).
    pub fn add_alias(&mut self, env: &str, alias: &str) {
        if env == alias {
            return;
        }
        self.environment_aliases
            .entry(env.to_string())
            .or_default()
            .insert(alias.to_string());
    }

    /// Declare `command` a sectioning command at `level` (`\section` is 0).
    pub fn set_structure_level(&mut self, command: &str, level: i32) {
        self.structure_levels.insert(command.to_string(), level);
    }

    /// Declare the keys accepted by the key-value argument of `command`.
    pub fn add_keys<'a>(&mut self, command: &str, keys: impl IntoIterator<Item = &'a str>) {
        let set = self.keys.entry(command.to_string()).or_default();
        set.extend(keys.into_iter().map(str::to_string));
    }

    /// Declare the values accepted for `key` of `command`.
    pub fn add_key_values<'a>(
        &mut self,
        command: &str,
        key: &str,
        values: impl IntoIterator<Item = &'a str>,
    ) {
        let set = self.values.entry(format!("{command}/{key}")).or_default();
        set.extend(values.into_iter().map(str::to_string));
    }

    /// Declare an additional tabular column letter.
    pub fn add_column_type(&mut self, column: char) {
        self.column_types.insert(column);
    }

    /// Declare a math delimiter pair (`$`/`$`, `\(`/`\)`).
    pub fn add_math_delimiter(&mut self, open: &str, close: &str) {
        let pair = (open.to_string(), close.to_string());
        if !self.math_delimiters.contains(&pair) {
            self.math_delimiters.push(pair);
        }
    }

    /// Record a package as part of this database.
    pub fn mark_package(&mut self, name: &str) {
        self.packages.insert(name.to_string());
    }

    /// Merge every table of `other` into `self`.
    pub fn merge(&mut self, other: &CommandDatabase) {
        for (cat, names) in &other.categories {
            for name in names {
                self.add_to_category(cat, name);
            }
        }
        for (name, sig) in &other.signatures {
            self.signatures.insert(name.clone(), Arc::clone(sig));
        }
        self.environments.extend(other.environments.iter().cloned());
        for (env, aliases) in &other.environment_aliases {
            self.environment_aliases
                .entry(env.clone())
                .or_default()
                .extend(aliases.iter().cloned());
        }
        self.structure_levels.extend(
            other
                .structure_levels
                .iter()
                .map(|(k, v)| (k.clone(), *v)),
        );
        for (cmd, keys) in &other.keys {
            self.keys
                .entry(cmd.clone())
                .or_default()
                .extend(keys.iter().cloned());
        }
        for (key, values) in &other.values {
            self.values
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self.column_types.extend(other.column_types.iter().copied());
        for (open, close) in &other.math_delimiters {
            self.add_math_delimiter(open, close);
        }
        self.packages.extend(other.packages.iter().cloned());
    }

    /// Add document-level definitions to the `user` (or `math`) category.
    pub fn apply_user_definitions<'a>(
        &mut self,
        definitions: impl IntoIterator<Item = &'a UserDefinition>,
    ) {
        for def in definitions {
            match def.kind {
                DefinitionKind::Command | DefinitionKind::MathCommand => {
                    let cat = if def.kind == DefinitionKind::Command {
                        category::USER
                    } else {
                        category::MATH
                    };
                    self.add_to_category(cat, &def.name);
                    if def.arity > 0 {
                        let sig =
                            CommandSignature::user_command(&def.name, def.arity, def.optional_first);
                        self.signatures.insert(def.name.clone(), Arc::new(sig));
                    }
                }
                DefinitionKind::Environment => {
                    self.add_to_category(category::USER, &def.name);
                    self.add_environment(&def.name, def.aliases.iter().map(String::as_str));
                    if def.arity > 0 {
                        let name = format!("\\begin{{{}}}", def.name);
                        let sig = CommandSignature::user_command(name, def.arity, def.optional_first);
                        self.signatures.insert(sig.name.clone(), Arc::new(sig));
                    }
                }
                DefinitionKind::ColumnType => {
                    if let Some(c) = def.name.chars().next() {
                        self.column_types.insert(c);
                    }
                }
            }
        }
    }

    /// Argument signature of a command (or of `\begin{env}`).
    pub fn signature(&self, name: &str) -> Option<&Arc<CommandSignature>> {
        self.signatures.get(name)
    }

    /// Argument signature following `\begin{env}`.
    pub fn environment_signature(&self, env: &str) -> Option<&Arc<CommandSignature>> {
        self.signatures.get(&format!("\\begin{{{env}}}"))
    }

    /// Returns `true` if `name` is in `category`.
    pub fn in_category(&self, category: &str, name: &str) -> bool {
        self.categories
            .get(category)
            .is_some_and(|set| set.contains(name))
    }

    /// All names in a category.
    pub fn category(&self, category: &str) -> Option<&HashSet<String>> {
        self.categories.get(category)
    }

    /// Categories a command belongs to.
    pub fn categories_of(&self, command: &str) -> impl Iterator<Item = &str> {
        self.command_categories
            .get(command)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Returns `true` if the command is in any category.
    pub fn is_known_command(&self, command: &str) -> bool {
        self.command_categories.contains_key(command)
    }

    /// Returns `true` if `env` is a known environment.
    pub fn is_environment(&self, env: &str) -> bool {
        self.environments.contains(env)
            || self.environment_aliases.contains_key(env)
            || self.in_category(category::USER, env)
    }

    /// All known environment names.
    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.environments.iter().map(String::as_str)
    }

    /// Transitive aliases of an environment (not including the environment itself).
    pub fn aliases(&self, env: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut pending = vec![env.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(direct) = self.environment_aliases.get(&current) {
                for alias in direct {
                    if alias != env && out.insert(alias.clone()) {
                        pending.push(alias.clone());
                    }
                }
            }
        }
        out
    }

    /// Returns `true` if `env` is `target` or aliases it (transitively).
    pub fn environment_is(&self, env: &str, target: &str) -> bool {
        env == target || self.aliases(env).contains(target)
    }

    /// Sectioning level of a command.
    pub fn structure_level(&self, command: &str) -> Option<i32> {
        self.structure_levels.get(command).copied()
    }

    /// Deepest declared sectioning level.
    pub fn deepest_structure_level(&self) -> i32 {
        self.structure_levels.values().copied().max().unwrap_or(0)
    }

    /// Keys accepted by the key-value argument of `command`, if declared.
    pub fn keys_for(&self, command: &str) -> Option<&BTreeSet<String>> {
        self.keys.get(command)
    }

    /// Values accepted for `key` of `command`, if declared.
    pub fn values_for(&self, command: &str, key: &str) -> Option<&BTreeSet<String>> {
        self.values.get(&format!("{command}/{key}"))
    }

    /// Returns `true` if `column` is a declared extra column letter.
    pub fn is_column_type(&self, column: char) -> bool {
        self.column_types.contains(&column)
    }

    /// Closing delimiter for a math opening delimiter.
    pub fn math_close_for(&self, open: &str) -> Option<&str> {
        self.math_delimiters
            .iter()
            .find(|(o, _)| o == open)
            .map(|(_, c)| c.as_str())
    }

    /// Returns `true` if `text` closes some math delimiter pair.
    pub fn is_math_close(&self, text: &str) -> bool {
        self.math_delimiters.iter().any(|(_, c)| c == text)
    }

    /// Packages merged into this database.
    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// Returns `true` if `package` was merged into this database.
    pub fn has_package(&self, package: &str) -> bool {
        self.packages.contains(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_command_registers_categories_and_signature() {
        let mut db = CommandDatabase::new();
        db.add_command("\\label{label}", &[category::NORMAL, category::LABEL])
            .unwrap();
        db.add_command("\\today", &[category::NORMAL]).unwrap();

        assert!(db.in_category(category::LABEL, "\\label"));
        assert!(db.signature("\\label").is_some());
        assert!(db.signature("\\today").is_none());
        assert!(db.is_known_command("\\today"));
        let cats: Vec<_> = db.categories_of("\\label").collect();
        assert_eq!(cats, vec!["%label", "normal"]);
    }

    #[test]
    fn test_environment_aliases_are_transitive() {
        let mut db = CommandDatabase::new();
        db.add_environment("equation", ["math"]);
        db.add_environment("myeq", ["equation"]);
        assert!(db.environment_is("myeq", "math"));
        assert!(db.environment_is("equation", "equation"));
        assert!(!db.environment_is("equation", "tabular"));
    }

    #[test]
    fn test_alias_cycles_terminate() {
        let mut db = CommandDatabase::new();
        db.add_alias("a", "b");
        db.add_alias("b", "a");
        let aliases = db.aliases("a");
        assert!(aliases.contains("b"));
        assert!(!aliases.contains("a"));
    }

    #[test]
    fn test_user_definitions_extend_database() {
        let mut db = CommandDatabase::new();
        db.apply_user_definitions(&[
            UserDefinition::command("\\foo").with_arity(2, true),
            UserDefinition::new(DefinitionKind::MathCommand, "\\op"),
            UserDefinition::new(DefinitionKind::Environment, "myitemize").with_alias("itemize"),
            UserDefinition::new(DefinitionKind::ColumnType, "L"),
        ]);

        assert!(db.in_category(category::USER, "\\foo"));
        assert_eq!(db.signature("\\foo").unwrap().args.len(), 2);
        assert!(db.in_category(category::MATH, "\\op"));
        assert!(db.environment_is("myitemize", "itemize"));
        assert!(db.is_column_type('L'));
    }

    #[test]
    fn test_environment_signature_registers_environment() {
        let mut db = CommandDatabase::new();
        db.add_command("\\begin{tabular}[pos]{cols}", &[]).unwrap();
        assert!(db.is_environment("tabular"));
        assert!(db.environment_signature("tabular").is_some());
    }
}
