//! Signature store
//!
//! Loads one or more magic sources, orders the top-level rules by strength
//! and indexes the named trees that `use` rules refer to.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::parser;
use super::rule::{Offset, SignatureRule, TestKind};
use crate::error::{LoadError, Location};
use crate::types::{HEURISTIC_WINDOW, MAX_PREFIX_LEN, MAX_RECURSION, PREFIX_SAFETY_MARGIN};

/// Database compiled into the crate
const BUILTIN: &str = include_str!("builtin.magic");
const BUILTIN_NAME: &str = "builtin";

/// Where a magic database comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicSource {
    /// The database shipped with the crate
    Builtin,
    /// In-memory text, labelled with `name` in error messages
    Text { name: String, text: String },
    /// A magic file, or a directory whose files are loaded in name order
    Path(PathBuf),
}

impl MagicSource {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        MagicSource::Text {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Reads the source into `(origin, text)` pairs
    fn read(&self) -> Result<Vec<(String, String)>, LoadError> {
        match self {
            MagicSource::Builtin => Ok(vec![(BUILTIN_NAME.to_string(), BUILTIN.to_string())]),
            MagicSource::Text { name, text } => Ok(vec![(name.clone(), text.clone())]),
            MagicSource::Path(path) if path.is_dir() => read_dir(path),
            MagicSource::Path(path) => Ok(vec![read_file(path)?]),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_file(path: &Path) -> Result<(String, String), LoadError> {
    let bytes = fs::read(path).map_err(|err| io_error(path, err))?;
    Ok((
        path.display().to_string(),
        String::from_utf8_lossy(&bytes).into_owned(),
    ))
}

fn read_dir(dir: &Path) -> Result<Vec<(String, String)>, LoadError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| io_error(dir, err))? {
        let entry = entry.map_err(|err| io_error(dir, err))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|path| read_file(path)).collect()
}

/// Immutable, strength-ordered collection of signature rules
#[derive(Debug, Clone)]
pub struct SignatureStore {
    rules: Vec<SignatureRule>,
    named: HashMap<String, SignatureRule>,
    prefix_len: usize,
    sources: Vec<String>,
}

impl SignatureStore {
    /// Loads a single source
    pub fn load(source: &MagicSource) -> Result<Self, LoadError> {
        Self::load_all(std::slice::from_ref(source))
    }

    /// Loads several sources into one store; `use` may refer to a name
    /// defined in any of them.
    pub fn load_all(sources: &[MagicSource]) -> Result<Self, LoadError> {
        let mut origins = Vec::new();
        let mut parsed: Vec<(usize, SignatureRule)> = Vec::new();

        for source in sources {
            for (origin, text) in source.read()? {
                let index = origins.len();
                parsed.extend(
                    parser::parse(&origin, &text)?
                        .into_iter()
                        .map(|rule| (index, rule)),
                );
                origins.push(origin);
            }
        }

        {
            let names: Vec<&str> = parsed.iter().filter_map(|(_, rule)| rule.name()).collect();
            for (index, rule) in &parsed {
                check_uses(rule, &names, &origins[*index])?;
            }
        }

        let mut rules = Vec::new();
        let mut named = HashMap::new();
        for (index, rule) in parsed {
            match rule.name().map(str::to_string) {
                Some(name) if named.contains_key(&name) => {
                    debug!(name = %name, origin = %origins[index], "duplicate name ignored");
                }
                Some(name) => {
                    named.insert(name, rule);
                }
                None => rules.push(rule),
            }
        }

        rules.sort_by(|a, b| b.strength.cmp(&a.strength));

        let mut store = Self {
            rules,
            named,
            prefix_len: HEURISTIC_WINDOW,
            sources: origins,
        };
        store.prefix_len = store.compute_prefix_len();

        debug!(
            sources = store.sources.len(),
            rules = store.rules.len(),
            named = store.named.len(),
            prefix_len = store.prefix_len,
            "loaded magic database"
        );
        Ok(store)
    }

    /// Loads the database compiled into the crate
    pub fn builtin() -> Result<Self, LoadError> {
        Self::load(&MagicSource::Builtin)
    }

    /// Loads in-memory magic text
    pub fn parse(name: &str, text: &str) -> Result<Self, LoadError> {
        Self::load(&MagicSource::text(name, text))
    }

    /// Top-level rules, strongest first; equal strengths keep declaration order
    pub fn rules_in_priority_order(&self) -> &[SignatureRule] {
        &self.rules
    }

    /// The `name` rule heading the named tree `name`
    pub fn named(&self, name: &str) -> Option<&SignatureRule> {
        self.named.get(name)
    }

    /// Number of top-level rules, named trees excluded
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of leading bytes an input must provide for every static
    /// offset in the database to be readable
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Origins the store was loaded from, in load order
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// `(strength, rule)` for every top-level rule, in priority order
    pub fn list(&self) -> impl Iterator<Item = (u32, &SignatureRule)> {
        self.rules.iter().map(|rule| (rule.strength(), rule))
    }

    fn compute_prefix_len(&self) -> usize {
        let extent = self
            .rules
            .iter()
            .map(|rule| self.extent(rule, 0, Some(0), 0))
            .max()
            .unwrap_or(0);
        let wanted = usize::try_from(extent)
            .unwrap_or(usize::MAX)
            .saturating_add(PREFIX_SAFETY_MARGIN);
        wanted.max(HEURISTIC_WINDOW).min(MAX_PREFIX_LEN)
    }

    /// Furthest byte a rule tree can read at a statically known offset.
    ///
    /// `base` is where absolute offsets start (non-zero inside `use`);
    /// `parent_end` is `None` once an indirect or from-end offset makes the
    /// position unknowable.
    fn extent(&self, rule: &SignatureRule, base: u64, parent_end: Option<u64>, depth: usize) -> u64 {
        if depth > MAX_RECURSION {
            return 0;
        }

        let start = match rule.offset() {
            Offset::Absolute(offset) => Some(base.saturating_add(*offset)),
            Offset::Relative(delta) => {
                parent_end.map(|end| end.saturating_add_signed(*delta))
            }
            Offset::FromEnd(_) | Offset::Indirect(_) => None,
        };

        let mut furthest = 0;
        let mut end = None;
        if let Some(start) = start {
            let stop = start.saturating_add(rule.test().static_len() as u64);
            furthest = stop;
            end = Some(stop);

            if let TestKind::Use { name, .. } = rule.test() {
                if let Some(tree) = self.named.get(name) {
                    for child in tree.children() {
                        furthest = furthest.max(self.extent(child, start, Some(start), depth + 1));
                    }
                }
            }
        }

        for child in rule.children() {
            furthest = furthest.max(self.extent(child, base, end, depth + 1));
        }
        furthest
    }
}

/// Loads a magic database; shorthand for [`SignatureStore::load`]
pub fn load_signature_store(source: &MagicSource) -> Result<SignatureStore, LoadError> {
    SignatureStore::load(source)
}

fn check_uses(rule: &SignatureRule, names: &[&str], origin: &str) -> Result<(), LoadError> {
    if let TestKind::Use { name, .. } = rule.test() {
        if !names.contains(&name.as_str()) {
            return Err(LoadError::UndefinedName {
                at: Location::new(origin, rule.line()),
                name: name.clone(),
            });
        }
    }
    rule.children()
        .iter()
        .try_for_each(|child| check_uses(child, names, origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_sorted_by_strength_stably() {
        let store = SignatureStore::parse(
            "test",
            "0 byte 1 one\n0 string ABCDEFGH long\n0 byte 2 two\n",
        )
        .unwrap();
        let order: Vec<&str> = store
            .rules_in_priority_order()
            .iter()
            .map(SignatureRule::description)
            .collect();
        assert_eq!(order, ["long", "one", "two"]);
    }

    #[test]
    fn test_named_trees_are_indexed_separately() {
        let store =
            SignatureStore::parse("test", "0 name part\n>0 byte 1 one\n0 use part\n").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.named("part").is_some());
    }

    #[test]
    fn test_undefined_use_is_rejected() {
        let err = SignatureStore::parse("test", "0 byte 1 x\n>1 use missing\n").unwrap_err();
        assert!(matches!(err, LoadError::UndefinedName { ref name, .. } if name == "missing"));
        assert_eq!(err.location(), Some(&Location::new("test", 2)));
    }

    #[test]
    fn test_prefix_len_has_a_floor() {
        let store = SignatureStore::parse("test", "0 string ABC abc\n").unwrap();
        assert_eq!(store.prefix_len(), HEURISTIC_WINDOW);
    }

    #[test]
    fn test_prefix_len_follows_relative_offsets() {
        let store =
            SignatureStore::parse("test", "9000 string AB x\n>&100 belong 1 y\n").unwrap();
        assert_eq!(store.prefix_len(), 9000 + 2 + 100 + 4 + PREFIX_SAFETY_MARGIN);
    }

    #[test]
    fn test_prefix_len_follows_use() {
        let store = SignatureStore::parse(
            "test",
            "0 name deep\n>10000 byte 1 z\n0 byte 1 x\n>20000 use deep\n",
        )
        .unwrap();
        assert_eq!(store.prefix_len(), 30001 + PREFIX_SAFETY_MARGIN);
    }

    #[test]
    fn test_prefix_len_is_capped() {
        let store = SignatureStore::parse("test", "0x7fffffff byte 1 far\n").unwrap();
        assert_eq!(store.prefix_len(), MAX_PREFIX_LEN);
    }

    #[test]
    fn test_indirect_offsets_do_not_grow_prefix() {
        let store = SignatureStore::parse("test", "(0x3c.l) string PE\\0\\0 pe\n").unwrap();
        assert_eq!(store.prefix_len(), HEURISTIC_WINDOW);
    }

    #[test]
    fn test_builtin_database_loads() {
        let store = SignatureStore::builtin().unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.sources(), ["builtin".to_string()]);
        assert!(store.prefix_len() >= HEURISTIC_WINDOW);
        assert!(store.prefix_len() <= MAX_PREFIX_LEN);
    }
}
