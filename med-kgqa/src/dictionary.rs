use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::entity::EntityCategory;
use crate::error::Result;

/// Immutable per-category canonical term lists.
///
/// Loaded once at startup and shared read-only across requests; source
/// of truth for both the dictionary automaton and the canonical
/// aligner.
#[derive(Debug, Clone, Default)]
pub struct TermIndex {
    terms: BTreeMap<EntityCategory, Vec<String>>,
}

impl TermIndex {
    /// Load term lists from a directory containing one `<label>.txt`
    /// file per category (e.g. `疾病.txt`). Each line holds one term;
    /// only the first whitespace-separated token is used. Missing
    /// files leave that category empty.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut terms = BTreeMap::new();
        for category in EntityCategory::ALL {
            let path = dir.join(format!("{}.txt", category.label()));
            let list = match fs::read_to_string(&path) {
                Ok(content) => parse_term_lines(&content),
                Err(e) => {
                    warn!("term list {} not readable: {}", path.display(), e);
                    Vec::new()
                }
            };
            info!("loaded {} terms for {}", list.len(), category.label());
            terms.insert(category, list);
        }
        Ok(Self { terms })
    }

    /// Build an index from in-memory term lists.
    pub fn from_terms<I, S>(lists: I) -> Self
    where
        I: IntoIterator<Item = (EntityCategory, Vec<S>)>,
        S: Into<String>,
    {
        let mut terms: BTreeMap<EntityCategory, Vec<String>> = BTreeMap::new();
        for (category, list) in lists {
            terms
                .entry(category)
                .or_default()
                .extend(list.into_iter().map(Into::into));
        }
        Self { terms }
    }

    /// Terms for one category; empty slice when the category has no
    /// dictionary.
    pub fn terms(&self, category: EntityCategory) -> &[String] {
        self.terms.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories that actually carry at least one term.
    pub fn populated_categories(&self) -> impl Iterator<Item = EntityCategory> + '_ {
        EntityCategory::ALL
            .into_iter()
            .filter(|c| !self.terms(*c).is_empty())
    }
}

fn parse_term_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}
