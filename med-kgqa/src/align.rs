use std::collections::{BTreeMap, HashMap};

use crate::dictionary::TermIndex;
use crate::entity::{EntityCategory, EntityMap, Span};

/// Minimum cosine similarity for a span to be accepted as one of the
/// canonical terms of its category.
const MIN_SIMILARITY: f32 = 0.5;

/// Canonical terms longer than this are excluded from the alignment
/// vocabulary; they are graph pollution rather than names.
const MAX_TERM_CHARS: usize = 15;

/// Normalized character term-frequency vector over a fixed category
/// vocabulary, stored sparsely as `(char index, weight)`.
type TfVector = Vec<(usize, f32)>;

struct CategoryVectors {
    vocab: HashMap<char, usize>,
    terms: Vec<(String, TfVector)>,
}

/// Fuzzy normalization of recognized spans onto canonical graph
/// entities.
///
/// For each category the canonical terms are embedded once as
/// character term-frequency vectors; at request time a span's surface
/// text is embedded over the same vocabulary and the best cosine match
/// at or above the threshold wins. Characters outside the category
/// vocabulary carry no weight.
pub struct CanonicalAligner {
    categories: BTreeMap<EntityCategory, CategoryVectors>,
}

impl CanonicalAligner {
    pub fn build(index: &TermIndex) -> Self {
        let mut categories = BTreeMap::new();
        for category in index.populated_categories() {
            let terms: Vec<&str> = index
                .terms(category)
                .iter()
                .map(String::as_str)
                .filter(|t| {
                    let n = t.chars().count();
                    (1..=MAX_TERM_CHARS).contains(&n)
                })
                .collect();
            if terms.is_empty() {
                continue;
            }

            let mut vocab: HashMap<char, usize> = HashMap::new();
            for term in &terms {
                for ch in term.chars() {
                    let next = vocab.len();
                    vocab.entry(ch).or_insert(next);
                }
            }

            let embedded = terms
                .iter()
                .map(|term| ((*term).to_string(), embed(term, &vocab)))
                .collect();

            categories.insert(
                category,
                CategoryVectors {
                    vocab,
                    terms: embedded,
                },
            );
        }
        Self { categories }
    }

    /// Map merged spans to canonical entities. Spans whose category
    /// has no canonical index contribute nothing; within a category a
    /// later span overwrites an earlier one.
    pub fn align(&self, spans: &[Span]) -> EntityMap {
        let mut entities = EntityMap::new();
        for span in spans {
            let Some(vectors) = self.categories.get(&span.category) else {
                continue;
            };
            let span_vec = embed(&span.text, &vectors.vocab);
            if span_vec.is_empty() {
                continue;
            }

            let mut best: Option<(&str, f32)> = None;
            for (term, term_vec) in &vectors.terms {
                let score = dot(&span_vec, term_vec);
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((term, score));
                }
            }
            if let Some((term, score)) = best {
                if score >= MIN_SIMILARITY {
                    entities.insert(span.category, term);
                }
            }
        }
        entities
    }

    /// Cosine similarity between arbitrary text and one canonical
    /// term, scored in the term's category space.
    #[cfg(test)]
    fn similarity(&self, category: EntityCategory, text: &str, term: &str) -> f32 {
        let vectors = &self.categories[&category];
        dot(&embed(text, &vectors.vocab), &embed(term, &vectors.vocab))
    }
}

/// L2-normalized character count vector restricted to `vocab`.
fn embed(text: &str, vocab: &HashMap<char, usize>) -> TfVector {
    let mut counts: HashMap<usize, f32> = HashMap::new();
    for ch in text.chars() {
        if let Some(&idx) = vocab.get(&ch) {
            *counts.entry(idx).or_insert(0.0) += 1.0;
        }
    }
    let norm: f32 = counts.values().map(|c| c * c).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Vec::new();
    }
    let mut vec: TfVector = counts.into_iter().map(|(i, c)| (i, c / norm)).collect();
    vec.sort_by_key(|(i, _)| *i);
    vec
}

fn dot(a: &TfVector, b: &TfVector) -> f32 {
    let mut score = 0.0;
    let mut ia = 0;
    let mut ib = 0;
    while ia < a.len() && ib < b.len() {
        match a[ia].0.cmp(&b[ib].0) {
            std::cmp::Ordering::Less => ia += 1,
            std::cmp::Ordering::Greater => ib += 1,
            std::cmp::Ordering::Equal => {
                score += a[ia].1 * b[ib].1;
                ia += 1;
                ib += 1;
            }
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{SpanSource, Span};

    fn aligner() -> CanonicalAligner {
        CanonicalAligner::build(&TermIndex::from_terms(vec![
            (EntityCategory::Disease, vec!["感冒", "肺气肿", "百日咳"]),
            (EntityCategory::Drug, vec!["阿司匹林"]),
        ]))
    }

    fn rule_span(category: EntityCategory, text: &str) -> Span {
        Span::new(0, text.chars().count() - 1, category, text, SpanSource::Rule)
    }

    #[test]
    fn exact_match_scores_one_and_is_selected() {
        let a = aligner();
        let score = a.similarity(EntityCategory::Disease, "感冒", "感冒");
        assert!((score - 1.0).abs() < 1e-6);

        let entities = a.align(&[rule_span(EntityCategory::Disease, "感冒")]);
        assert_eq!(entities.get(EntityCategory::Disease), Some("感冒"));
    }

    #[test]
    fn near_match_above_threshold_is_normalized() {
        let a = aligner();
        // 感冒 shares both its characters; the out-of-vocabulary 重
        // carries no weight, so the score stays 1.0.
        let entities = a.align(&[rule_span(EntityCategory::Disease, "重感冒")]);
        assert_eq!(entities.get(EntityCategory::Disease), Some("感冒"));
    }

    #[test]
    fn dissimilar_span_is_rejected() {
        let a = aligner();
        // Shares one character each with 百日咳 and 肺气肿; both
        // scores stay below the threshold.
        let entities = a.align(&[rule_span(EntityCategory::Disease, "日肿")]);
        assert!(entities.get(EntityCategory::Disease).is_none());
    }

    #[test]
    fn unknown_category_contributes_nothing() {
        let a = aligner();
        let entities = a.align(&[rule_span(EntityCategory::Food, "苹果")]);
        assert!(entities.is_empty());
    }

    #[test]
    fn empty_span_list_gives_empty_map() {
        assert!(aligner().align(&[]).is_empty());
    }

    #[test]
    fn later_span_of_same_category_overwrites() {
        let a = aligner();
        let entities = a.align(&[
            rule_span(EntityCategory::Disease, "感冒"),
            rule_span(EntityCategory::Disease, "百日咳"),
        ]);
        assert_eq!(entities.get(EntityCategory::Disease), Some("百日咳"));
    }

    #[test]
    fn out_of_vocabulary_span_is_skipped() {
        let a = aligner();
        let entities = a.align(&[rule_span(EntityCategory::Drug, "板蓝根")]);
        assert!(entities.get(EntityCategory::Drug).is_none());
    }
}
