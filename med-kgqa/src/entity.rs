use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed set of entity categories known to the knowledge graph.
///
/// Serialized names double as the Neo4j node labels and as the file
/// names of the canonical term lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    #[serde(rename = "食物")]
    Food,
    #[serde(rename = "药品商")]
    Manufacturer,
    #[serde(rename = "治疗方法")]
    Treatment,
    #[serde(rename = "药品")]
    Drug,
    #[serde(rename = "检查项目")]
    Examination,
    #[serde(rename = "疾病")]
    Disease,
    #[serde(rename = "疾病症状")]
    Symptom,
    #[serde(rename = "科目")]
    Department,
}

impl EntityCategory {
    /// Scan/iteration order. Matches the order the dictionaries are
    /// loaded in, which fixes the tie-break order of equal-length rule
    /// spans during merging.
    pub const ALL: [EntityCategory; 8] = [
        EntityCategory::Food,
        EntityCategory::Manufacturer,
        EntityCategory::Treatment,
        EntityCategory::Drug,
        EntityCategory::Examination,
        EntityCategory::Disease,
        EntityCategory::Symptom,
        EntityCategory::Department,
    ];

    /// Graph label for this category (also the term-list file stem).
    pub fn label(&self) -> &'static str {
        match self {
            EntityCategory::Food => "食物",
            EntityCategory::Manufacturer => "药品商",
            EntityCategory::Treatment => "治疗方法",
            EntityCategory::Drug => "药品",
            EntityCategory::Examination => "检查项目",
            EntityCategory::Disease => "疾病",
            EntityCategory::Symptom => "疾病症状",
            EntityCategory::Department => "科目",
        }
    }

    pub fn from_label(label: &str) -> Option<EntityCategory> {
        EntityCategory::ALL.iter().copied().find(|c| c.label() == label)
    }
}

/// Where a span came from: the sequence-tagging model or the
/// dictionary automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanSource {
    Model,
    Rule,
}

/// A contiguous character range in the input text tagged with a
/// category. `start` and `end` are inclusive character indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub category: EntityCategory,
    pub text: String,
    pub source: SpanSource,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        category: EntityCategory,
        text: impl Into<String>,
        source: SpanSource,
    ) -> Self {
        Self {
            start,
            end,
            category,
            text: text.into(),
            source,
        }
    }

    /// Length of the span in characters.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Per-request mapping from category to the canonical entity text.
///
/// Single slot per category: a later write for the same category
/// replaces the earlier one. Deliberately not a ranked or multi-valued
/// map; the query templates consume exactly one entity per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMap(BTreeMap<EntityCategory, String>);

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: EntityCategory, canonical: impl Into<String>) {
        self.0.insert(category, canonical.into());
    }

    pub fn get(&self, category: EntityCategory) -> Option<&str> {
        self.0.get(&category).map(|s| s.as_str())
    }

    pub fn contains(&self, category: EntityCategory) -> bool {
        self.0.contains_key(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, &str)> {
        self.0.iter().map(|(c, s)| (*c, s.as_str()))
    }
}

/// Decode a per-character BIO tag sequence (`O`, `B-<label>`,
/// `I-<label>`) into model spans over `text`.
///
/// A span is a `B` tag followed by any run of `I` tags; tags with an
/// unknown category label are dropped. Tag sequences shorter or longer
/// than the text are truncated to the overlap.
pub fn decode_bio_spans(text: &str, tags: &[String]) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len().min(tags.len());
    let mut spans = Vec::new();
    let mut i = 0;
    while i < n {
        if let Some(label) = tags[i].strip_prefix("B-") {
            let mut j = i + 1;
            while j < n && tags[j].starts_with("I-") {
                j += 1;
            }
            if let Some(category) = EntityCategory::from_label(label) {
                let text: String = chars[i..j].iter().collect();
                spans.push(Span::new(i, j - 1, category, text, SpanSource::Model));
            }
            i = j;
        } else {
            i += 1;
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn decode_single_entity() {
        let spans = decode_bio_spans("我有感冒", &tags(&["O", "O", "B-疾病", "I-疾病"]));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 2);
        assert_eq!(spans[0].end, 3);
        assert_eq!(spans[0].category, EntityCategory::Disease);
        assert_eq!(spans[0].text, "感冒");
        assert_eq!(spans[0].source, SpanSource::Model);
    }

    #[test]
    fn decode_adjacent_entities() {
        let spans = decode_bio_spans(
            "头疼感冒",
            &tags(&["B-疾病症状", "I-疾病症状", "B-疾病", "I-疾病"]),
        );
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].category, EntityCategory::Symptom);
        assert_eq!(spans[1].category, EntityCategory::Disease);
    }

    #[test]
    fn decode_drops_unknown_labels() {
        let spans = decode_bio_spans("感冒", &tags(&["B-不存在", "I-不存在"]));
        assert!(spans.is_empty());
    }

    #[test]
    fn decode_all_outside_is_empty() {
        let spans = decode_bio_spans("你好", &tags(&["O", "O"]));
        assert!(spans.is_empty());
    }

    #[test]
    fn entity_map_last_write_wins() {
        let mut map = EntityMap::new();
        map.insert(EntityCategory::Disease, "感冒");
        map.insert(EntityCategory::Disease, "肺炎");
        assert_eq!(map.get(EntityCategory::Disease), Some("肺炎"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn entity_map_serializes_with_graph_labels() {
        let mut map = EntityMap::new();
        map.insert(EntityCategory::Disease, "感冒");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"疾病":"感冒"}"#);
    }
}
