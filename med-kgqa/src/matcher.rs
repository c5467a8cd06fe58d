use std::collections::{HashMap, VecDeque};

use crate::dictionary::TermIndex;
use crate::entity::{EntityCategory, Span, SpanSource};

/// Minimum term length (in characters) admitted into an automaton.
/// Single-character terms are noise for dictionary matching.
const MIN_TERM_CHARS: usize = 2;

#[derive(Debug, Default)]
struct AcNode {
    children: HashMap<char, usize>,
    fail: usize,
    /// Character lengths of the patterns ending at this node,
    /// including those inherited through fail links.
    output_lens: Vec<usize>,
}

/// A character-level Aho–Corasick automaton over one pattern set.
///
/// Built once, then scanned concurrently without locking: `find_all`
/// takes `&self` and touches no interior mutability.
#[derive(Debug)]
struct AcAutomaton {
    nodes: Vec<AcNode>,
}

impl AcAutomaton {
    fn build<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        let mut nodes = vec![AcNode::default()];

        for pattern in patterns {
            let mut current = 0;
            let mut chars = 0;
            for ch in pattern.chars() {
                chars += 1;
                let next = match nodes[current].children.get(&ch) {
                    Some(&next) => next,
                    None => {
                        nodes.push(AcNode::default());
                        let next = nodes.len() - 1;
                        nodes[current].children.insert(ch, next);
                        next
                    }
                };
                current = next;
            }
            if chars > 0 {
                nodes[current].output_lens.push(chars);
            }
        }

        // Breadth-first fail links; outputs of the fail target are
        // folded into each node so one pass reports every match.
        let mut queue = VecDeque::new();
        let roots: Vec<usize> = nodes[0].children.values().copied().collect();
        for child in roots {
            nodes[child].fail = 0;
            queue.push_back(child);
        }
        while let Some(current) = queue.pop_front() {
            let children: Vec<(char, usize)> =
                nodes[current].children.iter().map(|(c, n)| (*c, *n)).collect();
            for (ch, child) in children {
                let mut fail = nodes[current].fail;
                let fail_target = loop {
                    if let Some(&next) = nodes[fail].children.get(&ch) {
                        break next;
                    }
                    if fail == 0 {
                        break 0;
                    }
                    fail = nodes[fail].fail;
                };
                nodes[child].fail = fail_target;
                let inherited = nodes[fail_target].output_lens.clone();
                nodes[child].output_lens.extend(inherited);
                queue.push_back(child);
            }
        }

        Self { nodes }
    }

    /// All matches as `(start, end)` inclusive character indices.
    fn find_all(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let mut matches = Vec::new();
        let mut state = 0;
        for (i, ch) in chars.iter().enumerate() {
            loop {
                if let Some(&next) = self.nodes[state].children.get(ch) {
                    state = next;
                    break;
                }
                if state == 0 {
                    break;
                }
                state = self.nodes[state].fail;
            }
            for &len in &self.nodes[state].output_lens {
                matches.push((i + 1 - len, i));
            }
        }
        matches
    }
}

/// One automaton per entity category, built from the canonical term
/// lists at startup and shared read-only across requests.
#[derive(Debug)]
pub struct DictionaryMatcher {
    automatons: Vec<(EntityCategory, AcAutomaton)>,
}

impl DictionaryMatcher {
    pub fn build(index: &TermIndex) -> Self {
        let automatons = EntityCategory::ALL
            .into_iter()
            .map(|category| {
                let patterns = index
                    .terms(category)
                    .iter()
                    .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
                    .map(String::as_str);
                (category, AcAutomaton::build(patterns))
            })
            .collect();
        Self { automatons }
    }

    /// Run every category automaton over `text` and collect all
    /// matches. Overlaps across categories are allowed here; overlap
    /// resolution is the merge step's job.
    pub fn scan(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        let mut spans = Vec::new();
        for (category, automaton) in &self.automatons {
            for (start, end) in automaton.find_all(&chars) {
                let surface: String = chars[start..=end].iter().collect();
                spans.push(Span::new(start, end, *category, surface, SpanSource::Rule));
            }
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::TermIndex;

    fn matcher(lists: Vec<(EntityCategory, Vec<&str>)>) -> DictionaryMatcher {
        DictionaryMatcher::build(&TermIndex::from_terms(lists))
    }

    #[test]
    fn finds_single_match() {
        let m = matcher(vec![(EntityCategory::Disease, vec!["感冒"])]);
        let spans = m.scan("感冒怎么办");
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 1));
        assert_eq!(spans[0].text, "感冒");
        assert_eq!(spans[0].source, SpanSource::Rule);
    }

    #[test]
    fn finds_overlapping_and_nested_matches() {
        let m = matcher(vec![(EntityCategory::Disease, vec!["感冒", "病毒性感冒"])]);
        let spans = m.scan("我得了病毒性感冒");
        let ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert!(ranges.contains(&(3, 7)));
        assert!(ranges.contains(&(6, 7)));
    }

    #[test]
    fn matches_across_categories_can_overlap() {
        let m = matcher(vec![
            (EntityCategory::Disease, vec!["心脏病"]),
            (EntityCategory::Department, vec!["心脏病科"]),
        ]);
        let spans = m.scan("心脏病科在哪");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn short_terms_are_excluded() {
        let m = matcher(vec![(EntityCategory::Drug, vec!["药", "阿司匹林"])]);
        let spans = m.scan("这个药是阿司匹林");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "阿司匹林");
    }

    #[test]
    fn empty_dictionary_matches_nothing() {
        let m = matcher(vec![]);
        assert!(m.scan("感冒发烧头疼").is_empty());
    }

    #[test]
    fn repeated_occurrences_all_reported() {
        let m = matcher(vec![(EntityCategory::Symptom, vec!["头疼"])]);
        let spans = m.scan("头疼，还是头疼");
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (0, 1));
        assert_eq!((spans[1].start, spans[1].end), (5, 6));
    }

    #[test]
    fn suffix_matches_via_fail_links() {
        // "冒" transitions must recover the shorter pattern after a
        // longer-prefix mismatch.
        let m = matcher(vec![(EntityCategory::Disease, vec!["感冒", "伤风感冒"])]);
        let spans = m.scan("重感冒");
        let ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(1, 2)]);
    }
}
