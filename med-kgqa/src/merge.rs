use std::collections::HashSet;

use crate::entity::Span;

/// Resolve overlaps between model spans and rule spans.
///
/// Greedy longest-first interval packing: both lists are concatenated
/// (model spans first), stably sorted by descending character length,
/// and a span is kept only if none of its positions has been claimed
/// by an earlier-kept span. The stable sort makes input order the
/// tie-break for equal lengths.
pub fn merge_spans(model_spans: Vec<Span>, rule_spans: Vec<Span>) -> Vec<Span> {
    let mut candidates = model_spans;
    candidates.extend(rule_spans);
    candidates.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut kept = Vec::new();
    for span in candidates {
        if (span.start..=span.end).any(|pos| claimed.contains(&pos)) {
            continue;
        }
        claimed.extend(span.start..=span.end);
        kept.push(span);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityCategory, SpanSource};

    fn span(start: usize, end: usize, text: &str, source: SpanSource) -> Span {
        Span::new(start, end, EntityCategory::Disease, text, source)
    }

    #[test]
    fn empty_inputs_give_empty_output() {
        assert!(merge_spans(vec![], vec![]).is_empty());
    }

    #[test]
    fn disjoint_spans_are_all_preserved() {
        let spans = vec![
            span(0, 1, "感冒", SpanSource::Model),
            span(3, 4, "肺炎", SpanSource::Model),
        ];
        let merged = merge_spans(spans.clone(), vec![]);
        assert_eq!(merged.len(), 2);
        for s in &spans {
            assert!(merged.contains(s));
        }
    }

    #[test]
    fn longer_span_wins_over_contained_span() {
        let long = span(0, 4, "病毒性感冒", SpanSource::Rule);
        let short = span(3, 4, "感冒", SpanSource::Model);
        let merged = merge_spans(vec![short], vec![long.clone()]);
        assert_eq!(merged, vec![long]);
    }

    #[test]
    fn equal_length_tie_keeps_first_listed() {
        // Model spans are listed before rule spans, so on a full
        // overlap of equal length the model span survives.
        let model = span(0, 1, "感冒", SpanSource::Model);
        let rule = span(1, 2, "冒险", SpanSource::Rule);
        let merged = merge_spans(vec![model.clone()], vec![rule]);
        assert_eq!(merged, vec![model]);
    }

    #[test]
    fn output_spans_never_overlap() {
        let model = vec![span(0, 2, "病毒性", SpanSource::Model), span(2, 4, "性感冒", SpanSource::Model)];
        let rule = vec![span(1, 3, "毒性感", SpanSource::Rule), span(4, 4, "冒", SpanSource::Rule)];
        let merged = merge_spans(model, rule);
        for (i, a) in merged.iter().enumerate() {
            for b in merged.iter().skip(i + 1) {
                assert!(a.end < b.start || b.end < a.start, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn partial_overlap_with_claimed_interior_is_dropped() {
        // (0,2) claims 0..=2; (2,3) shares position 2 even though its
        // endpoints are not both claimed.
        let a = span(0, 2, "一二三", SpanSource::Model);
        let b = span(2, 3, "三四", SpanSource::Rule);
        let merged = merge_spans(vec![a.clone()], vec![b]);
        assert_eq!(merged, vec![a]);
    }
}
