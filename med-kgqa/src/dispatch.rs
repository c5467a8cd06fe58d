use serde_json::json;
use tracing::{info, warn};

use crate::entity::{EntityCategory, EntityMap};
use crate::graph::{GraphStore, string_cells};

/// Shape of the graph query behind a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Single disease node, return one property.
    Attribute { attribute: &'static str },
    /// Disease node → relation → neighbor set, return neighbor names.
    Relation {
        relation: &'static str,
        target: &'static str,
    },
    /// Reverse lookup from a drug to its manufacturer.
    Manufacturer,
}

/// One entry of the fixed dispatch table.
#[derive(Debug)]
pub struct QueryTemplate {
    /// Intent label reported in the intent summary when this template
    /// fires.
    pub label: &'static str,
    /// The template fires when any trigger occurs in the recognized
    /// intent text.
    pub triggers: &'static [&'static str],
    pub kind: QueryKind,
}

impl QueryTemplate {
    /// All templates except the manufacturer lookup pivot on a
    /// disease entity.
    pub fn requires_disease(&self) -> bool {
        !matches!(self.kind, QueryKind::Manufacturer)
    }

    /// Statement text built from static template parts only; the
    /// entity name travels separately as the `name` bind parameter.
    pub fn cypher(&self) -> String {
        match self.kind {
            QueryKind::Attribute { attribute } => {
                format!("MATCH (a:疾病 {{名称: $name}}) RETURN a.`{attribute}`")
            }
            QueryKind::Relation { relation, target } => {
                format!("MATCH (a:疾病 {{名称: $name}})-[r:`{relation}`]->(b:`{target}`) RETURN b.名称")
            }
            QueryKind::Manufacturer => {
                "MATCH (a:药品商)-[r:生产]->(b:药品 {名称: $name}) RETURN a.名称".to_string()
            }
        }
    }

    pub fn params(&self, entity: &str) -> serde_json::Value {
        json!({ "name": entity })
    }
}

/// Fixed priority list; output order of `dispatch` is this order, not
/// relevance-ranked.
pub const DISPATCH_TABLE: &[QueryTemplate] = &[
    QueryTemplate {
        label: "查询疾病简介",
        triggers: &["简介"],
        kind: QueryKind::Attribute { attribute: "疾病简介" },
    },
    QueryTemplate {
        label: "查询疾病病因",
        triggers: &["病因"],
        kind: QueryKind::Attribute { attribute: "疾病病因" },
    },
    QueryTemplate {
        label: "查询预防措施",
        triggers: &["预防"],
        kind: QueryKind::Attribute { attribute: "预防措施" },
    },
    QueryTemplate {
        label: "查询治疗周期",
        triggers: &["治疗周期", "多久", "几天", "多长时间", "能好", "痊愈", "恢复"],
        kind: QueryKind::Attribute { attribute: "治疗周期" },
    },
    QueryTemplate {
        label: "查询治愈概率",
        triggers: &["治愈概率", "能治好", "治愈", "治得好"],
        kind: QueryKind::Attribute { attribute: "治愈概率" },
    },
    QueryTemplate {
        label: "查询疾病易感人群",
        triggers: &["易感人群"],
        kind: QueryKind::Attribute { attribute: "疾病易感人群" },
    },
    QueryTemplate {
        label: "查询疾病使用药品",
        triggers: &["药品"],
        kind: QueryKind::Relation { relation: "疾病使用药品", target: "药品" },
    },
    QueryTemplate {
        label: "查询疾病宜吃食物",
        triggers: &["宜吃食物"],
        kind: QueryKind::Relation { relation: "疾病宜吃食物", target: "食物" },
    },
    QueryTemplate {
        label: "查询疾病忌吃食物",
        triggers: &["忌吃食物"],
        kind: QueryKind::Relation { relation: "疾病忌吃食物", target: "食物" },
    },
    QueryTemplate {
        label: "查询疾病所需检查",
        triggers: &["检查项目"],
        kind: QueryKind::Relation { relation: "疾病所需检查", target: "检查项目" },
    },
    QueryTemplate {
        label: "查询疾病所属科目",
        triggers: &["查询疾病所属科目"],
        kind: QueryKind::Relation { relation: "疾病所属科目", target: "科目" },
    },
    QueryTemplate {
        label: "查询疾病的症状",
        triggers: &["症状"],
        kind: QueryKind::Relation { relation: "疾病的症状", target: "疾病症状" },
    },
    QueryTemplate {
        label: "查询治疗的方法",
        triggers: &["治疗"],
        kind: QueryKind::Relation { relation: "治疗的方法", target: "治疗方法" },
    },
    QueryTemplate {
        label: "查询疾病并发疾病",
        triggers: &["并发"],
        kind: QueryKind::Relation { relation: "疾病并发疾病", target: "疾病" },
    },
    QueryTemplate {
        label: "查询药物生产商",
        triggers: &["生产商"],
        kind: QueryKind::Manufacturer,
    },
];

/// Select the templates whose triggers occur in the recognized intent
/// text, skipping disease-scoped templates when no disease entity was
/// resolved.
pub fn dispatch(intent_text: &str, entities: &EntityMap) -> Vec<&'static QueryTemplate> {
    DISPATCH_TABLE
        .iter()
        .filter(|template| template.triggers.iter().any(|t| intent_text.contains(t)))
        .filter(|template| {
            !template.requires_disease() || entities.contains(EntityCategory::Disease)
        })
        .collect()
}

/// Outcome of the pre-dispatch symptom → disease reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymptomInference {
    /// No symptom entity, a disease was already present, or the graph
    /// knows no disease with this symptom.
    NotApplicable,
    /// A candidate disease was chosen uniformly at random. This is an
    /// inference, not a confirmed diagnosis; the prompt assembler
    /// surfaces the caveat to the consumer.
    Inferred {
        symptom: String,
        candidates: Vec<String>,
        chosen: String,
    },
    QueryFailed { symptom: String },
    NotConnected { symptom: String },
}

const SYMPTOM_TO_DISEASE_CYPHER: &str =
    "MATCH (a:疾病)-[r:疾病的症状]->(b:疾病症状 {名称: $name}) RETURN a.名称";

/// If a symptom was recognized but no disease, ask the graph which
/// diseases exhibit that symptom and fill the disease slot with one
/// candidate so disease-scoped templates can fire.
pub async fn infer_disease_from_symptom(
    entities: &mut EntityMap,
    graph: Option<&dyn GraphStore>,
) -> SymptomInference {
    if entities.contains(EntityCategory::Disease) {
        return SymptomInference::NotApplicable;
    }
    let Some(symptom) = entities.get(EntityCategory::Symptom).map(str::to_string) else {
        return SymptomInference::NotApplicable;
    };

    let Some(graph) = graph else {
        return SymptomInference::NotConnected { symptom };
    };

    match graph
        .query(SYMPTOM_TO_DISEASE_CYPHER, json!({ "name": symptom }))
        .await
    {
        Ok(rows) => {
            let candidates = string_cells(&rows);
            if candidates.is_empty() {
                return SymptomInference::NotApplicable;
            }
            let chosen = candidates[rand::random_range(0..candidates.len())].clone();
            info!(
                "inferred disease '{}' from symptom '{}' ({} candidates)",
                chosen,
                symptom,
                candidates.len()
            );
            entities.insert(EntityCategory::Disease, chosen.clone());
            SymptomInference::Inferred {
                symptom,
                candidates,
                chosen,
            }
        }
        Err(e) => {
            warn!("symptom inference query failed: {}", e);
            SymptomInference::QueryFailed { symptom }
        }
    }
}
