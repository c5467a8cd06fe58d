use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dispatch::{QueryKind, QueryTemplate, SymptomInference};
use crate::entity::{EntityCategory, EntityMap};
use crate::graph::{GraphStore, string_cells};

/// Grounding instruction: answer strictly from the embedded evidence.
const INSTRUCTION_GROUNDING: &str = "<指令>你是一个医疗问答机器人，你需要根据给定的提示回答用户的问题。请注意，你的全部回答必须完全基于给定的提示，不可自由发挥。如果根据提示无法给出答案，立刻回答“根据已知信息无法回答该问题”。</指令>";

/// Scope instruction: decline out-of-domain questions.
const INSTRUCTION_SCOPE: &str = "<指令>请你仅针对医疗类问题提供简洁和专业的回答。如果问题不是医疗相关的，你一定要回答“我只能回答医疗相关的问题。”，以明确告知你的回答限制。</指令>";

const CLOSING_GUARDS: [&str; 3] = [
    "<注意>现在你已经知道给定的“<提示></提示>”和“<用户问题></用户问题>”了,你要极其认真的判断提示里是否有用户问题所需的信息，如果没有相关信息，你必须直接回答“根据已知信息无法回答该问题”。</注意>",
    "<注意>你一定要再次检查你的回答是否完全基于“<提示></提示>”的内容，不可产生提示之外的答案！换而言之，你的任务是根据用户的问题，将“<提示></提示>”整理成有条理、有逻辑的语句。你起到的作用仅仅是整合提示的功能，你一定不可以利用自身已经存在的知识进行回答，你必须从提示中找到问题的答案！</注意>",
    "<注意>你必须充分的利用提示中的知识，不可将提示中的任何信息遗漏，你必须做到对提示信息的充分整合。你回答的任何一句话必须在提示中有所体现！如果根据提示无法给出答案，你必须回答“根据已知信息无法回答该问题”。</注意>",
];

const GREETING_WORDS: [&str; 6] = ["你好", "hello", "hi", "介绍", "帮助", "什么"];

const GREETING_BLOCK: &str = "<提示>用户可能是在问候或询问系统功能。请介绍你是一个专业的医疗RAG问答系统，可以回答医疗相关问题，包括疾病简介、症状、治疗方法、药物信息等。请鼓励用户提出具体的医疗问题。</提示>";

const NO_KNOWLEDGE_BLOCK: &str = "<提示>提示：知识库异常，没有相关信息！请你直接回答“根据已知信息无法回答该问题”！</提示>";

/// Embedded error messages are cut to this many characters.
const MAX_ERROR_CHARS: usize = 30;

/// The assembled request: the bounded prompt, the user-facing
/// knowledge trace, and the 、-joined summary of satisfied intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBundle {
    pub prompt: String,
    pub knowledge: String,
    pub intent: String,
}

/// Build the final prompt by executing every dispatched template
/// against the graph store, degrading each failure into embedded
/// text. Always produces a prompt.
pub async fn assemble_prompt(
    query: &str,
    entities: &EntityMap,
    inference: &SymptomInference,
    templates: &[&QueryTemplate],
    graph: Option<&dyn GraphStore>,
) -> PromptBundle {
    let mut prompt = String::new();
    prompt.push_str(INSTRUCTION_GROUNDING);
    prompt.push_str(INSTRUCTION_SCOPE);
    prompt.push_str(&inference_block(inference));

    let mut satisfied = Vec::new();
    let mut knowledge_blocks = 0usize;
    for template in templates {
        let block = execute_template(template, entities, graph).await;
        if block.is_empty() {
            continue;
        }
        prompt.push_str(&block);
        knowledge_blocks += 1;
        satisfied.push(template.label);
    }

    if knowledge_blocks == 0 {
        let lowered = query.to_lowercase();
        if GREETING_WORDS.iter().any(|w| lowered.contains(w)) {
            prompt.push_str(GREETING_BLOCK);
        } else {
            prompt.push_str(NO_KNOWLEDGE_BLOCK);
        }
    }

    prompt.push_str(&format!("<用户问题>{query}</用户问题>"));
    for guard in CLOSING_GUARDS {
        prompt.push_str(guard);
    }

    let knowledge = extract_knowledge(&prompt);
    debug!("assembled prompt with {} knowledge blocks", knowledge_blocks);

    PromptBundle {
        prompt,
        knowledge,
        intent: satisfied.join("、"),
    }
}

fn inference_block(inference: &SymptomInference) -> String {
    match inference {
        SymptomInference::NotApplicable => String::new(),
        SymptomInference::Inferred {
            symptom,
            candidates,
            ..
        } => {
            let all = candidates.join("、");
            format!(
                "<提示>用户有{symptom}的情况，知识库推测其可能是得了{all}。请注意这只是一个推测，你需要明确告知用户这一点。</提示>"
            )
        }
        SymptomInference::QueryFailed { symptom } => {
            format!("<提示>用户有{symptom}的情况，但查询知识图谱时发生错误，无法推测相关疾病。</提示>")
        }
        SymptomInference::NotConnected { symptom } => {
            format!("<提示>用户有{symptom}的情况，但Neo4j数据库未连接，无法查询相关疾病信息。</提示>")
        }
    }
}

async fn execute_template(
    template: &QueryTemplate,
    entities: &EntityMap,
    graph: Option<&dyn GraphStore>,
) -> String {
    match template.kind {
        QueryKind::Attribute { attribute } => {
            let Some(disease) = entities.get(EntityCategory::Disease) else {
                return String::new();
            };
            knowledge_block(template, disease, attribute, "", graph).await
        }
        QueryKind::Relation { relation, .. } => {
            let Some(disease) = entities.get(EntityCategory::Disease) else {
                return String::new();
            };
            knowledge_block(template, disease, relation, "、", graph).await
        }
        QueryKind::Manufacturer => manufacturer_block(template, entities, graph).await,
    }
}

/// The uniform four-outcome `<提示>` block shared by attribute and
/// relation queries: value found, nothing in the graph, query error,
/// store unreachable.
async fn knowledge_block(
    template: &QueryTemplate,
    entity: &str,
    need: &str,
    separator: &str,
    graph: Option<&dyn GraphStore>,
) -> String {
    let Some(graph) = graph else {
        return format!(
            "<提示>用户对{entity}可能有查询{need}需求，但Neo4j数据库未连接，无法查询知识图谱。</提示>"
        );
    };

    match graph.query(&template.cypher(), template.params(entity)).await {
        Ok(rows) => {
            let values = string_cells(&rows);
            let content = if values.is_empty() {
                "图谱中无信息，查找失败。".to_string()
            } else {
                values.join(separator)
            };
            format!("<提示>用户对{entity}可能有查询{need}需求，知识库内容如下：{content}</提示>")
        }
        Err(e) => {
            let message = truncate_chars(&e.to_string(), MAX_ERROR_CHARS);
            format!(
                "<提示>用户对{entity}可能有查询{need}需求，但查询知识图谱时发生错误：{message}。</提示>"
            )
        }
    }
}

async fn manufacturer_block(
    template: &QueryTemplate,
    entities: &EntityMap,
    graph: Option<&dyn GraphStore>,
) -> String {
    let drug = entities.get(EntityCategory::Drug);
    match (graph, drug) {
        (Some(graph), Some(drug)) => {
            match graph.query(&template.cypher(), template.params(drug)).await {
                Ok(rows) => {
                    let values = string_cells(&rows);
                    let content = if values.is_empty() {
                        "图谱中无信息，查找失败".to_string()
                    } else {
                        values.join("")
                    };
                    format!(
                        "<提示>用户对{drug}可能有查询药品生产商的需求，知识图谱内容如下：{content}</提示>"
                    )
                }
                Err(e) => {
                    let message = truncate_chars(&e.to_string(), MAX_ERROR_CHARS);
                    format!("<提示>查询药品生产商时发生错误：{message}</提示>")
                }
            }
        }
        (None, Some(drug)) => {
            format!("<提示>Neo4j数据库未连接，无法查询{drug}的生产商信息。</提示>")
        }
        (_, None) => "<提示>未识别到药品实体，无法查询生产商信息。</提示>".to_string(),
    }
}

static TIP_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<提示>(.*?)</提示>").expect("static pattern"));

/// Extract the knowledge trace from a finished prompt: every `<提示>`
/// body of at least 3 characters, numbered in order of appearance.
pub fn extract_knowledge(prompt: &str) -> String {
    TIP_BLOCK
        .captures_iter(prompt)
        .map(|c| c[1].to_string())
        .filter(|body| body.chars().count() >= 3)
        .enumerate()
        .map(|(i, body)| format!("提示{}, {}", i + 1, body))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
