use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

/// Non-streaming completion collaborator, used for the fallback intent
/// classification call.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Returned when no keyword matches and no classifier is available or
/// the classifier call fails.
pub const DEFAULT_INTENT: &str = "[查询疾病简介] # 默认意图";

/// Fixed keyword table, checked in order. Each entry maps a literal
/// keyword of the user query to the intent labels it implies.
const KEYWORD_INTENTS: &[(&str, &[&str])] = &[
    ("怎么办", &["查询疾病简介", "查询疾病的治疗方法", "查询疾病所需药品", "查询疾病所需检查项目"]),
    ("吃什么", &["查询疾病所需药品", "查询疾病宜吃食物"]),
    ("不能吃", &["查询疾病忌吃食物"]),
    ("症状", &["查询疾病简介", "查询疾病的症状"]),
    ("原因", &["查询疾病简介", "查询疾病病因"]),
    ("预防", &["查询疾病简介", "查询疾病预防措施"]),
    ("检查", &["查询疾病简介", "查询疾病所需检查项目"]),
    ("治疗", &["查询疾病简介", "查询疾病的治疗方法", "查询疾病所需药品"]),
    ("并发", &["查询疾病简介", "查询疾病的并发疾病"]),
    ("生产", &["查询药品的生产商"]),
    ("多久", &["查询疾病简介", "查询治疗周期", "查询治愈概率"]),
    ("几天", &["查询疾病简介", "查询治疗周期", "查询治愈概率"]),
    ("多长时间", &["查询疾病简介", "查询治疗周期"]),
    ("能好", &["查询疾病简介", "查询治疗周期", "查询治愈概率"]),
    ("能治好", &["查询疾病简介", "查询疾病的治疗方法", "查询治愈概率"]),
    ("治愈", &["查询疾病简介", "查询治愈概率", "查询疾病的治疗方法"]),
    ("痊愈", &["查询疾病简介", "查询治愈概率", "查询治疗周期"]),
    ("恢复", &["查询疾病简介", "查询治疗周期", "查询治愈概率"]),
];

fn classifier_prompt(query: &str) -> String {
    format!(
        r#"
你是医疗意图识别专家。分析用户问题："{query}"

从以下类别选择最相关的（可多选，最多3个）：
- 查询疾病简介
- 查询疾病病因
- 查询疾病预防措施
- 查询疾病所需药品
- 查询疾病宜吃食物
- 查询疾病忌吃食物
- 查询疾病所需检查项目
- 查询疾病的症状
- 查询疾病的治疗方法
- 查询疾病的并发疾病
- 查询药品的生产商

直接输出：["类别1", "类别2"]
"#
    )
}

/// Intent recognition: literal keyword matching first, an external
/// classifier as fallback. Both paths yield a free-text label list
/// that the dispatcher scans for trigger keywords.
pub struct IntentService {
    classifier: Option<Arc<dyn LlmClient>>,
}

impl IntentService {
    pub fn new() -> Self {
        Self { classifier: None }
    }

    pub fn with_classifier(classifier: Arc<dyn LlmClient>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub async fn recognize(&self, query: &str) -> String {
        for (keyword, labels) in KEYWORD_INTENTS {
            if query.contains(keyword) {
                let result = format!("{labels:?} # 根据关键词'{keyword}'匹配");
                info!("intent matched by keyword '{}'", keyword);
                return result;
            }
        }

        match &self.classifier {
            Some(classifier) => match classifier.complete(&classifier_prompt(query)).await {
                Ok(labels) => labels,
                Err(e) => {
                    warn!("intent classifier failed, using default intent: {}", e);
                    DEFAULT_INTENT.to_string()
                }
            },
            None => DEFAULT_INTENT.to_string(),
        }
    }
}

impl Default for IntentService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KgqaError;

    struct FixedClassifier(String);

    #[async_trait]
    impl LlmClient for FixedClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl LlmClient for FailingClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(KgqaError::LlmClient("boom".into()))
        }
    }

    #[tokio::test]
    async fn keyword_match_lists_mapped_labels() {
        let service = IntentService::new();
        let result = service.recognize("感冒怎么办").await;
        assert!(result.contains("查询疾病简介"));
        assert!(result.contains("查询疾病的治疗方法"));
        assert!(result.contains("查询疾病所需药品"));
        assert!(result.contains("查询疾病所需检查项目"));
        assert!(result.contains("根据关键词'怎么办'匹配"));
    }

    #[tokio::test]
    async fn earlier_keyword_wins() {
        // 怎么办 precedes 治疗 in the table.
        let service = IntentService::new();
        let result = service.recognize("感冒治疗要怎么办").await;
        assert!(result.contains("'怎么办'"));
    }

    #[tokio::test]
    async fn classifier_used_when_no_keyword_matches() {
        let service =
            IntentService::with_classifier(Arc::new(FixedClassifier("[\"查询疾病病因\"]".into())));
        let result = service.recognize("为何会得肺炎呢").await;
        assert_eq!(result, "[\"查询疾病病因\"]");
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_default() {
        let service = IntentService::with_classifier(Arc::new(FailingClassifier));
        let result = service.recognize("随便说点别的").await;
        assert_eq!(result, DEFAULT_INTENT);
    }

    #[tokio::test]
    async fn no_classifier_degrades_to_default() {
        let service = IntentService::new();
        let result = service.recognize("随便说点别的").await;
        assert_eq!(result, DEFAULT_INTENT);
    }
}
