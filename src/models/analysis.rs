use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 分析阶段的结构化结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 核心论点（有序）
    pub key_claims: Vec<String>,
    /// 指标名 → 报告值
    #[serde(
        default,
        alias = "metrics_and_results",
        deserialize_with = "deserialize_metrics"
    )]
    pub metrics: BTreeMap<String, String>,
    pub methodology_summary: String,
    #[serde(default, alias = "mathematical_derivations")]
    pub derivations: Vec<String>,
    pub tldr: String,
    #[serde(default)]
    pub eli5: String,
}

impl AnalysisResult {
    /// 阶段边界校验：缺少关键字段的结果视为格式错误
    pub fn validate(&self) -> Result<(), String> {
        if self.tldr.trim().is_empty() {
            return Err("tldr 为空".to_string());
        }
        if self.methodology_summary.trim().is_empty() {
            return Err("methodology_summary 为空".to_string());
        }
        if !self.key_claims.iter().any(|c| !c.trim().is_empty()) {
            return Err("key_claims 为空".to_string());
        }
        Ok(())
    }
}

/// 外部来源（标题 + 地址），记录它是针对哪条论点找到的
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub locator: String,
    pub claim: String,
}

/// Critic 阶段输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub corroborating: Vec<SourceRef>,
    pub conflicting: Vec<SourceRef>,
    pub synthesis: String,
}

impl Critique {
    /// 存在冲突来源即视为实质性矛盾
    pub fn has_contradiction(&self) -> bool {
        !self.conflicting.is_empty()
    }

    pub fn is_conflicted(&self, claim: &str) -> bool {
        self.conflicting.iter().any(|s| s.claim == claim)
    }

    pub fn is_corroborated(&self, claim: &str) -> bool {
        self.corroborating.iter().any(|s| s.claim == claim)
    }

    /// 全部来源（先支持后冲突）
    pub fn all_sources(&self) -> impl Iterator<Item = &SourceRef> {
        self.corroborating.iter().chain(self.conflicting.iter())
    }
}

/// 核查结果与它实际核对过的论点
///
/// 复核分析可能改写论点措辞，来源的 `claim` 始终指向核查时的原始论点
#[derive(Debug, Clone, Copy)]
pub struct Verification<'a> {
    pub critique: &'a Critique,
    pub checked_claims: &'a [String],
}

impl<'a> Verification<'a> {
    pub fn new(critique: &'a Critique, checked: &'a AnalysisResult) -> Self {
        Self {
            critique,
            checked_claims: &checked.key_claims,
        }
    }

    /// 找到支持来源且没有冲突来源的论点才算已确认
    pub fn is_settled(&self, claim: &str) -> bool {
        self.critique.is_corroborated(claim) && !self.critique.is_conflicted(claim)
    }
}

// 指标值可能是字符串、数字或布尔，统一转为字符串
fn deserialize_metrics<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name, text)
        })
        .collect())
}
