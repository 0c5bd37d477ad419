//! Critic 阶段 - 流程层
//!
//! 由论点和指标生成查询 → 网络搜索 → 逐条论点让模型判定来源是支持、冲突还是无关

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Stage, StageError, StageErrorKind};
use crate::models::{AnalysisResult, Critique, PaperDescriptor, SourceRef};
use crate::services::{
    ReasoningRequest, ReasoningService, SearchHit, ThoughtKind, ThoughtWriter, WebSearch,
};
use crate::utils::{extract_json_block, truncate_text};
use crate::workflow::prompts;

const AGENT: &str = "CriticAgent";

/// 查询中论点部分的最大字符数
const MAX_QUERY_CLAIM_CHARS: usize = 200;

/// 一条待执行的搜索
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimQuery {
    /// 该查询用于核对的论点
    pub claim: String,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Verdict {
    Corroborating,
    Conflicting,
    Irrelevant,
}

#[derive(Debug, Deserialize)]
struct HitVerdict {
    index: usize,
    verdict: Verdict,
}

#[derive(Debug, Deserialize)]
struct Classification {
    verdicts: Vec<HitVerdict>,
    #[serde(default)]
    note: String,
}

pub struct CriticAgent {
    reasoning: Arc<dyn ReasoningService>,
    search: Arc<dyn WebSearch>,
    max_claims: usize,
    results_per_query: usize,
    thoughts: ThoughtWriter,
}

impl CriticAgent {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        search: Arc<dyn WebSearch>,
        max_claims: usize,
        results_per_query: usize,
        thoughts: ThoughtWriter,
    ) -> Self {
        Self {
            reasoning,
            search,
            max_claims,
            results_per_query,
            thoughts,
        }
    }

    pub async fn run(
        &self,
        paper: &PaperDescriptor,
        analysis: &AnalysisResult,
    ) -> Result<Critique, StageError> {
        let paper_id = paper.identifier.as_str();
        let queries = build_queries(analysis, self.max_claims);
        self.thoughts.write(
            AGENT,
            ThoughtKind::Step,
            &format!("Verifying {} with {} queries", paper_id, queries.len()),
        );

        // 论点 → 搜索结果（保持论点顺序，按 URL 去重）
        let mut grouped: Vec<(String, Vec<SearchHit>)> = Vec::new();
        let mut failures = 0;
        for query in &queries {
            let hits = match self.search.search(&query.query, self.results_per_query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("[{}] 搜索 '{}' 失败: {}", paper_id, query.query, e);
                    failures += 1;
                    continue;
                }
            };
            debug!("[{}] '{}' 返回 {} 条结果", paper_id, query.query, hits.len());

            let pos = match grouped.iter().position(|(claim, _)| *claim == query.claim) {
                Some(pos) => pos,
                None => {
                    grouped.push((query.claim.clone(), Vec::new()));
                    grouped.len() - 1
                }
            };
            let slot = &mut grouped[pos].1;
            for hit in hits {
                if !slot.iter().any(|h| h.url == hit.url) {
                    slot.push(hit);
                }
            }
        }

        if !queries.is_empty() && failures == queries.len() {
            return Err(StageError::new(
                Stage::Critic,
                paper_id,
                StageErrorKind::Search(format!("{} 个查询全部失败", failures)),
            ));
        }

        let mut critique = Critique::default();
        let mut notes = Vec::new();
        for (claim, hits) in grouped.iter().filter(|(_, hits)| !hits.is_empty()) {
            let request = ReasoningRequest::new(
                prompts::CRITIC_SYSTEM_PROMPT,
                prompts::critic_user_prompt(claim, hits),
            );
            let response = self.reasoning.complete(&request).await.map_err(|e| {
                StageError::new(Stage::Critic, paper_id, StageErrorKind::Reasoning(e.to_string()))
            })?;
            let classification = parse_classification(&response).map_err(|message| {
                StageError::new(
                    Stage::Critic,
                    paper_id,
                    StageErrorKind::MalformedResponse(message),
                )
            })?;

            apply_verdicts(&mut critique, claim, hits, &classification.verdicts);
            if !classification.note.trim().is_empty() {
                notes.push(format!(
                    "{}: {}",
                    truncate_text(claim, 80),
                    classification.note.trim()
                ));
            }
        }

        critique.synthesis = summarize(&critique, grouped.len(), &notes);
        info!(
            "[{}] ✓ 核查完成: {} 个支持来源, {} 个冲突来源",
            paper_id,
            critique.corroborating.len(),
            critique.conflicting.len()
        );
        let kind = if critique.has_contradiction() {
            ThoughtKind::Decide
        } else {
            ThoughtKind::Success
        };
        self.thoughts.write(AGENT, kind, &critique.synthesis);

        Ok(critique)
    }
}

/// 生成查询：每条论点一个，再由指标与首条论点组合补足，总数不超过 `max_queries`
pub fn build_queries(analysis: &AnalysisResult, max_queries: usize) -> Vec<ClaimQuery> {
    let mut queries: Vec<ClaimQuery> = analysis
        .key_claims
        .iter()
        .take(max_queries)
        .map(|claim| ClaimQuery {
            claim: claim.clone(),
            query: shorten(claim),
        })
        .collect();

    if let Some(first_claim) = analysis.key_claims.first() {
        for (metric, value) in &analysis.metrics {
            if queries.len() >= max_queries {
                break;
            }
            queries.push(ClaimQuery {
                claim: first_claim.clone(),
                query: format!("{} {} {}", shorten(first_claim), metric, value),
            });
        }
    }

    queries
}

fn shorten(claim: &str) -> String {
    claim.chars().take(MAX_QUERY_CLAIM_CHARS).collect::<String>().trim().to_string()
}

fn parse_classification(response: &str) -> Result<Classification, String> {
    serde_json::from_str(extract_json_block(response)).map_err(|e| e.to_string())
}

/// 把判定结果写入 critique；无关来源丢弃，同一列表内按 (地址, 论点) 去重
///
/// 同一来源可以支持多条论点，每条论点各记一次
fn apply_verdicts(critique: &mut Critique, claim: &str, hits: &[SearchHit], verdicts: &[HitVerdict]) {
    for verdict in verdicts {
        // 提示词中的编号从 1 开始
        let Some(hit) = verdict.index.checked_sub(1).and_then(|i| hits.get(i)) else {
            continue;
        };
        let target = match verdict.verdict {
            Verdict::Corroborating => &mut critique.corroborating,
            Verdict::Conflicting => &mut critique.conflicting,
            Verdict::Irrelevant => continue,
        };
        if target.iter().any(|s| s.locator == hit.url && s.claim == claim) {
            continue;
        }
        target.push(SourceRef {
            title: hit.title.clone(),
            locator: hit.url.clone(),
            claim: claim.to_string(),
        });
    }
}

fn summarize(critique: &Critique, claims_checked: usize, notes: &[String]) -> String {
    let mut summary = format!(
        "Checked {} claim(s): {} corroborating and {} conflicting source(s).",
        claims_checked,
        critique.corroborating.len(),
        critique.conflicting.len()
    );
    for note in notes {
        summary.push(' ');
        summary.push_str(note);
        if !note.ends_with('.') {
            summary.push('.');
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn analysis(claims: &[&str], metrics: &[(&str, &str)]) -> AnalysisResult {
        AnalysisResult {
            key_claims: claims.iter().map(|c| c.to_string()).collect(),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            methodology_summary: "m".to_string(),
            derivations: Vec::new(),
            tldr: "t".to_string(),
            eli5: String::new(),
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: format!("title {}", url),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_queries_capped_and_metrics_fill_remaining() {
        let a = analysis(&["claim one", "claim two"], &[("accuracy", "0.9"), ("f1", "0.8")]);
        let queries = build_queries(&a, 3);
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].query, "claim one");
        assert_eq!(queries[2].claim, "claim one");
        assert_eq!(queries[2].query, "claim one accuracy 0.9");

        assert_eq!(build_queries(&a, 1).len(), 1);
    }

    #[test]
    fn test_apply_verdicts_drops_irrelevant_and_duplicates() {
        let hits = vec![hit("https://a"), hit("https://b"), hit("https://c")];
        let verdicts = parse_classification(
            r#"{"verdicts": [
                {"index": 1, "verdict": "corroborating"},
                {"index": 2, "verdict": "irrelevant"},
                {"index": 3, "verdict": "conflicting"},
                {"index": 9, "verdict": "conflicting"}
            ], "note": "mostly holds"}"#,
        )
        .unwrap();

        let mut critique = Critique::default();
        apply_verdicts(&mut critique, "claim", &hits, &verdicts.verdicts);
        apply_verdicts(&mut critique, "claim", &hits, &verdicts.verdicts);

        assert_eq!(critique.corroborating.len(), 1);
        assert_eq!(critique.conflicting.len(), 1);
        assert_eq!(critique.conflicting[0].locator, "https://c");
        assert!(critique.is_conflicted("claim"));
    }

    #[test]
    fn test_one_source_corroborates_several_claims() {
        let hits = vec![hit("https://survey")];
        let verdicts = parse_classification(
            r#"{"verdicts": [{"index": 1, "verdict": "corroborating"}], "note": ""}"#,
        )
        .unwrap();

        let mut critique = Critique::default();
        apply_verdicts(&mut critique, "claim one", &hits, &verdicts.verdicts);
        apply_verdicts(&mut critique, "claim two", &hits, &verdicts.verdicts);

        assert_eq!(critique.corroborating.len(), 2);
        assert!(critique.is_corroborated("claim one"));
        assert!(critique.is_corroborated("claim two"));
        assert!(!critique.has_contradiction());
    }

    #[test]
    fn test_summary_mentions_counts() {
        let critique = Critique::default();
        let summary = summarize(&critique, 2, &["claim one: holds".to_string()]);
        assert_eq!(
            summary,
            "Checked 2 claim(s): 0 corroborating and 0 conflicting source(s). claim one: holds."
        );
    }
}
