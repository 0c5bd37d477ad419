//! 综合阶段 - 流程层
//!
//! 模型只负责"贡献概述"和"后续建议"两段文字，片段的结构由本模块确定性地渲染。
//! 片段以二级标题开头、以单个换行结尾，可以直接拼接。

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::{Stage, StageError, StageErrorKind};
use crate::models::{AnalysisResult, PaperDescriptor, Verification};
use crate::services::{ReasoningRequest, ReasoningService, ThoughtKind, ThoughtWriter};
use crate::utils::extract_json_block;
use crate::workflow::prompts;

const AGENT: &str = "SynthesizerAgent";

/// 模型返回的文字部分
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynthesisNotes {
    pub overview: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

pub struct SynthesizerAgent {
    reasoning: Arc<dyn ReasoningService>,
    thoughts: ThoughtWriter,
}

impl SynthesizerAgent {
    pub fn new(reasoning: Arc<dyn ReasoningService>, thoughts: ThoughtWriter) -> Self {
        Self { reasoning, thoughts }
    }

    /// `analysis` 为最终采用的分析（可能是复核结果）；`verification` 为核查结果
    pub async fn run(
        &self,
        paper: &PaperDescriptor,
        analysis: &AnalysisResult,
        verification: Option<Verification<'_>>,
    ) -> Result<String, StageError> {
        let paper_id = paper.identifier.as_str();
        let request = ReasoningRequest::new(
            prompts::SYNTHESIZER_SYSTEM_PROMPT,
            prompts::synthesizer_user_prompt(paper, analysis, verification.map(|v| v.critique)),
        );

        let response = self.reasoning.complete(&request).await.map_err(|e| {
            StageError::new(
                Stage::Synthesis,
                paper_id,
                StageErrorKind::Reasoning(e.to_string()),
            )
        })?;
        let notes = parse_notes(&response).map_err(|message| {
            StageError::new(
                Stage::Synthesis,
                paper_id,
                StageErrorKind::MalformedResponse(message),
            )
        })?;

        let fragment = render_fragment(paper, analysis, verification, &notes);
        info!("[{}] ✓ 报告片段生成: {} 字符", paper_id, fragment.chars().count());
        self.thoughts.write(
            AGENT,
            ThoughtKind::Success,
            &format!("Report fragment ready for {}", paper_id),
        );
        Ok(fragment)
    }
}

pub fn parse_notes(response: &str) -> Result<SynthesisNotes, String> {
    let notes: SynthesisNotes =
        serde_json::from_str(extract_json_block(response)).map_err(|e| e.to_string())?;
    if notes.overview.trim().is_empty() {
        return Err("overview 为空".to_string());
    }
    Ok(notes)
}

/// 渲染单篇论文的 Markdown 片段
pub fn render_fragment(
    paper: &PaperDescriptor,
    analysis: &AnalysisResult,
    verification: Option<Verification<'_>>,
    notes: &SynthesisNotes,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("## {}\n\n", clean_inline(&paper.title)));

    let mut meta = format!(
        "*{}* · arXiv [{}]({})",
        clean_inline(&paper.author_line(5)),
        paper.identifier,
        paper.locator
    );
    if let Some(published) = paper.published.as_deref() {
        let date = published.split('T').next().unwrap_or(published);
        meta.push_str(&format!(" · Published {}", date));
    }
    out.push_str(&meta);
    out.push_str("\n\n");

    out.push_str(&format!("**TL;DR:** {}\n\n", clean_inline(&analysis.tldr)));

    if !analysis.eli5.trim().is_empty() {
        push_section(&mut out, "In plain terms", &clean_inline(&analysis.eli5));
    }
    push_section(&mut out, "Contributions", &clean_inline(&notes.overview));
    push_section(&mut out, "Methodology", &clean_inline(&analysis.methodology_summary));

    let metrics = if analysis.metrics.is_empty() {
        "No quantitative results were reported.".to_string()
    } else {
        let mut table = String::from("| Metric | Value |\n|---|---|");
        for (name, value) in &analysis.metrics {
            table.push_str(&format!("\n| {} | {} |", clean_cell(name), clean_cell(value)));
        }
        table
    };
    push_section(&mut out, "Reported metrics", &metrics);

    if !analysis.derivations.is_empty() {
        push_section(&mut out, "Derivations", &bullet_list(&analysis.derivations));
    }

    // 按核查时的原始论点划分，来源才能与论点一一对应
    let checked_claims = verification.map_or(analysis.key_claims.as_slice(), |v| v.checked_claims);
    let (settled, uncertain): (Vec<String>, Vec<String>) = checked_claims
        .iter()
        .cloned()
        .partition(|claim| verification.is_some_and(|v| v.is_settled(claim)));
    let settled_body = if settled.is_empty() {
        match verification {
            Some(_) => "_No claim was corroborated by external sources._".to_string(),
            None => "_Claims were not checked against external sources._".to_string(),
        }
    } else {
        bullet_list(&settled)
    };
    push_section(&mut out, "Settled claims", &settled_body);
    let uncertain_body = if uncertain.is_empty() {
        "_None._".to_string()
    } else {
        bullet_list(&uncertain)
    };
    push_section(&mut out, "Uncertain claims", &uncertain_body);

    if verification.is_some() && analysis.key_claims.as_slice() != checked_claims {
        push_section(&mut out, "Claims after review", &bullet_list(&analysis.key_claims));
    }

    let sources = match verification.map(|v| v.critique) {
        Some(critique) if critique.all_sources().next().is_some() => {
            let mut lines: Vec<String> = critique
                .corroborating
                .iter()
                .map(|s| source_line(&s.title, &s.locator, "supports", &s.claim))
                .collect();
            lines.extend(
                critique
                    .conflicting
                    .iter()
                    .map(|s| source_line(&s.title, &s.locator, "disputes", &s.claim)),
            );
            lines.join("\n")
        }
        Some(_) => "No relevant external sources were found.".to_string(),
        None => "No external sources were consulted.".to_string(),
    };
    push_section(&mut out, "Sources", &sources);

    let next_steps = if notes.next_steps.is_empty() {
        "_None proposed._".to_string()
    } else {
        bullet_list(&notes.next_steps)
    };
    push_section(&mut out, "Next steps", &next_steps);

    format!("{}\n", out.trim_end())
}

fn push_section(out: &mut String, heading: &str, body: &str) {
    out.push_str(&format!("### {}\n\n{}\n\n", heading, body));
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| clean_inline(item))
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn source_line(title: &str, locator: &str, relation: &str, claim: &str) -> String {
    format!(
        "- [{}]({}): {} \"{}\"",
        clean_inline(title).replace(['[', ']'], ""),
        locator,
        relation,
        clean_inline(claim)
    )
}

/// 合并为单行，并去掉开头的 `#`，避免模型文字变成标题
pub fn clean_inline(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    single_line.trim_start_matches(['#', ' ']).to_string()
}

fn clean_cell(text: &str) -> String {
    clean_inline(text).replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Critique, SourceRef};
    use std::collections::BTreeMap;

    fn paper() -> PaperDescriptor {
        PaperDescriptor {
            title: "Graph Attention Networks".to_string(),
            authors: vec!["Petar Veličković".to_string()],
            abstract_text: String::new(),
            identifier: "1710.10903v3".to_string(),
            locator: "http://arxiv.org/pdf/1710.10903v3".to_string(),
            published: Some("2017-10-30T17:03:15Z".to_string()),
        }
    }

    fn analysis() -> AnalysisResult {
        let mut metrics = BTreeMap::new();
        metrics.insert("Cora accuracy".to_string(), "83.0|0.7".to_string());
        AnalysisResult {
            key_claims: vec!["Attention helps".to_string(), "# Scales well".to_string()],
            metrics,
            methodology_summary: "Masked self-attention\nover neighbors".to_string(),
            derivations: Vec::new(),
            tldr: "GATs weigh neighbors".to_string(),
            eli5: String::new(),
        }
    }

    fn notes() -> SynthesisNotes {
        SynthesisNotes {
            overview: "# Introduces graph attention".to_string(),
            next_steps: vec!["Try on larger graphs".to_string()],
        }
    }

    #[test]
    fn test_fragment_structure_without_critique() {
        let fragment = render_fragment(&paper(), &analysis(), None, &notes());

        assert!(fragment.starts_with("## Graph Attention Networks\n"));
        assert!(fragment.ends_with("- Try on larger graphs\n"));
        assert!(!fragment.ends_with("\n\n"));
        assert!(fragment.contains("**TL;DR:** GATs weigh neighbors"));
        assert!(fragment.contains("Published 2017-10-30"));
        assert!(fragment.contains("| Cora accuracy | 83.0\\|0.7 |"));
        assert!(fragment.contains("Masked self-attention over neighbors"));
        assert!(fragment.contains("No external sources were consulted."));
        // 模型文字不能产生一级标题
        assert!(!fragment.lines().any(|line| line.starts_with("# ")));
        assert!(fragment.contains("- Scales well"));
    }

    #[test]
    fn test_claims_split_by_critique() {
        let critique = Critique {
            corroborating: vec![SourceRef {
                title: "Survey".to_string(),
                locator: "https://survey".to_string(),
                claim: "Attention helps".to_string(),
            }],
            conflicting: vec![SourceRef {
                title: "Rebuttal".to_string(),
                locator: "https://rebuttal".to_string(),
                claim: "# Scales well".to_string(),
            }],
            synthesis: String::new(),
        };

        let checked = analysis();
        let fragment = render_fragment(
            &paper(),
            &checked,
            Some(Verification::new(&critique, &checked)),
            &notes(),
        );
        assert!(!fragment.contains("### Claims after review"));
        let settled = fragment.split("### Settled claims").nth(1).unwrap();
        let settled = settled.split("### Uncertain claims").next().unwrap();
        assert!(settled.contains("- Attention helps"));
        assert!(!settled.contains("Scales well"));

        assert!(fragment.contains("- [Survey](https://survey): supports \"Attention helps\""));
        assert!(fragment.contains("- [Rebuttal](https://rebuttal): disputes \"Scales well\""));
    }

    #[test]
    fn test_reworded_claims_keep_their_verdicts() {
        let original = analysis();
        let critique = Critique {
            corroborating: vec![SourceRef {
                title: "Survey".to_string(),
                locator: "https://survey".to_string(),
                claim: "Attention helps".to_string(),
            }],
            conflicting: Vec::new(),
            synthesis: String::new(),
        };
        let mut refined = original.clone();
        refined.key_claims[0] = "Attention helps on citation graphs".to_string();

        let fragment = render_fragment(
            &paper(),
            &refined,
            Some(Verification::new(&critique, &original)),
            &notes(),
        );
        let settled = fragment.split("### Settled claims").nth(1).unwrap();
        let settled = settled.split("### Uncertain claims").next().unwrap();
        assert!(settled.contains("- Attention helps\n"));

        let revised = fragment.split("### Claims after review").nth(1).unwrap();
        let revised = revised.split("### Sources").next().unwrap();
        assert!(revised.contains("- Attention helps on citation graphs"));
        assert!(fragment.contains("- [Survey](https://survey): supports \"Attention helps\""));
    }

    #[test]
    fn test_parse_notes_requires_overview() {
        assert!(parse_notes(r#"{"overview": " ", "next_steps": []}"#).is_err());
        let parsed = parse_notes("```json\n{\"overview\": \"o\"}\n```").unwrap();
        assert!(parsed.next_steps.is_empty());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = render_fragment(&paper(), &analysis(), None, &notes());
        let b = render_fragment(&paper(), &analysis(), None, &notes());
        assert_eq!(a, b);
    }
}
