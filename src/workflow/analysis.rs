//! 分析阶段 - 流程层
//!
//! 截断正文 → 一次结构化推理请求 → 解析并校验 `AnalysisResult`

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Stage, StageError, StageErrorKind};
use crate::models::{AnalysisResult, Critique, ExtractedContent, PaperDescriptor};
use crate::services::{ReasoningRequest, ReasoningService, ThoughtKind, ThoughtWriter};
use crate::utils::{extract_json_block, truncate_text};
use crate::workflow::prompts;

const AGENT: &str = "AnalystAgent";

pub struct AnalystAgent {
    reasoning: Arc<dyn ReasoningService>,
    max_input_chars: usize,
    system_prompt: String,
    thoughts: ThoughtWriter,
}

impl AnalystAgent {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        max_input_chars: usize,
        thoughts: ThoughtWriter,
    ) -> Self {
        Self {
            reasoning,
            max_input_chars,
            system_prompt: prompts::ANALYST_SYSTEM_PROMPT.to_string(),
            thoughts,
        }
    }

    /// 以指定视角分析
    pub fn with_persona(mut self, persona: Option<&str>) -> Self {
        self.system_prompt = prompts::analyst_system_prompt(persona);
        self
    }

    /// `evidence` 为 Critic 阶段的结果时，本次调用是复核分析
    pub async fn run(
        &self,
        paper: &PaperDescriptor,
        content: &ExtractedContent,
        evidence: Option<&Critique>,
    ) -> Result<AnalysisResult, StageError> {
        let paper_id = paper.identifier.as_str();
        let paper_text = truncate_for_model(&content.raw_text, self.max_input_chars);
        if paper_text.len() != content.raw_text.len() {
            debug!(
                "[{}] 正文 {} 字符，截断到 {} 字符",
                paper_id,
                content.char_count(),
                self.max_input_chars
            );
        }

        let action = if evidence.is_some() { "Re-analyzing" } else { "Analyzing" };
        self.thoughts.write(
            AGENT,
            ThoughtKind::Analyze,
            &format!("{} {}: {}", action, paper_id, truncate_text(&paper.title, 80)),
        );

        let request = ReasoningRequest::new(
            self.system_prompt.as_str(),
            prompts::analyst_user_prompt(paper, content, &paper_text, evidence),
        )
        .with_images(content.images.clone());

        let response = self.reasoning.complete(&request).await.map_err(|e| {
            StageError::new(
                Stage::Analysis,
                paper_id,
                StageErrorKind::Reasoning(e.to_string()),
            )
        })?;

        let analysis = parse_analysis(&response).map_err(|message| {
            self.thoughts.write(
                AGENT,
                ThoughtKind::Error,
                &format!("Malformed analysis for {}: {}", paper_id, message),
            );
            StageError::new(
                Stage::Analysis,
                paper_id,
                StageErrorKind::MalformedResponse(message),
            )
        })?;

        info!(
            "[{}] ✓ 分析完成: {} 条论点, {} 项指标",
            paper_id,
            analysis.key_claims.len(),
            analysis.metrics.len()
        );
        self.thoughts.write(
            AGENT,
            ThoughtKind::Insight,
            &format!("{} TL;DR: {}", paper_id, analysis.tldr),
        );
        Ok(analysis)
    }
}

/// 按字符数截断正文（保留开头）
///
/// 被截断时在末尾注明截掉的字符数；同一输入总是得到同一输出
pub fn truncate_for_model(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}\n\n[... truncated {} characters]", head, total - max_chars)
}

/// 解析模型回复并做边界校验
pub fn parse_analysis(response: &str) -> Result<AnalysisResult, String> {
    let mut analysis: AnalysisResult =
        serde_json::from_str(extract_json_block(response)).map_err(|e| e.to_string())?;

    analysis.key_claims = analysis
        .key_claims
        .into_iter()
        .map(|claim| claim.trim().to_string())
        .filter(|claim| !claim.is_empty())
        .collect();
    analysis.derivations.retain(|d| !d.trim().is_empty());
    analysis.validate()?;
    Ok(analysis)
}
