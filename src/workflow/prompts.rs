//! 各阶段的提示词
//!
//! 所有阶段都要求模型只返回 JSON，便于在阶段边界做结构校验

use crate::models::{AnalysisResult, Critique, ExtractedContent, PaperDescriptor};
use crate::services::SearchHit;

pub const ANALYST_SYSTEM_PROMPT: &str = r#"You are an expert research analyst reviewing an academic paper.

Analyze the paper and provide:
1. Key claims and contributions
2. Metrics and quantitative results
3. Methodology summary
4. Mathematical derivations (if any)
5. A concise TL;DR (one or two sentences)
6. An ELI5 (explain like I'm 5) summary

Return ONLY valid JSON with this structure:
{
    "key_claims": ["claim1", "claim2"],
    "metrics_and_results": {"metric": "value"},
    "methodology_summary": "...",
    "mathematical_derivations": ["derivation1"],
    "tldr": "...",
    "eli5": "..."
}"#;

/// 可选的分析视角
pub const PERSONAS: &[&str] = &[
    "The Skeptic - questions assumptions and methodological rigor",
    "The Proponent - identifies strengths and potential applications",
    "The Pragmatist - focuses on real-world implementation and scalability",
    "The Formalist - examines mathematical correctness and theoretical foundations",
    "The Strategist - evaluates long-term implications and research directions",
];

/// 简称（`skeptic`、`the formalist`）解析为完整视角描述，其他文本原样使用
pub fn resolve_persona(name: &str) -> String {
    let name = name.trim();
    let short = name.to_lowercase();
    let short = short.strip_prefix("the ").unwrap_or(&short);
    PERSONAS
        .iter()
        .find(|persona| {
            persona
                .to_lowercase()
                .strip_prefix("the ")
                .and_then(|rest| rest.split(" - ").next())
                .is_some_and(|label| label == short)
        })
        .map(|persona| persona.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// 分析阶段的系统指令；没有视角时就是 `ANALYST_SYSTEM_PROMPT`
pub fn analyst_system_prompt(persona: Option<&str>) -> String {
    match persona.map(str::trim).filter(|p| !p.is_empty()) {
        None => ANALYST_SYSTEM_PROMPT.to_string(),
        Some(persona) => {
            let body = ANALYST_SYSTEM_PROMPT
                .strip_prefix("You are an expert research analyst reviewing an academic paper.")
                .unwrap_or(ANALYST_SYSTEM_PROMPT);
            format!(
                "You are {}, an expert research analyst reviewing an academic paper.\n\
                 Provide critical analysis from this perspective.{}",
                resolve_persona(persona),
                body
            )
        }
    }
}

pub const CRITIC_SYSTEM_PROMPT: &str = r#"You are a careful research critic. You receive one claim from a paper and a numbered list of web search results.

For every result decide whether it corroborates the claim, conflicts with the claim, or is irrelevant to it.
Only mark a result as conflicting when it directly disputes the claim or reports materially different results.

Return ONLY valid JSON with this structure:
{
    "verdicts": [{"index": 1, "verdict": "corroborating" | "conflicting" | "irrelevant"}],
    "note": "one sentence on how well the claim holds up"
}"#;

pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r#"You are an expert research synthesizer writing one section of a research digest.

Given a structured analysis of a paper and, when available, the results of external validation:
1. Summarize the paper's contributions in one short paragraph
2. Propose concrete next steps for a reader or researcher (2 to 4 items)

Return ONLY valid JSON with this structure:
{
    "overview": "...",
    "next_steps": ["...", "..."]
}"#;

/// 分析阶段的用户消息
///
/// `paper_text` 为已截断的正文；`evidence` 存在时为复核请求
pub fn analyst_user_prompt(
    paper: &PaperDescriptor,
    content: &ExtractedContent,
    paper_text: &str,
    evidence: Option<&Critique>,
) -> String {
    let mut prompt = format!(
        "Please analyze the following research paper.\n\nTitle: {}\nAuthors: {}\nIdentifier: {}\nAbstract: {}\n",
        paper.title,
        paper.author_line(10),
        paper.identifier,
        paper.abstract_text,
    );

    if !content.images.is_empty() {
        let labels: Vec<String> = content
            .images
            .iter()
            .enumerate()
            .map(|(i, image)| format!("  Image {}: {}", i + 1, image.label))
            .collect();
        prompt.push_str(&format!(
            "\nAttached images ({}):\n{}\n",
            content.images.len(),
            labels.join("\n")
        ));
    }

    prompt.push_str(&format!("\nFull text:\n{}\n", paper_text));

    if let Some(critique) = evidence {
        prompt.push_str("\nExternal validation found the following evidence. ");
        prompt.push_str("Revise your analysis so that claims disputed by conflicting sources are stated with appropriate caution.\n");
        for source in &critique.conflicting {
            prompt.push_str(&format!(
                "- CONFLICTING ({}): {} <{}>\n",
                source.claim, source.title, source.locator
            ));
        }
        for source in &critique.corroborating {
            prompt.push_str(&format!(
                "- CORROBORATING ({}): {} <{}>\n",
                source.claim, source.title, source.locator
            ));
        }
        if !critique.synthesis.is_empty() {
            prompt.push_str(&format!("Critic summary: {}\n", critique.synthesis));
        }
    }

    prompt.push_str("\nRemember to return valid JSON matching the required structure.");
    prompt
}

pub fn critic_user_prompt(claim: &str, hits: &[SearchHit]) -> String {
    let results: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {} <{}>\n   {}", i + 1, hit.title, hit.url, hit.snippet))
        .collect();
    format!(
        "Claim: {}\n\nSearch results:\n{}\n\nClassify every result.",
        claim,
        results.join("\n")
    )
}

pub fn synthesizer_user_prompt(
    paper: &PaperDescriptor,
    analysis: &AnalysisResult,
    critique: Option<&Critique>,
) -> String {
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    let validation = match critique {
        Some(critique) => format!(
            "{} corroborating and {} conflicting sources. {}",
            critique.corroborating.len(),
            critique.conflicting.len(),
            critique.synthesis
        ),
        None => "No external validation was performed.".to_string(),
    };
    format!(
        "Paper: {} ({})\n\n## Analysis Results:\n{}\n\n## External Validation:\n{}\n\nReturn the JSON now.",
        paper.title, paper.identifier, analysis_json, validation
    )
}
