//! 单篇论文处理流程 - 流程层
//!
//! 核心职责：定义"一篇论文"的完整处理流程
//!
//! 流程顺序（严格串行）：
//! 1. 提取（远程会话）
//! 2. 分析
//! 3. 核查（可选）→ 发现冲突来源时复核分析一次
//! 4. 综合 → 报告片段

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Stage, StageError, StageErrorKind, StateError};
use crate::models::PaperDescriptor;
use crate::services::{ThoughtKind, ThoughtWriter};
use crate::workflow::analysis::AnalystAgent;
use crate::workflow::critic::CriticAgent;
use crate::workflow::extraction::ExtractionAgent;
use crate::workflow::paper_state::{PaperAnalysisState, PaperOutcome};
use crate::workflow::synthesis::SynthesizerAgent;

/// 单篇论文处理流程
///
/// - 决定阶段顺序与是否复核
/// - 不持有远程会话（由提取阶段按需租用）
/// - 每个阶段的输出写入 `PaperAnalysisState`
pub struct PaperFlow {
    extraction: ExtractionAgent,
    analyst: AnalystAgent,
    critic: Option<CriticAgent>,
    synthesizer: SynthesizerAgent,
    thoughts: ThoughtWriter,
}

impl PaperFlow {
    pub fn new(
        extraction: ExtractionAgent,
        analyst: AnalystAgent,
        critic: Option<CriticAgent>,
        synthesizer: SynthesizerAgent,
        thoughts: ThoughtWriter,
    ) -> Self {
        Self {
            extraction,
            analyst,
            critic,
            synthesizer,
            thoughts,
        }
    }

    /// 处理一篇论文
    ///
    /// `rank` 为检索排名（从 1 开始），同时用作日志前缀
    pub async fn run(
        &self,
        rank: usize,
        paper: PaperDescriptor,
        cancel: &CancellationToken,
    ) -> PaperOutcome {
        let result = self.run_stages(rank, paper, cancel).await;
        match &result {
            Ok(_) => info!("[论文 {}] ✅ 处理完成", rank),
            Err(e) if e.is_cancelled() => warn!("[论文 {}] ⏹ 已取消: {}", rank, e),
            Err(e) => {
                error!("[论文 {}] ❌ {}", rank, e);
                self.thoughts.write("Orchestrator", ThoughtKind::Error, &e.to_string());
            }
        }
        result
    }

    async fn run_stages(
        &self,
        rank: usize,
        paper: PaperDescriptor,
        cancel: &CancellationToken,
    ) -> PaperOutcome {
        let paper_id = paper.identifier.clone();
        let mut state = PaperAnalysisState::new(rank, paper);

        // ========== 1. 提取 ==========
        info!("[论文 {}] 📥 提取: {}", rank, paper_id);
        let content = self.extraction.run(state.descriptor(), cancel).await?;
        state
            .record_extraction(content)
            .map_err(|e| state_error(Stage::Extraction, &paper_id, e))?;

        // ========== 2. 分析 ==========
        info!("[论文 {}] 🧠 分析", rank);
        let analysis = {
            let content = state
                .require_extraction()
                .map_err(|e| state_error(Stage::Analysis, &paper_id, e))?;
            until_cancelled(
                cancel,
                Stage::Analysis,
                &paper_id,
                self.analyst.run(state.descriptor(), content, None),
            )
            .await?
        };
        state
            .record_analysis(analysis)
            .map_err(|e| state_error(Stage::Analysis, &paper_id, e))?;

        // ========== 3. 核查（可选，最多复核一次） ==========
        if let Some(critic) = &self.critic {
            info!("[论文 {}] 🔎 核查", rank);
            let critique = {
                let analysis = state
                    .require_analysis()
                    .map_err(|e| state_error(Stage::Critic, &paper_id, e))?;
                until_cancelled(
                    cancel,
                    Stage::Critic,
                    &paper_id,
                    critic.run(state.descriptor(), analysis),
                )
                .await?
            };
            let contradiction = critique.has_contradiction();
            state
                .record_critique(critique)
                .map_err(|e| state_error(Stage::Critic, &paper_id, e))?;

            if contradiction {
                info!("[论文 {}] 🔁 发现冲突来源，复核分析", rank);
                self.thoughts.write(
                    "Orchestrator",
                    ThoughtKind::Decide,
                    &format!("Conflicting evidence for {}, re-running analysis once", paper_id),
                );
                let refined = {
                    let content = state
                        .require_extraction()
                        .map_err(|e| state_error(Stage::Analysis, &paper_id, e))?;
                    let critique = state
                        .require_critique()
                        .map_err(|e| state_error(Stage::Analysis, &paper_id, e))?;
                    until_cancelled(
                        cancel,
                        Stage::Analysis,
                        &paper_id,
                        self.analyst.run(state.descriptor(), content, Some(critique)),
                    )
                    .await?
                };
                state
                    .record_refined_analysis(refined)
                    .map_err(|e| state_error(Stage::Analysis, &paper_id, e))?;
            }
        }

        // ========== 4. 综合 ==========
        info!("[论文 {}] ✍️ 生成报告片段", rank);
        let report = {
            let analysis = state
                .require_analysis()
                .map_err(|e| state_error(Stage::Synthesis, &paper_id, e))?;
            until_cancelled(
                cancel,
                Stage::Synthesis,
                &paper_id,
                self.synthesizer.run(state.descriptor(), analysis, state.verification()),
            )
            .await?
        };
        state
            .record_report(report)
            .map_err(|e| state_error(Stage::Synthesis, &paper_id, e))?;

        Ok(state)
    }
}

/// 在取消信号到来前等待阶段完成
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    stage: Stage,
    paper_id: &str,
    stage_future: impl Future<Output = Result<T, StageError>>,
) -> Result<T, StageError> {
    if cancel.is_cancelled() {
        return Err(StageError::cancelled(stage, paper_id));
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageError::cancelled(stage, paper_id)),
        result = stage_future => result,
    }
}

fn state_error(stage: Stage, paper_id: &str, error: StateError) -> StageError {
    StageError::new(stage, paper_id, StageErrorKind::State(error))
}
