//! 批量论文处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责一次完整运行：检索论文、并发处理、汇总报告。
//!
//! ## 核心功能
//!
//! 1. **数量约束**：请求论文数超过并发上限时截到上限（警告而非报错）
//! 2. **论文检索**：按主题检索，结果为空直接结束，不写文件
//! 3. **并发控制**：使用 Semaphore 限制同时运行的任务数（每个任务占用一个远程会话）
//! 4. **失败隔离**：单篇失败或 panic 只计入失败数
//! 5. **取消**：Ctrl-C 或运行超时触发取消，所有任务释放会话后退出，不写报告
//! 6. **报告输出**：按检索排名编译并写入报告

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{AppError, Stage, StageError};
use crate::infrastructure::DesktopProvider;
use crate::orchestrator::paper_processor::{self, ResultBuffer};
use crate::orchestrator::report::{compile_report, report_file_name};
use crate::services::{
    PaperSource, ReasoningService, ReportWriter, ThoughtKind, ThoughtWriter, WebSearch,
};
use crate::utils::logging;
use crate::workflow::{AnalystAgent, CriticAgent, ExtractionAgent, PaperFlow, SynthesizerAgent};

const AGENT: &str = "Orchestrator";

/// 外部协作方
///
/// 生产环境使用 arXiv / 远程浏览器 / LLM / DuckDuckGo，测试中替换为桩实现
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn PaperSource>,
    pub desktop: Arc<dyn DesktopProvider>,
    pub reasoning: Arc<dyn ReasoningService>,
    pub search: Arc<dyn WebSearch>,
}

/// 一次成功运行的统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub report_path: std::path::PathBuf,
    /// 请求的论文数（已按并发上限截断）
    pub requested: usize,
    /// 实际检索到并处理的论文数
    pub processed: usize,
    /// 收录进报告的论文数
    pub included: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn is_partial(&self) -> bool {
        self.included < self.requested
    }
}

/// 运行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 报告已写入（全部或部分成功）
    Completed(RunSummary),
    /// 没有检索到论文，未写文件
    NoPapers,
    /// 所有论文都失败，未写文件
    NoSummaries { processed: usize },
    /// 运行被取消，未写文件
    Cancelled,
}

/// 编排器
pub struct Orchestrator {
    source: Arc<dyn PaperSource>,
    flow: Arc<PaperFlow>,
    writer: ReportWriter,
    thoughts: ThoughtWriter,
    run_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn PaperSource>,
        flow: PaperFlow,
        writer: ReportWriter,
        thoughts: ThoughtWriter,
    ) -> Self {
        Self {
            source,
            flow: Arc::new(flow),
            writer,
            thoughts,
            run_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 按配置组装各阶段
    pub fn from_config(config: &Config, parts: Collaborators, thoughts: ThoughtWriter) -> Self {
        let extraction = ExtractionAgent::new(
            parts.desktop,
            config.reading_url_template.clone(),
            config.max_figures,
            thoughts.clone(),
        );
        let analyst = AnalystAgent::new(
            parts.reasoning.clone(),
            config.max_input_chars,
            thoughts.clone(),
        )
        .with_persona(config.analyst_persona.as_deref());
        let critic = config.critic_enabled.then(|| {
            CriticAgent::new(
                parts.reasoning.clone(),
                parts.search.clone(),
                config.max_claims_to_verify,
                config.search_results_per_query,
                thoughts.clone(),
            )
        });
        let synthesizer = SynthesizerAgent::new(parts.reasoning.clone(), thoughts.clone());
        let flow = PaperFlow::new(extraction, analyst, critic, synthesizer, thoughts.clone());

        let mut orchestrator = Self::new(
            parts.source,
            flow,
            ReportWriter::new(&config.output_dir),
            thoughts,
        );
        orchestrator.run_timeout = config.run_timeout_secs.map(Duration::from_secs);
        orchestrator
    }

    /// 取消信号（Ctrl-C 处理器持有一份）
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行完整流程
    pub async fn run(
        &self,
        topic: &str,
        papers_requested: usize,
        max_concurrency: usize,
    ) -> Result<RunOutcome, AppError> {
        let max_concurrency = max_concurrency.max(1);
        let requested = effective_paper_count(papers_requested, max_concurrency);
        logging::log_startup(topic, requested, max_concurrency);

        let timer = self.run_timeout.map(|timeout| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("⏰ 运行超时（{} 秒），取消所有任务", timeout.as_secs());
                cancel.cancel();
            })
        });

        let outcome = self.run_inner(topic, requested, max_concurrency).await;

        if let Some(timer) = timer {
            timer.abort();
        }
        outcome
    }

    async fn run_inner(
        &self,
        topic: &str,
        requested: usize,
        max_concurrency: usize,
    ) -> Result<RunOutcome, AppError> {
        // ========== 1. 检索 ==========
        self.thoughts.write(
            AGENT,
            ThoughtKind::Step,
            &format!("Searching papers on '{}' (max {})", topic, requested),
        );
        let papers = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            papers = self.source.search(topic, requested) => papers?,
        };
        if papers.is_empty() {
            warn!("⚠️ 没有检索到与 '{}' 相关的论文，程序结束", topic);
            self.thoughts
                .write(AGENT, ThoughtKind::Error, "No papers found");
            return Ok(RunOutcome::NoPapers);
        }
        // 数据源可能返回多于请求的条目
        let papers: Vec<_> = papers.into_iter().take(requested).collect();
        let processed = papers.len();
        logging::log_papers_fetched(processed, max_concurrency);

        // ========== 2. 并发处理 ==========
        let (succeeded, failed, states) = self.process_all(papers, max_concurrency).await;

        if self.cancel.is_cancelled() {
            warn!("⏹ 运行已取消，丢弃 {} 篇已完成的结果", states.len());
            return Ok(RunOutcome::Cancelled);
        }
        if states.is_empty() {
            warn!("⚠️ 没有生成任何摘要（{} 篇全部失败）", failed);
            self.thoughts
                .write(AGENT, ThoughtKind::Error, "No summaries generated");
            return Ok(RunOutcome::NoSummaries { processed });
        }

        // ========== 3. 编译报告 ==========
        let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let report = compile_report(topic, &states, requested, &generated_at);
        let report_path = self.writer.write(&report_file_name(topic), &report)?;

        let summary = RunSummary {
            report_path,
            requested,
            processed,
            included: succeeded,
            failed,
        };
        logging::print_final_stats(
            summary.included,
            summary.failed,
            summary.requested,
            &summary.report_path.display().to_string(),
        );
        self.thoughts.write(
            AGENT,
            ThoughtKind::Success,
            &format!("Included {} of {} papers", summary.included, summary.requested),
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// 每篇论文一个任务，同时运行的任务数不超过 `max_concurrency`
    ///
    /// 返回 (成功数, 失败数, 成功记录)
    async fn process_all(
        &self,
        papers: Vec<crate::models::PaperDescriptor>,
        max_concurrency: usize,
    ) -> (usize, usize, Vec<crate::workflow::PaperAnalysisState>) {
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let results: ResultBuffer = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        for (idx, paper) in papers.into_iter().enumerate() {
            let rank = idx + 1;
            let semaphore = semaphore.clone();
            let flow = self.flow.clone();
            let cancel = self.cancel.clone();
            let results = results.clone();
            let paper_id = paper.identifier.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(StageError::cancelled(Stage::Extraction, paper_id));
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(StageError::cancelled(Stage::Extraction, paper_id)),
                    },
                };
                paper_processor::process_paper(&flow, rank, paper, &cancel, &results).await
            });
            handles.push((rank, handle));
        }

        let mut succeeded = 0;
        let mut failed = 0;
        for (rank, handle) in handles {
            match handle.await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(_)) => failed += 1,
                Err(e) => {
                    error!("[论文 {}] 任务执行失败: {}", rank, e);
                    failed += 1;
                }
            }
        }

        let states = std::mem::take(&mut *results.lock().await);
        (succeeded, failed, states)
    }
}

/// 实际处理的论文数：不超过并发上限
pub fn effective_paper_count(papers_requested: usize, max_concurrency: usize) -> usize {
    if papers_requested > max_concurrency {
        warn!(
            "⚠️ 请求论文数 {} 超过并发上限 {}，调整为 {}",
            papers_requested, max_concurrency, max_concurrency
        );
        max_concurrency
    } else {
        papers_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_paper_count_clamps() {
        assert_eq!(effective_paper_count(5, 2), 2);
        assert_eq!(effective_paper_count(3, 3), 3);
        assert_eq!(effective_paper_count(1, 10), 1);
    }

    #[test]
    fn test_partial_summary() {
        let summary = RunSummary {
            report_path: "out.md".into(),
            requested: 3,
            processed: 3,
            included: 2,
            failed: 1,
        };
        assert!(summary.is_partial());
    }
}
