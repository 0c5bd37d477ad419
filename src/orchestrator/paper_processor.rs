//! 单篇论文任务 - 编排层
//!
//! ## 职责
//!
//! 1. **执行流程**：调用 `PaperFlow` 处理一篇论文
//! 2. **收集结果**：成功的记录追加到共享结果集（互斥锁保护）
//! 3. **隔离失败**：失败只记录日志并返回错误，不影响其他任务

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::StageError;
use crate::models::PaperDescriptor;
use crate::utils::truncate_text;
use crate::workflow::{PaperAnalysisState, PaperFlow};

/// 共享结果集：按完成顺序追加
pub type ResultBuffer = Arc<Mutex<Vec<PaperAnalysisState>>>;

/// 处理单篇论文
///
/// # 参数
/// - `flow`: 论文处理流程（所有任务共享，只读）
/// - `rank`: 检索排名（用于日志和报告排序）
/// - `paper`: 论文描述
/// - `cancel`: 取消信号
/// - `results`: 共享结果集
pub async fn process_paper(
    flow: &PaperFlow,
    rank: usize,
    paper: PaperDescriptor,
    cancel: &CancellationToken,
    results: &ResultBuffer,
) -> Result<(), StageError> {
    log_paper_start(rank, &paper);

    let state = flow.run(rank, paper, cancel).await?;

    let mut buffer = results.lock().await;
    buffer.push(state);
    info!("[论文 {}] 📦 已收集（当前共 {} 篇）", rank, buffer.len());
    Ok(())
}

fn log_paper_start(rank: usize, paper: &PaperDescriptor) {
    info!("\n{}", "─".repeat(60));
    info!(
        "[论文 {}] 📄 {} ({})",
        rank,
        truncate_text(&paper.title, 60),
        paper.identifier
    );
    info!("[论文 {}] 👥 {}", rank, paper.author_line(3));
    info!("{}", "─".repeat(60));
}
