//! # Paper Digest
//!
//! 按主题检索 arXiv 论文，在远程浏览器中阅读全文，调用 LLM 分析、（可选）联网核查，
//! 最后编译成一份 Markdown 研究摘要。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 连接远程浏览器或启动本地无头浏览器
//! - `infrastructure/` - 远程桌面会话抽象，持有稀缺资源，只暴露能力
//! - `SessionLease` - 会话租约，保证每个会话恰好释放一次
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `ArxivSearch` - 论文检索能力
//! - `LlmService` - 推理能力（带重试）
//! - `DuckDuckGoSearch` - 网络搜索能力
//! - `ThoughtWriter` / `ReportWriter` - 写 thoughts / 写报告
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文"的完整处理流程
//! - `PaperAnalysisState` - 单篇论文的处理记录（完成前缀约束）
//! - `PaperFlow` - 流程编排（提取 → 分析 → 核查 → 综合）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 一次完整运行，管理并发与取消
//! - `orchestrator/paper_processor` - 单篇论文任务，收集结果
//! - `orchestrator/report` - 编译最终报告
//!
//! ## 模块结构

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, Stage, StageError, StageErrorKind};
pub use infrastructure::{ChromeDesktop, DesktopProvider, DesktopSession, SessionLease};
pub use models::{AnalysisResult, Critique, ExtractedContent, ImagePayload, PaperDescriptor};
pub use orchestrator::{Collaborators, Orchestrator, RunOutcome, RunSummary};
pub use workflow::{PaperAnalysisState, PaperFlow, PaperOutcome};
