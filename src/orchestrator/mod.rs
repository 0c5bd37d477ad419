//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 一次完整运行
//! - 约束请求数量（不超过并发上限）
//! - 检索论文（Vec<PaperDescriptor>）
//! - 控制并发数量（Semaphore），每个任务占用一个远程会话
//! - 汇总结果、编译并写入报告
//!
//! ### `paper_processor` - 单篇论文任务
//! - 调用 PaperFlow
//! - 把成功记录追加到共享结果集
//!
//! ### `report` - 报告编译
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PaperDescriptor>)
//!     ↓
//! paper_processor (处理单篇论文)
//!     ↓
//! workflow::PaperFlow (提取 → 分析 → 核查 → 综合)
//!     ↓
//! services (能力层：paper search / llm / web search / thoughts / report)
//!     ↓
//! infrastructure (基础设施：远程桌面会话)
//! ```

pub mod batch_processor;
pub mod paper_processor;
pub mod report;

pub use batch_processor::{
    effective_paper_count, Collaborators, Orchestrator, RunOutcome, RunSummary,
};
pub use paper_processor::process_paper;
pub use report::{compile_report, report_file_name};
