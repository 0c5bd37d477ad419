use std::fmt;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 论文检索错误
    #[error("论文检索错误: {0}")]
    Fetch(#[from] FetchError),
    /// 单篇论文的阶段错误
    #[error("阶段错误: {0}")]
    Stage(#[from] StageError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 报告输出错误
    #[error("输出错误: {0}")]
    Output(#[from] OutputError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(String),
}

/// 论文元数据检索错误
#[derive(Debug, Error)]
pub enum FetchError {
    /// 网络请求失败
    #[error("检索请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 服务返回非成功状态码
    #[error("检索服务返回错误状态 ({endpoint}): {status}")]
    BadStatus { endpoint: String, status: u16 },
    /// 返回内容无法解析
    #[error("无法解析检索结果: {0}")]
    Parse(String),
}

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Analysis,
    Critic,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Analysis => "analysis",
            Stage::Critic => "critic",
            Stage::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

/// 阶段错误的具体原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageErrorKind {
    /// 远程桌面会话出错
    #[error("会话错误: {0}")]
    Session(String),
    /// 页面加载或外部调用超时
    #[error("超时: {0}")]
    Timeout(String),
    /// 未提取到任何文本
    #[error("提取到的文本为空")]
    EmptyText,
    /// 推理服务调用失败
    #[error("推理服务调用失败: {0}")]
    Reasoning(String),
    /// 推理服务返回的内容不符合约定结构
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),
    /// 网络搜索失败
    #[error("搜索失败: {0}")]
    Search(String),
    /// 状态记录违反完成前缀约束
    #[error("状态错误: {0}")]
    State(#[from] StateError),
    /// 任务被取消
    #[error("任务已取消")]
    Cancelled,
}

/// 单篇论文在某个阶段的失败，始终携带论文标识
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{paper_id}] {stage} 阶段失败: {kind}")]
pub struct StageError {
    pub stage: Stage,
    pub paper_id: String,
    pub kind: StageErrorKind,
}

impl StageError {
    pub fn new(stage: Stage, paper_id: impl Into<String>, kind: StageErrorKind) -> Self {
        Self {
            stage,
            paper_id: paper_id.into(),
            kind,
        }
    }

    pub fn cancelled(stage: Stage, paper_id: impl Into<String>) -> Self {
        Self::new(stage, paper_id, StageErrorKind::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StageErrorKind::Cancelled
    }
}

/// `PaperAnalysisState` 的记录错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// 字段已经设置过
    #[error("字段 {0} 已设置，不允许覆盖")]
    AlreadySet(&'static str),
    /// 前置字段尚未设置
    #[error("字段 {field} 需要先设置 {requires}")]
    MissingPrerequisite {
        field: &'static str,
        requires: &'static str,
    },
    /// 报告已生成，记录已封闭
    #[error("报告已生成，不能再记录 {0}")]
    Finalized(&'static str),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 构建请求失败
    #[error("构建 LLM 请求失败: {0}")]
    InvalidRequest(String),
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 网络搜索错误
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("搜索请求失败: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("搜索服务返回错误状态: {0}")]
    BadStatus(u16),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置文件读取或解析失败
    #[error("配置文件 {path} 无效: {message}")]
    InvalidFile { path: String, message: String },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// 报告输出错误
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_carries_paper_id() {
        let err = StageError::new(Stage::Extraction, "2401.00001", StageErrorKind::EmptyText);
        let message = err.to_string();
        assert!(message.contains("2401.00001"));
        assert!(message.contains("extraction"));
        assert!(!err.is_cancelled());
        assert!(StageError::cancelled(Stage::Analysis, "x").is_cancelled());
    }
}
