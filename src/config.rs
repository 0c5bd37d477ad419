//! 程序配置
//!
//! 加载顺序：内置默认值 → TOML 配置文件 → 环境变量（含 `.env`）→ 命令行参数

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "paper_digest.toml";

/// 模型别名 → 完整模型名
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("claude-3-5-sonnet-latest", "claude-3-5-sonnet-20241022"),
    ("claude-3-5-haiku-latest", "claude-3-5-haiku-20241022"),
    ("claude-3-5-sonnet", "claude-3-5-sonnet-20241022"),
    ("claude-3-5-haiku", "claude-3-5-haiku-20241022"),
    ("claude-3-opus", "claude-3-opus-20240229"),
    ("claude-3-sonnet", "claude-3-sonnet-20240229"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
];

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 运行参数 ---
    /// 单次运行允许请求的最大论文数
    pub max_papers_limit: usize,
    /// 允许的最大并发会话数
    pub max_vms_limit: usize,
    pub default_num_papers: usize,
    pub default_num_vms: usize,
    /// 报告输出目录
    pub output_dir: String,
    /// 日志目录（运行日志 + thoughts）
    pub log_dir: String,
    /// 是否输出 agent thoughts
    pub thoughts_enabled: bool,
    /// 整体运行超时（秒），不设置则不限
    pub run_timeout_secs: Option<u64>,

    // --- 远程桌面（浏览器）配置 ---
    /// 远程浏览器调试地址
    pub browser_debug_url: String,
    /// 本地浏览器可执行文件（仅在未配置远程地址时使用）
    pub browser_executable: Option<String>,
    /// 阅读页地址模板，`{id}` 会被替换为论文标识
    pub reading_url_template: String,
    /// 每篇论文最多截取的图表数量
    pub max_figures: usize,
    /// 页面加载超时（秒）
    pub page_load_timeout_secs: u64,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 送入推理服务前原文截断的字符数
    pub max_input_chars: usize,

    // --- 重试配置 ---
    pub max_retries: usize,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    // --- 外部检索 ---
    pub arxiv_api_url: String,
    pub search_api_url: String,

    // --- Critic 阶段 ---
    pub critic_enabled: bool,

    // --- Analyst 阶段 ---
    /// 分析视角，可写简称（如 `skeptic`）或完整描述；不设置则不带视角
    pub analyst_persona: Option<String>,
    pub max_claims_to_verify: usize,
    pub search_results_per_query: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_papers_limit: 20,
            max_vms_limit: 10,
            default_num_papers: 3,
            default_num_vms: 3,
            output_dir: "output".to_string(),
            log_dir: "logs".to_string(),
            thoughts_enabled: true,
            run_timeout_secs: None,
            browser_debug_url: "http://localhost:9222".to_string(),
            browser_executable: None,
            reading_url_template: "https://arxiv.org/html/{id}".to_string(),
            max_figures: 3,
            page_load_timeout_secs: 60,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.anthropic.com/v1".to_string(),
            llm_model_name: "claude-3-5-haiku-20241022".to_string(),
            llm_temperature: 0.0,
            llm_max_tokens: 2000,
            max_input_chars: 50_000,
            max_retries: 3,
            retry_initial_delay_ms: 2_000,
            retry_max_delay_ms: 60_000,
            arxiv_api_url: "http://export.arxiv.org/api/query".to_string(),
            search_api_url: "https://api.duckduckgo.com/".to_string(),
            critic_enabled: false,
            analyst_persona: None,
            max_claims_to_verify: 3,
            search_results_per_query: 5,
        }
    }
}

impl Config {
    /// 按完整顺序加载配置（不含命令行参数）
    pub fn load() -> Result<Self, ConfigError> {
        // .env 不存在时忽略
        let _ = dotenvy::dotenv();

        let path = std::env::var("PAPER_DIGEST_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = Self::from_file(Path::new(&path))?.unwrap_or_default();
        base.with_env()
    }

    /// 读取 TOML 配置文件，文件不存在时返回 `None`
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|message| ConfigError::InvalidFile {
                path: path.display().to_string(),
                message,
            })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// 只使用默认值 + 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// 用环境变量覆盖当前配置
    pub fn with_env(self) -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .unwrap_or(self.llm_api_key);

        let mut config = Self {
            default_num_papers: env_parse("DEFAULT_NUM_PAPERS", self.default_num_papers)?,
            default_num_vms: env_parse("DEFAULT_NUM_VMS", self.default_num_vms)?,
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(self.output_dir),
            log_dir: std::env::var("LOG_DIR").unwrap_or(self.log_dir),
            browser_debug_url: std::env::var("BROWSER_DEBUG_URL").unwrap_or(self.browser_debug_url),
            llm_api_key: api_key,
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE", self.llm_temperature)?,
            max_retries: env_parse("MAX_RETRIES", self.max_retries)?,
            retry_initial_delay_ms: env_parse("RETRY_DELAY_MS", self.retry_initial_delay_ms)?,
            critic_enabled: env_parse("CRITIC_ENABLED", self.critic_enabled)?,
            analyst_persona: std::env::var("ANALYST_PERSONA").ok().or(self.analyst_persona),
            ..self
        };
        config.llm_model_name = resolve_model_alias(&config.llm_model_name);
        Ok(config)
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm_api_key",
                message: "未设置 LLM_API_KEY（或 ANTHROPIC_API_KEY）".to_string(),
            });
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_input_chars",
                message: "必须大于 0".to_string(),
            });
        }
        if self.max_papers_limit == 0 || self.max_vms_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_papers_limit",
                message: "论文数与并发数上限必须大于 0".to_string(),
            });
        }
        if !self.reading_url_template.contains("{id}") {
            return Err(ConfigError::InvalidValue {
                field: "reading_url_template",
                message: "必须包含 {id} 占位符".to_string(),
            });
        }
        Ok(())
    }
}

/// 把模型别名解析为完整模型名，未知名称原样返回
pub fn resolve_model_alias(name: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn env_parse<T: FromStr>(var_name: &str, current: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>(),
            }),
        Err(_) => Ok(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_alias() {
        assert_eq!(
            resolve_model_alias("claude-3-5-haiku"),
            "claude-3-5-haiku-20241022"
        );
        assert_eq!(resolve_model_alias("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn test_toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            output_dir = "reports"
            max_figures = 1
            critic_enabled = true
            analyst_persona = "skeptic"
            "#,
        )
        .unwrap();
        assert_eq!(config.analyst_persona.as_deref(), Some("skeptic"));
        assert_eq!(config.output_dir, "reports");
        assert_eq!(config.max_figures, 1);
        assert!(config.critic_enabled);
        assert_eq!(config.max_input_chars, 50_000);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            llm_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_none() {
        let result = Config::from_file(Path::new("definitely/not/here.toml")).unwrap();
        assert!(result.is_none());
    }
}
