//! 命令行参数
//!
//! `paper_digest run <topic> [--num-papers N] [--num-vms M] [--critic] [--no-thoughts] [--output-dir DIR] [--persona P]`

use std::sync::OnceLock;

use clap::{Args, Parser, Subcommand};
use regex::Regex;

use crate::config::Config;
use crate::error::AppError;
use crate::orchestrator::RunOutcome;

/// 退出码
pub mod exit_code {
    /// 运行完成（全部或部分成功）
    pub const SUCCESS: u8 = 0;
    /// 配置、浏览器、参数等致命错误
    pub const FATAL: u8 = 1;
    /// 没有检索到论文
    pub const NO_PAPERS: u8 = 3;
    /// 没有生成任何摘要
    pub const NO_SUMMARIES: u8 = 4;
    /// 被取消（Ctrl-C / 超时）
    pub const CANCELLED: u8 = 130;
}

const TOPIC_MIN_CHARS: usize = 3;
const TOPIC_MAX_CHARS: usize = 200;

#[derive(Debug, Parser)]
#[command(name = "paper_digest", version, about = "Search arXiv, read papers in a remote browser and compile a Markdown research digest")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 检索并总结某个主题的论文
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// 研究主题，例如 "graph neural networks"
    pub topic: String,

    /// 要总结的论文数量
    #[arg(long)]
    pub num_papers: Option<usize>,

    /// 并发的远程会话数量
    #[arg(long)]
    pub num_vms: Option<usize>,

    /// 启用网络核查阶段
    #[arg(long)]
    pub critic: bool,

    /// 不记录 agent thoughts
    #[arg(long)]
    pub no_thoughts: bool,

    /// 报告输出目录
    #[arg(long)]
    pub output_dir: Option<String>,

    /// 分析视角：skeptic / proponent / pragmatist / formalist / strategist，或自定义描述
    #[arg(long)]
    pub persona: Option<String>,
}

impl RunArgs {
    /// 命令行参数覆盖配置
    pub fn apply_to(&self, config: &mut Config) {
        if self.critic {
            config.critic_enabled = true;
        }
        if self.no_thoughts {
            config.thoughts_enabled = false;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(persona) = &self.persona {
            config.analyst_persona = Some(persona.clone());
        }
    }

    pub fn num_papers(&self, config: &Config) -> usize {
        self.num_papers.unwrap_or(config.default_num_papers)
    }

    pub fn num_vms(&self, config: &Config) -> usize {
        self.num_vms.unwrap_or(config.default_num_vms)
    }

    /// 参数校验；论文数大于会话数不算错误，由编排器截断
    pub fn validate(&self, config: &Config) -> Result<(), String> {
        validate_topic(&self.topic)?;

        let papers = self.num_papers(config);
        if papers < 1 || papers > config.max_papers_limit {
            return Err(format!(
                "--num-papers 必须在 1 到 {} 之间（当前 {}）",
                config.max_papers_limit, papers
            ));
        }
        let vms = self.num_vms(config);
        if vms < 1 || vms > config.max_vms_limit {
            return Err(format!(
                "--num-vms 必须在 1 到 {} 之间（当前 {}）",
                config.max_vms_limit, vms
            ));
        }
        Ok(())
    }
}

/// 主题只允许字母、数字、空格、连字符和括号
pub fn validate_topic(topic: &str) -> Result<(), String> {
    static TOPIC_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = TOPIC_PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9\s\-\(\)]+$").expect("valid topic pattern"));

    let topic = topic.trim();
    let len = topic.chars().count();
    if len < TOPIC_MIN_CHARS {
        return Err(format!("主题至少需要 {} 个字符", TOPIC_MIN_CHARS));
    }
    if len > TOPIC_MAX_CHARS {
        return Err(format!("主题不能超过 {} 个字符", TOPIC_MAX_CHARS));
    }
    if !pattern.is_match(topic) {
        return Err("主题只能包含字母、数字、空格、连字符和括号".to_string());
    }
    Ok(())
}

/// 运行结果 → 退出码
pub fn exit_code_for(result: &Result<RunOutcome, AppError>) -> u8 {
    match result {
        Ok(RunOutcome::Completed(_)) => exit_code::SUCCESS,
        Ok(RunOutcome::NoPapers) | Err(AppError::Fetch(_)) => exit_code::NO_PAPERS,
        Ok(RunOutcome::NoSummaries { .. }) => exit_code::NO_SUMMARIES,
        Ok(RunOutcome::Cancelled) => exit_code::CANCELLED,
        Err(_) => exit_code::FATAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, FetchError};

    fn args(topic: &str, papers: Option<usize>, vms: Option<usize>) -> RunArgs {
        RunArgs {
            topic: topic.to_string(),
            num_papers: papers,
            num_vms: vms,
            critic: false,
            no_thoughts: false,
            output_dir: None,
            persona: None,
        }
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "paper_digest",
            "run",
            "graph neural networks",
            "--num-papers",
            "5",
            "--num-vms",
            "2",
            "--critic",
            "--persona",
            "skeptic",
        ])
        .unwrap();
        let Command::Run(run) = cli.command;
        assert_eq!(run.topic, "graph neural networks");
        assert_eq!(run.num_papers, Some(5));
        assert_eq!(run.num_vms, Some(2));
        assert!(run.critic);
        assert!(!run.no_thoughts);
        assert_eq!(run.persona.as_deref(), Some("skeptic"));
    }

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("graph neural networks").is_ok());
        assert!(validate_topic("LLM (agents) - survey").is_ok());
        assert!(validate_topic("ab").is_err());
        assert!(validate_topic("drop; table").is_err());
        assert!(validate_topic(&"a".repeat(201)).is_err());
    }

    #[test]
    fn test_more_papers_than_vms_is_not_an_error() {
        let config = Config::default();
        assert!(args("graph neural networks", Some(5), Some(2)).validate(&config).is_ok());
        assert!(args("graph neural networks", Some(21), Some(2)).validate(&config).is_err());
        assert!(args("graph neural networks", Some(3), Some(0)).validate(&config).is_err());
        assert!(args("graph neural networks", Some(3), Some(11)).validate(&config).is_err());
    }

    #[test]
    fn test_apply_to_config() {
        let mut config = Config::default();
        let mut run = args("gnn survey", None, None);
        run.critic = true;
        run.no_thoughts = true;
        run.output_dir = Some("reports".to_string());
        run.persona = Some("formalist".to_string());
        run.apply_to(&mut config);
        assert_eq!(config.analyst_persona.as_deref(), Some("formalist"));

        assert!(config.critic_enabled);
        assert!(!config.thoughts_enabled);
        assert_eq!(config.output_dir, "reports");
        assert_eq!(run.num_papers(&config), 3);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&Ok(RunOutcome::NoPapers)), 3);
        assert_eq!(exit_code_for(&Ok(RunOutcome::NoSummaries { processed: 2 })), 4);
        assert_eq!(exit_code_for(&Ok(RunOutcome::Cancelled)), 130);
        assert_eq!(
            exit_code_for(&Err(AppError::Fetch(FetchError::Parse("x".to_string())))),
            3
        );
        assert_eq!(
            exit_code_for(&Err(AppError::Config(ConfigError::InvalidValue {
                field: "x",
                message: "y".to_string()
            }))),
            1
        );
    }
}
