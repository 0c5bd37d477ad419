//! Agent thoughts 写入服务 - 业务能力层
//!
//! 只负责"记录各阶段的思考过程"能力，不关心流程。
//! 多个任务共享同一个文件，写入由互斥锁串行化。

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// thoughts 文件名
pub const THOUGHTS_FILE_NAME: &str = "thoughts.txt";

/// 思考记录的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThoughtKind {
    Step,
    Analyze,
    Decide,
    Insight,
    Success,
    Error,
}

impl fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThoughtKind::Step => "STEP",
            ThoughtKind::Analyze => "ANALYZE",
            ThoughtKind::Decide => "DECIDE",
            ThoughtKind::Insight => "INSIGHT",
            ThoughtKind::Success => "SUCCESS",
            ThoughtKind::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// thoughts 写入服务
///
/// 职责：
/// - 追加 `[时间] [agent] KIND: 内容` 行到 thoughts 文件
/// - 可选地同步输出到终端
/// - 禁用时所有写入都是空操作
#[derive(Clone, Default)]
pub struct ThoughtWriter {
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
    echo: bool,
}

impl ThoughtWriter {
    /// 不记录任何内容
    pub fn disabled() -> Self {
        Self::default()
    }

    /// 在 `log_dir` 下打开（追加）thoughts 文件
    pub fn open(log_dir: &Path, echo: bool) -> std::io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        Self::with_path(log_dir.join(THOUGHTS_FILE_NAME), echo)
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<PathBuf>, echo: bool) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("thoughts 文件: {}", path.display());
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            path: Some(path),
            echo,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 写入一条记录；写入失败只记警告
    pub fn write(&self, agent: &str, kind: ThoughtKind, message: &str) {
        let Some(file) = &self.file else {
            return;
        };

        let line = format_thought(
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            agent,
            kind,
            message,
        );

        match file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
                    warn!("写入 thoughts 失败: {}", e);
                }
            }
            Err(_) => warn!("thoughts 文件锁已损坏，跳过: {}", line),
        }

        if self.echo {
            println!("[{} | {}] {}", agent, kind, message);
        }
    }
}

fn format_thought(timestamp: &str, agent: &str, kind: ThoughtKind, message: &str) -> String {
    // 保证一条记录只占一行
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("[{}] [{}] {}: {}", timestamp, agent, kind, message)
}
