//! 报告写入服务 - 业务能力层
//!
//! 只负责"把编译好的报告写到输出目录"能力

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::OutputError;

pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 写入报告（覆盖同名文件），返回完整路径
    pub fn write(&self, file_name: &str, content: &str) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| OutputError::WriteFailed {
            path: self.output_dir.display().to_string(),
            source: e,
        })?;

        let path = self.output_dir.join(file_name);
        fs::write(&path, content).map_err(|e| OutputError::WriteFailed {
            path: path.display().to_string(),
            source: e,
        })?;

        info!("📝 报告已写入: {}", path.display());
        Ok(path)
    }
}
