//! 提取阶段 - 流程层
//!
//! 在一个远程桌面会话内完成：打开阅读页 → 读取正文 → 截取图表。
//! 会话由 `SessionLease` 持有，任何退出路径都恰好释放一次。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Stage, StageError, StageErrorKind};
use crate::infrastructure::{DesktopProvider, SessionError, SessionLease};
use crate::models::{ExtractedContent, ImagePayload, PaperDescriptor};
use crate::services::{ThoughtKind, ThoughtWriter};

const AGENT: &str = "ExtractorAgent";

/// 读取正文：优先 `<article>`，其次 `<main>`，最后整个 body
const TEXT_SCRIPT: &str = r#"(() => {
    const root = document.querySelector('article')
        || document.querySelector('main')
        || document.body;
    return root ? root.innerText : '';
})()"#;

pub struct ExtractionAgent {
    desktop: Arc<dyn DesktopProvider>,
    reading_url_template: String,
    max_figures: usize,
    thoughts: ThoughtWriter,
}

impl ExtractionAgent {
    pub fn new(
        desktop: Arc<dyn DesktopProvider>,
        reading_url_template: impl Into<String>,
        max_figures: usize,
        thoughts: ThoughtWriter,
    ) -> Self {
        Self {
            desktop,
            reading_url_template: reading_url_template.into(),
            max_figures,
            thoughts,
        }
    }

    pub async fn run(
        &self,
        paper: &PaperDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ExtractedContent, StageError> {
        let paper_id = paper.identifier.as_str();
        if cancel.is_cancelled() {
            return Err(StageError::cancelled(Stage::Extraction, paper_id));
        }

        let mut lease = SessionLease::acquire(self.desktop.clone())
            .await
            .map_err(|e| session_error(paper_id, e))?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("[{}] 提取阶段被取消，释放会话", paper_id);
                Err(StageError::cancelled(Stage::Extraction, paper_id))
            }
            result = self.extract_in_session(&mut lease, paper) => result,
        };

        if let Err(e) = lease.release().await {
            warn!("[{}] 释放会话失败: {}", paper_id, e);
        }

        result
    }

    async fn extract_in_session(
        &self,
        lease: &mut SessionLease,
        paper: &PaperDescriptor,
    ) -> Result<ExtractedContent, StageError> {
        let paper_id = paper.identifier.as_str();
        let session = lease.session_mut().map_err(|e| session_error(paper_id, e))?;

        let url = paper.reading_url(&self.reading_url_template);
        self.thoughts
            .write(AGENT, ThoughtKind::Step, &format!("Opening {} for {}", url, paper_id));
        session
            .navigate(&url)
            .await
            .map_err(|e| session_error(paper_id, e))?;

        let value = session
            .eval(TEXT_SCRIPT)
            .await
            .map_err(|e| session_error(paper_id, e))?;
        let raw_text = value.as_str().unwrap_or_default().trim().to_string();
        if raw_text.is_empty() {
            self.thoughts
                .write(AGENT, ThoughtKind::Error, &format!("No text found for {}", paper_id));
            return Err(StageError::new(
                Stage::Extraction,
                paper_id,
                StageErrorKind::EmptyText,
            ));
        }
        debug!("[{}] 读取正文 {} 字符", paper_id, raw_text.chars().count());

        let mut images = Vec::new();
        if self.max_figures > 0 {
            match session
                .capture_elements("figure", "figcaption", self.max_figures)
                .await
            {
                Ok(figures) => images = figures,
                Err(e) => warn!("[{}] 截取图表失败: {}", paper_id, e),
            }

            // 没有图表时退回到 PDF 首屏截图
            if images.is_empty() {
                match capture_locator(session, &paper.locator).await {
                    Ok(image) => images.push(image),
                    Err(e) => warn!("[{}] PDF 截图失败: {}", paper_id, e),
                }
            }
        }

        info!(
            "[{}] ✓ 提取完成: {} 字符, {} 张图片",
            paper_id,
            raw_text.chars().count(),
            images.len()
        );
        self.thoughts.write(
            AGENT,
            ThoughtKind::Success,
            &format!("Extracted {} with {} images", paper_id, images.len()),
        );

        Ok(ExtractedContent {
            source_url: url,
            raw_text,
            images,
        })
    }
}

async fn capture_locator(
    session: &mut (dyn crate::infrastructure::DesktopSession + 'static),
    locator: &str,
) -> Result<ImagePayload, SessionError> {
    session.navigate(locator).await?;
    let data = session.capture_screen().await?;
    Ok(ImagePayload {
        label: "First page".to_string(),
        media_type: "image/png".to_string(),
        data,
    })
}

fn session_error(paper_id: &str, error: SessionError) -> StageError {
    let kind = match &error {
        SessionError::Timeout { .. } => StageErrorKind::Timeout(error.to_string()),
        _ => StageErrorKind::Session(error.to_string()),
    };
    StageError::new(Stage::Extraction, paper_id, kind)
}
