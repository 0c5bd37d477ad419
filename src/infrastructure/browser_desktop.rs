//! 基于远程浏览器（CDP）的桌面会话实现
//!
//! 一个会话对应远程浏览器中的一个标签页，释放即关闭该标签页

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::browser;
use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::desktop::{DesktopProvider, DesktopSession, SessionError};
use crate::models::ImagePayload;

/// 远程浏览器桌面
///
/// 职责：
/// - 持有唯一的 Browser 连接
/// - 按需开标签页作为会话
/// - 不认识论文 / 阶段
pub struct ChromeDesktop {
    browser: Arc<Browser>,
    page_load_timeout: Duration,
    next_id: AtomicUsize,
}

impl ChromeDesktop {
    /// 连接远程浏览器；`browser_debug_url` 为空时在本地启动无头浏览器
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let browser = if config.browser_debug_url.trim().is_empty() {
            browser::launch_headless_browser(config.browser_executable.as_deref()).await?
        } else {
            browser::connect_to_browser(&config.browser_debug_url).await?
        };

        Ok(Self {
            browser: Arc::new(browser),
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
            next_id: AtomicUsize::new(1),
        })
    }
}

#[async_trait]
impl DesktopProvider for ChromeDesktop {
    async fn acquire(&self) -> Result<Box<dyn DesktopSession>, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Acquire(e.to_string()))?;

        let id = format!("tab-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!("新建标签页会话: {}", id);

        Ok(Box::new(BrowserSession {
            id,
            page,
            page_load_timeout: self.page_load_timeout,
        }))
    }
}

/// 远程浏览器中的单个标签页
pub struct BrowserSession {
    id: String,
    page: Page,
    page_load_timeout: Duration,
}

#[async_trait]
impl DesktopSession for BrowserSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        debug!("[{}] 导航到: {}", self.id, url);
        match tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(SessionError::Timeout {
                url: url.to_string(),
                secs: self.page_load_timeout.as_secs(),
            }),
        }
    }

    async fn eval(&mut self, script: &str) -> Result<JsonValue, SessionError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| SessionError::Script(e.to_string()))?;
        result
            .into_value::<JsonValue>()
            .map_err(|e| SessionError::Script(e.to_string()))
    }

    async fn capture_screen(&mut self) -> Result<Vec<u8>, SessionError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))
    }

    async fn capture_elements(
        &mut self,
        selector: &str,
        caption_selector: &str,
        limit: usize,
    ) -> Result<Vec<ImagePayload>, SessionError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))?;

        let mut images = Vec::new();
        for (index, element) in elements.iter().take(limit).enumerate() {
            let data = match element.screenshot(CaptureScreenshotFormat::Png).await {
                Ok(data) => data,
                Err(e) => {
                    debug!("[{}] 元素 {} 截图失败: {}", self.id, index + 1, e);
                    continue;
                }
            };

            let caption = match element.find_element(caption_selector).await {
                Ok(caption) => caption.inner_text().await.ok().flatten(),
                Err(_) => None,
            };
            let label = caption
                .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| format!("Figure {}", index + 1));

            images.push(ImagePayload {
                label,
                media_type: "image/png".to_string(),
                data,
            });
        }
        Ok(images)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| SessionError::Release(e.to_string()))
    }
}
