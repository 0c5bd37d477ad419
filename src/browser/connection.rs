use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::AppError;

/// 连接到远程浏览器（CDP 调试地址）
pub async fn connect_to_browser(browser_url: &str) -> Result<Browser, AppError> {
    info!("正在连接到远程浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::Browser(format!("连接 {} 失败: {}", browser_url, e))
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await.map_err(|e| AppError::Browser(e.to_string()))?;
    debug!("远程浏览器已有 {} 个标签页", pages.len());

    Ok(browser)
}
