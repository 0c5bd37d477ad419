//! 远程桌面会话抽象
//!
//! 会话生命周期：acquire → navigate / eval / capture → release。
//! `SessionLease` 保证每个取得的会话恰好释放一次。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ImagePayload;

/// 会话错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("无法取得远程会话: {0}")]
    Acquire(String),
    #[error("导航到 {url} 失败: {message}")]
    Navigation { url: String, message: String },
    #[error("导航到 {url} 超时 ({secs} 秒)")]
    Timeout { url: String, secs: u64 },
    #[error("执行脚本失败: {0}")]
    Script(String),
    #[error("截图失败: {0}")]
    Capture(String),
    #[error("释放会话失败: {0}")]
    Release(String),
    #[error("会话已释放")]
    Released,
}

/// 单个远程桌面会话
#[async_trait]
pub trait DesktopSession: Send {
    /// 会话标识（仅用于日志）
    fn session_id(&self) -> &str;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// 在当前页面执行脚本并返回 JSON 结果
    async fn eval(&mut self, script: &str) -> Result<JsonValue, SessionError>;

    /// 截取当前可见区域（PNG）
    async fn capture_screen(&mut self) -> Result<Vec<u8>, SessionError>;

    /// 截取匹配 `selector` 的元素（最多 `limit` 个），标签取自元素内的 `caption_selector`
    async fn capture_elements(
        &mut self,
        selector: &str,
        caption_selector: &str,
        limit: usize,
    ) -> Result<Vec<ImagePayload>, SessionError>;

    /// 关闭远程会话
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// 远程桌面会话的提供方
#[async_trait]
pub trait DesktopProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn DesktopSession>, SessionError>;

    async fn release(&self, mut session: Box<dyn DesktopSession>) -> Result<(), SessionError> {
        session.close().await
    }
}

/// 会话租约
///
/// - 正常路径：调用 `release().await`
/// - 任务被中止或 panic：`Drop` 在后台释放
pub struct SessionLease {
    provider: Arc<dyn DesktopProvider>,
    session: Option<Box<dyn DesktopSession>>,
}

impl SessionLease {
    pub async fn acquire(provider: Arc<dyn DesktopProvider>) -> Result<Self, SessionError> {
        let session = provider.acquire().await?;
        debug!("取得远程会话: {}", session.session_id());
        Ok(Self {
            provider,
            session: Some(session),
        })
    }

    pub fn session_mut(&mut self) -> Result<&mut (dyn DesktopSession + 'static), SessionError> {
        self.session.as_deref_mut().ok_or(SessionError::Released)
    }

    /// 释放会话
    pub async fn release(mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(session) => {
                let id = session.session_id().to_string();
                let result = self.provider.release(session).await;
                debug!("远程会话已释放: {}", id);
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let provider = self.provider.clone();
        let id = session.session_id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("会话 {} 未显式释放，转入后台释放", id);
                handle.spawn(async move {
                    if let Err(e) = provider.release(session).await {
                        warn!("后台释放会话 {} 失败: {}", id, e);
                    }
                });
            }
            Err(_) => warn!("会话 {} 无法释放：没有可用的运行时", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    struct CountingProvider(Arc<Counter>);

    struct NoopSession;

    #[async_trait]
    impl DesktopSession for NoopSession {
        fn session_id(&self) -> &str {
            "noop"
        }
        async fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
            Ok(())
        }
        async fn eval(&mut self, _script: &str) -> Result<JsonValue, SessionError> {
            Ok(JsonValue::Null)
        }
        async fn capture_screen(&mut self) -> Result<Vec<u8>, SessionError> {
            Ok(Vec::new())
        }
        async fn capture_elements(
            &mut self,
            _selector: &str,
            _caption_selector: &str,
            _limit: usize,
        ) -> Result<Vec<ImagePayload>, SessionError> {
            Ok(Vec::new())
        }
        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[async_trait]
    impl DesktopProvider for CountingProvider {
        async fn acquire(&self) -> Result<Box<dyn DesktopSession>, SessionError> {
            self.0.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopSession))
        }

        async fn release(&self, _session: Box<dyn DesktopSession>) -> Result<(), SessionError> {
            self.0.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_explicit_release_happens_once() {
        let counter = Arc::new(Counter::default());
        let provider: Arc<dyn DesktopProvider> = Arc::new(CountingProvider(counter.clone()));

        let mut lease = SessionLease::acquire(provider).await.unwrap();
        assert!(lease.session_mut().is_ok());
        lease.release().await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(counter.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(counter.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_lease_is_released_in_background() {
        let counter = Arc::new(Counter::default());
        let provider: Arc<dyn DesktopProvider> = Arc::new(CountingProvider(counter.clone()));

        let lease = SessionLease::acquire(provider).await.unwrap();
        drop(lease);

        for _ in 0..50 {
            if counter.released.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.released.load(Ordering::SeqCst), 1);
    }
}
