//! 基础设施层
//!
//! 持有稀缺的远程资源（远程桌面会话），只暴露能力，不认识论文流程

pub mod browser_desktop;
pub mod desktop;

pub use browser_desktop::{BrowserSession, ChromeDesktop};
pub use desktop::{DesktopProvider, DesktopSession, SessionError, SessionLease};
