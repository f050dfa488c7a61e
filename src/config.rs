//! 配置模块 - API 地址与通知会话选项
//!
//! base URL 读取优先级：
//! 1. CLI 参数（`--url`）
//! 2. 环境变量 `VMC_BASE_URL`
//! 3. 默认开发服务器地址

use std::time::Duration;

/// 默认开发服务器地址
pub const DEFAULT_BASE_URL: &str = "http://43.201.249.207:8080";

/// 默认 member id
pub const DEFAULT_MEMBER_ID: &str = "1";

/// REST API 配置
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// 服务端 base URL
    pub base_url: String,
    /// 请求默认携带的 memberId 头
    pub member_id: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            member_id: member_id.into(),
        }
    }

    /// 从环境变量读取配置
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("VMC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let member_id =
            std::env::var("VMC_MEMBER_ID").unwrap_or_else(|_| DEFAULT_MEMBER_ID.to_string());
        Self::new(base_url, member_id)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MEMBER_ID)
    }
}

/// 通知会话选项
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// 是否额外订阅广播 topic（/topic/messages）
    pub broadcast: bool,
    /// 传输断开后是否自动重连（默认关闭，待产品确认）
    pub reconnect: bool,
    /// 重连固定间隔
    pub reconnect_delay: Duration,
    /// 心跳间隔（双向协商值）
    pub heartbeat: Duration,
    /// 重连去重窗口
    pub dedup_window: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            broadcast: false,
            reconnect: false,
            reconnect_delay: Duration::from_millis(5000),
            heartbeat: Duration::from_millis(4000),
            dedup_window: Duration::from_millis(2000),
        }
    }
}

impl NotifyConfig {
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }
}
