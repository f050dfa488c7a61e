//! 事件去重器 - 防止重连边界上的 frame 被重复摄入
//!
//! broker 在重连后可能重放最近的通知。去重器按事件身份键
//! 记录最近摄入时间，窗口内的重复事件被丢弃。
//! 窗口过期后同一事件可以再次摄入（VM 反复变更状态是正常的）。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// 事件去重器
pub struct EventDeduplicator {
    /// 最近摄入的事件: dedup_key -> 摄入时间
    recent: HashMap<String, Instant>,
    /// 去重窗口
    window: Duration,
}

impl EventDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            recent: HashMap::new(),
            window,
        }
    }

    /// 检查事件是否应该摄入
    ///
    /// 返回 `true` 表示摄入并记录，`false` 表示窗口内重复、应丢弃。
    pub fn should_append(&mut self, key: &str) -> bool {
        let now = Instant::now();
        self.recent
            .retain(|_, seen| now.duration_since(*seen) < self.window);

        if self.recent.contains_key(key) {
            debug!(key, "Duplicate event within window, dropping");
            return false;
        }
        self.recent.insert(key.to_string(), now);
        true
    }
}
