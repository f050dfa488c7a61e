//! 实时通知子系统 - VM 状态变更的 STOMP 订阅会话
//!
//! # 设计目标
//! 1. 单一会话对象：[`NotificationChannel`] 管理连接、订阅、摄入、断开的全生命周期
//! 2. 显式构造：通道由组合点创建注入，不做模块级单例，测试可并行建多个实例
//! 3. 故障降级：任何失败都退化为"没有新通知"，不向 UI 层抛未处理异常
//! 4. 可注入传输：[`transport::Connector`] 工厂隔离 tokio-tungstenite，
//!    测试用内存传输驱动完整协议
//!
//! # 使用示例
//! ```ignore
//! use vm_console::notification::NotificationChannel;
//! use vm_console::config::NotifyConfig;
//!
//! let channel = NotificationChannel::new("42", "http://localhost:8080", NotifyConfig::default())?;
//! channel.connect().await;
//! for event in channel.notifications() {
//!     println!("{}", event.describe());
//! }
//! channel.disconnect();
//! ```

pub mod channel;
pub mod deduplicator;
pub mod event;
pub mod stomp;
pub mod transport;

pub use channel::{
    ConnectOutcome, ConnectionState, NotificationChannel, BROADCAST_TOPIC, USER_QUEUE,
};
pub use deduplicator::EventDeduplicator;
pub use event::{EventPayload, NotificationEvent};
pub use transport::{default_connector, memory_pair, notification_url, Connector, Transport};
