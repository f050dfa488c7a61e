//! VM Console - VM 管理控制台客户端
//!
//! 核心是实时通知子系统（[`notification`]）：一条 STOMP-over-WebSocket
//! 订阅会话，接收 VM 状态变更事件并维护本地通知列表。
//! [`api`] 提供 VM / Tag / Network 的 REST 绑定，用于把通知里的
//! vmId 关联回具体实体。

pub mod api;
pub mod config;
pub mod notification;

pub use api::{ApiClient, ApiEnvelope, Network, Tag, VmDetail, VmListItem, VmListQuery, VmPage};
pub use config::{ApiConfig, NotifyConfig};
pub use notification::{
    ConnectOutcome, ConnectionState, NotificationChannel, NotificationEvent,
};
