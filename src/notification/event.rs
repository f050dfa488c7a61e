//! 通知事件结构 - 定义 broker 推送的 VM 状态变更事件
//!
//! 线上出现过两种事件 schema：
//! - 规范版：`vmId` / `type` / `prevVmState` / `currentVmState`
//! - 旧版：`entityId` / `notificationType` / `message`
//!
//! 本模块以规范版为准，旧版字段通过 serde alias 兼容解析。
//! 两种 id 字段都缺失的 frame 视为格式错误，由摄入协议丢弃。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条通知事件，对应 broker 推送的一个 frame body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// 事件关联的 VM id
    #[serde(alias = "entityId")]
    pub vm_id: i64,
    /// 事件类型（如 STATE_CHANGE）
    #[serde(rename = "type", alias = "notificationType")]
    pub kind: String,
    /// 本地接收时间 - 不在 wire 上，解析时填充
    #[serde(skip_serializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    /// 事件内容（状态对或自由文本，按事件类型取舍）
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// 事件内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// 变更前的 VM 状态
    #[serde(default, alias = "prevState", skip_serializing_if = "Option::is_none")]
    pub prev_vm_state: Option<String>,
    /// 变更后的 VM 状态
    #[serde(default, alias = "currentState", skip_serializing_if = "Option::is_none")]
    pub current_vm_state: Option<String>,
    /// 自由文本消息（旧版 schema）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NotificationEvent {
    /// 解析一个 frame body
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// 去重键 - 覆盖事件的全部身份字段
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.vm_id,
            self.kind,
            self.payload.prev_vm_state.as_deref().unwrap_or(""),
            self.payload.current_vm_state.as_deref().unwrap_or(""),
            self.payload.message.as_deref().unwrap_or(""),
        )
    }

    /// 单行摘要，用于 CLI 输出
    pub fn describe(&self) -> String {
        match (
            self.payload.prev_vm_state.as_deref(),
            self.payload.current_vm_state.as_deref(),
        ) {
            (Some(prev), Some(curr)) => {
                format!("VM {} [{}] {} -> {}", self.vm_id, self.kind, prev, curr)
            }
            (None, Some(curr)) => format!("VM {} [{}] -> {}", self.vm_id, self.kind, curr),
            _ => format!(
                "VM {} [{}] {}",
                self.vm_id,
                self.kind,
                self.payload.message.as_deref().unwrap_or("")
            ),
        }
    }
}
