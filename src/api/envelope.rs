//! 响应 envelope - 服务端所有 REST 响应的统一包装

use serde::{Deserialize, Serialize};

/// `{ metaData, result }` 包装
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub meta_data: MetaData,
    pub result: T,
}

/// 响应元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub status_code: i32,
    pub status_message: String,
}
