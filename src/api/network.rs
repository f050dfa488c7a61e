//! Network API 绑定 - /networks 端点

use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;

/// 一个可挂载的网络
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub network_id: i64,
    pub open_ip: String,
    pub open_port: u16,
}

/// 查询全部网络
pub async fn fetch_networks(client: &ApiClient) -> Result<Vec<Network>> {
    let builder = client.request(Method::GET, "/networks");
    client.send(builder).await
}
