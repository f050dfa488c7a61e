//! VM API 绑定 - /vms 端点的类型化请求与响应
//!
//! 列表分页参数与服务端约定：`page` / `tags`（逗号分隔）/ `size` /
//! `order-param`（如 `name-asc`）。

use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::network::Network;

/// VM 列表查询参数
#[derive(Debug, Clone)]
pub struct VmListQuery {
    pub page: u32,
    pub tags: Vec<String>,
    pub size: u32,
    pub order_param: String,
}

impl Default for VmListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            tags: Vec::new(),
            size: 5,
            order_param: "name-asc".to_string(),
        }
    }
}

impl VmListQuery {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("page", self.page.to_string()),
            ("size", self.size.to_string()),
            ("order-param", self.order_param.clone()),
        ];
        if !self.tags.is_empty() {
            query.push(("tags", self.tags.join(",")));
        }
        query
    }
}

/// VM 列表页
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmPage {
    pub page_number: u32,
    pub total_pages: u32,
    pub page_contents: Vec<VmListItem>,
}

/// VM 列表项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmListItem {
    pub vm_id: i64,
    pub vm_name: String,
    pub tags: Vec<String>,
    pub private_ip: String,
}

/// VM 详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmDetail {
    pub vm_id: i64,
    pub vm_name: String,
    pub vm_status: String,
    pub description: String,
    pub v_cpu: u32,
    pub memory: u32,
    pub storage: u32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub private_ip: String,
    pub create_at: String,
    pub update_at: Option<String>,
    pub networks: Vec<Network>,
    pub tags: Vec<TagRef>,
}

/// VM 详情里的 tag 引用
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRef {
    pub tag_id: i64,
    pub tag_name: String,
}

/// 名称查重结果（服务端字段首字母大写）
#[derive(Debug, Clone, Deserialize)]
pub struct NameCheck {
    #[serde(rename = "IsDuplicate")]
    pub is_duplicate: bool,
}

/// 创建 VM 请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmRequest {
    pub name: String,
    pub description: String,
    pub v_cpu: u32,
    pub memory: u32,
    pub storage: u32,
    pub network_ids: Vec<i64>,
    pub tag_ids: Vec<String>,
}

/// 更新 VM 请求（storage 不可变更）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVmRequest {
    pub name: String,
    pub description: String,
    pub v_cpu: u32,
    pub memory: u32,
    pub network_ids: Vec<i64>,
    pub tag_ids: Vec<String>,
}

/// 查询 VM 列表页
pub async fn fetch_vms(client: &ApiClient, query: &VmListQuery) -> Result<VmPage> {
    let builder = client.request(Method::GET, "/vms").query(&query.to_query());
    client.send(builder).await
}

/// 查询 VM 详情
pub async fn fetch_vm_detail(client: &ApiClient, vm_id: i64) -> Result<VmDetail> {
    let builder = client.request(Method::GET, &format!("/vms/{vm_id}"));
    client.send(builder).await
}

/// 创建 VM，返回新 VM 的 id
pub async fn create_vm(client: &ApiClient, request: &CreateVmRequest) -> Result<i64> {
    let builder = client.request(Method::POST, "/vms").json(request);
    client.send(builder).await
}

/// 更新 VM
pub async fn update_vm(client: &ApiClient, vm_id: i64, request: &UpdateVmRequest) -> Result<()> {
    let builder = client
        .request(Method::PATCH, &format!("/vms/{vm_id}"))
        .json(request);
    client.send_empty(builder).await
}

/// 删除 VM
pub async fn delete_vm(client: &ApiClient, vm_id: i64) -> Result<()> {
    let builder = client.request(Method::DELETE, &format!("/vms/{vm_id}"));
    client.send_empty(builder).await
}

/// 名称查重（vm_id 用于更新时排除自身）
pub async fn is_duplicate_vm_name(client: &ApiClient, name: &str, vm_id: i64) -> Result<bool> {
    let builder = client.request(Method::GET, "/vms/check").query(&[
        ("vm-name", name.to_string()),
        ("vm-id", vm_id.to_string()),
    ]);
    let check: NameCheck = client.send(builder).await?;
    Ok(check.is_duplicate)
}
