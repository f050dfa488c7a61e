//! Tag API 绑定 - /tags 端点
//!
//! 服务端的写操作参数走 query string（`POST /tags?name=`、
//! `PUT /tags/{id}?tag-name=`），不是 body。

use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::ApiClient;

/// 一个 tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub tag_name: String,
}

/// 查询全部 tag
pub async fn get_tags(client: &ApiClient) -> Result<Vec<Tag>> {
    let builder = client.request(Method::GET, "/tags");
    client.send(builder).await
}

/// 创建 tag，返回新 tag 的 id
pub async fn post_tag(client: &ApiClient, name: &str) -> Result<i64> {
    let builder = client
        .request(Method::POST, "/tags")
        .query(&[("name", name)]);
    client.send(builder).await
}

/// 重命名 tag
pub async fn put_tag(client: &ApiClient, id: i64, name: &str) -> Result<()> {
    let builder = client
        .request(Method::PUT, &format!("/tags/{id}"))
        .query(&[("tag-name", name)]);
    client.send_empty(builder).await
}

/// 删除 tag
pub async fn delete_tag(client: &ApiClient, id: i64) -> Result<()> {
    let builder = client.request(Method::DELETE, &format!("/tags/{id}"));
    client.send_empty(builder).await
}

/// 校验 tag 名是否可用
pub async fn validate_tag_name(client: &ApiClient, name: &str) -> Result<bool> {
    let builder = client
        .request(Method::GET, "/tags/validate")
        .query(&[("name", name)]);
    client.send(builder).await
}
