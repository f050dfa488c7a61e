//! API 客户端 - reqwest 封装与 envelope 解包

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::envelope::ApiEnvelope;
use crate::config::ApiConfig;

/// 请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST API 客户端
///
/// 所有请求默认携带 `memberId` 头（服务端据此路由用户数据）。
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        // HTTP 头名大小写不敏感，from_bytes 会归一化为小写
        headers.insert(
            HeaderName::from_bytes(b"memberId").context("invalid header name")?,
            config
                .member_id
                .parse()
                .context("invalid memberId header value")?,
        );
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 构造指向 `{base_url}{path}` 的请求
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    /// 发送请求并解包 `{metaData, result}` envelope，返回 result
    pub async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.context("API request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("API returned {status}");
        }
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .context("failed to decode API envelope")?;
        debug!(
            status_code = envelope.meta_data.status_code,
            message = %envelope.meta_data.status_message,
            "API response"
        );
        Ok(envelope.result)
    }

    /// 发送不关心 result 内容的请求（删除、更新等）
    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder.send().await.context("API request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("API returned {status}");
        }
        Ok(())
    }
}
