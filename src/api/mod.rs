//! REST API 绑定 - VM / Tag / Network 端点的类型化封装
//!
//! 服务端所有响应都包在 `{metaData, result}` envelope 里，
//! [`client::ApiClient::send`] 统一解包后只把 result 交给调用方。
//! 通知核心不依赖这些端点；它们服务于把通知里的 vmId
//! 关联回 REST 拉取的 VM 实体。

pub mod client;
pub mod envelope;
pub mod network;
pub mod tag;
pub mod vm;

pub use client::ApiClient;
pub use envelope::{ApiEnvelope, MetaData};
pub use network::Network;
pub use tag::Tag;
pub use vm::{
    CreateVmRequest, UpdateVmRequest, VmDetail, VmListItem, VmListQuery, VmPage,
};
