//! 传输层抽象 - WebSocket 连接的可注入工厂
//!
//! 通道不直接持有 tokio-tungstenite 类型，而是通过 [`Connector`]
//! 工厂拿到一个 `Box<dyn Transport>`。生产环境用 [`default_connector`]
//! 真实拨号；测试注入 [`memory_pair`] 构造的内存传输，
//! 不起网络就能驱动完整的会话生命周期。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 一条已建立的双向文本传输
#[async_trait]
pub trait Transport: Send {
    /// 发送一段文本（一个 frame 或心跳）
    async fn send(&mut self, text: String) -> Result<()>;
    /// 接收下一段文本；`None` 表示对端关闭
    async fn recv(&mut self) -> Option<Result<String>>;
    /// 请求关闭连接（尽力而为）
    async fn close(&mut self) -> Result<()>;
}

pub type BoxTransport = Box<dyn Transport>;

/// 传输工厂 - 每次调用建立一条新连接
pub type Connector = Arc<dyn Fn(Url) -> BoxFuture<'static, Result<BoxTransport>> + Send + Sync>;

/// 构造通知订阅地址：`{base}/noti?memberId={id}`
///
/// WebSocket 传输只接受 ws(s) scheme，http(s) 在这里重写。
pub fn notification_url(base_url: &str, member_id: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).with_context(|| format!("invalid base url: {base_url}"))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" => "ws",
        "wss" => "wss",
        other => bail!("unsupported url scheme: {other}"),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot rewrite scheme for {base_url}"))?;

    let path = format!("{}/noti", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut().append_pair("memberId", member_id);
    Ok(url)
}

/// 基于 tokio-tungstenite 的真实 WebSocket 传输
struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .context("websocket send failed")
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes).context("non-utf8 binary websocket message"),
                    )
                }
                // tungstenite 在读写时自动回复 Pong
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(anyhow!(e).context("websocket recv failed"))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close(None).await.context("websocket close failed")
    }
}

/// 默认工厂：真实拨号 tokio-tungstenite
pub fn default_connector() -> Connector {
    Arc::new(|url: Url| {
        Box::pin(async move {
            let (stream, _response) = connect_async(url.as_str())
                .await
                .with_context(|| format!("websocket connect failed: {url}"))?;
            Ok(Box::new(WsTransport { inner: stream }) as BoxTransport)
        })
    })
}

/// 内存传输 - 客户端侧
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// 内存传输 - 对端（测试里扮演 broker）
pub struct MemoryRemote {
    pub tx: mpsc::UnboundedSender<String>,
    pub rx: mpsc::UnboundedReceiver<String>,
}

/// 建一对内存传输，返回（客户端侧，broker 侧）
pub fn memory_pair() -> (BoxTransport, MemoryRemote) {
    let (client_tx, remote_rx) = mpsc::unbounded_channel();
    let (remote_tx, client_rx) = mpsc::unbounded_channel();
    (
        Box::new(MemoryTransport {
            tx: client_tx,
            rx: client_rx,
        }),
        MemoryRemote {
            tx: remote_tx,
            rx: remote_rx,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| anyhow!("memory transport peer gone"))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}
