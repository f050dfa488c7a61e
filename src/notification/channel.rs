//! 通知通道 - 一条实时通知订阅会话的完整生命周期
//!
//! 连接、STOMP 握手、订阅、摄入、断开、可选重连都由本模块管理。
//! 通道显式构造、按需用 `Arc` 共享（不做模块级单例），
//! 事件列表以快照 + 版本号的方式暴露给调用方。
//!
//! 错误处理约定：任何失败都降级为"没有新通知"，不向调用方抛出
//! 未处理异常。连接失败记日志并置 `Failed`，坏 frame 记日志并丢弃，
//! 重复 connect / disconnect 是良性 no-op。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

use super::deduplicator::EventDeduplicator;
use super::event::NotificationEvent;
use super::stomp::{self, Command, Frame};
use super::transport::{default_connector, notification_url, BoxTransport, Connector, Transport};
use crate::config::NotifyConfig;

/// 用户私有队列
pub const USER_QUEUE: &str = "/user/queue/notifications";
/// 广播 topic
pub const BROADCAST_TOPIC: &str = "/topic/messages";

/// STOMP 握手超时
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// connect 的类型化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// 握手成功，订阅已建立
    Connected,
    /// 通道已在连接中/已连接，本次调用为 no-op
    AlreadyActive,
    /// 拨号或握手失败，详情见日志
    Failed,
}

/// 会话任务与外部调用方共享的状态
struct Shared {
    state: Mutex<ConnectionState>,
    events: Mutex<Vec<NotificationEvent>>,
    version: AtomicU64,
    new_event: AtomicBool,
}

impl Shared {
    fn push(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
        self.version.fetch_add(1, Ordering::SeqCst);
        self.new_event.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }
}

/// 通知通道 - 每个用户身份一条会话
pub struct NotificationChannel {
    member_id: String,
    endpoint: Url,
    config: NotifyConfig,
    connector: Connector,
    shared: Arc<Shared>,
    /// 活跃会话的关停信号；会话任务 detach 运行
    session: Mutex<Option<watch::Sender<bool>>>,
}

impl NotificationChannel {
    /// 创建通道（不发起连接）
    ///
    /// `base_url` 可以是 http(s) 或 ws(s) scheme，内部统一重写。
    pub fn new(
        member_id: impl Into<String>,
        base_url: &str,
        config: NotifyConfig,
    ) -> Result<Self> {
        let member_id = member_id.into();
        if member_id.trim().is_empty() {
            bail!("member id must not be empty");
        }
        let endpoint = notification_url(base_url, &member_id)?;
        Ok(Self {
            member_id,
            endpoint,
            config,
            connector: default_connector(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                events: Mutex::new(Vec::new()),
                version: AtomicU64::new(0),
                new_event: AtomicBool::new(false),
            }),
            session: Mutex::new(None),
        })
    }

    /// 替换传输工厂（测试注入内存传输用）
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    /// 建立连接并订阅
    ///
    /// 已在连接中/已连接时幂等返回 [`ConnectOutcome::AlreadyActive`]，
    /// 不会产生第二条传输或重复订阅。失败不抛错，
    /// 记诊断日志并返回 [`ConnectOutcome::Failed`]。
    pub async fn connect(&self) -> ConnectOutcome {
        {
            let mut state = self.shared.state.lock().unwrap();
            match *state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    warn!(
                        member_id = %self.member_id,
                        "Notification channel already active, ignoring connect"
                    );
                    return ConnectOutcome::AlreadyActive;
                }
                _ => *state = ConnectionState::Connecting,
            }
        }

        match establish(&self.connector, &self.endpoint, &self.member_id, &self.config).await {
            Ok(transport) => {
                self.shared.set_state(ConnectionState::Connected);
                info!(member_id = %self.member_id, "Notification channel connected");

                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                tokio::spawn(run_session(
                    self.shared.clone(),
                    transport,
                    self.config.clone(),
                    self.connector.clone(),
                    self.endpoint.clone(),
                    self.member_id.clone(),
                    shutdown_rx,
                ));
                // 上一条会话（若有）已经结束，直接替换关停信号
                *self.session.lock().unwrap() = Some(shutdown_tx);
                ConnectOutcome::Connected
            }
            Err(e) => {
                warn!(
                    member_id = %self.member_id,
                    error = %e,
                    "Notification channel connect failed"
                );
                self.shared.set_state(ConnectionState::Failed);
                ConnectOutcome::Failed
            }
        }
    }

    /// 断开连接
    ///
    /// 已断开时为良性 no-op。DISCONNECT frame 和传输关闭由会话任务
    /// 尽力而为地完成，调用方不等待。事件列表不清空。
    pub fn disconnect(&self) {
        let mut session = self.session.lock().unwrap();
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state == ConnectionState::Disconnected {
                debug!("Notification channel already disconnected");
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        if let Some(shutdown) = session.take() {
            let _ = shutdown.send(true);
        }
        info!(member_id = %self.member_id, "Notification channel disconnected");
    }

    /// 当前事件列表快照（按到达顺序）
    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.shared.events.lock().unwrap().clone()
    }

    /// 列表版本号 - 每次变更递增，调用方据此判断快照是否过期
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// 消费型"有新事件"标记
    ///
    /// 边沿触发：读取即复位，连续到达的多条事件合并为一次 `true`。
    pub fn take_new_event(&self) -> bool {
        self.shared.new_event.swap(false, Ordering::SeqCst)
    }

    /// 移除指定 VM 的全部事件，其余事件保持相对顺序
    pub fn remove_notification(&self, vm_id: i64) {
        let mut events = self.shared.events.lock().unwrap();
        let before = events.len();
        events.retain(|event| event.vm_id != vm_id);
        if events.len() != before {
            self.shared.version.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 清空事件列表
    pub fn clear_notifications(&self) {
        let mut events = self.shared.events.lock().unwrap();
        if !events.is_empty() {
            events.clear();
            self.shared.version.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 拨号 + STOMP 握手 + 订阅，返回可服务的传输
async fn establish(
    connector: &Connector,
    endpoint: &Url,
    member_id: &str,
    config: &NotifyConfig,
) -> Result<BoxTransport> {
    let mut transport = (connector.as_ref())(endpoint.clone()).await?;

    let host = endpoint.host_str().unwrap_or("localhost").to_string();
    let heartbeat_ms = config.heartbeat.as_millis() as u64;
    transport
        .send(Frame::connect(&host, member_id, heartbeat_ms).serialize())
        .await
        .context("failed to send CONNECT")?;

    let connected = tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_connected(transport.as_mut()))
        .await
        .context("handshake timed out")??;
    debug!(
        user = connected.header("user-name").unwrap_or("anonymous"),
        "STOMP connected"
    );

    transport
        .send(Frame::subscribe("sub-0", USER_QUEUE).serialize())
        .await
        .context("failed to subscribe user queue")?;
    if config.broadcast {
        transport
            .send(Frame::subscribe("sub-1", BROADCAST_TOPIC).serialize())
            .await
            .context("failed to subscribe broadcast topic")?;
    }
    Ok(transport)
}

/// 等待 broker 的 CONNECTED frame
async fn wait_connected(transport: &mut dyn Transport) -> Result<Frame> {
    loop {
        let raw = match transport.recv().await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return Err(e.context("transport error during handshake")),
            None => bail!("transport closed during handshake"),
        };
        if stomp::is_heartbeat(&raw) {
            continue;
        }
        let frame = Frame::parse(&raw)?;
        match frame.command {
            Command::Connected => return Ok(frame),
            Command::Error => bail!(
                "broker rejected connection: {}",
                frame.header("message").unwrap_or("unknown")
            ),
            other => debug!(command = ?other, "Ignoring frame before CONNECTED"),
        }
    }
}

/// 会话任务 - 服务一条连接直到断开，按配置重连
async fn run_session(
    shared: Arc<Shared>,
    mut transport: BoxTransport,
    config: NotifyConfig,
    connector: Connector,
    endpoint: Url,
    member_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    // 去重只在重连开启时需要：重连边界上 broker 可能重放 frame
    let mut dedup = config
        .reconnect
        .then(|| EventDeduplicator::new(config.dedup_window));

    'session: loop {
        let mut heartbeat = tokio::time::interval(config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // 服务当前连接
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    // disconnect() 触发，或通道被 drop。尽力而为地收尾。
                    let _ = transport.send(Frame::disconnect().serialize()).await;
                    let _ = transport.close().await;
                    debug!(member_id = %member_id, "Notification session torn down");
                    return;
                }
                _ = heartbeat.tick() => {
                    // 单独一个 LF 即 STOMP 心跳
                    if let Err(e) = transport.send("\n".to_string()).await {
                        debug!(error = %e, "Heartbeat send failed");
                    }
                }
                inbound = transport.recv() => {
                    match inbound {
                        Some(Ok(raw)) => ingest(&shared, &raw, dedup.as_mut()),
                        Some(Err(e)) => {
                            warn!(error = %e, "Transport error, treating connection as closed");
                            break;
                        }
                        None => {
                            debug!(member_id = %member_id, "Transport closed by peer");
                            break;
                        }
                    }
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }
        if !config.reconnect {
            let mut state = shared.state.lock().unwrap();
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Failed;
            }
            warn!(member_id = %member_id, "Notification transport lost, channel failed");
            return;
        }

        // 固定间隔重连，每次尝试用全新传输，旧的已随 break 丢弃
        shared.set_state(ConnectionState::Connecting);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(config.reconnect_delay) => {}
            }
            match establish(&connector, &endpoint, &member_id, &config).await {
                Ok(fresh) => {
                    transport = fresh;
                    shared.set_state(ConnectionState::Connected);
                    info!(member_id = %member_id, "Notification channel reconnected");
                    continue 'session;
                }
                Err(e) => {
                    warn!(member_id = %member_id, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }
}

/// 摄入协议 - 每到达一段原始文本执行一次
///
/// 坏 frame 只丢弃本条，订阅继续，会话不受影响。
fn ingest(shared: &Shared, raw: &str, dedup: Option<&mut EventDeduplicator>) {
    if stomp::is_heartbeat(raw) {
        return;
    }
    let frame = match Frame::parse(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Dropping unparseable frame");
            return;
        }
    };
    match frame.command {
        Command::Message => match NotificationEvent::parse(&frame.body) {
            Ok(event) => {
                if let Some(dedup) = dedup {
                    if !dedup.should_append(&event.dedup_key()) {
                        return;
                    }
                }
                debug!(
                    vm_id = event.vm_id,
                    kind = %event.kind,
                    destination = frame.destination().unwrap_or(""),
                    "Notification received"
                );
                shared.push(event);
            }
            Err(e) => warn!(error = %e, "Failed to parse notification JSON, dropping frame"),
        },
        Command::Error => warn!(
            message = frame.header("message").unwrap_or("unknown"),
            "Broker reported STOMP error"
        ),
        Command::Receipt => debug!(
            receipt = frame.header("receipt-id").unwrap_or(""),
            "Receipt acknowledged"
        ),
        other => debug!(command = ?other, "Ignoring unexpected frame"),
    }
}
