//! STOMP frame 编解码 - 客户端侧最小实现
//!
//! 只覆盖通知订阅会话用到的 frame：
//! - 客户端发出 CONNECT / SUBSCRIBE / DISCONNECT
//! - broker 发回 CONNECTED / MESSAGE / RECEIPT / ERROR
//!
//! frame 格式：命令行 + 头部行（`key:value`）+ 空行 + body + NUL。
//! 单独一个 LF 是心跳，不构成 frame。解析永不 panic，
//! 坏数据返回 Err 由调用方丢弃。

use anyhow::{anyhow, bail, Result};

/// STOMP 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => bail!("unknown STOMP command: {other}"),
        })
    }
}

/// 一个 STOMP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// 判断一段原始文本是否为心跳（空 frame 或单独的换行）
pub fn is_heartbeat(raw: &str) -> bool {
    raw.trim_end_matches('\0')
        .trim_matches(&['\r', '\n'][..])
        .is_empty()
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame，携带 memberId 鉴权头和心跳协商
    pub fn connect(host: &str, member_id: &str, heartbeat_ms: u64) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"))
            .with_header("memberId", member_id)
    }

    /// SUBSCRIBE frame
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// DISCONNECT frame
    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// 查找头部（取第一个匹配项，与 STOMP 规范一致）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 消息目的地（MESSAGE frame 的 destination 头）
    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    /// 序列化为线上格式
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// 从原始文本解析 frame
    ///
    /// 心跳不是 frame，调用方应先用 [`is_heartbeat`] 过滤。
    pub fn parse(raw: &str) -> Result<Frame> {
        let raw = raw.trim_end_matches('\0');
        let (head, body) = raw
            .split_once("\n\n")
            .or_else(|| raw.split_once("\r\n\r\n"))
            .ok_or_else(|| anyhow!("STOMP frame missing header/body separator"))?;

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| anyhow!("empty STOMP frame"))?
            .trim_end_matches('\r');
        let command = Command::from_str(command_line)?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("malformed STOMP header: {line}"))?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}
