//! VM Console CLI
//!
//! 订阅 VM 实时通知，查询/管理 VM、Tag 和 Network

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use vm_console::api::{self, ApiClient, VmListQuery};
use vm_console::config::{ApiConfig, NotifyConfig};
use vm_console::notification::{ConnectOutcome, NotificationChannel};

#[derive(Parser)]
#[command(name = "vmc")]
#[command(about = "VM Console - VM 管理控制台客户端")]
#[command(version)]
struct Cli {
    /// 服务端 base URL（覆盖 VMC_BASE_URL）
    #[arg(long, global = true)]
    url: Option<String>,
    /// member id（覆盖 VMC_MEMBER_ID）
    #[arg(long, global = true)]
    member_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 订阅实时通知并持续输出
    Watch {
        /// 额外订阅广播 topic (/topic/messages)
        #[arg(long)]
        broadcast: bool,
        /// 断开后自动重连（固定 5 秒间隔）
        #[arg(long)]
        reconnect: bool,
    },
    /// VM 操作
    Vms {
        #[command(subcommand)]
        command: VmsCommand,
    },
    /// Tag 操作
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },
    /// 列出所有网络
    Networks {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum VmsCommand {
    /// 分页列出 VM
    List {
        /// 页码
        #[arg(long, default_value = "1")]
        page: u32,
        /// 按 tag 过滤（逗号分隔）
        #[arg(long)]
        tags: Option<String>,
        /// 每页条数
        #[arg(long, default_value = "5")]
        size: u32,
        /// 排序参数（如 name-asc）
        #[arg(long, default_value = "name-asc")]
        order: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查询 VM 详情
    Info {
        /// VM id
        vm_id: i64,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 检查 VM 名称是否重复
    Check {
        /// 待检查的名称
        name: String,
        /// 更新场景下排除自身的 VM id
        #[arg(long, default_value = "0")]
        vm_id: i64,
    },
    /// 删除 VM
    Delete {
        /// VM id
        vm_id: i64,
    },
}

#[derive(Subcommand)]
enum TagsCommand {
    /// 列出所有 tag
    List {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 创建 tag
    Add {
        /// tag 名称
        name: String,
    },
    /// 重命名 tag
    Rename {
        /// tag id
        id: i64,
        /// 新名称
        name: String,
    },
    /// 删除 tag
    Delete {
        /// tag id
        id: i64,
    },
    /// 校验 tag 名是否可用
    Validate {
        /// 待校验的名称
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，默认 info
    // 例如: RUST_LOG=vm_console=debug vmc watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vm_console=info,vmc=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(member_id) = cli.member_id {
        config.member_id = member_id;
    }

    match cli.command {
        Commands::Watch {
            broadcast,
            reconnect,
        } => {
            let notify_config = NotifyConfig::default()
                .with_broadcast(broadcast)
                .with_reconnect(reconnect);
            watch(&config, notify_config).await?;
        }
        Commands::Vms { command } => {
            let client = ApiClient::new(&config)?;
            handle_vms(&client, command).await?;
        }
        Commands::Tags { command } => {
            let client = ApiClient::new(&config)?;
            handle_tags(&client, command).await?;
        }
        Commands::Networks { json } => {
            let client = ApiClient::new(&config)?;
            let networks = api::network::fetch_networks(&client).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&networks)?);
            } else {
                println!("发现 {} 个网络:\n", networks.len());
                for network in networks {
                    println!(
                        "  ID: {} | IP: {} | 端口: {}",
                        network.network_id, network.open_ip, network.open_port
                    );
                }
            }
        }
    }

    Ok(())
}

/// 订阅通知并持续输出，Ctrl-C 退出
async fn watch(config: &ApiConfig, notify_config: NotifyConfig) -> Result<()> {
    let channel =
        NotificationChannel::new(config.member_id.clone(), &config.base_url, notify_config)?;

    match channel.connect().await {
        ConnectOutcome::Connected => {}
        other => {
            // 失败详情已记入日志，按设计不作为错误向上传播
            eprintln!("通知通道连接失败 ({other:?})，请检查服务端地址");
            return Ok(());
        }
    }

    println!("已连接 (memberId={})，等待通知... Ctrl-C 退出", channel.member_id());

    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if channel.take_new_event() {
                    let events = channel.notifications();
                    for event in events.iter().skip(printed) {
                        println!(
                            "[{}] {}",
                            event.received_at.format("%H:%M:%S"),
                            event.describe()
                        );
                    }
                    printed = events.len();
                }
            }
        }
    }

    channel.disconnect();
    println!("已断开");
    Ok(())
}

async fn handle_vms(client: &ApiClient, command: VmsCommand) -> Result<()> {
    match command {
        VmsCommand::List {
            page,
            tags,
            size,
            order,
            json,
        } => {
            let query = VmListQuery {
                page,
                tags: tags
                    .map(|t| t.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                size,
                order_param: order,
            };
            let result = api::vm::fetch_vms(client, &query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "第 {}/{} 页，共 {} 条:\n",
                    result.page_number,
                    result.total_pages,
                    result.page_contents.len()
                );
                for vm in result.page_contents {
                    println!(
                        "  ID: {} | 名称: {} | IP: {} | tags: {}",
                        vm.vm_id,
                        vm.vm_name,
                        vm.private_ip,
                        vm.tags.join(",")
                    );
                }
            }
        }
        VmsCommand::Info { vm_id, json } => {
            let detail = api::vm::fetch_vm_detail(client, vm_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                println!("VM 详情:");
                println!("  ID: {}", detail.vm_id);
                println!("  名称: {}", detail.vm_name);
                println!("  状态: {}", detail.vm_status);
                println!("  vCPU: {} | 内存: {}G | 存储: {}G", detail.v_cpu, detail.memory, detail.storage);
                println!("  CPU 使用率: {:.1}% | 内存使用率: {:.1}%", detail.cpu_usage, detail.memory_usage);
                println!("  IP: {}", detail.private_ip);
            }
        }
        VmsCommand::Check { name, vm_id } => {
            let duplicate = api::vm::is_duplicate_vm_name(client, &name, vm_id).await?;
            if duplicate {
                println!("名称 \"{name}\" 已被占用");
            } else {
                println!("名称 \"{name}\" 可用");
            }
        }
        VmsCommand::Delete { vm_id } => {
            api::vm::delete_vm(client, vm_id).await?;
            println!("已删除 VM {vm_id}");
        }
    }
    Ok(())
}

async fn handle_tags(client: &ApiClient, command: TagsCommand) -> Result<()> {
    match command {
        TagsCommand::List { json } => {
            let tags = api::tag::get_tags(client).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                println!("发现 {} 个 tag:\n", tags.len());
                for tag in tags {
                    println!("  ID: {} | 名称: {}", tag.id, tag.tag_name);
                }
            }
        }
        TagsCommand::Add { name } => {
            let id = api::tag::post_tag(client, &name).await?;
            println!("已创建 tag {name} (id={id})");
        }
        TagsCommand::Rename { id, name } => {
            api::tag::put_tag(client, id, &name).await?;
            println!("已重命名 tag {id} -> {name}");
        }
        TagsCommand::Delete { id } => {
            api::tag::delete_tag(client, id).await?;
            println!("已删除 tag {id}");
        }
        TagsCommand::Validate { name } => {
            let available = api::tag::validate_tag_name(client, &name).await?;
            if available {
                println!("名称 \"{name}\" 可用");
            } else {
                println!("名称 \"{name}\" 不可用");
            }
        }
    }
    Ok(())
}
