//! MedRef 参考数据查询服务主程序

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medref_admin::{init_logging, MedrefConfig};
use medref_query::QueryFacade;
use medref_store::{ReferenceStore, SnapshotLoader};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// MedRef 命令行参数
#[derive(Parser, Debug)]
#[command(name = "medref-server")]
#[command(about = "ICD-10 编码、检验参考值与临床指引查询服务")]
struct Args {
    /// 配置文件路径 (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 执行单条 JSON 查询并输出响应
    Query {
        /// 请求 JSON，例如 {"op":"find_nearby","code":"E11.9"}
        request: String,
    },
    /// 从 stdin 逐行读取 JSON 请求，向 stdout 逐行输出响应
    Serve,
    /// 输出生效配置
    Config {
        /// 只输出指定路径的值，例如 store.data_dir
        #[arg(long)]
        get: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = MedrefConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    if let Command::Config { get } = &args.command {
        let rendered = match get {
            Some(path) => config.get_value(path)?.to_string(),
            None => config.to_toml()?,
        };
        println!("{}", rendered);
        return Ok(());
    }

    init_logging(&config.logging)?;
    info!("Starting MedRef server...");

    let loader = config.store.loader();
    info!("  Data directory: {}", loader.data_dir().display());
    info!("  Built-in seed: {}", config.store.use_builtin_seed);

    let store = ReferenceStore::open(&loader).context("Failed to open reference store")?;
    let facade = QueryFacade::with_settings(store.clone(), config.query.limits(), config.pathway.clone());

    match args.command {
        Command::Query { request } => {
            println!("{}", respond(&facade, &request)?);
        }
        Command::Serve => {
            if let Some(period) = config.store.refresh_interval() {
                spawn_refresh(store, loader, period);
            }
            serve(&facade).await?;
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

/// 执行一行请求并序列化响应
fn respond(facade: &QueryFacade, line: &str) -> Result<String> {
    let response = facade.execute_json(line);
    debug!("{} -> {:?}", response.op, response.status);
    serde_json::to_string(&response).context("Failed to serialize response")
}

/// JSON-lines 请求循环，stdin 关闭或收到 Ctrl-C 时结束
async fn serve(facade: &QueryFacade) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Serving JSON-lines requests on stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read request line")? else {
                    info!("stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let mut out = respond(facade, &line)?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// 周期性重建快照，失败时保留旧快照
fn spawn_refresh(store: ReferenceStore, loader: SnapshotLoader, period: Duration) {
    info!("Snapshot refresh every {}s", period.as_secs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            interval.tick().await;

            let store = store.clone();
            let loader = loader.clone();
            match tokio::task::spawn_blocking(move || store.refresh(&loader)).await {
                Ok(Ok(info)) => info!("Snapshot refreshed: version {}", info.version),
                Ok(Err(e)) => warn!("Snapshot refresh failed: {}", e),
                Err(e) => error!("Snapshot refresh task panicked: {}", e),
            }
        }
    });
}
