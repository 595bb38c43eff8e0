use clap::Parser;
use resumedir_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use resumedir_lib::run_invocation;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 目录续传包装器：`resumedir [选项...] 源 目标`
///
/// 同时给出递归 (`-r`) 和续传 (`-c`) 且一端为远程时逐条续传整个目录，
/// 其余调用原样交给外部传输工具。
#[derive(Parser, Debug)]
#[command(
    name = "resumedir",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// 全部参数，由包装器自己解析
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    args: Vec<String>,
}

/// 初始化日志系统：文件日志 + stderr 控制台
fn init_logging() {
    let log_dir = get_log_dir();
    let config = LogConfig::load(&log_dir);

    let env_filter = EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    // 控制台只显示警告以上，避免和工具自身的输出混在一起
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let file_layer = if config.enabled {
        match SizeRotatingWriter::new(&log_dir, &config) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            ),
            Err(e) => {
                eprintln!("无法创建日志文件 {:?}: {}", log_dir, e);
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run_invocation(&cli.args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
