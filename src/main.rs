use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;

use douyin_uploader_lib::config::{resolve_session_path, AppConfig};
use douyin_uploader_lib::job::{parse_tags, UploadJob};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 上传服务（默认）
    Serve,
    /// 检查或重新生成抖音 Cookie
    Login {
        /// Cookie 文件路径（相对当前目录）
        #[arg(long)]
        path: Option<String>,
        /// 只检查 Cookie 是否有效，不打开登录浏览器
        #[arg(long)]
        check: bool,
        /// 即使 Cookie 有效也重新生成
        #[arg(long)]
        force: bool,
    },
    /// 直接发布一个视频
    Upload {
        #[arg(long)]
        video: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// 逗号分隔，可重复
        #[arg(long)]
        tags: Vec<String>,
        #[arg(long)]
        cover: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            douyin_uploader_lib::run_server(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Login { path, check, force } => {
            if let Some(path) = path.as_deref() {
                config.session_path = resolve_session_path(Some(path));
            }
            let outcome = douyin_uploader_lib::run_login(&config, check, force).await?;
            Ok(if outcome.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Upload {
            video,
            title,
            description,
            tags,
            cover,
        } => {
            let job = UploadJob {
                video,
                title,
                description,
                tags: parse_tags(&tags),
                cover,
            };
            let report = douyin_uploader_lib::run_upload(&config, &job).await?;
            log::info!(
                "发布完成: {} (尝试 {} 次) -> {}",
                job.video.display(),
                report.attempts,
                report.manage_url
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
