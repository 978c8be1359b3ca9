//! anime-dl：番剧搜索、选集与下载命令行工具。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/重试等基础设施
//! - `provider`：搜索/元数据提供方（AllAnime）
//! - `download`：下载流程编排（选标题、选集、选服务器、选清晰度、派发）
//! - `ui`：交互选择后端与 `download` 子命令

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

mod base_system;
mod download;
mod provider;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use provider::TranslationType;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "anime-dl")]
#[command(about = "Search, select and download anime episodes")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 指定配置文件路径（优先于 data_dir）
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Option<Command>,
}

/// 仅对本次运行生效的配置覆盖，不写回 config.yml。
#[derive(Debug, Args)]
struct ConfigOverrides {
    /// 期望清晰度，例如 1080 / 720
    #[arg(long, global = true)]
    quality: Option<String>,

    /// 翻译类型：sub / dub / raw
    #[arg(long, global = true)]
    translation_type: Option<TranslationType>,

    /// 下载保存目录
    #[arg(long, global = true)]
    downloads_dir: Option<String>,

    /// 自动选择最相似的标题
    #[arg(long, global = true, action = ArgAction::SetTrue, overrides_with = "no_auto_select")]
    auto_select: bool,

    #[arg(long, global = true, action = ArgAction::SetTrue, overrides_with = "auto_select")]
    no_auto_select: bool,

    /// 使用 fzf 作为选择界面
    #[arg(long, global = true, action = ArgAction::SetTrue, overrides_with = "no_fzf")]
    fzf: bool,

    #[arg(long, global = true, action = ArgAction::SetTrue, overrides_with = "fzf")]
    no_fzf: bool,

    /// yt-dlp 格式选择表达式
    #[arg(long, global = true)]
    format: Option<String>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(translation) = self.translation_type {
            config.translation_type = translation;
        }
        if let Some(dir) = self.downloads_dir {
            config.downloads_dir = dir;
        }
        if self.auto_select {
            config.auto_select = true;
        } else if self.no_auto_select {
            config.auto_select = false;
        }
        if self.fzf {
            config.use_fzf = true;
        } else if self.no_fzf {
            config.use_fzf = false;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 搜索并下载番剧
    #[command(disable_help_flag = true)]
    Download {
        /// 要搜索的番剧名
        anime_title: String,

        /// 集数范围，例如 "1-12"（左闭右开）
        #[arg(short = 'r', long)]
        episode_range: Option<String>,

        /// 直接使用优先级最高的服务器
        #[arg(short = 'h', long, default_value_t = false)]
        highest_priority: bool,

        /// 显示帮助
        #[arg(long, action = ArgAction::Help)]
        help: Option<bool>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("anime-dl v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;

    let mut config = load_or_create::<Config>(cli.config.as_deref(), data_dir)
        .map_err(|e| anyhow!(e.to_string()))?;
    cli.overrides.apply(&mut config);

    let result = match cli.command {
        Some(Command::Download {
            anime_title,
            episode_range,
            highest_priority,
            ..
        }) => {
            info!(target: "startup", "当前版本: v{}", VERSION);
            ui::download::run(&config, &anime_title, episode_range, highest_priority).map(|_| ())
        }
        None => {
            println!("未指定子命令，使用 `anime-dl download --help` 查看用法");
            Ok(())
        }
    };

    log.safe_exit();
    result
}

fn init_logging(debug: bool, base_dir: Option<&std::path::Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}
