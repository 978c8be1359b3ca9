//! `download` 子命令：组装提供方、选择后端与下载后端并运行下载流程。

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use super::selector::build_selector;
use crate::base_system::context::{Config, ServerPreference};
use crate::download::models::EpisodeOutcome;
use crate::download::{DownloadReport, DownloadRequest, Pipeline, ServerMode, build_transfer};
use crate::provider::build_provider;

/// `-h` 或配置 `server: top` 任一成立时直接取第一个服务器。
pub(crate) fn server_mode(highest_priority: bool, config: &Config) -> ServerMode {
    if highest_priority || config.server == ServerPreference::Top {
        ServerMode::TopPriority
    } else {
        ServerMode::Choose
    }
}

pub fn run(
    config: &Config,
    anime_title: &str,
    episode_range: Option<String>,
    highest_priority: bool,
) -> Result<DownloadReport> {
    let start = Instant::now();
    let provider = build_provider(config).context("初始化提供方失败")?;
    let selector = build_selector(config);
    let transfer = build_transfer(config).context("初始化下载后端失败")?;
    info!(
        target: "startup",
        "提供方: {}，下载后端: {}，保存目录: {}",
        provider.name(),
        transfer.name(),
        config.default_save_dir().display()
    );

    let request = DownloadRequest {
        query: anime_title.to_string(),
        episode_range,
        server_mode: server_mode(highest_priority, config),
    };
    let report = Pipeline::new(config, provider.as_ref(), selector.as_ref(), transfer.as_ref())
        .run(&request)
        .with_context(|| format!("下载失败: {}", anime_title))?;

    print_summary(&report);
    println!("耗时: {:.2?}", start.elapsed());
    Ok(report)
}

fn print_summary(report: &DownloadReport) {
    println!("\n===== {} =====", report.anime_title);
    for entry in &report.episodes {
        match &entry.outcome {
            EpisodeOutcome::Dispatched { path, .. } => {
                println!("第 {} 集: 完成 -> {}", entry.episode, path.display())
            }
            EpisodeOutcome::Skipped(reason) => {
                println!("第 {} 集: 跳过 ({:?})", entry.episode, reason)
            }
            EpisodeOutcome::Failed { stage, message } => {
                println!("第 {} 集: 失败 [{}] {}", entry.episode, stage, message)
            }
        }
    }
    println!(
        "完成 {} / 跳过 {} / 失败 {}",
        report.dispatched(),
        report.skipped(),
        report.failed()
    );
}
