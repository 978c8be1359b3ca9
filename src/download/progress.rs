//! CLI 进度显示：阻塞请求的 spinner 与文件下载的字节进度条。
//!
//! 全部绘制到 stderr；非终端环境下 indicatif 会自动隐藏。

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const SPINNER_TICK: Duration = Duration::from_millis(100);

/// 在 spinner 显示期间执行 `op`，结束后清除 spinner。
pub(crate) fn with_spinner<T>(message: &str, op: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(SPINNER_TICK);

    let out = op();
    spinner.finish_and_clear();
    out
}

/// 单个文件的下载进度条；长度未知时退化为字节计数 spinner。
pub(crate) fn byte_bar(total: Option<u64>, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(total, ProgressDrawTarget::stderr());
    let style = match total {
        Some(_) => ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .map(|s| s.progress_chars("##-")),
        None => ProgressStyle::with_template("{spinner} {prefix} {bytes} ({bytes_per_sec})"),
    };
    bar.set_style(style.unwrap_or_else(|_| ProgressStyle::default_bar()));
    bar.set_prefix(prefix.to_string());
    bar
}
