//! 退避重试策略。

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::debug;

const MAX_DELAY: Duration = Duration::from_secs(8);

/// 执行 `op`，失败后按指数退避重试，最多 `max_retries` 次（总尝试次数为 `max_retries + 1`）。
///
/// 延迟从 `initial_delay` 开始每次翻倍，上限 8 秒。全部失败时返回最后一次的错误。
pub fn with_backoff<T, F>(
    label: &str,
    max_retries: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut delay = initial_delay;
    let mut last_error = None;
    for attempt in 0..=max_retries {
        if attempt > 0 {
            debug!(target: "retry", "{label}: 第 {attempt} 次重试，等待 {:?}", delay);
            std::thread::sleep(delay);
            delay = std::cmp::min(delay * 2, MAX_DELAY);
        }
        match op() {
            Ok(v) => return Ok(v),
            Err(e) => {
                debug!(target: "retry", "{label}: 请求失败: {e:#}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("{label}: no attempt was made")))
}
