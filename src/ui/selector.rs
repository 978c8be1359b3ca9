use std::io;

use thiserror::Error;
use tracing::warn;

use super::fzf::FzfSelector;
use super::prompt::PromptSelector;
use crate::base_system::context::Config;

const FZF_HEADER: &str = "anime-dl";

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("fzf exited with status {0}")]
    Fzf(i32),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
}

/// 交互选择能力：给出候选项与提示，返回选中的一项。
///
/// 返回 `Ok(None)` 表示用户取消（Esc / Ctrl-C）。
pub trait Selector {
    fn choose(&self, options: &[String], prompt: &str) -> Result<Option<String>, SelectError>;

    /// 失败后是否重试。默认读一行标准输入。
    fn confirm(&self, prompt: &str) -> Result<bool, SelectError> {
        let line = super::read_line(prompt)?;
        Ok(super::parse_confirm(&line))
    }
}

/// 按配置选出唯一的选择后端；`use_fzf` 但找不到 fzf 时回退到内置提示。
pub fn build_selector(config: &Config) -> Box<dyn Selector> {
    if config.use_fzf {
        match FzfSelector::locate(FZF_HEADER) {
            Some(fzf) => return Box::new(fzf),
            None => warn!("use_fzf 已开启但 PATH 中找不到 fzf，改用内置选择提示"),
        }
    }
    Box::new(PromptSelector::new())
}
