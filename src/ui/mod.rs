//! 交互层入口。
//!
//! - `selector` — 选择后端契约与构造
//! - `fzf` / `prompt` — fzf 进程与内置模糊提示两种实现
//! - `download` — `download` 子命令的交互流程

pub mod download;
pub mod fzf;
pub mod prompt;
pub mod selector;

use std::io::{self, BufRead, Write};

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};

pub use selector::{SelectError, Selector};

pub(crate) fn read_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line)
}

/// 回车或 y 视为确认，n / q 视为拒绝。
pub(crate) fn parse_confirm(input: &str) -> bool {
    !matches!(
        input.trim().to_ascii_lowercase().as_str(),
        "n" | "no" | "q" | "quit"
    )
}

pub(crate) fn clear_screen() -> Result<()> {
    let mut out = io::stdout();
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_accepts_enter_and_rejects_quit() {
        assert!(parse_confirm("\n"));
        assert!(parse_confirm("y\n"));
        assert!(!parse_confirm("n\n"));
        assert!(!parse_confirm("Q"));
    }
}
