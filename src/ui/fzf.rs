use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use super::selector::{SelectError, Selector};

/// 通过外部 fzf 进程选择。
pub struct FzfSelector {
    binary: PathBuf,
    header: String,
}

impl FzfSelector {
    pub fn locate(header: &str) -> Option<Self> {
        which::which("fzf").ok().map(|binary| Self {
            binary,
            header: header.to_string(),
        })
    }
}

impl Selector for FzfSelector {
    fn choose(&self, options: &[String], prompt: &str) -> Result<Option<String>, SelectError> {
        if options.is_empty() {
            return Ok(None);
        }

        let mut child = Command::new(&self.binary)
            .args(["--reverse", "--cycle", "--height", "50%"])
            .arg("--prompt")
            .arg(prompt)
            .arg("--header")
            .arg(&self.header)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(options.join("\n").as_bytes())?;
        }

        let output = child.wait_with_output()?;
        match output.status.code() {
            Some(0) => Ok(parse_fzf_output(&output.stdout)),
            // 1: 没有匹配项, 130: Esc / Ctrl-C
            Some(1) | Some(130) => Ok(None),
            Some(code) => Err(SelectError::Fzf(code)),
            None => {
                debug!("fzf terminated by signal");
                Ok(None)
            }
        }
    }
}

fn parse_fzf_output(stdout: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().next()?.trim_end_matches('\r');
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
