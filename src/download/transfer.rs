//! 下载后端：直接 HTTP 下载或交给 yt-dlp。
//!
//! 输出路径统一为 `<dest>/<番剧名>/<集标题>.<ext>`，名称经 `safe_fs_name` 清理。

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tracing::{debug, info};

use super::models::DownloadJob;
use super::progress::byte_bar;
use crate::base_system::context::{Config, TransferBackend, safe_fs_name};

const DIR_NAME_MAX: usize = 120;
const FILE_NAME_MAX: usize = 150;
const DEFAULT_EXTENSION: &str = "mp4";
const YT_DLP: &str = "yt-dlp";
const USER_AGENT_VALUE: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

/// 实际执行下载的后端，返回写入的文件路径。
pub trait Transfer {
    fn name(&self) -> &'static str;

    fn transfer(&self, job: &DownloadJob) -> Result<PathBuf>;
}

pub fn build_transfer(config: &Config) -> Result<Box<dyn Transfer>> {
    let http = || -> Result<Box<dyn Transfer>> {
        Ok(Box::new(HttpTransfer::new(
            Duration::from_secs(config.request_timeout.max(1)),
            &config.allanime_referer,
        )?))
    };
    match config.transfer_backend {
        TransferBackend::Http => http(),
        TransferBackend::YtDlp => {
            let program = which::which(YT_DLP)
                .context("transfer_backend 为 yt-dlp，但 PATH 中找不到 yt-dlp")?;
            Ok(Box::new(YtDlpTransfer::new(program)))
        }
        TransferBackend::Auto => match which::which(YT_DLP) {
            Ok(program) => Ok(Box::new(YtDlpTransfer::new(program))),
            Err(_) => {
                debug!(target: "transfer", "未找到 yt-dlp，使用 HTTP 下载");
                http()
            }
        },
    }
}

/// 本集文件所在目录。
pub(crate) fn anime_dir(job: &DownloadJob) -> PathBuf {
    job.destination_dir
        .join(safe_fs_name(&job.anime_title, "_", DIR_NAME_MAX))
}

pub(crate) fn episode_stem(job: &DownloadJob) -> String {
    safe_fs_name(&job.episode_title, "_", FILE_NAME_MAX)
}

/// 从 URL 路径取扩展名，忽略查询参数与锚点。
pub(crate) fn extract_extension(url: &str) -> Option<String> {
    let clean = url.split(['?', '#']).next()?;
    let last = clean.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub struct HttpTransfer {
    client: Client,
}

impl HttpTransfer {
    pub fn new(timeout: Duration, referer: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        // 未启用 gzip 解码，要求原始字节
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        // 视频体积大，只限制连接建立时间
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(None)
            .build()
            .context("init http client")?;
        Ok(Self { client })
    }

    pub(crate) fn target_path(job: &DownloadJob) -> Result<PathBuf> {
        let ext = extract_extension(&job.link).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        if ext == "m3u8" {
            bail!(
                "HLS 播放列表无法直接下载（{}），请安装 yt-dlp 或设置 transfer_backend: yt-dlp",
                job.link
            );
        }
        Ok(anime_dir(job).join(format!("{}.{}", episode_stem(job), ext)))
    }
}

impl Transfer for HttpTransfer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn transfer(&self, job: &DownloadJob) -> Result<PathBuf> {
        let path = Self::target_path(job)?;
        if path.exists() && !job.overwrite {
            info!(target: "transfer", "文件已存在，跳过: {}", path.display());
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let resp = self
            .client
            .get(&job.link)
            .send()
            .with_context(|| format!("request {}", job.link))?
            .error_for_status()
            .with_context(|| format!("request {}", job.link))?;

        let bar = byte_bar(resp.content_length(), &episode_stem(job));
        let part = part_path(&path);
        let written = write_stream(&mut bar.wrap_read(resp), &part);
        bar.finish_and_clear();
        let written = match written {
            Ok(n) => n,
            Err(err) => {
                let _ = fs::remove_file(&part);
                return Err(err);
            }
        };

        fs::rename(&part, &path)
            .with_context(|| format!("rename {} -> {}", part.display(), path.display()))?;
        debug!(target: "transfer", "写入 {} 字节到 {}", written, path.display());
        Ok(path)
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

fn write_stream(reader: &mut impl io::Read, part: &Path) -> Result<u64> {
    let file = File::create(part).with_context(|| format!("create {}", part.display()))?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(reader, &mut writer).context("download stream")?;
    writer.flush().context("flush download")?;
    Ok(written)
}

pub struct YtDlpTransfer {
    program: PathBuf,
}

impl YtDlpTransfer {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub(crate) fn args(job: &DownloadJob) -> Vec<OsString> {
        let template = anime_dir(job).join(format!("{}.%(ext)s", episode_stem(job)));
        let overwrite = if job.overwrite {
            "--force-overwrites"
        } else {
            "--no-overwrites"
        };
        vec![
            OsString::from(&job.link),
            OsString::from("-f"),
            OsString::from(&job.format),
            OsString::from("-o"),
            template.into_os_string(),
            OsString::from(overwrite),
        ]
    }
}

impl Transfer for YtDlpTransfer {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn transfer(&self, job: &DownloadJob) -> Result<PathBuf> {
        let dir = anime_dir(job);
        fs::create_dir_all(&dir).with_context(|| format!("create dir {}", dir.display()))?;

        let status = Command::new(&self.program)
            .args(Self::args(job))
            .status()
            .with_context(|| format!("spawn {}", self.program.display()))?;
        if !status.success() {
            return Err(anyhow!("yt-dlp 退出码 {:?}: {}", status.code(), job.link));
        }

        let stem = episode_stem(job);
        Ok(find_output(&dir, &stem).unwrap_or_else(|| dir.join(stem)))
    }
}

/// yt-dlp 自行决定扩展名，下载完成后按文件名主干查找结果。
fn find_output(dir: &Path, stem: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| {
            path.file_stem().and_then(|s| s.to_str()) == Some(stem)
                && path.extension().is_some_and(|ext| ext != "part")
        })
}
