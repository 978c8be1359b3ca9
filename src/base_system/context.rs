//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。运行期间配置只读，
//! 由入口显式传给下载流程。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::provider::TranslationType;

/// 支持的搜索/元数据提供方。
pub const KNOWN_PROVIDERS: [&str; 1] = ["allanime"];

/// 服务器选择策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPreference {
    /// 直接取提供方排在第一位的服务器
    Top,
    /// 列出全部服务器交给用户选择
    Choose,
}

/// 下载后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferBackend {
    /// PATH 中有 yt-dlp 时使用 yt-dlp，否则直接 HTTP 下载
    Auto,
    Http,
    YtDlp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 提供方配置
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub translation_type: TranslationType,
    #[serde(default = "default_allanime_api")]
    pub allanime_api: String,
    #[serde(default = "default_allanime_referer")]
    pub allanime_referer: String,

    // 选择配置
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_true")]
    pub quality_fallback: bool,
    #[serde(default = "default_true")]
    pub auto_select: bool,
    #[serde(default = "default_false")]
    pub use_fzf: bool,
    #[serde(default = "default_server")]
    pub server: ServerPreference,

    // 下载配置
    #[serde(default)]
    pub downloads_dir: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_transfer_backend")]
    pub transfer_backend: TransferBackend,
    #[serde(default = "default_true")]
    pub allow_overwrite_files: bool,

    // 重试与容错
    #[serde(default = "default_max_pipeline_attempts")]
    pub max_pipeline_attempts: u32,
    #[serde(default = "default_episode_error_delay_ms")]
    pub episode_error_delay_ms: u64,
    #[serde(default = "default_false")]
    pub clear_after_error: bool,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            translation_type: TranslationType::default(),
            allanime_api: default_allanime_api(),
            allanime_referer: default_allanime_referer(),
            quality: default_quality(),
            quality_fallback: default_true(),
            auto_select: default_true(),
            use_fzf: default_false(),
            server: default_server(),
            downloads_dir: String::new(),
            format: default_format(),
            transfer_backend: default_transfer_backend(),
            allow_overwrite_files: default_true(),
            max_pipeline_attempts: default_max_pipeline_attempts(),
            episode_error_delay_ms: default_episode_error_delay_ms(),
            clear_after_error: default_false(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 18] = [
            FieldMeta {
                name: "provider",
                description: "搜索/元数据提供方, 可选: [allanime]",
            },
            FieldMeta {
                name: "translation_type",
                description: "翻译类型, 可选: [sub, dub, raw]",
            },
            FieldMeta {
                name: "allanime_api",
                description: "AllAnime API 地址",
            },
            FieldMeta {
                name: "allanime_referer",
                description: "AllAnime 请求使用的 Referer",
            },
            FieldMeta {
                name: "quality",
                description: "期望清晰度，例如 1080、720、480",
            },
            FieldMeta {
                name: "quality_fallback",
                description: "找不到期望清晰度时是否退而选择最接近的清晰度",
            },
            FieldMeta {
                name: "auto_select",
                description: "是否按标题相似度自动选择搜索结果",
            },
            FieldMeta {
                name: "use_fzf",
                description: "是否使用 fzf 进行交互选择（找不到 fzf 时回退到内置提示）",
            },
            FieldMeta {
                name: "server",
                description: "服务器选择方式, 可选: [choose, top]；choose 时逐集选择服务器，top 等同每次传入 -h",
            },
            FieldMeta {
                name: "downloads_dir",
                description: "保存路径（留空为当前目录下的 downloads）",
            },
            FieldMeta {
                name: "format",
                description: "yt-dlp 格式选择表达式",
            },
            FieldMeta {
                name: "transfer_backend",
                description: "下载后端, 可选: [auto, http, yt-dlp]",
            },
            FieldMeta {
                name: "allow_overwrite_files",
                description: "是否允许覆盖已存在的文件",
            },
            FieldMeta {
                name: "max_pipeline_attempts",
                description: "搜索/获取番剧失败时整体重试的最大次数（0 表示不限制）",
            },
            FieldMeta {
                name: "episode_error_delay_ms",
                description: "单集出错后继续下一集前的等待时间, 单位ms",
            },
            FieldMeta {
                name: "clear_after_error",
                description: "单集出错后是否清屏",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "网络请求最大重试次数",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !KNOWN_PROVIDERS.contains(&self.provider.trim().to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown provider '{}', expected one of {:?}",
                self.provider, KNOWN_PROVIDERS
            )));
        }
        if self.quality.trim().is_empty() {
            return Err(ConfigError::Validation("quality must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.downloads_dir.trim().is_empty() {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("downloads")
        } else {
            PathBuf::from(&self.downloads_dir)
        }
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            // Windows 文件名禁用字符转为全角
            ':' => '：',
            '"' => '＂',
            '<' => '＜',
            '>' => '＞',
            '/' | '\\' => '／',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    let trimmed = cleaned.trim().to_string();
    cleaned = trimmed;
    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "allanime".to_string()
}

fn default_allanime_api() -> String {
    "https://api.allanime.day".to_string()
}

fn default_allanime_referer() -> String {
    "https://allmanga.to".to_string()
}

fn default_quality() -> String {
    "1080".to_string()
}

fn default_server() -> ServerPreference {
    ServerPreference::Choose
}

fn default_format() -> String {
    "best[height<=1080]/bestvideo[height<=1080]+bestaudio/best".to_string()
}

fn default_transfer_backend() -> TransferBackend {
    TransferBackend::Auto
}

fn default_max_pipeline_attempts() -> u32 {
    3
}

fn default_episode_error_delay_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}
