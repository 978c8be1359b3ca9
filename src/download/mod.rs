//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`    — 数据模型（DownloadJob / DownloadReport / PipelineError 等）
//! - `range`     — 集数范围解析
//! - `title`     — 搜索结果标题选择
//! - `quality`   — 清晰度筛选
//! - `progress`  — spinner 与字节进度条
//! - `transfer`  — 下载后端（HTTP / yt-dlp）
//! - `dispatch`  — 任务派发
//! - `pipeline`  — 下载主流程编排

pub mod dispatch;
pub mod models;
pub mod pipeline;
pub(crate) mod progress;
pub mod quality;
pub mod range;
pub mod title;
pub mod transfer;

pub use models::{DownloadReport, DownloadRequest, ServerMode};
pub use pipeline::Pipeline;
pub use transfer::build_transfer;
