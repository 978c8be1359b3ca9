//! 下载流程的数据模型与错误类型。
//!
//! 包含下载任务、服务器选择模式、单集状态/结果与整次运行的汇总报告。

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ui::SelectError;

/// 完全解析好的下载任务，交给下载后端执行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub link: String,
    pub anime_title: String,
    pub episode_title: String,
    pub destination_dir: PathBuf,
    pub overwrite: bool,
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// 取提供方给出的第一个服务器，不展开其余服务器
    TopPriority,
    /// 展开全部服务器后交给用户选择
    Choose,
}

/// 一次 `download` 调用的输入。
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub query: String,
    pub episode_range: Option<String>,
    pub server_mode: ServerMode,
}

/// 单集处理进度：`Pending → StreamsFetched → ServerChosen → LinkFiltered → Dispatched`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStage {
    Pending,
    StreamsFetched,
    ServerChosen,
    LinkFiltered,
    Dispatched,
}

impl fmt::Display for EpisodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpisodeStage::Pending => "pending",
            EpisodeStage::StreamsFetched => "streams fetched",
            EpisodeStage::ServerChosen => "server chosen",
            EpisodeStage::LinkFiltered => "link filtered",
            EpisodeStage::Dispatched => "dispatched",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownEpisode,
    EmptyStreamSet,
    QualityNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Dispatched { job: DownloadJob, path: PathBuf },
    Skipped(SkipReason),
    Failed { stage: EpisodeStage, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeReport {
    pub episode: String,
    pub outcome: EpisodeOutcome,
}

/// 整次运行的结果，按处理顺序记录每一集。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub search_title: String,
    pub anime_title: String,
    pub episodes: Vec<EpisodeReport>,
}

impl DownloadReport {
    pub fn new(search_title: &str, anime_title: &str) -> Self {
        Self {
            search_title: search_title.to_string(),
            anime_title: anime_title.to_string(),
            episodes: Vec::new(),
        }
    }

    pub fn push(&mut self, episode: &str, outcome: EpisodeOutcome) {
        self.episodes.push(EpisodeReport {
            episode: episode.to_string(),
            outcome,
        });
    }

    pub fn jobs(&self) -> Vec<&DownloadJob> {
        self.episodes
            .iter()
            .filter_map(|e| match &e.outcome {
                EpisodeOutcome::Dispatched { job, .. } => Some(job),
                _ => None,
            })
            .collect()
    }

    pub fn dispatched(&self) -> usize {
        self.jobs().len()
    }

    pub fn skipped(&self) -> usize {
        self.episodes
            .iter()
            .filter(|e| matches!(e.outcome, EpisodeOutcome::Skipped(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.episodes
            .iter()
            .filter(|e| matches!(e.outcome, EpisodeOutcome::Failed { .. }))
            .count()
    }

}

#[cfg(test)]
impl DownloadReport {
    pub fn outcome_of(&self, episode: &str) -> Option<&EpisodeOutcome> {
        self.episodes
            .iter()
            .find(|e| e.episode == episode)
            .map(|e| &e.outcome)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("search returned no results for '{0}'")]
    SearchFailed(String),
    #[error("could not fetch anime '{0}'")]
    AnimeFetchFailed(String),
    #[error("no streams available for episode {0}")]
    EmptyStreamSet(String),
    #[error("quality '{quality}' not found for episode {episode}")]
    QualityNotFound { episode: String, quality: String },
    #[error("episode {0} not found")]
    UnknownEpisode(String),
    #[error("invalid episode range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },
    #[error("selection cancelled")]
    Cancelled,
    #[error("giving up after {0} failed attempts")]
    RetriesExhausted(u32),
    #[error("transfer failed: {0:#}")]
    Transfer(anyhow::Error),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// 可跳过（非失败）的单集错误。
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            PipelineError::UnknownEpisode(_) => Some(SkipReason::UnknownEpisode),
            PipelineError::EmptyStreamSet(_) => Some(SkipReason::EmptyStreamSet),
            PipelineError::QualityNotFound { .. } => Some(SkipReason::QualityNotFound),
            _ => None,
        }
    }

    /// 触发整体重试的错误。
    pub fn restarts_pipeline(&self) -> bool {
        matches!(
            self,
            PipelineError::SearchFailed(_) | PipelineError::AnimeFetchFailed(_)
        )
    }
}
