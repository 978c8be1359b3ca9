use std::path::PathBuf;

use tracing::info;

use super::models::{DownloadJob, PipelineError};
use super::transfer::Transfer;

/// 把解析好的任务交给下载后端。
pub struct Dispatcher<'a> {
    transfer: &'a dyn Transfer,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transfer: &'a dyn Transfer) -> Self {
        Self { transfer }
    }

    pub fn dispatch(
        &self,
        search_title: &str,
        episode: &str,
        job: &DownloadJob,
    ) -> Result<PathBuf, PipelineError> {
        info!(target: "pipeline", "Now downloading: {} Episode {}", search_title, episode);
        let path = self
            .transfer
            .transfer(job)
            .map_err(PipelineError::Transfer)?;
        info!(
            target: "pipeline",
            "第 {} 集下载完成（{}）: {}",
            episode,
            self.transfer.name(),
            path.display()
        );
        Ok(path)
    }
}
