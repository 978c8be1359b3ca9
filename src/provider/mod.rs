//! 搜索/元数据提供方。
//!
//! 子模块：
//! - `models`   — 强类型的搜索结果 / 番剧详情 / 服务器 / 播放链接
//! - `allanime` — AllAnime GraphQL 客户端

pub mod allanime;
pub mod models;

use anyhow::{Result, anyhow};

use crate::base_system::context::Config;
pub use models::{AnimeDetail, SearchResult, SearchResults, Server, StreamLink, TranslationType};

/// 某一集的服务器序列：惰性、有限、只能消费一次。
pub type EpisodeStreams<'a> = Box<dyn Iterator<Item = Server> + 'a>;

/// 下载流程依赖的提供方契约。
///
/// `search` / `get_anime` 返回 `Ok(None)` 表示提供方没有给出可用数据；
/// `Err` 表示请求本身失败（重试后仍然失败）。
pub trait AnimeProvider {
    fn name(&self) -> &'static str;

    fn search(&self, query: &str, translation: TranslationType) -> Result<Option<SearchResults>>;

    fn get_anime(&self, id: &str) -> Result<Option<AnimeDetail>>;

    /// 返回按提供方优先级排列的服务器序列。只取第一个元素时不得触发其余服务器的解析。
    fn get_episode_streams<'a>(
        &'a self,
        anime: &AnimeDetail,
        episode: &str,
        translation: TranslationType,
    ) -> Result<EpisodeStreams<'a>>;
}

pub fn build_provider(config: &Config) -> Result<Box<dyn AnimeProvider>> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        "allanime" => {
            let client = allanime::AllAnimeClient::new(allanime::AllAnimeConfig::from(config))?;
            Ok(Box::new(client))
        }
        other => Err(anyhow!("unknown provider: {other}")),
    }
}
