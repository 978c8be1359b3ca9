//! 下载主流程编排。
//!
//! 搜索 → 选标题 → 取详情 → 逐集（取服务器 → 选服务器 → 选清晰度 → 派发）。
//! 搜索/详情失败时在有限次数内整体重试；单集错误只影响该集。

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::models::{
    DownloadJob, DownloadReport, DownloadRequest, EpisodeOutcome, EpisodeStage, PipelineError,
    ServerMode, SkipReason,
};
use super::progress::with_spinner;
use super::quality::filter_by_quality;
use super::range::EpisodeRange;
use super::title::select_title;
use super::transfer::Transfer;
use crate::base_system::context::Config;
use crate::provider::{AnimeDetail, AnimeProvider, EpisodeStreams, Server};
use crate::ui::{Selector, clear_screen};

const RETRY_PROMPT: &str = "获取番剧信息失败，回车重试，输入 n 退出: ";
const SERVER_PROMPT: &str = "Select Server: ";

pub struct Pipeline<'a> {
    config: &'a Config,
    provider: &'a dyn AnimeProvider,
    selector: &'a dyn Selector,
    dispatcher: Dispatcher<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        provider: &'a dyn AnimeProvider,
        selector: &'a dyn Selector,
        transfer: &'a dyn Transfer,
    ) -> Self {
        Self {
            config,
            provider,
            selector,
            dispatcher: Dispatcher::new(transfer),
        }
    }

    pub fn run(&self, request: &DownloadRequest) -> Result<DownloadReport, PipelineError> {
        // 范围格式错误在任何网络请求之前报告
        let requested = request
            .episode_range
            .as_deref()
            .map(EpisodeRange::parse)
            .transpose()?;

        let (search_title, anime) = self.resolve_with_retry(&request.query)?;
        let translation = self.config.translation_type;
        let range = match requested {
            Some(range) => {
                // 超出最大集号的部分不会命中任何集
                let limit = anime
                    .last_episode_number(translation)
                    .map_or(0, |n| n.saturating_add(1));
                let clamped = range.clamp_end(limit);
                if clamped != range {
                    warn!(
                        target: "pipeline",
                        "集数范围 {}-{} 超出已有集数，收紧为 {}-{}",
                        range.start, range.end, clamped.start, clamped.end
                    );
                }
                clamped
            }
            None => EpisodeRange::full(anime.episode_count(translation)),
        };
        if range.is_empty() {
            warn!(
                target: "pipeline",
                "集数范围 {}-{} 为空，没有可下载的集",
                range.start, range.end
            );
        }
        info!(
            target: "pipeline",
            "{}（{}）共 {} 集，本次处理 {}-{}（{} 个编号）",
            anime.title,
            translation,
            anime.episode_count(translation),
            range.start,
            range.end,
            range.len()
        );

        let mut report = DownloadReport::new(&search_title, &anime.title);
        for number in range.iter() {
            let episode = number.to_string();
            let outcome = self.run_episode(&anime, &search_title, &episode, request.server_mode);
            report.push(&episode, outcome);
        }

        info!(target: "pipeline", "Done downloading");
        info!(
            target: "pipeline",
            "完成 {} 集，跳过 {} 集，失败 {} 集",
            report.dispatched(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// 搜索与详情阶段的有限次重试，`max_pipeline_attempts == 0` 时不限次数。
    fn resolve_with_retry(&self, query: &str) -> Result<(String, AnimeDetail), PipelineError> {
        let max_attempts = self.config.max_pipeline_attempts;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.resolve_anime(query) {
                Ok(resolved) => return Ok(resolved),
                Err(err) if err.restarts_pipeline() => {
                    error!(target: "pipeline", "第 {} 次尝试失败: {}", attempt, err);
                    if max_attempts != 0 && attempt >= max_attempts {
                        return Err(PipelineError::RetriesExhausted(attempt));
                    }
                    if !self.selector.confirm(RETRY_PROMPT)? {
                        return Err(PipelineError::Cancelled);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn resolve_anime(&self, query: &str) -> Result<(String, AnimeDetail), PipelineError> {
        let translation = self.config.translation_type;
        let results = match with_spinner("Fetching Search Results...", || {
            self.provider.search(query, translation)
        }) {
            Ok(Some(results)) if !results.is_empty() => results,
            Ok(_) => return Err(PipelineError::SearchFailed(query.to_string())),
            Err(err) => {
                warn!(target: "pipeline", "{} 搜索失败: {:#}", self.provider.name(), err);
                return Err(PipelineError::SearchFailed(query.to_string()));
            }
        };

        debug!(target: "pipeline", "搜索到 {} 个结果", results.len());
        let title = select_title(&results, query, self.config.auto_select, self.selector)?;
        let id = match results.get(&title) {
            Some(result) => result.id.clone(),
            None => return Err(PipelineError::SearchFailed(query.to_string())),
        };
        debug!(target: "pipeline", "选中标题 {} (id={})", title, id);

        match with_spinner("Fetching Anime...", || self.provider.get_anime(&id)) {
            Ok(Some(anime)) => Ok((title, anime)),
            Ok(None) => Err(PipelineError::AnimeFetchFailed(title)),
            Err(err) => {
                warn!(target: "pipeline", "获取番剧详情失败: {:#}", err);
                Err(PipelineError::AnimeFetchFailed(title))
            }
        }
    }

    /// 单集边界：任何错误都在这里转为结果，不会中断整个范围。
    fn run_episode(
        &self,
        anime: &AnimeDetail,
        search_title: &str,
        episode: &str,
        mode: ServerMode,
    ) -> EpisodeOutcome {
        let mut stage = EpisodeStage::Pending;
        match self.process_episode(anime, search_title, episode, mode, &mut stage) {
            Ok((job, path)) => EpisodeOutcome::Dispatched { job, path },
            Err(err) => match err.skip_reason() {
                Some(reason) => {
                    match reason {
                        SkipReason::UnknownEpisode => {
                            warn!(target: "pipeline", "Episode not found, skipping: {}", err)
                        }
                        _ => info!(target: "pipeline", "跳过第 {} 集: {}", episode, err),
                    }
                    EpisodeOutcome::Skipped(reason)
                }
                None => {
                    error!(
                        target: "pipeline",
                        "第 {} 集处理失败（阶段: {}）: {}",
                        episode, stage, err
                    );
                    self.pause_after_error();
                    EpisodeOutcome::Failed {
                        stage,
                        message: err.to_string(),
                    }
                }
            },
        }
    }

    fn process_episode(
        &self,
        anime: &AnimeDetail,
        search_title: &str,
        episode: &str,
        mode: ServerMode,
        stage: &mut EpisodeStage,
    ) -> Result<(DownloadJob, PathBuf), PipelineError> {
        let translation = self.config.translation_type;
        if !anime.has_episode(translation, episode) {
            return Err(PipelineError::UnknownEpisode(episode.to_string()));
        }

        let streams = with_spinner("Fetching Episode Streams...", || {
            self.provider.get_episode_streams(anime, episode, translation)
        })?;
        *stage = EpisodeStage::StreamsFetched;

        let server = match mode {
            ServerMode::TopPriority => with_spinner("Resolving Server...", || {
                let mut streams = streams;
                streams.next()
            }),
            ServerMode::Choose => self.choose_server(streams)?,
        }
        .ok_or_else(|| PipelineError::EmptyStreamSet(episode.to_string()))?;
        *stage = EpisodeStage::ServerChosen;
        debug!(target: "pipeline", "第 {} 集使用服务器 {}", episode, server.name);

        let link = filter_by_quality(
            &self.config.quality,
            &server.links,
            self.config.quality_fallback,
        )
        .ok_or_else(|| PipelineError::QualityNotFound {
            episode: episode.to_string(),
            quality: self.config.quality.clone(),
        })?;
        *stage = EpisodeStage::LinkFiltered;
        if !link.quality.eq_ignore_ascii_case(&self.config.quality) {
            debug!(
                target: "pipeline",
                "请求清晰度 {}，实际使用 {}",
                self.config.quality, link.quality
            );
        }

        let job = DownloadJob {
            link: link.link.clone(),
            anime_title: anime.title.clone(),
            episode_title: server.episode_title.clone(),
            destination_dir: self.config.default_save_dir(),
            overwrite: self.config.allow_overwrite_files,
            format: self.config.format.clone(),
        };
        let path = self.dispatcher.dispatch(search_title, episode, &job)?;
        *stage = EpisodeStage::Dispatched;
        Ok((job, path))
    }

    /// 展开全部服务器交给用户选择。序列为空返回 `None`。
    fn choose_server(&self, streams: EpisodeStreams<'_>) -> Result<Option<Server>, PipelineError> {
        let mut servers: IndexMap<String, Server> = IndexMap::new();
        for server in with_spinner("Fetching Servers...", || streams.collect::<Vec<_>>()) {
            if let Some(previous) = servers.insert(server.name.clone(), server) {
                warn!(
                    target: "pipeline",
                    "重复的服务器名 {}，保留后出现的一项",
                    previous.name
                );
            }
        }
        if servers.is_empty() {
            return Ok(None);
        }

        let names: Vec<String> = servers.keys().cloned().collect();
        let chosen = self
            .selector
            .choose(&names, SERVER_PROMPT)?
            .ok_or(PipelineError::Cancelled)?;
        servers
            .shift_remove(&chosen)
            .map(Some)
            .ok_or(PipelineError::Cancelled)
    }

    fn pause_after_error(&self) {
        if self.config.episode_error_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.episode_error_delay_ms));
        }
        if self.config.clear_after_error {
            if let Err(err) = clear_screen() {
                debug!(target: "pipeline", "清屏失败: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, HashSet, VecDeque};

    use anyhow::{Result, anyhow};

    use super::*;
    use crate::provider::{SearchResult, SearchResults, StreamLink, TranslationType};
    use crate::ui::SelectError;

    struct FakeProvider {
        titles: Vec<(&'static str, &'static str)>,
        anime: Option<AnimeDetail>,
        servers: HashMap<String, Vec<Server>>,
        search_calls: Cell<u32>,
        pulls: Cell<usize>,
        fail_searches: Cell<u32>,
        none_searches: Cell<u32>,
        empty_searches: Cell<u32>,
        fail_details: Cell<u32>,
        detail_calls: Cell<u32>,
    }

    impl FakeProvider {
        fn new(episodes: &[&str]) -> Self {
            Self {
                titles: vec![("Naruto", "n1"), ("Naruto Shippuden", "n2")],
                anime: Some(AnimeDetail {
                    id: "n1".to_string(),
                    title: "Naruto".to_string(),
                    available_episodes: HashMap::from([(
                        TranslationType::Sub,
                        episodes.iter().map(|e| e.to_string()).collect::<HashSet<_>>(),
                    )]),
                }),
                servers: HashMap::new(),
                search_calls: Cell::new(0),
                pulls: Cell::new(0),
                fail_searches: Cell::new(0),
                none_searches: Cell::new(0),
                empty_searches: Cell::new(0),
                fail_details: Cell::new(0),
                detail_calls: Cell::new(0),
            }
        }

        fn with_servers(mut self, episode: &str, servers: Vec<Server>) -> Self {
            self.servers.insert(episode.to_string(), servers);
            self
        }
    }

    impl AnimeProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn search(&self, _query: &str, _: TranslationType) -> Result<Option<SearchResults>> {
            self.search_calls.set(self.search_calls.get() + 1);
            if self.fail_searches.get() > 0 {
                self.fail_searches.set(self.fail_searches.get() - 1);
                return Err(anyhow!("connection reset"));
            }
            if self.none_searches.get() > 0 {
                self.none_searches.set(self.none_searches.get() - 1);
                return Ok(None);
            }
            if self.empty_searches.get() > 0 {
                self.empty_searches.set(self.empty_searches.get() - 1);
                return Ok(Some(SearchResults::default()));
            }
            Ok(Some(SearchResults::from_results(self.titles.iter().map(
                |(title, id)| SearchResult {
                    title: title.to_string(),
                    id: id.to_string(),
                },
            ))))
        }

        fn get_anime(&self, _id: &str) -> Result<Option<AnimeDetail>> {
            self.detail_calls.set(self.detail_calls.get() + 1);
            if self.fail_details.get() > 0 {
                self.fail_details.set(self.fail_details.get() - 1);
                return Err(anyhow!("502 bad gateway"));
            }
            Ok(self.anime.clone())
        }

        fn get_episode_streams<'a>(
            &'a self,
            _anime: &AnimeDetail,
            episode: &str,
            _: TranslationType,
        ) -> Result<EpisodeStreams<'a>> {
            let servers = self.servers.get(episode).cloned().unwrap_or_default();
            Ok(Box::new(servers.into_iter().inspect(move |_| {
                self.pulls.set(self.pulls.get() + 1);
            })))
        }
    }

    #[derive(Default)]
    struct ScriptedSelector {
        choices: RefCell<VecDeque<Option<String>>>,
        confirms: RefCell<VecDeque<bool>>,
        confirm_calls: Cell<u32>,
    }

    impl Selector for ScriptedSelector {
        fn choose(&self, options: &[String], _: &str) -> Result<Option<String>, SelectError> {
            Ok(self
                .choices
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| options.first().cloned()))
        }

        fn confirm(&self, _: &str) -> Result<bool, SelectError> {
            self.confirm_calls.set(self.confirm_calls.get() + 1);
            Ok(self.confirms.borrow_mut().pop_front().unwrap_or(false))
        }
    }

    #[derive(Default)]
    struct RecordingTransfer {
        jobs: RefCell<Vec<DownloadJob>>,
        fail_links: Vec<String>,
    }

    impl Transfer for RecordingTransfer {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn transfer(&self, job: &DownloadJob) -> Result<PathBuf> {
            if self.fail_links.contains(&job.link) {
                return Err(anyhow!("503 from cdn"));
            }
            self.jobs.borrow_mut().push(job.clone());
            Ok(job.destination_dir.join(&job.episode_title))
        }
    }

    fn config() -> Config {
        Config {
            quality: "1080".to_string(),
            quality_fallback: false,
            downloads_dir: "/tmp/anime".to_string(),
            episode_error_delay_ms: 0,
            clear_after_error: false,
            max_pipeline_attempts: 3,
            auto_select: true,
            ..Config::default()
        }
    }

    fn server(name: &str, episode: &str, qualities: &[&str]) -> Server {
        Server {
            name: name.to_string(),
            episode_title: format!("Naruto; Episode {episode}"),
            links: qualities
                .iter()
                .map(|q| StreamLink {
                    quality: q.to_string(),
                    link: format!("https://{name}.test/{episode}/{q}.mp4"),
                })
                .collect(),
        }
    }

    fn request(range: Option<&str>, mode: ServerMode) -> DownloadRequest {
        DownloadRequest {
            query: "naruto".to_string(),
            episode_range: range.map(str::to_string),
            server_mode: mode,
        }
    }

    #[test]
    fn range_dispatches_existing_episodes_in_order() {
        let provider = FakeProvider::new(&["2", "3"])
            .with_servers("2", vec![server("wixmp", "2", &["1080"])])
            .with_servers("3", vec![server("wixmp", "3", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let pipeline = Pipeline::new(&cfg, &provider, &selector, &transfer);

        let report = pipeline
            .run(&request(Some("2-4"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(report.search_title, "Naruto");
        assert_eq!(report.episodes.len(), 2);
        assert_eq!(report.dispatched(), 2);
        assert_eq!(report.skipped(), 0);
        let titles: Vec<_> = transfer
            .jobs
            .borrow()
            .iter()
            .map(|j| j.episode_title.clone())
            .collect();
        assert_eq!(titles, ["Naruto; Episode 2", "Naruto; Episode 3"]);
        let job = &transfer.jobs.borrow()[0];
        assert_eq!(job.destination_dir, PathBuf::from("/tmp/anime"));
        assert!(job.overwrite);
    }

    #[test]
    fn unknown_episodes_are_skipped() {
        let provider = FakeProvider::new(&["1", "3"])
            .with_servers("1", vec![server("a", "1", &["1080"])])
            .with_servers("3", vec![server("a", "3", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-4"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(
            report.outcome_of("2"),
            Some(&EpisodeOutcome::Skipped(SkipReason::UnknownEpisode))
        );
        assert_eq!(report.dispatched(), 2);
    }

    #[test]
    fn missing_quality_skips_episode_and_continues() {
        let provider = FakeProvider::new(&["1", "2"])
            .with_servers("1", vec![server("a", "1", &["720", "480"])])
            .with_servers("2", vec![server("a", "2", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-3"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(
            report.outcome_of("1"),
            Some(&EpisodeOutcome::Skipped(SkipReason::QualityNotFound))
        );
        assert_eq!(transfer.jobs.borrow().len(), 1);
        assert_eq!(transfer.jobs.borrow()[0].link, "https://a.test/2/1080.mp4");
    }

    #[test]
    fn quality_fallback_picks_nearest() {
        let provider =
            FakeProvider::new(&["1"]).with_servers("1", vec![server("a", "1", &["480", "720"])]);
        let cfg = Config {
            quality_fallback: true,
            ..config()
        };
        let (selector, transfer) = (ScriptedSelector::default(), RecordingTransfer::default());
        Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();
        assert_eq!(transfer.jobs.borrow()[0].link, "https://a.test/1/720.mp4");
    }

    #[test]
    fn empty_stream_set_skips_only_that_episode() {
        let provider = FakeProvider::new(&["4", "5", "6"])
            .with_servers("4", vec![server("a", "4", &["1080"])])
            .with_servers("6", vec![server("a", "6", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("4-7"), ServerMode::Choose))
            .unwrap();

        assert_eq!(
            report.outcome_of("5"),
            Some(&EpisodeOutcome::Skipped(SkipReason::EmptyStreamSet))
        );
        assert!(matches!(report.outcome_of("6"), Some(EpisodeOutcome::Dispatched { .. })));
    }

    #[test]
    fn top_priority_pulls_exactly_one_server() {
        let provider = FakeProvider::new(&["1"]).with_servers(
            "1",
            vec![
                server("first", "1", &["1080"]),
                server("second", "1", &["1080"]),
                server("third", "1", &["1080"]),
            ],
        );
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(provider.pulls.get(), 1);
        assert_eq!(transfer.jobs.borrow()[0].link, "https://first.test/1/1080.mp4");
    }

    #[test]
    fn choose_mode_uses_selected_server_and_keeps_last_duplicate() {
        let mut dup = server("mirror", "1", &["1080"]);
        dup.links[0].link = "https://mirror-late.test/1.mp4".to_string();
        let provider = FakeProvider::new(&["1"]).with_servers(
            "1",
            vec![
                server("mirror", "1", &["1080"]),
                server("other", "1", &["1080"]),
                dup,
            ],
        );
        let cfg = config();
        let selector = ScriptedSelector::default();
        selector.choices.borrow_mut().push_back(Some("mirror".to_string()));
        let transfer = RecordingTransfer::default();
        Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::Choose))
            .unwrap();

        assert_eq!(provider.pulls.get(), 3);
        assert_eq!(transfer.jobs.borrow()[0].link, "https://mirror-late.test/1.mp4");
    }

    #[test]
    fn transfer_failure_is_recorded_and_loop_continues() {
        let provider = FakeProvider::new(&["1", "2"])
            .with_servers("1", vec![server("a", "1", &["1080"])])
            .with_servers("2", vec![server("a", "2", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer {
            fail_links: vec!["https://a.test/1/1080.mp4".to_string()],
            ..Default::default()
        };
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-3"), ServerMode::TopPriority))
            .unwrap();

        assert!(matches!(
            report.outcome_of("1"),
            Some(EpisodeOutcome::Failed {
                stage: EpisodeStage::LinkFiltered,
                ..
            })
        ));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn identical_inputs_give_identical_jobs() {
        let build = || {
            FakeProvider::new(&["0", "1", "2"])
                .with_servers("0", vec![server("a", "0", &["720", "1080"])])
                .with_servers("1", vec![server("b", "1", &["1080p"])])
                .with_servers("2", vec![server("a", "2", &["1080"])])
        };
        let cfg = config();
        let run = || {
            let provider = build();
            let selector = ScriptedSelector::default();
            let transfer = RecordingTransfer::default();
            Pipeline::new(&cfg, &provider, &selector, &transfer)
                .run(&request(None, ServerMode::TopPriority))
                .unwrap();
            transfer.jobs.take()
        };
        let first = run();
        assert_eq!(first.len(), 3);
        assert_eq!(first, run());
    }

    #[test]
    fn invalid_range_fails_before_any_request() {
        let provider = FakeProvider::new(&["1"]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let err = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("one-two"), ServerMode::TopPriority))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange { .. }));
        assert_eq!(provider.search_calls.get(), 0);
    }

    #[test]
    fn search_failure_retries_after_confirmation() {
        let provider =
            FakeProvider::new(&["1"]).with_servers("1", vec![server("a", "1", &["1080"])]);
        provider.fail_searches.set(1);
        let cfg = config();
        let selector = ScriptedSelector::default();
        selector.confirms.borrow_mut().push_back(true);
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(provider.search_calls.get(), 2);
        assert_eq!(selector.confirm_calls.get(), 1);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn declining_retry_cancels() {
        let provider = FakeProvider::new(&["1"]);
        provider.fail_searches.set(5);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let err = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(None, ServerMode::TopPriority))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(provider.search_calls.get(), 1);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut provider = FakeProvider::new(&["1"]);
        provider.anime = None;
        let cfg = Config {
            max_pipeline_attempts: 2,
            ..config()
        };
        let selector = ScriptedSelector::default();
        selector.confirms.borrow_mut().extend([true, true, true]);
        let transfer = RecordingTransfer::default();
        let err = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(None, ServerMode::TopPriority))
            .unwrap_err();
        assert!(matches!(err, PipelineError::RetriesExhausted(2)));
        assert_eq!(provider.search_calls.get(), 2);
        assert_eq!(selector.confirm_calls.get(), 1);
    }

    #[test]
    fn zero_attempt_limit_retries_until_success() {
        let provider =
            FakeProvider::new(&["1"]).with_servers("1", vec![server("a", "1", &["1080"])]);
        provider.fail_searches.set(5);
        let cfg = Config {
            max_pipeline_attempts: 0,
            ..config()
        };
        let selector = ScriptedSelector::default();
        selector.confirms.borrow_mut().extend([true; 5]);
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(provider.search_calls.get(), 6);
        assert_eq!(selector.confirm_calls.get(), 5);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn empty_search_results_trigger_retry() {
        let provider =
            FakeProvider::new(&["1"]).with_servers("1", vec![server("a", "1", &["1080"])]);
        provider.none_searches.set(1);
        provider.empty_searches.set(1);
        let cfg = config();
        let selector = ScriptedSelector::default();
        selector.confirms.borrow_mut().extend([true, true]);
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(provider.search_calls.get(), 3);
        assert_eq!(selector.confirm_calls.get(), 2);
        assert_eq!(provider.detail_calls.get(), 1);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn detail_error_restarts_from_search() {
        let provider =
            FakeProvider::new(&["1"]).with_servers("1", vec![server("a", "1", &["1080"])]);
        provider.fail_details.set(1);
        let cfg = config();
        let selector = ScriptedSelector::default();
        selector.confirms.borrow_mut().push_back(true);
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-2"), ServerMode::TopPriority))
            .unwrap();

        assert_eq!(provider.search_calls.get(), 2);
        assert_eq!(provider.detail_calls.get(), 2);
        assert_eq!(selector.confirm_calls.get(), 1);
        assert_eq!(report.dispatched(), 1);
    }

    #[test]
    fn oversized_range_stops_after_last_episode() {
        let provider = FakeProvider::new(&["1", "2"])
            .with_servers("1", vec![server("a", "1", &["1080"])])
            .with_servers("2", vec![server("a", "2", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-1e300"), ServerMode::TopPriority))
            .unwrap();

        let episodes: Vec<_> = report.episodes.iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(episodes, ["1", "2"]);
        assert_eq!(report.dispatched(), 2);
    }

    #[test]
    fn cancelled_server_choice_fails_episode_only() {
        let provider = FakeProvider::new(&["1", "2"])
            .with_servers("1", vec![server("a", "1", &["1080"])])
            .with_servers("2", vec![server("a", "2", &["1080"])]);
        let cfg = config();
        let selector = ScriptedSelector::default();
        selector.choices.borrow_mut().push_back(None);
        let transfer = RecordingTransfer::default();
        let report = Pipeline::new(&cfg, &provider, &selector, &transfer)
            .run(&request(Some("1-3"), ServerMode::Choose))
            .unwrap();

        assert!(matches!(
            report.outcome_of("1"),
            Some(EpisodeOutcome::Failed {
                stage: EpisodeStage::StreamsFetched,
                ..
            })
        ));
        assert_eq!(report.dispatched(), 1);
    }
}
