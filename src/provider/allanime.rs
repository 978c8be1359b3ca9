use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    AnimeDetail, AnimeProvider, EpisodeStreams, SearchResult, SearchResults, Server, StreamLink,
    TranslationType,
};
use crate::base_system::context::Config;
use crate::base_system::retry::with_backoff;

const SEARCH_GQL: &str = "query( $search: SearchInput $limit: Int $page: Int $translationType: VaildTranslationTypeEnumType $countryOrigin: VaildCountryOriginEnumType ) { shows( search: $search limit: $limit page: $page translationType: $translationType countryOrigin: $countryOrigin ) { edges { _id name availableEpisodes __typename } }}";

const SHOW_GQL: &str =
    "query ($showId: String!) { show( _id: $showId ) { _id name availableEpisodesDetail }}";

const EPISODE_GQL: &str = "query ($showId: String!, $translationType: VaildTranslationTypeEnumType!, $episodeString: String!) { episode( showId: $showId translationType: $translationType episodeString: $episodeString ) { episodeString sourceUrls }}";

const SEARCH_LIMIT: u32 = 40;
const SOURCE_XOR_KEY: u8 = 56;
const DIRECT_QUALITY: &str = "auto";

#[derive(Debug, Clone)]
pub struct AllAnimeConfig {
    pub api_base: String,
    pub referer: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for AllAnimeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.allanime.day".to_string(),
            referer: "https://allmanga.to".to_string(),
            request_timeout: Duration::from_secs(15),
            max_retries: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string(),
        }
    }
}

impl From<&Config> for AllAnimeConfig {
    fn from(config: &Config) -> Self {
        Self {
            api_base: config.allanime_api.trim().trim_end_matches('/').to_string(),
            referer: config.allanime_referer.trim().to_string(),
            request_timeout: Duration::from_secs(config.request_timeout.max(1)),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

pub struct AllAnimeClient {
    client: Client,
    config: AllAnimeConfig,
    clock_base: String,
}

// ── 响应结构（仅在本模块内使用） ─────────────────────────────────

#[derive(Debug, Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ShowsData {
    shows: ShowEdges,
}

#[derive(Debug, Deserialize)]
struct ShowEdges {
    #[serde(default)]
    edges: Vec<ShowEdge>,
}

#[derive(Debug, Deserialize)]
struct ShowEdge {
    #[serde(rename = "_id")]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ShowData {
    show: Option<ShowWire>,
}

#[derive(Debug, Deserialize)]
struct ShowWire {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(rename = "availableEpisodesDetail", default)]
    available_episodes_detail: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EpisodeData {
    episode: Option<EpisodeWire>,
}

#[derive(Debug, Deserialize)]
struct EpisodeWire {
    /// 逐条校验，单条格式异常不影响其余来源
    #[serde(rename = "sourceUrls", default)]
    source_urls: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct SourceUrl {
    #[serde(rename = "sourceUrl")]
    source_url: String,
    #[serde(default)]
    priority: f64,
    #[serde(rename = "sourceName")]
    source_name: String,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    #[serde(default)]
    links: Vec<ClockLink>,
}

#[derive(Debug, Deserialize)]
struct ClockLink {
    link: String,
    #[serde(rename = "resolutionStr", default)]
    resolution_str: String,
}

impl AllAnimeClient {
    pub fn new(config: AllAnimeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        if let Ok(v) = HeaderValue::from_str(&config.referer) {
            headers.insert(REFERER, v);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context("init AllAnime http client")?;

        Ok(Self {
            client,
            clock_base: clock_base(&config.api_base),
            config,
        })
    }

    fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let url = format!("{}/api", self.config.api_base);
        let variables = variables.to_string();
        with_backoff(
            "allanime",
            self.config.max_retries,
            Duration::from_millis(600),
            || {
                let resp = self
                    .client
                    .get(&url)
                    .query(&[("variables", variables.as_str()), ("query", query)])
                    .send()?;
                let resp = resp.error_for_status()?;
                Ok(resp.json::<Value>()?)
            },
        )
    }

    fn fetch_clock_links(&self, path: &str) -> Result<Vec<StreamLink>> {
        let url = format!("{}{}", self.clock_base, path);
        debug!(target: "provider", "解析服务器: {}", url);
        let clock: ClockResponse = with_backoff(
            "allanime clock",
            self.config.max_retries,
            Duration::from_millis(600),
            || {
                let resp = self.client.get(&url).send()?.error_for_status()?;
                Ok(resp.json::<ClockResponse>()?)
            },
        )?;
        Ok(clock
            .links
            .into_iter()
            .filter(|l| !l.link.trim().is_empty())
            .map(|l| StreamLink {
                quality: if l.resolution_str.trim().is_empty() {
                    DIRECT_QUALITY.to_string()
                } else {
                    l.resolution_str
                },
                link: l.link,
            })
            .collect())
    }

    fn resolve_source(&self, source: &SourceUrl, episode_title: &str) -> Option<Server> {
        let links = match source_target(&source.source_url) {
            Ok(SourceTarget::Direct(link)) => vec![StreamLink {
                quality: DIRECT_QUALITY.to_string(),
                link,
            }],
            Ok(SourceTarget::Clock(path)) => match self.fetch_clock_links(&path) {
                Ok(links) => links,
                Err(e) => {
                    debug!(target: "provider", "服务器 {} 解析失败: {e:#}", source.source_name);
                    return None;
                }
            },
            Err(e) => {
                debug!(target: "provider", "服务器 {} 地址无法识别: {e:#}", source.source_name);
                return None;
            }
        };

        if links.is_empty() {
            debug!(target: "provider", "服务器 {} 没有可用链接", source.source_name);
            return None;
        }

        Some(Server {
            name: source.source_name.clone(),
            episode_title: episode_title.to_string(),
            links,
        })
    }
}

impl AnimeProvider for AllAnimeClient {
    fn name(&self) -> &'static str {
        "allanime"
    }

    fn search(&self, query: &str, translation: TranslationType) -> Result<Option<SearchResults>> {
        let variables = json!({
            "search": {
                "allowAdult": false,
                "allowUnknown": false,
                "query": query,
            },
            "limit": SEARCH_LIMIT,
            "page": 1,
            "translationType": translation.as_str(),
            "countryOrigin": "ALL",
        });
        let raw = self.graphql(SEARCH_GQL, variables)?;
        Ok(parse_search(raw))
    }

    fn get_anime(&self, id: &str) -> Result<Option<AnimeDetail>> {
        let raw = self.graphql(SHOW_GQL, json!({ "showId": id }))?;
        Ok(parse_show(raw))
    }

    fn get_episode_streams<'a>(
        &'a self,
        anime: &AnimeDetail,
        episode: &str,
        translation: TranslationType,
    ) -> Result<EpisodeStreams<'a>> {
        let variables = json!({
            "showId": anime.id,
            "translationType": translation.as_str(),
            "episodeString": episode,
        });
        let raw = self.graphql(EPISODE_GQL, variables)?;
        let sources = parse_sources(raw);
        debug!(target: "provider", "第 {} 集共有 {} 个来源", episode, sources.len());

        let episode_title = format!("{}; Episode {}", anime.title, episode);
        let servers = sources
            .into_iter()
            .filter_map(move |source| self.resolve_source(&source, &episode_title));
        Ok(Box::new(servers))
    }
}

fn decode_data<T: DeserializeOwned>(raw: Value, what: &str) -> Option<T> {
    match serde_json::from_value::<GqlResponse<T>>(raw) {
        Ok(GqlResponse { data: Some(data) }) => Some(data),
        Ok(GqlResponse { data: None }) => {
            warn!(target: "provider", "AllAnime {} 响应缺少 data 字段", what);
            None
        }
        Err(e) => {
            warn!(target: "provider", "AllAnime {} 响应格式异常: {}", what, e);
            None
        }
    }
}

fn parse_search(raw: Value) -> Option<SearchResults> {
    let data: ShowsData = decode_data(raw, "search")?;
    let results = SearchResults::from_results(data.shows.edges.into_iter().map(|edge| {
        SearchResult {
            title: edge.name,
            id: edge.id,
        }
    }));
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

fn parse_show(raw: Value) -> Option<AnimeDetail> {
    let data: ShowData = decode_data(raw, "show")?;
    let show = data.show?;

    let mut available_episodes = HashMap::new();
    for (key, episodes) in show.available_episodes_detail {
        match key.parse::<TranslationType>() {
            Ok(translation) => {
                available_episodes.insert(translation, episodes.into_iter().collect::<HashSet<_>>());
            }
            Err(_) => debug!(target: "provider", "忽略未知的翻译类型: {}", key),
        }
    }

    Some(AnimeDetail {
        id: show.id,
        title: show.name,
        available_episodes,
    })
}

/// 取出来源列表并按 priority 从高到低排序（稳定排序，同优先级保持原顺序）。
fn parse_sources(raw: Value) -> Vec<SourceUrl> {
    let Some(EpisodeData {
        episode: Some(episode),
    }) = decode_data::<EpisodeData>(raw, "episode")
    else {
        return Vec::new();
    };
    let mut sources: Vec<SourceUrl> = episode
        .source_urls
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<SourceUrl>(raw) {
            Ok(source) => Some(source),
            Err(e) => {
                debug!(target: "provider", "忽略格式异常的来源: {}", e);
                None
            }
        })
        .collect();
    sources.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    sources
}

#[derive(Debug, PartialEq, Eq)]
enum SourceTarget {
    /// 可直接下载的外部地址
    Direct(String),
    /// 需要再请求一次 clock.json 的内部路径
    Clock(String),
}

fn source_target(source_url: &str) -> Result<SourceTarget> {
    let decoded = match source_url.strip_prefix("--") {
        Some(encoded) => decode_source_url(encoded)?,
        None => source_url.to_string(),
    };

    if decoded.starts_with("http://") || decoded.starts_with("https://") {
        return Ok(SourceTarget::Direct(decoded));
    }
    if decoded.starts_with('/') {
        let path = if decoded.contains("/clock.json") {
            decoded
        } else {
            decoded.replacen("/clock", "/clock.json", 1)
        };
        return Ok(SourceTarget::Clock(path));
    }
    Err(anyhow!("unsupported source url: {}", source_url))
}

/// `--` 前缀的来源地址：十六进制解码后逐字节异或 56。
fn decode_source_url(encoded: &str) -> Result<String> {
    let bytes = hex::decode(encoded.trim()).context("source url is not hex")?;
    let decoded: Vec<u8> = bytes.into_iter().map(|b| b ^ SOURCE_XOR_KEY).collect();
    String::from_utf8(decoded).context("decoded source url is not utf-8")
}

/// `https://api.allanime.day` → `https://allanime.day`
fn clock_base(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    match base.split_once("://") {
        Some((scheme, host)) => {
            let host = host.strip_prefix("api.").unwrap_or(host);
            format!("{scheme}://{host}")
        }
        None => base.to_string(),
    }
}
