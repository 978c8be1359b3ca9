//! 提供方返回数据的强类型模型。
//!
//! 所有提供方响应在边界处转换为这些类型，下载流程内部不再接触原始 JSON。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 翻译类型（字幕/配音/生肉）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationType {
    #[default]
    Sub,
    Dub,
    Raw,
}

impl TranslationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationType::Sub => "sub",
            TranslationType::Dub => "dub",
            TranslationType::Raw => "raw",
        }
    }
}

impl fmt::Display for TranslationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" => Ok(TranslationType::Sub),
            "dub" => Ok(TranslationType::Dub),
            "raw" => Ok(TranslationType::Raw),
            other => Err(format!("unknown translation type '{other}' (sub/dub/raw)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub id: String,
}

/// 按标题索引的搜索结果，保持插入顺序。
///
/// 重名标题保留最后一个值（位置沿用第一次出现的位置），并记录警告。
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    entries: IndexMap<String, SearchResult>,
}

impl SearchResults {
    pub fn from_results(results: impl IntoIterator<Item = SearchResult>) -> Self {
        let mut entries = IndexMap::new();
        for result in results {
            if let Some(previous) = entries.insert(result.title.clone(), result) {
                warn!(
                    target: "provider",
                    "duplicate search title '{}', keeping the later entry (dropped id {})",
                    previous.title, previous.id
                );
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, title: &str) -> Option<&SearchResult> {
        self.entries.get(title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeDetail {
    pub id: String,
    pub title: String,
    pub available_episodes: HashMap<TranslationType, HashSet<String>>,
}

impl AnimeDetail {
    pub fn episodes(&self, translation: TranslationType) -> Option<&HashSet<String>> {
        self.available_episodes.get(&translation)
    }

    pub fn episode_count(&self, translation: TranslationType) -> usize {
        self.episodes(translation).map_or(0, HashSet::len)
    }

    pub fn has_episode(&self, translation: TranslationType, episode: &str) -> bool {
        self.episodes(translation)
            .is_some_and(|set| set.contains(episode))
    }

    /// 数值最大的集号（`"12.5"` 向上取整），没有数值集号时为 None。
    pub fn last_episode_number(&self, translation: TranslationType) -> Option<u64> {
        self.episodes(translation)?
            .iter()
            .filter_map(|key| key.trim().parse::<f64>().ok())
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.ceil() as u64)
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLink {
    pub quality: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub episode_title: String,
    pub links: Vec<StreamLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, id: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn duplicate_titles_keep_last_value_in_first_position() {
        let results = SearchResults::from_results([
            result("Naruto", "1"),
            result("Bleach", "2"),
            result("Naruto", "3"),
        ]);
        assert_eq!(results.len(), 2);
        assert_eq!(results.titles().collect::<Vec<_>>(), ["Naruto", "Bleach"]);
        assert_eq!(results.get("Naruto").unwrap().id, "3");
    }

    #[test]
    fn episode_membership_is_string_exact() {
        let anime = AnimeDetail {
            id: "x".to_string(),
            title: "X".to_string(),
            available_episodes: HashMap::from([(
                TranslationType::Sub,
                HashSet::from(["1".to_string(), "2".to_string()]),
            )]),
        };
        assert!(anime.has_episode(TranslationType::Sub, "1"));
        assert!(!anime.has_episode(TranslationType::Sub, "01"));
        assert!(!anime.has_episode(TranslationType::Dub, "1"));
        assert_eq!(anime.episode_count(TranslationType::Sub), 2);
        assert_eq!(anime.episode_count(TranslationType::Dub), 0);
    }

    #[test]
    fn last_episode_number_ignores_non_numeric_keys() {
        let anime = AnimeDetail {
            id: "x".to_string(),
            title: "X".to_string(),
            available_episodes: HashMap::from([(
                TranslationType::Sub,
                HashSet::from([
                    "2".to_string(),
                    "12".to_string(),
                    "6.5".to_string(),
                    "OVA".to_string(),
                ]),
            )]),
        };
        assert_eq!(anime.last_episode_number(TranslationType::Sub), Some(12));
        assert_eq!(anime.last_episode_number(TranslationType::Dub), None);
    }

    #[test]
    fn translation_type_parses_case_insensitively() {
        assert_eq!("DUB".parse::<TranslationType>(), Ok(TranslationType::Dub));
        assert!("fansub".parse::<TranslationType>().is_err());
    }
}
