//! 搜索结果标题的选择：自动（相似度最高）或交互。

use super::models::PipelineError;
use crate::provider::SearchResults;
use crate::ui::Selector;

const TITLE_PROMPT: &str = "Please select title: ";

/// 与查询词最相似的标题；相似度相同保留靠前的标题。
pub fn best_title_match<'a>(results: &'a SearchResults, query: &str) -> Option<&'a str> {
    let query = query.trim().to_lowercase();
    let mut best: Option<(&str, f64)> = None;
    for title in results.titles() {
        let score = strsim::normalized_levenshtein(&title.trim().to_lowercase(), &query);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((title, score)),
        }
    }
    best.map(|(title, _)| title)
}

pub fn select_title(
    results: &SearchResults,
    query: &str,
    auto_select: bool,
    selector: &dyn Selector,
) -> Result<String, PipelineError> {
    if auto_select {
        return best_title_match(results, query)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::SearchFailed(query.to_string()));
    }

    let choices: Vec<String> = results.titles().map(str::to_string).collect();
    match selector.choose(&choices, TITLE_PROMPT)? {
        Some(title) if results.get(&title).is_some() => Ok(title),
        _ => Err(PipelineError::Cancelled),
    }
}
