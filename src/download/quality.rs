//! 清晰度筛选。
//!
//! 规则：
//! 1. 先找与期望清晰度完全一致的链接（忽略大小写和结尾的 `p`，`1080` 等同 `1080p`）；
//! 2. 找不到且允许回退时，取分辨率数值最接近的链接（距离相同取靠前的）；
//!    没有任何可比较的数值时取第一个链接；
//! 3. 不允许回退则返回 None。

use std::sync::OnceLock;

use regex::Regex;

use crate::provider::StreamLink;

static RE_RESOLUTION: OnceLock<Regex> = OnceLock::new();

fn re_resolution() -> &'static Regex {
    RE_RESOLUTION.get_or_init(|| Regex::new(r"(\d{3,4})").expect("compile RE_RESOLUTION"))
}

fn normalize(quality: &str) -> String {
    quality.trim().to_ascii_lowercase().trim_end_matches('p').to_string()
}

fn resolution(quality: &str) -> Option<u32> {
    re_resolution()
        .captures(quality)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn filter_by_quality<'a>(
    requested: &str,
    links: &'a [StreamLink],
    fallback: bool,
) -> Option<&'a StreamLink> {
    let wanted = normalize(requested);
    if let Some(exact) = links.iter().find(|l| normalize(&l.quality) == wanted) {
        return Some(exact);
    }
    if !fallback {
        return None;
    }

    if let Some(target) = resolution(requested) {
        let nearest = links
            .iter()
            .filter_map(|l| resolution(&l.quality).map(|r| (r.abs_diff(target), l)))
            .min_by_key(|(distance, _)| *distance);
        if let Some((_, link)) = nearest {
            return Some(link);
        }
    }

    links.first()
}
