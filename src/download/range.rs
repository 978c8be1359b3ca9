//! 集数范围解析。
//!
//! 输入形如 `"start-end"`，两端按浮点解析后四舍六入五成双取整，得到左闭右开区间。

use std::ops::Range;

use super::models::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeRange {
    pub start: u64,
    pub end: u64,
}

impl EpisodeRange {
    /// 未指定范围时的默认区间 `[0, count)`。
    pub fn full(count: usize) -> Self {
        Self {
            start: 0,
            end: count as u64,
        }
    }

    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        let invalid = |reason: &str| PipelineError::InvalidRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = input.split('-').collect();
        let [start, end] = parts.as_slice() else {
            return Err(invalid("expected <start>-<end>"));
        };

        Ok(Self {
            start: parse_bound(start).map_err(|r| invalid(&r))?,
            end: parse_bound(end).map_err(|r| invalid(&r))?,
        })
    }

    /// 把右端收紧到 `limit`，左端不超过右端。
    pub fn clamp_end(self, limit: u64) -> Self {
        let end = self.end.min(limit);
        Self {
            start: self.start.min(end),
            end,
        }
    }

    pub fn iter(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

fn parse_bound(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("missing bound".to_string());
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{raw}' is not a finite number"));
    }
    let rounded = value.round_ties_even();
    if rounded < 0.0 {
        return Err(format!("'{raw}' is negative"));
    }
    Ok(rounded as u64)
}
