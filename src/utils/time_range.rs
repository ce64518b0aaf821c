//! 查询时间范围
//!
//! 支持 RFC3339 与 `YYYY-MM-DD`。仅日期的结束时间按当天 23:59:59.999 处理，
//! 缺省的一端视为无界。

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PrivalyticsError, Result};

const UNBOUNDED_START: &str = "min";
const UNBOUNDED_END: &str = "max";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// 解析查询参数，格式错误或 start > end 时返回 Validation 错误
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(parse_bound(s, false).ok_or_else(|| {
                PrivalyticsError::validation(format!(
                    "Invalid startDate '{}'. Supported formats: RFC3339 or YYYY-MM-DD",
                    s
                ))
            })?),
            None => None,
        };
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(parse_bound(s, true).ok_or_else(|| {
                PrivalyticsError::validation(format!(
                    "Invalid endDate '{}'. Supported formats: RFC3339 or YYYY-MM-DD",
                    s
                ))
            })?),
            None => None,
        };

        if let (Some(s), Some(e)) = (start, end)
            && s > e
        {
            return Err(PrivalyticsError::validation(
                "startDate must not be later than endDate",
            ));
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| *ts >= s) && self.end.is_none_or(|e| *ts <= e)
    }

    /// 用于缓存键的确定性表示，无界端使用哨兵
    pub fn cache_token(&self) -> String {
        let start = self
            .start
            .map(|s| s.timestamp_millis().to_string())
            .unwrap_or_else(|| UNBOUNDED_START.to_string());
        let end = self
            .end
            .map(|e| e.timestamp_millis().to_string())
            .unwrap_or_else(|| UNBOUNDED_END.to_string());
        format!("{}:{}", start, end)
    }
}

fn parse_bound(s: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            let time = if end_of_day {
                NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
            } else {
                NaiveTime::MIN
            };
            Some(date.and_time(time).and_utc())
        })
}
