//! 規劃期間模型（月份索引 1..=M）

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{PlanError, Result};

/// 規劃月份（1 起算）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(u32);

impl Period {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// 月份索引（1 起算）
    pub fn index(&self) -> u32 {
        self.0
    }

    /// 陣列偏移（0 起算）
    pub fn offset(&self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 規劃時界
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningHorizon {
    /// 月份數 M
    pub months: u32,

    /// 第 1 期所在月份（取該月第一天）
    pub start: NaiveDate,
}

impl PlanningHorizon {
    /// 創建規劃時界
    pub fn new(months: u32, start: NaiveDate) -> Result<Self> {
        if months == 0 {
            return Err(PlanError::Config("規劃月份數必須至少為 1".to_string()));
        }
        let start = start
            .with_day(1)
            .ok_or_else(|| PlanError::Config(format!("無效的起始日期: {start}")))?;
        Ok(Self { months, start })
    }

    /// 所有期間
    pub fn periods(&self) -> impl Iterator<Item = Period> {
        (1..=self.months).map(Period::new)
    }

    /// 最終期間 M
    pub fn last(&self) -> Period {
        Period::new(self.months)
    }

    pub fn len(&self) -> usize {
        self.months as usize
    }

    pub fn is_empty(&self) -> bool {
        self.months == 0
    }

    /// 期間對應的月份第一天
    pub fn date_of(&self, period: Period) -> Option<NaiveDate> {
        self.start
            .checked_add_months(Months::new(period.index().saturating_sub(1)))
    }

    /// 期間標籤（YYYY-MM）
    pub fn label(&self, period: Period) -> String {
        match self.date_of(period) {
            Some(date) => date.format("%Y-%m").to_string(),
            None => format!("m{}", period.index()),
        }
    }
}
