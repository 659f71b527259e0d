//! 模型變數索引

use crate::problem::VarId;

/// 站點單期變數
#[derive(Debug, Clone, Copy)]
pub struct SitePeriodVars {
    /// 本期新啟用 y
    pub activate: VarId,
    /// 啟用狀態 a
    pub active: VarId,
    /// 本期新增充電樁 x
    pub new_chargers: VarId,
    /// 本期新增太陽能板 z
    pub new_panels: VarId,
    /// 累計充電樁 X
    pub chargers: VarId,
    /// 累計太陽能板 Z
    pub panels: VarId,
    pub demand_served: VarId,
    pub demand_unserved: VarId,
    /// 太陽能供電 s
    pub solar: VarId,
    /// 電網供電 r
    pub grid: VarId,
    /// 總耗電 e
    pub energy: VarId,
    /// 慢充/快充數量（啟用組合時）
    pub mix: Option<(VarId, VarId)>,
}

/// 站點全部期間的變數
#[derive(Debug, Clone)]
pub struct SiteVars {
    /// 行政區索引
    pub district: usize,
    /// 行政區內的站點索引
    pub site: usize,
    /// 有效充電樁上限
    pub max_chargers: u32,
    /// 有效太陽能板上限
    pub max_panels: u32,
    pub periods: Vec<SitePeriodVars>,
}

/// 行政區單期變數
#[derive(Debug, Clone, Copy)]
pub struct DistrictPeriodVars {
    /// 滿足需求 S
    pub served: VarId,
    /// 未滿足比例 phi
    pub phi: VarId,
    /// phi × S 的 McCormick 代理 psi
    pub psi: VarId,
    /// 總需求 D（常數）
    pub demand: u64,
}

/// 行政區全部期間的變數
#[derive(Debug, Clone)]
pub struct DistrictVars {
    pub district: usize,
    pub periods: Vec<DistrictPeriodVars>,
}

/// 模型變數總索引（依行政區、站點的輸入順序）
#[derive(Debug, Clone, Default)]
pub struct ModelIndex {
    pub sites: Vec<SiteVars>,
    pub districts: Vec<DistrictVars>,
}

impl ModelIndex {
    /// 某行政區的站點變數
    pub fn sites_of(&self, district: usize) -> impl Iterator<Item = &SiteVars> {
        self.sites.iter().filter(move |s| s.district == district)
    }

    pub fn site(&self, district: usize, site: usize) -> Option<&SiteVars> {
        self.sites
            .iter()
            .find(|s| s.district == district && s.site == site)
    }
}
