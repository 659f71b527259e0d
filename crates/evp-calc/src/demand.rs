//! 充電需求估算
//!
//! 由行政區車隊規模推得區域需求，再依站點權重分攤至各站點，
//! 多期時依年成長率複利外推。

use evp_core::{DemandParams, District, Period, PlanningHorizon, Site, SiteId};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::fleet::FleetRegistry;

/// 需求估算器
#[derive(Debug, Clone)]
pub struct DemandEstimator {
    params: DemandParams,
    fleet: FleetRegistry,
}

impl DemandEstimator {
    /// 創建需求估算器
    pub fn new(params: &DemandParams) -> Self {
        Self {
            params: params.clone(),
            fleet: FleetRegistry::from_params(params),
        }
    }

    pub fn fleet(&self) -> &FleetRegistry {
        &self.fleet
    }

    /// 行政區每月公共充電需求（次數）
    pub fn district_base_demand(&self, district: &District) -> f64 {
        let fleet = self.fleet.fleet_of(district) as f64;
        fleet
            * self.params.electrification_fraction
            * self.params.charges_per_month
            * self.params.public_fraction
    }

    /// 站點類型權重
    pub fn type_weight(&self, site_type: &str) -> f64 {
        self.params
            .type_weights
            .get(site_type)
            .copied()
            .unwrap_or(self.params.default_type_weight)
    }

    /// 站點權重 w
    pub fn site_weight(&self, site: &Site) -> f64 {
        let mut weight = 1.0;
        if site.existing_chargers > 0 {
            weight *= self.params.existing_boost;
        }
        if let Some(cap) = site.max_chargers.filter(|cap| *cap > 0) {
            weight *= 1.0 + self.params.capacity_weight * f64::from(cap);
        }
        weight * self.type_weight(&site.site_type)
    }

    /// 站點分攤比例
    pub fn demand_fraction(&self, site: &Site) -> f64 {
        self.site_weight(site) / (self.params.avg_sites_per_district * self.params.avg_weight)
    }

    /// 單期每月需求估算
    pub fn estimate(&self, site: &Site, district: &District) -> u32 {
        if self.params.use_precomputed_demand {
            if let Some(hint) = site.demand_hint {
                return hint;
            }
        }

        let raw = self.district_base_demand(district)
            * self.demand_fraction(site)
            * self.params.conservatism;
        let rounded = raw.round().clamp(0.0, f64::from(u32::MAX)) as u32;
        rounded.max(self.params.min_estimate)
    }

    /// 第 m 期相對第 1 期的需求倍數
    pub fn growth_factor(&self, site: &Site, period: Period) -> f64 {
        let months_elapsed = f64::from(period.index().saturating_sub(1));
        let growth = (1.0 + self.params.annual_growth).powf(months_elapsed / 12.0);
        if self.params.growth_type_factors_enabled {
            let factor = self
                .params
                .growth_type_factors
                .get(&site.site_type)
                .copied()
                .unwrap_or(self.params.default_growth_type_factor);
            growth * factor
        } else {
            growth
        }
    }

    /// 站點整個時界的需求序列
    pub fn project(&self, site: &Site, district: &District, horizon: &PlanningHorizon) -> Vec<u32> {
        let base = f64::from(self.estimate(site, district));
        horizon
            .periods()
            .map(|period| {
                // 吸收浮點誤差，避免 115 變成 114.999…
                let value = (base * self.growth_factor(site, period) + 1e-9).floor();
                value.clamp(0.0, f64::from(u32::MAX)) as u32
            })
            .collect()
    }

    /// 計算所有站點的需求表
    pub fn build_table(&self, districts: &[District], horizon: &PlanningHorizon) -> DemandTable {
        tracing::info!(
            "開始需求估算：行政區 {} 個，月份 {}",
            districts.len(),
            horizon.months
        );

        let mut table = DemandTable::new(horizon.months);
        for district in districts {
            for site in &district.sites {
                table.insert(&district.id, &site.id, self.project(site, district, horizon));
            }
            tracing::debug!(
                "行政區 {}: 站點 {}，第 1 期需求 {}",
                district.id,
                district.site_count(),
                table.district_total(&district.id, Period::new(1))
            );
        }

        tracing::info!("需求估算完成：第 1 期總需求 {}", table.period_total(Period::new(1)));
        table
    }
}

/// 需求表：d[行政區][站點][期間]
#[derive(Debug, Clone, Default, Serialize)]
pub struct DemandTable {
    months: u32,
    entries: BTreeMap<String, BTreeMap<SiteId, Vec<u32>>>,
}

/// 需求表中的一列（輸出用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandRow {
    pub district: String,
    pub site_id: String,
    pub period: u32,
    pub demand: u32,
}

impl DemandTable {
    pub fn new(months: u32) -> Self {
        Self {
            months,
            entries: BTreeMap::new(),
        }
    }

    pub fn months(&self) -> u32 {
        self.months
    }

    /// 寫入站點需求序列（長度不足補 0，超出截斷）
    pub fn insert(&mut self, district: &str, site: &SiteId, mut series: Vec<u32>) {
        series.resize(self.months as usize, 0);
        self.entries
            .entry(district.to_string())
            .or_default()
            .insert(site.clone(), series);
    }

    /// 站點需求序列
    pub fn series(&self, district: &str, site: &SiteId) -> Option<&[u32]> {
        self.entries
            .get(district)
            .and_then(|sites| sites.get(site))
            .map(Vec::as_slice)
    }

    /// 站點某期需求（未知站點為 0）
    pub fn site_demand(&self, district: &str, site: &SiteId, period: Period) -> u32 {
        self.series(district, site)
            .and_then(|series| series.get(period.offset()))
            .copied()
            .unwrap_or(0)
    }

    /// 行政區某期總需求 D
    pub fn district_total(&self, district: &str, period: Period) -> u64 {
        self.entries
            .get(district)
            .map(|sites| {
                sites
                    .values()
                    .filter_map(|series| series.get(period.offset()))
                    .map(|d| u64::from(*d))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// 全部行政區某期總需求
    pub fn period_total(&self, period: Period) -> u64 {
        self.entries
            .keys()
            .map(|district| self.district_total(district, period))
            .sum()
    }

    /// 攤平為輸出列
    pub fn rows(&self) -> Vec<DemandRow> {
        let mut rows = Vec::new();
        for (district, sites) in &self.entries {
            for (site, series) in sites {
                for (offset, demand) in series.iter().enumerate() {
                    rows.push(DemandRow {
                        district: district.clone(),
                        site_id: site.to_string(),
                        period: offset as u32 + 1,
                        demand: *demand,
                    });
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evp_core::{GeoPoint, PlanConfig};
    use proptest::prelude::*;
    use rstest::rstest;

    fn horizon(months: u32) -> PlanningHorizon {
        PlanConfig::default().with_months(months).planning_horizon().unwrap()
    }

    fn point() -> GeoPoint {
        GeoPoint::new(-70.6, -33.4)
    }

    #[test]
    fn test_district_base_demand() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        // 185000 × 0.40 × 4.0 × 0.60
        let base = estimator.district_base_demand(&District::new("Maipú"));
        assert!((base - 177_600.0).abs() < 1e-6);
        // 未知行政區使用預設 30000
        let base = estimator.district_base_demand(&District::new("Atlantis"));
        assert!((base - 28_800.0).abs() < 1e-6);
    }

    #[rstest]
    #[case("charging_station", 2.0)]
    #[case("car_wash", 0.4)]
    #[case("lighthouse", 0.5)]
    fn test_type_weight(#[case] site_type: &str, #[case] expected: f64) {
        let estimator = DemandEstimator::new(&DemandParams::default());
        assert_eq!(estimator.type_weight(site_type), expected);
    }

    #[test]
    fn test_site_weight_combines_factors() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        let site = Site::new("S1", "mall", point())
            .with_existing_chargers(2)
            .with_max_chargers(10);
        // 2.5 × (1 + 0.05 × 10) × 1.8
        assert!((estimator.site_weight(&site) - 6.75).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_example() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        let district = District::new("Maipú");
        let site = Site::new("S1", "mall", point())
            .with_existing_chargers(2)
            .with_max_chargers(10);
        // 177600 × 6.75 / 180 × 0.3 = 1998
        assert_eq!(estimator.estimate(&site, &district), 1998);
    }

    #[test]
    fn test_estimate_floor_and_hint() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        let tiny = District::new("Pirque").with_fleet_size(10);
        let site = Site::new("S1", "car_wash", point());
        assert_eq!(estimator.estimate(&site, &tiny), 1);

        let hinted = site.clone().with_demand_hint(0);
        assert_eq!(estimator.estimate(&hinted, &tiny), 0);

        let mut params = DemandParams::default();
        params.use_precomputed_demand = false;
        let estimator = DemandEstimator::new(&params);
        assert_eq!(estimator.estimate(&hinted, &tiny), 1);
    }

    #[test]
    fn test_projection_growth() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        let district = District::new("Maipú");
        let site = Site::new("S1", "parking", point()).with_demand_hint(100);
        let horizon = horizon(13);

        let series = estimator.project(&site, &district, &horizon);
        assert_eq!(series.len(), 13);
        assert_eq!(series[0], 100);
        // 一年後成長 8%
        assert_eq!(series[12], 108);
        assert!(series.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_projection_type_factor() {
        let mut params = DemandParams::default();
        params.growth_type_factors_enabled = true;
        let estimator = DemandEstimator::new(&params);
        let district = District::new("Maipú");
        let site = Site::new("S1", "hospital", point()).with_demand_hint(100);
        let horizon = horizon(13);

        let series = estimator.project(&site, &district, &horizon);
        assert_eq!(series[0], 180);
    }

    #[test]
    fn test_table_totals() {
        let estimator = DemandEstimator::new(&DemandParams::default());
        let district = District::new("Macul").with_sites(vec![
            Site::new("A", "mall", point()).with_demand_hint(40),
            Site::new("B", "fuel", point()).with_demand_hint(60),
        ]);
        let empty = District::new("Pirque");
        let horizon = horizon(2);

        let table = estimator.build_table(&[district, empty], &horizon);
        assert_eq!(table.district_total("macul", Period::new(1)), 100);
        assert_eq!(table.district_total("pirque", Period::new(1)), 0);
        assert_eq!(table.site_demand("macul", &SiteId::new("B"), Period::new(1)), 60);
        assert_eq!(table.site_demand("macul", &SiteId::new("Z"), Period::new(1)), 0);
        assert_eq!(table.rows().len(), 4);
    }

    proptest! {
        #[test]
        fn prop_estimate_is_deterministic_and_floored(
            fleet in 0u64..500_000,
            existing in 0u32..20,
            cap in proptest::option::of(0u32..60),
            type_index in 0usize..14,
        ) {
            let types = [
                "charging_station", "mall", "supermarket", "fuel", "parking", "university",
                "stadium", "hospital", "office", "commercial", "retail", "car_wash", "other",
                "unknown_kind",
            ];
            let estimator = DemandEstimator::new(&DemandParams::default());
            let district = District::new("X").with_fleet_size(fleet);
            let mut site = Site::new("S", types[type_index], point()).with_existing_chargers(existing);
            site.max_chargers = cap;

            let first = estimator.estimate(&site, &district);
            let second = DemandEstimator::new(&DemandParams::default()).estimate(&site, &district);
            prop_assert_eq!(first, second);
            prop_assert!(first >= 1);
        }
    }
}
