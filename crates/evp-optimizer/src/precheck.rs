//! 求解前檢查
//!
//! 在建模前找出明顯的資料與預算問題。結果只作為警告，不中止規劃。

use evp_calc::DemandTable;
use evp_core::{District, PlanConfig, PlanWarning, PlanningHorizon, WarningSeverity};
use rust_decimal::Decimal;

/// 求解前檢查器
pub struct PreSolveCheck<'a> {
    config: &'a PlanConfig,
    horizon: &'a PlanningHorizon,
}

impl<'a> PreSolveCheck<'a> {
    pub fn new(config: &'a PlanConfig, horizon: &'a PlanningHorizon) -> Self {
        Self { config, horizon }
    }

    /// 執行全部檢查
    pub fn run(&self, districts: &[District], demand: &DemandTable) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();
        self.check_sites(districts, &mut warnings);
        self.check_budget(districts, &mut warnings);
        self.check_min_coverage(districts, demand, &mut warnings);

        for warning in &warnings {
            match warning.severity {
                WarningSeverity::Info => tracing::info!("{}", warning),
                WarningSeverity::Warning => tracing::warn!("{}", warning),
                WarningSeverity::Error => tracing::error!("{}", warning),
            }
        }
        warnings
    }

    fn check_sites(&self, districts: &[District], warnings: &mut Vec<PlanWarning>) {
        let infra = &self.config.infrastructure;
        for district in districts {
            if district.is_empty() {
                warnings.push(PlanWarning::info(&district.id, "行政區沒有可用站點，彙總將為零"));
            }
            for duplicate in district.duplicate_site_ids() {
                warnings.push(PlanWarning::error(
                    format!("{}/{}", district.id, duplicate),
                    "站點ID在行政區內重複，無法建模",
                ));
            }
            for site in &district.sites {
                let subject = format!("{}/{}", district.id, site.id);
                if site.exceeds_charger_cap() {
                    let effective = site.effective_max_chargers(
                        infra.default_charger_cap_for(&site.site_type),
                        infra.capacity_headroom,
                    );
                    warnings.push(PlanWarning::warning(
                        subject.clone(),
                        format!(
                            "既有充電樁 {} 超過上限 {}，有效上限放寬為 {}",
                            site.existing_chargers,
                            site.max_chargers.unwrap_or_default(),
                            effective
                        ),
                    ));
                }
                if site.exceeds_panel_cap() {
                    let effective =
                        site.effective_max_panels(infra.default_max_panels, infra.capacity_headroom);
                    warnings.push(PlanWarning::warning(
                        subject,
                        format!(
                            "既有太陽能板 {} 超過上限 {}，有效上限放寬為 {}",
                            site.existing_panels,
                            site.max_panels.unwrap_or_default(),
                            effective
                        ),
                    ));
                }
            }
        }
    }

    /// 預算可行性的下界估計
    fn check_budget(&self, districts: &[District], warnings: &mut Vec<PlanWarning>) {
        let costs = &self.config.costs;
        let infra = &self.config.infrastructure;
        let months = self.horizon.months;

        let existing_chargers: u64 = districts.iter().map(District::existing_chargers).sum();
        let existing_panels: u64 = districts
            .iter()
            .flat_map(|d| d.sites.iter())
            .map(|s| u64::from(s.existing_panels))
            .sum();
        let committed = costs.committed_upkeep(existing_chargers, existing_panels, months);

        let available = if costs.exempt_existing_upkeep {
            costs.budget
        } else {
            if committed > costs.budget {
                warnings.push(PlanWarning::error(
                    "budget",
                    format!("既有設施維護費 {committed} 已超過預算 {}，模型將不可行", costs.budget),
                ));
            }
            (costs.budget - committed).max(Decimal::ZERO)
        };

        // 新站點：無既有充電樁且容量至少 1
        let candidates = districts
            .iter()
            .flat_map(|d| d.sites.iter())
            .filter(|s| {
                !s.q()
                    && s.effective_max_chargers(
                        infra.default_charger_cap_for(&s.site_type),
                        infra.capacity_headroom,
                    ) > 0
            })
            .count();
        if candidates == 0 {
            return;
        }

        // 最晚一期才啟用的單站成本：啟用 + 一支充電樁 + 一個月維護
        let cheapest = costs.activation + costs.charger_install + costs.charger_upkeep;
        if cheapest > available {
            warnings.push(PlanWarning::warning(
                "budget",
                format!("可用預算 {available} 不足以啟用任何新站點（最低 {cheapest}）"),
            ));
        }

        let full = (costs.activation + costs.charger_install * Decimal::from(2)) * Decimal::from(candidates);
        if full > available {
            warnings.push(PlanWarning::info(
                "budget",
                format!("啟用全部 {candidates} 個候選站點（各 2 支充電樁）需 {full}，超過可用預算 {available}"),
            ));
        }
    }

    /// 最低覆蓋率是否可能達成
    fn check_min_coverage(&self, districts: &[District], demand: &DemandTable, warnings: &mut Vec<PlanWarning>) {
        let Some(ceiling) = self.config.equity.min_coverage_ceiling else {
            return;
        };
        let infra = &self.config.infrastructure;
        let last = self.horizon.last();

        for district in districts {
            let total = demand.district_total(&district.id, last) as f64;
            if total == 0.0 {
                continue;
            }
            let required = (1.0 - ceiling) * total;
            let capacity: f64 = district
                .sites
                .iter()
                .map(|s| {
                    let cap = s.effective_max_chargers(
                        infra.default_charger_cap_for(&s.site_type),
                        infra.capacity_headroom,
                    );
                    let site_demand = f64::from(demand.site_demand(&district.id, &s.id, last));
                    (f64::from(cap) * infra.clients_per_charger).min(site_demand)
                })
                .sum();
            if capacity < required {
                warnings.push(PlanWarning::error(
                    &district.id,
                    format!("全部站點滿載可服務 {capacity:.0}，低於最低覆蓋所需 {required:.0}，模型將不可行"),
                ));
            }
        }
    }
}
