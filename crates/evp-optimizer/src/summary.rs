//! 規劃結果彙總：行政區、全域、成本、公平性與逐月演進

use evp_core::PlanConfig;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::extract::PlanSolution;

/// 覆蓋率直方圖的區間寬度（百分點）
const HISTOGRAM_BIN_WIDTH: f64 = 20.0;

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// 行政區彙總（最終期）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictSummary {
    pub comuna: String,
    pub name: String,
    pub sites: usize,
    pub active_sites: usize,
    pub activated_sites: usize,
    pub chargers_existing: u64,
    pub chargers_new: u64,
    pub chargers_total: u64,
    pub panels_existing: u64,
    pub panels_new: u64,
    pub panels_total: u64,
    pub demand_total: u64,
    pub demand_satisfied: u64,
    pub demand_unsatisfied: u64,
    pub coverage_pct: f64,
    pub solar_kwh: f64,
    pub grid_kwh: f64,
    pub renewable_pct: f64,
    pub phi: f64,
}

/// 全域彙總
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSummary {
    pub districts: usize,
    pub sites: usize,
    pub active_sites: usize,
    pub activated_sites: usize,
    pub chargers_total: u64,
    pub chargers_new: u64,
    pub panels_total: u64,
    pub panels_new: u64,
    pub demand_total: u64,
    pub demand_satisfied: u64,
    pub coverage_pct: f64,
    pub solar_kwh: f64,
    pub grid_kwh: f64,
    pub solar_pct: f64,
    /// 整個時界的太陽能供電
    pub solar_kwh_horizon: f64,
    /// 整個時界避免的 CO2（公斤）
    pub co2_avoided_kg: f64,
}

/// 成本明細（整個時界）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub activation: Decimal,
    pub charger_install: Decimal,
    pub charger_upkeep: Decimal,
    pub panel_install: Decimal,
    pub panel_upkeep: Decimal,
    pub grid_energy: Decimal,
    pub total: Decimal,
    /// 既有設施的維護費
    pub committed_upkeep: Decimal,
    /// 計入預算的金額
    pub budgeted_total: Decimal,
    pub budget: Decimal,
}

impl CostBreakdown {
    /// 是否在預算內（含容差）
    pub fn within_budget(&self, tolerance: Decimal) -> bool {
        self.budgeted_total <= self.budget + tolerance
    }

    /// 預算使用率（%）
    pub fn budget_utilization_pct(&self) -> Decimal {
        if self.budget.is_zero() {
            Decimal::ZERO
        } else {
            (self.budgeted_total / self.budget * Decimal::ONE_HUNDRED).round_dp(2)
        }
    }
}

/// 行政區覆蓋率的公平性統計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityStats {
    /// 需求大於 0 的行政區數
    pub districts: usize,
    pub mean_pct: f64,
    pub std_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
    pub range_pct: f64,
    /// [0,20), [20,40), [40,60), [60,80), [80,100]
    pub histogram: [usize; 5],
}

impl EquityStats {
    pub fn from_coverages(coverages: &[f64]) -> Self {
        if coverages.is_empty() {
            return Self {
                districts: 0,
                mean_pct: 0.0,
                std_pct: 0.0,
                min_pct: 0.0,
                max_pct: 0.0,
                range_pct: 0.0,
                histogram: [0; 5],
            };
        }

        let n = coverages.len() as f64;
        let mean = coverages.iter().sum::<f64>() / n;
        let variance = coverages.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        let min = coverages.iter().copied().fold(f64::INFINITY, f64::min);
        let max = coverages.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut histogram = [0; 5];
        for coverage in coverages {
            let bin = ((coverage / HISTOGRAM_BIN_WIDTH).floor().max(0.0) as usize).min(4);
            histogram[bin] += 1;
        }

        Self {
            districts: coverages.len(),
            mean_pct: mean,
            std_pct: variance.sqrt(),
            min_pct: min,
            max_pct: max,
            range_pct: max - min,
            histogram,
        }
    }
}

/// 逐月演進
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineRow {
    pub period: u32,
    pub label: String,
    pub active_sites: usize,
    pub activations: usize,
    pub chargers_total: u64,
    pub panels_total: u64,
    pub demand_total: u64,
    pub demand_satisfied: u64,
    pub coverage_pct: f64,
    pub solar_kwh: f64,
    pub grid_kwh: f64,
}

/// 完整彙總
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub global: GlobalSummary,
    pub districts: Vec<DistrictSummary>,
    pub costs: CostBreakdown,
    pub equity: EquityStats,
    pub timeline: Vec<TimelineRow>,
}

impl PlanSummary {
    /// 由規劃解計算彙總
    pub fn from_solution(solution: &PlanSolution, config: &PlanConfig, committed_upkeep: Decimal) -> Self {
        let districts = district_summaries(solution);
        let global = global_summary(solution, &districts, config);
        let costs = cost_breakdown(solution, config, committed_upkeep);
        let coverages: Vec<f64> = districts
            .iter()
            .filter(|d| d.demand_total > 0)
            .map(|d| d.coverage_pct)
            .collect();
        let equity = EquityStats::from_coverages(&coverages);
        let timeline = timeline(solution);

        Self {
            global,
            districts,
            costs,
            equity,
            timeline,
        }
    }

    /// 文字報表
    pub fn render(&self) -> String {
        let g = &self.global;
        let c = &self.costs;
        let e = &self.equity;
        let mut out = String::new();
        out.push_str("=== 規劃摘要 ===\n");
        out.push_str(&format!(
            "行政區 {}，站點 {}（啟用中 {}，新啟用 {}）\n",
            g.districts, g.sites, g.active_sites, g.activated_sites
        ));
        out.push_str(&format!(
            "充電樁 {}（新增 {}），太陽能板 {}（新增 {}）\n",
            g.chargers_total, g.chargers_new, g.panels_total, g.panels_new
        ));
        out.push_str(&format!(
            "需求 {}，滿足 {}（覆蓋率 {:.1}%）\n",
            g.demand_total, g.demand_satisfied, g.coverage_pct
        ));
        out.push_str(&format!(
            "太陽能 {:.0} kWh，電網 {:.0} kWh（再生比例 {:.1}%），時界內避免 CO2 {:.0} kg\n",
            g.solar_kwh, g.grid_kwh, g.solar_pct, g.co2_avoided_kg
        ));
        out.push_str("--- 成本 ---\n");
        out.push_str(&format!("啟用: {}\n", c.activation));
        out.push_str(&format!("充電樁安裝: {}\n", c.charger_install));
        out.push_str(&format!("充電樁維護: {}\n", c.charger_upkeep));
        out.push_str(&format!("太陽能板安裝: {}\n", c.panel_install));
        out.push_str(&format!("太陽能板維護: {}\n", c.panel_upkeep));
        out.push_str(&format!("電網購電: {}\n", c.grid_energy));
        out.push_str(&format!(
            "合計: {}（計入預算 {}，預算 {}，使用率 {}%）\n",
            c.total,
            c.budgeted_total,
            c.budget,
            c.budget_utilization_pct()
        ));
        out.push_str("--- 公平性 ---\n");
        out.push_str(&format!(
            "覆蓋率平均 {:.1}%，標準差 {:.1}，最低 {:.1}%，最高 {:.1}%\n",
            e.mean_pct, e.std_pct, e.min_pct, e.max_pct
        ));
        out.push_str(&format!("分布 {:?}\n", e.histogram));
        out
    }
}

fn district_summaries(solution: &PlanSolution) -> Vec<DistrictSummary> {
    solution
        .districts
        .iter()
        .map(|district| {
            let mut summary = DistrictSummary {
                comuna: district.district.clone(),
                name: district.name.clone(),
                sites: 0,
                active_sites: 0,
                activated_sites: 0,
                chargers_existing: 0,
                chargers_new: 0,
                chargers_total: 0,
                panels_existing: 0,
                panels_new: 0,
                panels_total: 0,
                demand_total: 0,
                demand_satisfied: 0,
                demand_unsatisfied: 0,
                coverage_pct: 0.0,
                solar_kwh: 0.0,
                grid_kwh: 0.0,
                renewable_pct: 0.0,
                phi: district.final_period().map(|p| p.phi).unwrap_or(0.0),
            };

            for site in solution.sites_in(&district.district) {
                let record = site.record();
                summary.sites += 1;
                summary.active_sites += usize::from(record.active);
                summary.activated_sites += usize::from(record.activated);
                summary.chargers_existing += u64::from(record.existing_chargers);
                summary.chargers_new += u64::from(record.chargers_new);
                summary.chargers_total += u64::from(record.chargers_total);
                summary.panels_existing += u64::from(record.existing_panels);
                summary.panels_new += u64::from(record.panels_new);
                summary.panels_total += u64::from(record.panels_total);
                summary.demand_total += u64::from(record.demand_estimated);
                summary.demand_satisfied += u64::from(record.demand_satisfied);
                summary.demand_unsatisfied += u64::from(record.demand_unsatisfied);
                summary.solar_kwh += record.solar_used_kwh;
                summary.grid_kwh += record.grid_used_kwh;
            }

            summary.coverage_pct = percent(summary.demand_satisfied as f64, summary.demand_total as f64);
            summary.renewable_pct = percent(summary.solar_kwh, summary.solar_kwh + summary.grid_kwh);
            summary
        })
        .collect()
}

fn global_summary(solution: &PlanSolution, districts: &[DistrictSummary], config: &PlanConfig) -> GlobalSummary {
    let solar_kwh_horizon: f64 = solution
        .sites
        .iter()
        .flat_map(|s| s.periods.iter())
        .map(|p| p.solar_kwh)
        .sum();

    let mut global = GlobalSummary {
        districts: districts.len(),
        sites: 0,
        active_sites: 0,
        activated_sites: 0,
        chargers_total: 0,
        chargers_new: 0,
        panels_total: 0,
        panels_new: 0,
        demand_total: 0,
        demand_satisfied: 0,
        coverage_pct: 0.0,
        solar_kwh: 0.0,
        grid_kwh: 0.0,
        solar_pct: 0.0,
        solar_kwh_horizon,
        co2_avoided_kg: solar_kwh_horizon * config.objective.co2_kg_per_kwh,
    };
    for d in districts {
        global.sites += d.sites;
        global.active_sites += d.active_sites;
        global.activated_sites += d.activated_sites;
        global.chargers_total += d.chargers_total;
        global.chargers_new += d.chargers_new;
        global.panels_total += d.panels_total;
        global.panels_new += d.panels_new;
        global.demand_total += d.demand_total;
        global.demand_satisfied += d.demand_satisfied;
        global.solar_kwh += d.solar_kwh;
        global.grid_kwh += d.grid_kwh;
    }
    global.coverage_pct = percent(global.demand_satisfied as f64, global.demand_total as f64);
    global.solar_pct = percent(global.solar_kwh, global.solar_kwh + global.grid_kwh);
    global
}

fn cost_breakdown(solution: &PlanSolution, config: &PlanConfig, committed_upkeep: Decimal) -> CostBreakdown {
    let costs = &config.costs;
    let mut activations = 0u64;
    let mut new_chargers = 0u64;
    let mut charger_months = 0u64;
    let mut new_panels = 0u64;
    let mut panel_months = 0u64;
    let mut grid_kwh = 0.0;

    for site in &solution.sites {
        for p in &site.periods {
            activations += u64::from(p.activated_now);
            new_chargers += u64::from(p.chargers_new);
            charger_months += u64::from(p.chargers_total);
            new_panels += u64::from(p.panels_new);
            panel_months += u64::from(p.panels_total);
            grid_kwh += p.grid_kwh;
        }
    }

    let activation = costs.activation * Decimal::from(activations);
    let charger_install = costs.charger_install * Decimal::from(new_chargers);
    let charger_upkeep = costs.charger_upkeep * Decimal::from(charger_months);
    let panel_install = costs.panel_install * Decimal::from(new_panels);
    let panel_upkeep = costs.panel_upkeep * Decimal::from(panel_months);
    let grid_energy = (costs.grid_price_per_kwh * Decimal::from_f64(grid_kwh).unwrap_or_default()).round_dp(2);
    let total = activation + charger_install + charger_upkeep + panel_install + panel_upkeep + grid_energy;
    let budgeted_total = if costs.exempt_existing_upkeep {
        total - committed_upkeep
    } else {
        total
    };

    CostBreakdown {
        activation,
        charger_install,
        charger_upkeep,
        panel_install,
        panel_upkeep,
        grid_energy,
        total,
        committed_upkeep,
        budgeted_total,
        budget: costs.budget,
    }
}

fn timeline(solution: &PlanSolution) -> Vec<TimelineRow> {
    let months = solution
        .districts
        .first()
        .map(|d| d.periods.len())
        .unwrap_or(0);

    (0..months)
        .map(|offset| {
            let mut row = TimelineRow {
                period: offset as u32 + 1,
                label: String::new(),
                active_sites: 0,
                activations: 0,
                chargers_total: 0,
                panels_total: 0,
                demand_total: 0,
                demand_satisfied: 0,
                coverage_pct: 0.0,
                solar_kwh: 0.0,
                grid_kwh: 0.0,
            };
            for site in &solution.sites {
                let Some(p) = site.periods.get(offset) else {
                    continue;
                };
                if row.label.is_empty() {
                    row.label = p.label.clone();
                }
                row.active_sites += usize::from(p.active);
                row.activations += usize::from(p.activated_now);
                row.chargers_total += u64::from(p.chargers_total);
                row.panels_total += u64::from(p.panels_total);
                row.solar_kwh += p.solar_kwh;
                row.grid_kwh += p.grid_kwh;
            }
            for district in &solution.districts {
                if let Some(p) = district.periods.get(offset) {
                    row.demand_total += p.demand;
                    row.demand_satisfied += p.served;
                }
            }
            row.coverage_pct = percent(row.demand_satisfied as f64, row.demand_total as f64);
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DistrictPeriodOutcome, DistrictPlan, SitePeriodDecision, SitePlan};
    use evp_core::GeoPoint;
    use rstest::rstest;

    fn decision(period: u32, activated_now: bool, chargers: u32, served: u32, demand: u32, solar: f64, grid: f64) -> SitePeriodDecision {
        SitePeriodDecision {
            period,
            label: format!("2025-0{period}"),
            activated_now,
            active: chargers > 0,
            chargers_new: if activated_now { chargers } else { 0 },
            chargers_total: chargers,
            panels_new: 0,
            panels_total: 2,
            demand_estimated: demand,
            demand_served: served,
            demand_unserved: demand - served,
            solar_kwh: solar,
            grid_kwh: grid,
            slow_chargers: None,
            fast_chargers: None,
        }
    }

    fn solution() -> PlanSolution {
        let site = SitePlan {
            district: "macul".to_string(),
            district_name: "Macul".to_string(),
            site_id: "A".to_string(),
            site_name: None,
            site_type: "mall".to_string(),
            location: GeoPoint::new(-70.6, -33.4),
            existing_chargers: 0,
            existing_panels: 2,
            max_chargers: 10,
            max_panels: 10,
            distance_to_existing_m: None,
            periods: vec![
                decision(1, false, 0, 0, 100, 0.0, 0.0),
                decision(2, true, 2, 100, 100, 112.5, 2887.5),
            ],
        };
        PlanSolution {
            objective: 0.0,
            sites: vec![site],
            districts: vec![
                DistrictPlan {
                    district: "macul".to_string(),
                    name: "Macul".to_string(),
                    periods: vec![
                        DistrictPeriodOutcome { period: 1, demand: 100, served: 0, phi: 1.0, psi: 0.0 },
                        DistrictPeriodOutcome { period: 2, demand: 100, served: 100, phi: 0.0, psi: 0.0 },
                    ],
                },
                DistrictPlan {
                    district: "pirque".to_string(),
                    name: "Pirque".to_string(),
                    periods: vec![
                        DistrictPeriodOutcome { period: 1, demand: 0, served: 0, phi: 0.0, psi: 0.0 },
                        DistrictPeriodOutcome { period: 2, demand: 0, served: 0, phi: 0.0, psi: 0.0 },
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_district_summaries() {
        let config = PlanConfig::default().with_months(2);
        let summary = PlanSummary::from_solution(&solution(), &config, Decimal::ZERO);

        let macul = &summary.districts[0];
        assert_eq!(macul.sites, 1);
        assert_eq!(macul.activated_sites, 1);
        assert_eq!(macul.chargers_new, 2);
        assert_eq!(macul.coverage_pct, 100.0);
        assert!((macul.renewable_pct - 3.75).abs() < 1e-9);

        // 無站點的行政區以零值出現
        let pirque = &summary.districts[1];
        assert_eq!(pirque.sites, 0);
        assert_eq!(pirque.coverage_pct, 0.0);
        assert_eq!(summary.equity.districts, 1);
    }

    #[test]
    fn test_costs() {
        let config = PlanConfig::default().with_months(2);
        let committed = config.costs.committed_upkeep(0, 2, 2);
        let summary = PlanSummary::from_solution(&solution(), &config, committed);
        let costs = &summary.costs;

        assert_eq!(costs.activation, Decimal::new(6_500_000, 0));
        assert_eq!(costs.charger_install, Decimal::new(4_000_000, 0));
        assert_eq!(costs.charger_upkeep, Decimal::new(126_000, 0));
        assert_eq!(costs.panel_upkeep, Decimal::new(2_500, 0));
        assert_eq!(costs.grid_energy, Decimal::new(519_750, 0));
        assert_eq!(costs.budgeted_total, costs.total - Decimal::new(2_500, 0));
        assert!(costs.within_budget(Decimal::ZERO));
    }

    #[test]
    fn test_timeline_and_global() {
        let config = PlanConfig::default().with_months(2);
        let summary = PlanSummary::from_solution(&solution(), &config, Decimal::ZERO);

        assert_eq!(summary.timeline.len(), 2);
        assert_eq!(summary.timeline[0].coverage_pct, 0.0);
        assert_eq!(summary.timeline[1].activations, 1);
        assert_eq!(summary.timeline[1].label, "2025-02");
        assert!((summary.global.co2_avoided_kg - 56.25).abs() < 1e-9);
        assert!(summary.render().contains("覆蓋率 100.0%"));
    }

    #[rstest]
    #[case(&[], [0, 0, 0, 0, 0])]
    #[case(&[0.0, 19.9, 20.0, 55.0, 100.0], [2, 1, 1, 0, 1])]
    #[case(&[80.0, 99.0], [0, 0, 0, 0, 2])]
    fn test_equity_histogram(#[case] coverages: &[f64], #[case] expected: [usize; 5]) {
        assert_eq!(EquityStats::from_coverages(coverages).histogram, expected);
    }

    #[test]
    fn test_equity_moments() {
        let stats = EquityStats::from_coverages(&[40.0, 60.0]);
        assert_eq!(stats.mean_pct, 50.0);
        assert_eq!(stats.std_pct, 10.0);
        assert_eq!(stats.range_pct, 20.0);
    }
}
