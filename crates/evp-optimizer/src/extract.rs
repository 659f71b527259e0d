//! 解讀求解結果

use evp_core::{District, GeoPoint, PlanConfig, PlanningHorizon, Period};
use serde::Serialize;

use crate::builder::BuiltModel;
use crate::problem::VarId;

/// 站點單期決策
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitePeriodDecision {
    pub period: u32,
    pub label: String,
    /// 本期新啟用
    pub activated_now: bool,
    pub active: bool,
    pub chargers_new: u32,
    pub chargers_total: u32,
    pub panels_new: u32,
    pub panels_total: u32,
    pub demand_estimated: u32,
    pub demand_served: u32,
    pub demand_unserved: u32,
    pub solar_kwh: f64,
    pub grid_kwh: f64,
    pub slow_chargers: Option<u32>,
    pub fast_chargers: Option<u32>,
}

/// 站點全時界決策
#[derive(Debug, Clone, Serialize)]
pub struct SitePlan {
    pub district: String,
    pub district_name: String,
    pub site_id: String,
    pub site_name: Option<String>,
    pub site_type: String,
    pub location: GeoPoint,
    pub existing_chargers: u32,
    pub existing_panels: u32,
    pub max_chargers: u32,
    pub max_panels: u32,
    pub distance_to_existing_m: Option<f64>,
    pub periods: Vec<SitePeriodDecision>,
}

/// 站點最終期輸出列
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRecord {
    pub comuna: String,
    pub site_id: String,
    pub site_name: String,
    pub site_type: String,
    pub lon: f64,
    pub lat: f64,
    pub q_existed: bool,
    pub existing_chargers: u32,
    pub existing_panels: u32,
    pub activated: bool,
    pub activation_period: Option<u32>,
    pub active: bool,
    pub chargers_new: u32,
    pub chargers_total: u32,
    pub panels_new: u32,
    pub panels_total: u32,
    pub demand_estimated: u32,
    pub demand_satisfied: u32,
    pub demand_unsatisfied: u32,
    pub solar_used_kwh: f64,
    pub grid_used_kwh: f64,
    pub distance_to_existing_m: Option<f64>,
}

/// 站點逐期輸出列
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitePeriodRecord {
    pub comuna: String,
    pub site_id: String,
    pub period: u32,
    pub label: String,
    pub activated_now: bool,
    pub active: bool,
    pub chargers_new: u32,
    pub chargers_total: u32,
    pub panels_new: u32,
    pub panels_total: u32,
    pub demand_estimated: u32,
    pub demand_satisfied: u32,
    pub demand_unsatisfied: u32,
    pub solar_used_kwh: f64,
    pub grid_used_kwh: f64,
}

impl SitePlan {
    /// 啟用期間（既有站點或未啟用為 None）
    pub fn activation_period(&self) -> Option<u32> {
        self.periods.iter().find(|p| p.activated_now).map(|p| p.period)
    }

    pub fn q_existed(&self) -> bool {
        self.existing_chargers > 0
    }

    /// 最終期決策
    pub fn final_period(&self) -> Option<&SitePeriodDecision> {
        self.periods.last()
    }

    /// 最終期輸出列
    pub fn record(&self) -> SiteRecord {
        let last = self.final_period();
        let pick = |f: fn(&SitePeriodDecision) -> u32| last.map(f).unwrap_or(0);
        let chargers_total = last.map(|p| p.chargers_total).unwrap_or(self.existing_chargers);
        let panels_total = last.map(|p| p.panels_total).unwrap_or(self.existing_panels);

        SiteRecord {
            comuna: self.district.clone(),
            site_id: self.site_id.clone(),
            site_name: self.site_name.clone().unwrap_or_default(),
            site_type: self.site_type.clone(),
            lon: self.location.lon,
            lat: self.location.lat,
            q_existed: self.q_existed(),
            existing_chargers: self.existing_chargers,
            existing_panels: self.existing_panels,
            activated: self.activation_period().is_some(),
            activation_period: self.activation_period(),
            active: last.map(|p| p.active).unwrap_or(false),
            chargers_new: chargers_total.saturating_sub(self.existing_chargers),
            chargers_total,
            panels_new: panels_total.saturating_sub(self.existing_panels),
            panels_total,
            demand_estimated: pick(|p| p.demand_estimated),
            demand_satisfied: pick(|p| p.demand_served),
            demand_unsatisfied: pick(|p| p.demand_unserved),
            solar_used_kwh: last.map(|p| p.solar_kwh).unwrap_or(0.0),
            grid_used_kwh: last.map(|p| p.grid_kwh).unwrap_or(0.0),
            distance_to_existing_m: self.distance_to_existing_m,
        }
    }

    /// 逐期輸出列
    pub fn period_records(&self) -> Vec<SitePeriodRecord> {
        self.periods
            .iter()
            .map(|p| SitePeriodRecord {
                comuna: self.district.clone(),
                site_id: self.site_id.clone(),
                period: p.period,
                label: p.label.clone(),
                activated_now: p.activated_now,
                active: p.active,
                chargers_new: p.chargers_new,
                chargers_total: p.chargers_total,
                panels_new: p.panels_new,
                panels_total: p.panels_total,
                demand_estimated: p.demand_estimated,
                demand_satisfied: p.demand_served,
                demand_unsatisfied: p.demand_unserved,
                solar_used_kwh: p.solar_kwh,
                grid_used_kwh: p.grid_kwh,
            })
            .collect()
    }
}

/// 行政區單期結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictPeriodOutcome {
    pub period: u32,
    pub demand: u64,
    pub served: u64,
    pub phi: f64,
    pub psi: f64,
}

/// 行政區全時界結果
#[derive(Debug, Clone, Serialize)]
pub struct DistrictPlan {
    pub district: String,
    pub name: String,
    pub periods: Vec<DistrictPeriodOutcome>,
}

impl DistrictPlan {
    pub fn final_period(&self) -> Option<&DistrictPeriodOutcome> {
        self.periods.last()
    }
}

/// 完整規劃解
#[derive(Debug, Clone, Serialize)]
pub struct PlanSolution {
    pub objective: f64,
    pub sites: Vec<SitePlan>,
    pub districts: Vec<DistrictPlan>,
}

impl PlanSolution {
    pub fn site_records(&self) -> Vec<SiteRecord> {
        self.sites.iter().map(SitePlan::record).collect()
    }

    pub fn site_period_records(&self) -> Vec<SitePeriodRecord> {
        self.sites.iter().flat_map(SitePlan::period_records).collect()
    }

    pub fn sites_in<'s>(&'s self, district: &'s str) -> impl Iterator<Item = &'s SitePlan> {
        self.sites.iter().filter(move |s| s.district == district)
    }
}

/// 求解結果解讀器
pub struct SolutionExtractor<'a> {
    config: &'a PlanConfig,
    horizon: &'a PlanningHorizon,
}

fn count(values: &[f64], var: VarId) -> u32 {
    let value = values.get(var.index()).copied().unwrap_or(0.0).round();
    value.clamp(0.0, f64::from(u32::MAX)) as u32
}

fn flag(values: &[f64], var: VarId) -> bool {
    values.get(var.index()).copied().unwrap_or(0.0) > 0.5
}

fn amount(values: &[f64], var: VarId) -> f64 {
    // 去除求解器的微小負值
    values.get(var.index()).copied().unwrap_or(0.0).max(0.0)
}

impl<'a> SolutionExtractor<'a> {
    pub fn new(config: &'a PlanConfig, horizon: &'a PlanningHorizon) -> Self {
        Self { config, horizon }
    }

    /// 將變數值轉為站點與行政區決策
    pub fn extract(&self, model: &BuiltModel, districts: &[District], values: &[f64], objective: f64) -> PlanSolution {
        tracing::debug!("解讀結果：站點 {}", model.index.sites.len());
        let with_mix = self.config.charger_mix.is_some();

        let sites = model
            .index
            .sites
            .iter()
            .map(|site_vars| {
                let district = &districts[site_vars.district];
                let site = &district.sites[site_vars.site];
                let periods = site_vars
                    .periods
                    .iter()
                    .enumerate()
                    .map(|(offset, vars)| {
                        let period = Period::new(offset as u32 + 1);
                        let served = count(values, vars.demand_served);
                        let unserved = count(values, vars.demand_unserved);
                        let (slow, fast) = match vars.mix {
                            Some((slow, fast)) if with_mix => {
                                (Some(count(values, slow)), Some(count(values, fast)))
                            }
                            _ => (None, None),
                        };
                        SitePeriodDecision {
                            period: period.index(),
                            label: self.horizon.label(period),
                            activated_now: flag(values, vars.activate),
                            active: flag(values, vars.active),
                            chargers_new: count(values, vars.new_chargers),
                            chargers_total: count(values, vars.chargers),
                            panels_new: count(values, vars.new_panels),
                            panels_total: count(values, vars.panels),
                            demand_estimated: served + unserved,
                            demand_served: served,
                            demand_unserved: unserved,
                            solar_kwh: amount(values, vars.solar),
                            grid_kwh: amount(values, vars.grid),
                            slow_chargers: slow,
                            fast_chargers: fast,
                        }
                    })
                    .collect();

                SitePlan {
                    district: district.id.clone(),
                    district_name: district.name.clone(),
                    site_id: site.id.to_string(),
                    site_name: site.name.clone(),
                    site_type: site.site_type.clone(),
                    location: site.location,
                    existing_chargers: site.existing_chargers,
                    existing_panels: site.existing_panels,
                    max_chargers: site_vars.max_chargers,
                    max_panels: site_vars.max_panels,
                    distance_to_existing_m: site.distance_to_existing_m,
                    periods,
                }
            })
            .collect();

        let districts = model
            .index
            .districts
            .iter()
            .map(|district_vars| {
                let district = &districts[district_vars.district];
                DistrictPlan {
                    district: district.id.clone(),
                    name: district.name.clone(),
                    periods: district_vars
                        .periods
                        .iter()
                        .enumerate()
                        .map(|(offset, vars)| DistrictPeriodOutcome {
                            period: offset as u32 + 1,
                            demand: vars.demand,
                            served: u64::from(count(values, vars.served)),
                            phi: amount(values, vars.phi),
                            psi: amount(values, vars.psi),
                        })
                        .collect(),
                }
            })
            .collect();

        PlanSolution {
            objective,
            sites,
            districts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use evp_calc::DemandEstimator;
    use evp_core::Site;

    #[test]
    fn test_extract_baseline() {
        let point = GeoPoint::new(-70.6, -33.4);
        let districts = vec![District::new("Macul").with_sites(vec![
            Site::new("A", "mall", point).with_demand_hint(40).with_distance(250.0),
            Site::new("B", "fuel", point)
                .with_existing_chargers(2)
                .with_existing_panels(1)
                .with_demand_hint(30),
        ])];
        let config = PlanConfig::default().with_months(2);
        let horizon = config.planning_horizon().unwrap();
        let demand = DemandEstimator::new(&config.demand).build_table(&districts, &horizon);
        let model = ModelBuilder::new(&config, &horizon, &demand).build(&districts).unwrap();

        let solution = SolutionExtractor::new(&config, &horizon).extract(&model, &districts, &model.baseline, 0.0);

        assert_eq!(solution.sites.len(), 2);
        let records = solution.site_records();
        assert_eq!(records[0].demand_estimated, 40);
        assert_eq!(records[0].demand_unsatisfied, 40);
        assert!(!records[0].activated);
        assert!(!records[0].active);
        assert_eq!(records[0].distance_to_existing_m, Some(250.0));

        assert!(records[1].q_existed);
        assert!(records[1].active);
        assert_eq!(records[1].chargers_total, 2);
        assert_eq!(records[1].chargers_new, 0);
        assert_eq!(records[1].panels_total, 1);

        assert_eq!(solution.site_period_records().len(), 4);
        assert_eq!(solution.site_period_records()[1].label, "2025-02");

        let district = &solution.districts[0];
        assert_eq!(district.final_period().unwrap().demand, 70);
        assert_eq!(district.final_period().unwrap().served, 0);
    }
}
