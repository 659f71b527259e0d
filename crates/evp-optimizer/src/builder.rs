//! 模型建構器
//!
//! 對所有 站點 × 行政區 × 月份 宣告變數與約束。只負責宣告，不負責求解。

use evp_calc::DemandTable;
use evp_core::{District, EquityMode, PlanConfig, PlanningHorizon, Result};
use rust_decimal::Decimal;

use crate::problem::{Domain, LinearExpr, LinearProgram, Relation, Sense, VarId};
use crate::variables::{DistrictPeriodVars, DistrictVars, ModelIndex, SitePeriodVars, SiteVars};

/// 建構完成的模型
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub program: LinearProgram,
    pub index: ModelIndex,
    /// 「不新增任何設施」的變數值，依 `VarId` 索引
    pub baseline: Vec<f64>,
    /// 既有設施在整個時界的維護費
    pub committed_upkeep: Decimal,
    /// 模型使用的預算上限（含豁免的既有維護費）
    pub budget_ceiling: Decimal,
}

/// 模型建構器
pub struct ModelBuilder<'a> {
    config: &'a PlanConfig,
    horizon: &'a PlanningHorizon,
    demand: &'a DemandTable,
}

/// 宣告變數時同步記錄基準值
struct Declarer {
    program: LinearProgram,
    baseline: Vec<f64>,
}

impl Declarer {
    fn var(&mut self, name: String, domain: Domain, lower: f64, upper: Option<f64>, baseline: f64) -> VarId {
        let id = self.program.add_variable(&name, domain, lower, upper);
        self.baseline.push(baseline);
        id
    }

    fn constrain(&mut self, name: String, expr: LinearExpr, relation: Relation, rhs: f64) {
        self.program.add_constraint(&name, expr, relation, rhs);
    }
}

impl<'a> ModelBuilder<'a> {
    /// 創建模型建構器
    pub fn new(config: &'a PlanConfig, horizon: &'a PlanningHorizon, demand: &'a DemandTable) -> Self {
        Self {
            config,
            horizon,
            demand,
        }
    }

    /// 建構模型（目標函數由 `ObjectiveComposer` 另行設置）
    pub fn build(&self, districts: &[District]) -> Result<BuiltModel> {
        if districts.is_empty() {
            return Err(evp_core::PlanError::NoDistricts);
        }
        check_unique_names(districts)?;

        tracing::info!(
            "開始建構模型：行政區 {}，站點 {}，月份 {}",
            districts.len(),
            districts.iter().map(District::site_count).sum::<usize>(),
            self.horizon.months
        );

        let mut declarer = Declarer {
            program: LinearProgram::new("ev_infrastructure_plan", Sense::Maximize),
            baseline: Vec::new(),
        };
        let mut index = ModelIndex::default();

        // Step 1: 站點變數與站點約束
        tracing::debug!("Step 1: 站點變數與約束");
        for (d_idx, district) in districts.iter().enumerate() {
            for (s_idx, _) in district.sites.iter().enumerate() {
                let site_vars = self.declare_site(&mut declarer, districts, d_idx, s_idx);
                index.sites.push(site_vars);
            }
        }

        // Step 2: 行政區彙總、公平性與 McCormick
        tracing::debug!("Step 2: 行政區彙總與公平性約束");
        for (d_idx, district) in districts.iter().enumerate() {
            let district_vars = self.declare_district(&mut declarer, &index, d_idx, district);
            index.districts.push(district_vars);
        }

        // Step 3: 跨區公平與最低覆蓋（僅最終期）
        tracing::debug!("Step 3: 跨區約束");
        self.add_terminal_equity(&mut declarer, &index, districts);

        // Step 4: 預算
        tracing::debug!("Step 4: 預算約束");
        let (committed_upkeep, budget_ceiling) = self.add_budget(&mut declarer, &index, districts);

        let stats = declarer.program.stats();
        tracing::info!(
            "模型建構完成：變數 {}（二元 {}，整數 {}，連續 {}），約束 {}",
            stats.variables,
            stats.binaries,
            stats.integers,
            stats.continuous,
            stats.constraints
        );

        Ok(BuiltModel {
            program: declarer.program,
            index,
            baseline: declarer.baseline,
            committed_upkeep,
            budget_ceiling,
        })
    }

    fn declare_site(&self, declarer: &mut Declarer, districts: &[District], d_idx: usize, s_idx: usize) -> SiteVars {
        let district = &districts[d_idx];
        let site = &district.sites[s_idx];
        let infra = &self.config.infrastructure;
        let headroom = infra.capacity_headroom;

        let eps = f64::from(site.existing_chargers);
        let delta = f64::from(site.existing_panels);
        let q = f64::from(site.q_value());
        let cap = site.effective_max_chargers(infra.default_charger_cap_for(&site.site_type), headroom);
        let zcap = site.effective_max_panels(infra.default_max_panels, headroom);
        let cap_f = f64::from(cap);
        let zcap_f = f64::from(zcap);

        let key = format!("{}_{}", district.id, site.id);
        let mut periods = Vec::with_capacity(self.horizon.len());

        for period in self.horizon.periods() {
            let m = period.index();
            let demand = f64::from(self.demand.site_demand(&district.id, &site.id, period));

            let activate = declarer.var(
                format!("y_{key}_{m}"),
                Domain::Binary,
                0.0,
                Some(1.0 - q),
                0.0,
            );
            let active = declarer.var(format!("a_{key}_{m}"), Domain::Binary, q, Some(1.0), q);
            let new_chargers = declarer.var(
                format!("x_{key}_{m}"),
                Domain::Integer,
                0.0,
                Some(cap_f - eps),
                0.0,
            );
            let new_panels = declarer.var(
                format!("z_{key}_{m}"),
                Domain::Integer,
                0.0,
                Some(zcap_f - delta),
                0.0,
            );
            let chargers = declarer.var(format!("X_{key}_{m}"), Domain::Integer, eps, Some(cap_f), eps);
            let panels = declarer.var(format!("Z_{key}_{m}"), Domain::Integer, delta, Some(zcap_f), delta);
            let demand_served = declarer.var(
                format!("dsat_{key}_{m}"),
                Domain::Integer,
                0.0,
                Some(demand),
                0.0,
            );
            let demand_unserved = declarer.var(
                format!("dunsat_{key}_{m}"),
                Domain::Integer,
                0.0,
                Some(demand),
                demand,
            );
            let solar = declarer.var(format!("s_{key}_{m}"), Domain::Continuous, 0.0, None, 0.0);
            let grid = declarer.var(
                format!("r_{key}_{m}"),
                Domain::Continuous,
                0.0,
                Some(infra.grid_ceiling_kwh),
                0.0,
            );
            let energy = declarer.var(format!("e_{key}_{m}"), Domain::Continuous, 0.0, None, 0.0);
            let mix = self.config.charger_mix.as_ref().map(|_| {
                let slow = declarer.var(format!("nslow_{key}_{m}"), Domain::Integer, 0.0, Some(cap_f), eps);
                let fast = declarer.var(format!("nfast_{key}_{m}"), Domain::Integer, 0.0, Some(cap_f), 0.0);
                (slow, fast)
            });

            periods.push(SitePeriodVars {
                activate,
                active,
                new_chargers,
                new_panels,
                chargers,
                panels,
                demand_served,
                demand_unserved,
                solar,
                grid,
                energy,
                mix,
            });

            let current = &periods[periods.len() - 1];
            self.add_period_constraints(declarer, &key, m, &periods, current, demand, eps, delta, q, cap_f, zcap_f);
        }

        // 整個時界最多啟用一次，且既有站點不可啟用
        let mut single = LinearExpr::new();
        for vars in &periods {
            single.add(vars.activate, 1.0);
        }
        declarer.constrain(format!("single_activation_{key}"), single, Relation::Le, 1.0 - q);

        SiteVars {
            district: d_idx,
            site: s_idx,
            max_chargers: cap,
            max_panels: zcap,
            periods,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_period_constraints(
        &self,
        declarer: &mut Declarer,
        key: &str,
        m: u32,
        history: &[SitePeriodVars],
        current: &SitePeriodVars,
        demand: f64,
        eps: f64,
        delta: f64,
        q: f64,
        cap: f64,
        zcap: f64,
    ) {
        let infra = &self.config.infrastructure;

        // 啟用狀態：a_m = q + Σ_{m'≤m} y
        let mut active = LinearExpr::new().term(current.active, 1.0);
        // 啟用需新增設備：X_m ≥ eps + Σ_{m'≤m} y
        let mut equipment = LinearExpr::new().term(current.chargers, 1.0);
        // 累計：X_m = eps + Σ x，Z_m = delta + Σ z
        let mut accum_x = LinearExpr::new().term(current.chargers, 1.0);
        let mut accum_z = LinearExpr::new().term(current.panels, 1.0);
        for past in history {
            active.add(past.activate, -1.0);
            equipment.add(past.activate, -1.0);
            accum_x.add(past.new_chargers, -1.0);
            accum_z.add(past.new_panels, -1.0);
        }
        declarer.constrain(format!("active_{key}_{m}"), active, Relation::Eq, q);
        declarer.constrain(format!("activation_equipment_{key}_{m}"), equipment, Relation::Ge, eps);
        declarer.constrain(format!("accum_chargers_{key}_{m}"), accum_x, Relation::Eq, eps);
        declarer.constrain(format!("accum_panels_{key}_{m}"), accum_z, Relation::Eq, delta);

        // 容量：超出既有數量的部分需站點啟用
        declarer.constrain(
            format!("cap_chargers_{key}_{m}"),
            LinearExpr::new()
                .term(current.chargers, 1.0)
                .term(current.active, -(cap - eps)),
            Relation::Le,
            eps,
        );
        declarer.constrain(
            format!("cap_panels_{key}_{m}"),
            LinearExpr::new()
                .term(current.panels, 1.0)
                .term(current.active, -(zcap - delta)),
            Relation::Le,
            delta,
        );

        // 服務量
        declarer.constrain(
            format!("service_cap_{key}_{m}"),
            LinearExpr::new()
                .term(current.demand_served, 1.0)
                .term(current.chargers, -infra.clients_per_charger),
            Relation::Le,
            0.0,
        );
        declarer.constrain(
            format!("demand_balance_{key}_{m}"),
            LinearExpr::new()
                .term(current.demand_served, 1.0)
                .term(current.demand_unserved, 1.0),
            Relation::Eq,
            demand,
        );

        // 能源平衡
        declarer.constrain(
            format!("energy_use_{key}_{m}"),
            LinearExpr::new()
                .term(current.energy, 1.0)
                .term(current.demand_served, -infra.energy_per_session_kwh),
            Relation::Eq,
            0.0,
        );
        declarer.constrain(
            format!("energy_balance_{key}_{m}"),
            LinearExpr::new()
                .term(current.energy, 1.0)
                .term(current.solar, -1.0)
                .term(current.grid, -1.0),
            Relation::Eq,
            0.0,
        );
        declarer.constrain(
            format!("solar_cap_{key}_{m}"),
            LinearExpr::new()
                .term(current.solar, 1.0)
                .term(current.panels, -infra.panel_output_kwh),
            Relation::Le,
            0.0,
        );
        declarer.constrain(
            format!("grid_cap_{key}_{m}"),
            LinearExpr::new()
                .term(current.grid, 1.0)
                .term(current.active, -infra.grid_ceiling_kwh),
            Relation::Le,
            0.0,
        );

        if let (Some((slow, fast)), Some(mix)) = (current.mix, self.config.charger_mix.as_ref()) {
            declarer.constrain(
                format!("mix_total_{key}_{m}"),
                LinearExpr::new()
                    .term(slow, 1.0)
                    .term(fast, 1.0)
                    .term(current.chargers, -1.0),
                Relation::Eq,
                0.0,
            );
            declarer.constrain(
                format!("mix_energy_{key}_{m}"),
                LinearExpr::new()
                    .term(current.energy, 1.0)
                    .term(slow, -mix.slow_kwh_per_month)
                    .term(fast, -mix.fast_kwh_per_month),
                Relation::Le,
                0.0,
            );
        }
    }

    fn declare_district(&self, declarer: &mut Declarer, index: &ModelIndex, d_idx: usize, district: &District) -> DistrictVars {
        let equity = &self.config.equity;
        let mut periods = Vec::with_capacity(self.horizon.len());

        for period in self.horizon.periods() {
            let m = period.index();
            let key = format!("{}_{m}", district.id);
            let total = self.demand.district_total(&district.id, period);
            let d = total as f64;

            // D = 0 時 phi、psi 固定為 0
            let (phi_upper, phi_baseline) = if total == 0 { (0.0, 0.0) } else { (1.0, 1.0) };
            let served = declarer.var(format!("S_{key}"), Domain::Integer, 0.0, Some(d), 0.0);
            let phi = declarer.var(format!("phi_{key}"), Domain::Continuous, 0.0, Some(phi_upper), phi_baseline);
            let psi = declarer.var(format!("psi_{key}"), Domain::Continuous, 0.0, Some(d), 0.0);

            let mut sum = LinearExpr::new().term(served, 1.0);
            for site in index.sites_of(d_idx) {
                sum.add(site.periods[period.offset()].demand_served, -1.0);
            }
            declarer.constrain(format!("district_served_{key}"), sum, Relation::Eq, 0.0);

            if total > 0 {
                let ratio = LinearExpr::new().term(phi, d).term(served, 1.0);
                match equity.mode {
                    EquityMode::Strict => {
                        declarer.constrain(format!("equity_{key}"), ratio, Relation::Eq, d);
                    }
                    EquityMode::Relaxed => {
                        let margin = equity.relaxed_margin;
                        declarer.constrain(format!("equity_lo_{key}"), ratio.clone(), Relation::Ge, d * (1.0 - margin));
                        declarer.constrain(format!("equity_hi_{key}"), ratio, Relation::Le, d * (1.0 + margin));
                    }
                    EquityMode::Omitted => {}
                }

                // McCormick：psi ≥ S + D·phi − D（減去鬆弛），psi ≤ S，psi ≤ D·phi
                declarer.constrain(
                    format!("mccormick_lo_{key}"),
                    LinearExpr::new().term(psi, 1.0).term(served, -1.0).term(phi, -d),
                    Relation::Ge,
                    -d - equity.envelope_slack * d,
                );
                declarer.constrain(
                    format!("mccormick_s_{key}"),
                    LinearExpr::new().term(psi, 1.0).term(served, -1.0),
                    Relation::Le,
                    0.0,
                );
                declarer.constrain(
                    format!("mccormick_phi_{key}"),
                    LinearExpr::new().term(psi, 1.0).term(phi, -d),
                    Relation::Le,
                    0.0,
                );
            }

            periods.push(DistrictPeriodVars {
                served,
                phi,
                psi,
                demand: total,
            });
        }

        DistrictVars {
            district: d_idx,
            periods,
        }
    }

    fn add_terminal_equity(&self, declarer: &mut Declarer, index: &ModelIndex, districts: &[District]) {
        let equity = &self.config.equity;
        if equity.mode == EquityMode::Omitted
            && (equity.cross_district_ratio.is_some() || equity.min_coverage_ceiling.is_some())
        {
            tracing::warn!("公平性模式為 omitted，phi 未定義，跨區與最低覆蓋約束僅作用於 McCormick 代理");
        }

        let last = self.horizon.last().offset();
        let terminal: Vec<(usize, DistrictPeriodVars)> = index
            .districts
            .iter()
            .filter_map(|dv| dv.periods.get(last).map(|p| (dv.district, *p)))
            .filter(|(_, p)| p.demand > 0)
            .collect();

        if let Some(ceiling) = equity.min_coverage_ceiling {
            for (d_idx, vars) in &terminal {
                declarer.constrain(
                    format!("min_coverage_{}", districts[*d_idx].id),
                    LinearExpr::new().term(vars.phi, 1.0),
                    Relation::Le,
                    ceiling,
                );
            }
        }

        if let Some(ratio) = equity.cross_district_ratio {
            for (j, vars_j) in &terminal {
                for (l, vars_l) in &terminal {
                    if j == l {
                        continue;
                    }
                    declarer.constrain(
                        format!("cross_equity_{}_{}", districts[*j].id, districts[*l].id),
                        LinearExpr::new().term(vars_j.phi, 1.0).term(vars_l.phi, -ratio),
                        Relation::Le,
                        0.0,
                    );
                }
            }
        }
    }

    fn add_budget(&self, declarer: &mut Declarer, index: &ModelIndex, districts: &[District]) -> (Decimal, Decimal) {
        let costs = &self.config.costs;
        let k = costs.scaled(costs.activation);
        let c = costs.scaled(costs.charger_install);
        let h = costs.scaled(costs.charger_upkeep);
        let v = costs.scaled(costs.panel_install);
        let mp = costs.scaled(costs.panel_upkeep);
        let price = costs.scaled(costs.grid_price_per_kwh);

        let mut spend = LinearExpr::new();
        for site in &index.sites {
            for vars in &site.periods {
                spend.add(vars.activate, k);
                spend.add(vars.new_chargers, c);
                spend.add(vars.chargers, h);
                spend.add(vars.new_panels, v);
                spend.add(vars.panels, mp);
                spend.add(vars.grid, price);
            }
        }

        let existing_chargers: u64 = districts.iter().map(District::existing_chargers).sum();
        let existing_panels: u64 = districts
            .iter()
            .flat_map(|d| d.sites.iter())
            .map(|s| u64::from(s.existing_panels))
            .sum();
        let committed = costs.committed_upkeep(existing_chargers, existing_panels, self.horizon.months);
        let ceiling = if costs.exempt_existing_upkeep {
            costs.budget + committed
        } else {
            costs.budget
        };

        declarer.constrain("budget".to_string(), spend, Relation::Le, costs.scaled(ceiling));
        (committed, ceiling)
    }
}

/// 變數與約束名稱由行政區與站點ID組成，兩者都必須唯一
fn check_unique_names(districts: &[District]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for district in districts {
        if !seen.insert(district.id.as_str()) {
            return Err(evp_core::PlanError::Model(format!("行政區 {} 重複", district.id)));
        }
        if let Some(duplicate) = district.duplicate_site_ids().first() {
            return Err(evp_core::PlanError::Model(format!(
                "行政區 {} 內站點ID {} 重複",
                district.id, duplicate
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evp_calc::DemandEstimator;
    use evp_core::{GeoPoint, Site};

    fn point() -> GeoPoint {
        GeoPoint::new(-70.6, -33.4)
    }

    fn districts() -> Vec<District> {
        vec![
            District::new("Macul").with_sites(vec![
                Site::new("A", "mall", point()).with_demand_hint(100),
                Site::new("B", "fuel", point())
                    .with_existing_chargers(3)
                    .with_max_chargers(3)
                    .with_existing_panels(2)
                    .with_demand_hint(80),
            ]),
            District::new("Pirque"),
        ]
    }

    fn build(config: &PlanConfig, districts: &[District]) -> BuiltModel {
        let horizon = config.planning_horizon().unwrap();
        let demand = DemandEstimator::new(&config.demand).build_table(districts, &horizon);
        ModelBuilder::new(config, &horizon, &demand).build(districts).unwrap()
    }

    #[test]
    fn test_variable_and_constraint_counts() {
        let config = PlanConfig::default().with_months(2);
        let model = build(&config, &districts());

        // 每站每期 11 個變數，每區每期 3 個
        let stats = model.program.stats();
        assert_eq!(stats.variables, 2 * 2 * 11 + 2 * 2 * 3);
        assert_eq!(model.index.sites.len(), 2);
        assert_eq!(model.index.districts.len(), 2);
        assert!(model.program.find_constraint("budget").is_some());
        assert!(model.program.find_constraint("single_activation_macul_A").is_some());
        assert!(model.program.find_constraint("mccormick_lo_macul_2").is_some());
        // 零需求行政區不建立公平性與 McCormick 約束
        assert!(model.program.find_constraint("mccormick_lo_pirque_1").is_none());
        assert!(model.program.find_constraint("district_served_pirque_1").is_some());
    }

    #[test]
    fn test_existing_site_bounds() {
        let config = PlanConfig::default().with_months(3);
        let model = build(&config, &districts());
        let site = model.index.site(0, 1).unwrap();
        assert_eq!(site.max_chargers, 3);

        for vars in &site.periods {
            let y = model.program.variable(vars.activate);
            assert_eq!(y.upper, Some(0.0));
            let a = model.program.variable(vars.active);
            assert_eq!(a.lower, 1.0);
            let chargers = model.program.variable(vars.chargers);
            assert_eq!((chargers.lower, chargers.upper), (3.0, Some(3.0)));
        }
    }

    #[test]
    fn test_baseline_is_feasible_in_every_mode() {
        for mode in [EquityMode::Strict, EquityMode::Relaxed, EquityMode::Omitted] {
            let mut config = PlanConfig::default().with_months(3).with_equity_mode(mode);
            config.equity.cross_district_ratio = Some(2.0);
            config.charger_mix = Some(Default::default());
            let model = build(&config, &districts());

            let violations = model.program.check_assignment(&model.baseline, 1e-9);
            assert!(violations.is_empty(), "{mode:?}: {violations:?}");
        }
    }

    #[test]
    fn test_baseline_feasible_with_zero_budget() {
        let config = PlanConfig::default()
            .with_months(2)
            .with_budget(Decimal::ZERO);
        let model = build(&config, &districts());

        assert!(model.committed_upkeep > Decimal::ZERO);
        assert_eq!(model.budget_ceiling, model.committed_upkeep);
        assert!(model.program.check_assignment(&model.baseline, 1e-9).is_empty());
    }

    #[test]
    fn test_min_coverage_breaks_baseline() {
        let mut config = PlanConfig::default().with_months(1);
        config.equity.min_coverage_ceiling = Some(0.3);
        let model = build(&config, &districts());

        let violations = model.program.check_assignment(&model.baseline, 1e-9);
        let names: Vec<&str> = violations.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["min_coverage_macul"]);
    }

    #[test]
    fn test_no_districts_is_an_error() {
        let config = PlanConfig::default();
        let horizon = config.planning_horizon().unwrap();
        let demand = DemandTable::new(horizon.months);
        let result = ModelBuilder::new(&config, &horizon, &demand).build(&[]);
        assert!(matches!(result, Err(evp_core::PlanError::NoDistricts)));
    }

    #[test]
    fn test_duplicate_site_ids_rejected() {
        let config = PlanConfig::default().with_months(1);
        let districts = vec![District::new("Macul").with_sites(vec![
            Site::new("A", "mall", point()).with_demand_hint(100),
            Site::new("A", "fuel", point()).with_demand_hint(50),
        ])];
        let horizon = config.planning_horizon().unwrap();
        let demand = DemandEstimator::new(&config.demand).build_table(&districts, &horizon);

        let result = ModelBuilder::new(&config, &horizon, &demand).build(&districts);
        assert!(matches!(result, Err(evp_core::PlanError::Model(ref m)) if m.contains("macul") && m.contains('A')));
    }

    #[test]
    fn test_duplicate_districts_rejected() {
        let config = PlanConfig::default().with_months(1);
        let districts = vec![District::new("La Florida"), District::new("la florida")];
        let horizon = config.planning_horizon().unwrap();
        let demand = DemandEstimator::new(&config.demand).build_table(&districts, &horizon);

        let result = ModelBuilder::new(&config, &horizon, &demand).build(&districts);
        assert!(matches!(result, Err(evp_core::PlanError::Model(_))));
    }
}
