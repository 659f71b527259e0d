//! 集成測試：以 microlp 後端端到端求解小型情境

use std::io::Write;

use evp_core::{District, EquityMode, GeoPoint, PlanConfig, Site};
use evp_io::{load_sites, write_outputs, OutputOptions, DISTRICTS_FILE, SITES_FILE, SUMMARY_FILE};
use evp_optimizer::{GoodLpSolver, PlanReport, Planner, SiteRecord, SolveStatus, CONFLICT_FILE};
use rstest::rstest;
use rust_decimal::Decimal;

fn point() -> GeoPoint {
    GeoPoint::new(-70.6, -33.4)
}

/// 以零間隙求解，情境斷言依賴最佳解
fn solve(config: PlanConfig, districts: &[District]) -> PlanReport {
    Planner::new(config.with_mip_gap(0.0), GoodLpSolver::microlp())
        .plan(districts)
        .unwrap()
}

fn site(report: &PlanReport, id: &str) -> SiteRecord {
    report
        .solution
        .as_ref()
        .unwrap()
        .site_records()
        .into_iter()
        .find(|r| r.site_id == id)
        .unwrap()
}

#[test]
fn test_single_new_site_serves_full_demand() {
    // 需求 100、每樁 50 人：至少需要 2 支充電樁
    let config = PlanConfig::default()
        .with_months(1)
        .with_clients_per_charger(50.0)
        .with_equity_mode(EquityMode::Omitted);
    let districts = vec![District::new("Macul").with_sites(vec![Site::new("A", "mall", point()).with_demand_hint(100)])];

    let report = solve(config, &districts);
    assert_eq!(report.status, SolveStatus::Optimal);

    let a = site(&report, "A");
    assert!(a.activated);
    assert_eq!(a.activation_period, Some(1));
    assert!(a.active);
    assert!(a.chargers_total >= 2);
    assert_eq!(a.demand_satisfied, 100);
    assert_eq!(a.demand_unsatisfied, 0);
    assert!(report.warnings.iter().all(|w| !w.is_error()), "{:?}", report.warnings);
}

#[test]
fn test_existing_site_at_capacity_stays() {
    let config = PlanConfig::default()
        .with_months(1)
        .with_equity_mode(EquityMode::Omitted);
    let districts = vec![District::new("Macul").with_sites(vec![Site::new("B", "fuel", point())
        .with_existing_chargers(3)
        .with_max_chargers(3)
        .with_demand_hint(500)])];

    let report = solve(config, &districts);
    let b = site(&report, "B");
    assert!(b.q_existed);
    assert!(!b.activated);
    assert!(b.active);
    assert_eq!(b.chargers_total, 3);
    assert_eq!(b.chargers_new, 0);
    // 3 × 70
    assert_eq!(b.demand_satisfied, 210);
}

#[test]
fn test_zero_budget_adds_nothing() {
    let config = PlanConfig::default().with_months(1).with_budget(Decimal::ZERO);
    let districts = vec![District::new("Macul").with_sites(vec![
        Site::new("A", "mall", point()).with_demand_hint(100),
        Site::new("B", "fuel", point())
            .with_existing_chargers(2)
            .with_existing_panels(4)
            .with_demand_hint(100),
    ])];

    let report = solve(config, &districts);
    assert!(report.is_solved());

    let a = site(&report, "A");
    assert!(!a.active);
    assert_eq!(a.chargers_total, 0);

    let b = site(&report, "B");
    assert_eq!(b.chargers_new, 0);
    assert_eq!(b.panels_new, 0);
    // 不能購電，只能用既有太陽能：4 × 56.25 = 225 kWh，每次 30 kWh
    assert!(b.grid_used_kwh < 1e-6);
    assert_eq!(b.demand_satisfied, 7);

    let costs = &report.summary.as_ref().unwrap().costs;
    assert!(costs.within_budget(Decimal::ONE));
    assert_eq!(costs.activation, Decimal::ZERO);
}

#[test]
fn test_zero_demand_district() {
    let config = PlanConfig::default().with_months(1);
    let districts = vec![
        District::new("Macul").with_sites(vec![Site::new("A", "mall", point()).with_demand_hint(100)]),
        District::new("Pirque").with_sites(vec![Site::new("P", "parking", point()).with_demand_hint(0)]),
    ];

    let report = solve(config, &districts);
    let solution = report.solution.as_ref().unwrap();
    let pirque = solution.districts.iter().find(|d| d.district == "pirque").unwrap();
    let last = pirque.final_period().unwrap();
    assert_eq!(last.demand, 0);
    assert_eq!(last.phi, 0.0);
    assert_eq!(last.psi, 0.0);

    let summary = report.summary.as_ref().unwrap();
    let row = summary.districts.iter().find(|d| d.comuna == "pirque").unwrap();
    assert_eq!(row.coverage_pct, 0.0);
    // 需求為 0 的行政區不列入公平性統計
    assert_eq!(summary.equity.districts, 1);
}

#[rstest]
#[case(EquityMode::Strict, None)]
#[case(EquityMode::Relaxed, None)]
#[case(EquityMode::Omitted, None)]
#[case(EquityMode::Strict, Some(1.5))]
#[case(EquityMode::Relaxed, Some(1.5))]
fn test_plan_invariants(#[case] mode: EquityMode, #[case] ratio: Option<f64>) {
    let mut config = PlanConfig::default()
        .with_months(2)
        .with_equity_mode(mode)
        .with_budget(Decimal::new(20_000_000, 0));
    config.equity.cross_district_ratio = ratio;
    let districts = vec![
        District::new("Macul").with_sites(vec![
            Site::new("A", "mall", point())
                .with_demand_hint(120)
                .with_max_chargers(4)
                .with_max_panels(3),
            Site::new("B", "fuel", point())
                .with_existing_chargers(1)
                .with_existing_panels(2)
                .with_demand_hint(60),
        ]),
        District::new("La Florida").with_sites(vec![Site::new("F", "supermarket", point()).with_demand_hint(90)]),
    ];
    let clients = config.infrastructure.clients_per_charger;

    let report = solve(config, &districts);
    assert!(report.is_solved(), "{}", report.status);
    let solution = report.solution.as_ref().unwrap();

    for plan in &solution.sites {
        let activations = plan.periods.iter().filter(|p| p.activated_now).count();
        assert!(activations <= 1);
        if plan.q_existed() {
            assert_eq!(activations, 0);
        }

        let mut previous = plan.existing_chargers;
        let mut previous_panels = plan.existing_panels;
        for p in &plan.periods {
            assert!(p.chargers_total <= plan.max_chargers);
            assert!(p.chargers_total >= previous);
            previous = p.chargers_total;

            assert!(p.panels_total <= plan.max_panels);
            assert!(p.panels_total >= previous_panels);
            previous_panels = p.panels_total;
            if !p.active {
                assert_eq!(p.chargers_total, plan.existing_chargers);
                assert_eq!(p.panels_total, plan.existing_panels);
            }
            assert_eq!(p.demand_served + p.demand_unserved, p.demand_estimated);
            assert!(f64::from(p.demand_served) <= clients * f64::from(p.chargers_total) + 1e-6);
            if p.chargers_total > plan.existing_chargers {
                assert!(p.active);
            }
            let activated_by = plan.activation_period().is_some_and(|m| m <= p.period);
            assert_eq!(p.active, plan.q_existed() || activated_by);
        }
    }

    for district in &solution.districts {
        for p in &district.periods {
            let served: u64 = solution
                .sites_in(&district.district)
                .map(|s| u64::from(s.periods[p.period as usize - 1].demand_served))
                .sum();
            assert_eq!(p.served, served);
            assert!((0.0..=1.0).contains(&p.phi));
            assert!(p.psi <= p.served as f64 + 1e-6);
            if mode == EquityMode::Strict && p.demand > 0 {
                // D·phi + S = D
                let expected = 1.0 - p.served as f64 / p.demand as f64;
                assert!((p.phi - expected).abs() < 1e-6, "{} {}: {}", district.district, p.period, p.phi);
            }
        }
    }

    if let Some(ratio) = ratio {
        let finals: Vec<f64> = solution
            .districts
            .iter()
            .filter_map(|d| d.final_period())
            .filter(|p| p.demand > 0)
            .map(|p| p.phi)
            .collect();
        for a in &finals {
            for b in &finals {
                assert!(*a <= ratio * b + 1e-6, "{a} > {ratio} × {b}");
            }
        }
    }

    // 預算守恆：計入預算的成本不超過預算
    let costs = &report.summary.as_ref().unwrap().costs;
    assert!(costs.within_budget(Decimal::ONE), "{costs:?}");
}

#[test]
fn test_time_limit_bounds_solve() {
    let mut config = PlanConfig::default()
        .with_months(6)
        .with_equity_mode(EquityMode::Strict)
        .with_time_limit(1.0);
    config.equity.cross_district_ratio = Some(1.5);
    let types = ["mall", "fuel", "parking", "supermarket", "office", "hospital"];
    let districts: Vec<District> = ["Macul", "La Florida", "Pirque", "Maipu"]
        .iter()
        .enumerate()
        .map(|(d, name)| {
            District::new(*name).with_sites(
                types
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| {
                        Site::new(format!("S{d}{i}"), *kind, point())
                            .with_existing_chargers(u32::from(i % 3 == 0))
                            .with_demand_hint(40 + 37 * ((d * 6 + i) as u32 % 7))
                    })
                    .collect(),
            )
        })
        .collect();

    let started = std::time::Instant::now();
    let report = Planner::new(config, GoodLpSolver::microlp()).plan(&districts).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < std::time::Duration::from_secs(30), "{elapsed:?}");
    assert!(
        matches!(
            report.status,
            SolveStatus::Optimal | SolveStatus::TimeLimitWithIncumbent { .. } | SolveStatus::TimeLimitNoIncumbent
        ),
        "{}",
        report.status
    );
    if !report.is_solved() {
        assert!(report.solution.is_none());
    }
}

#[test]
fn test_unreachable_min_coverage_reports_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PlanConfig::default()
        .with_months(1)
        .with_equity_mode(EquityMode::Strict);
    config.equity.min_coverage_ceiling = Some(0.3);
    let districts = vec![District::new("Macul").with_sites(vec![Site::new("A", "mall", point())
        .with_max_chargers(1)
        .with_demand_hint(500)])];

    let report = Planner::new(config, GoodLpSolver::microlp())
        .with_artifact_dir(dir.path())
        .plan(&districts)
        .unwrap();

    assert_eq!(report.status, SolveStatus::Infeasible);
    assert!(report.solution.is_none());
    let conflict = report.conflict.as_ref().unwrap();
    assert!(conflict.constraints.iter().any(|c| c == "min_coverage_macul"));
    assert!(conflict.constraints.len() < report.model_stats.constraints);

    let persisted = std::fs::read_to_string(dir.path().join(CONFLICT_FILE)).unwrap();
    assert!(persisted.contains("min_coverage_macul"));
    // 求解前檢查已預告
    assert!(report.warnings.iter().any(|w| w.is_error() && w.subject == "macul"));
}

#[test]
fn test_csv_to_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sites.csv");
    let mut file = std::fs::File::create(&input).unwrap();
    writeln!(file, "comuna,dpc_id,dpc_lon,dpc_lat,dpc_tipo_osm,cargadores_iniciales,demand_estimated").unwrap();
    writeln!(file, "Macul,S1,-70.60,-33.48,mall,0,80").unwrap();
    writeln!(file, "Macul,S2,-70.61,-33.49,fuel,1,40").unwrap();
    writeln!(file, "Pirque,P1,,-33.65,parking,0,30").unwrap();
    drop(file);

    let loaded = load_sites(&input).unwrap();
    assert_eq!(loaded.rows_skipped, 1);
    // 座標缺漏的站點被略過，Pirque 仍保留為沒有站點的行政區
    assert_eq!(loaded.districts.len(), 2);
    assert!(loaded.districts[1].is_empty());

    let out = dir.path().join("out");
    let config = PlanConfig::default().with_months(2);
    let report = solve(config, &loaded.districts);
    let written = write_outputs(&report, &out, &OutputOptions { geojson: true }).unwrap();

    let summary = report.summary.as_ref().unwrap();
    let pirque = summary.districts.iter().find(|d| d.comuna == "pirque").unwrap();
    assert_eq!(pirque.sites, 0);
    assert_eq!(pirque.demand_total, 0);
    assert_eq!(pirque.chargers_total, 0);
    assert_eq!(pirque.coverage_pct, 0.0);

    assert_eq!(written.len(), 6);
    let sites = std::fs::read_to_string(out.join(SITES_FILE)).unwrap();
    assert_eq!(sites.lines().count(), 3);
    let districts = std::fs::read_to_string(out.join(DISTRICTS_FILE)).unwrap();
    assert!(districts.lines().any(|l| l.starts_with("pirque,")));
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(summary["status_code"], "OPTIMAL");
}

#[test]
fn test_reference_config_parses() {
    let config = PlanConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
    assert_eq!(config.horizon.months, 12);
    assert_eq!(config.infrastructure.default_charger_cap_for("parking"), 25);
    assert_eq!(config.infrastructure.default_charger_cap_for("kiosk"), 10);
    assert_eq!(config.costs.activation, Decimal::new(6_500_000, 0));
    assert!(config.charger_mix.is_none());
}
