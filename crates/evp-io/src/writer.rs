//! 規劃結果輸出（CSV 與 JSON）

use std::path::{Path, PathBuf};

use evp_calc::DemandTable;
use evp_core::{PlanError, PlanWarning, Result};
use evp_optimizer::{ConflictSet, CostBreakdown, EquityStats, GlobalSummary, ModelStats, PlanReport, SolveStatus};
use serde::Serialize;

use crate::geojson::write_geojson;

pub const SITES_FILE: &str = "sites.csv";
pub const SITE_PERIODS_FILE: &str = "site_periods.csv";
pub const DISTRICTS_FILE: &str = "districts.csv";
pub const TIMELINE_FILE: &str = "timeline.csv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const GEOJSON_FILE: &str = "sites.geojson";

/// 輸出選項
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// 是否輸出站點 GeoJSON
    pub geojson: bool,
}

/// 將序列寫成 CSV（表頭取自結構欄位）
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| PlanError::Csv(format!("{}: {e}", path.display())))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| PlanError::Csv(format!("{}: {e}", path.display())))?;
    }
    writer.flush()?;
    tracing::debug!("寫入 {}：{} 列", path.display(), rows.len());
    Ok(())
}

/// 需求表 CSV
pub fn write_demand_csv(path: &Path, demand: &DemandTable) -> Result<()> {
    write_csv(path, &demand.rows())
}

/// summary.json 的內容
#[derive(Debug, Serialize)]
struct SummaryDocument<'a> {
    run_id: String,
    generated_at: String,
    solver: &'a str,
    status: &'a SolveStatus,
    status_code: &'a str,
    gap: Option<f64>,
    months: u32,
    objective: Option<f64>,
    elapsed_ms: u64,
    model: &'a ModelStats,
    global: Option<&'a GlobalSummary>,
    costs: Option<&'a CostBreakdown>,
    equity: Option<&'a EquityStats>,
    conflict: Option<&'a ConflictSet>,
    warnings: &'a [PlanWarning],
}

impl<'a> SummaryDocument<'a> {
    fn from_report(report: &'a PlanReport) -> Self {
        let gap = match &report.status {
            SolveStatus::TimeLimitWithIncumbent { gap } => *gap,
            _ => None,
        };
        Self {
            run_id: report.run_id.to_string(),
            generated_at: report.generated_at.to_rfc3339(),
            solver: &report.solver,
            status: &report.status,
            status_code: &report.status_code,
            gap,
            months: report.months,
            objective: report.solution.as_ref().map(|s| s.objective),
            elapsed_ms: report.elapsed_ms,
            model: &report.model_stats,
            global: report.summary.as_ref().map(|s| &s.global),
            costs: report.summary.as_ref().map(|s| &s.costs),
            equity: report.summary.as_ref().map(|s| &s.equity),
            conflict: report.conflict.as_ref(),
            warnings: &report.warnings,
        }
    }
}

/// summary.json
pub fn write_summary_json(path: &Path, report: &PlanReport) -> Result<()> {
    let document = SummaryDocument::from_report(report);
    let text = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// 寫出全部結果；無可用解時只寫 summary.json
pub fn write_outputs(report: &PlanReport, out_dir: &Path, options: &OutputOptions) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    if let (Some(solution), Some(summary)) = (&report.solution, &report.summary) {
        let sites = out_dir.join(SITES_FILE);
        write_csv(&sites, &solution.site_records())?;
        written.push(sites);

        let site_periods = out_dir.join(SITE_PERIODS_FILE);
        write_csv(&site_periods, &solution.site_period_records())?;
        written.push(site_periods);

        let districts = out_dir.join(DISTRICTS_FILE);
        write_csv(&districts, &summary.districts)?;
        written.push(districts);

        let timeline = out_dir.join(TIMELINE_FILE);
        write_csv(&timeline, &summary.timeline)?;
        written.push(timeline);

        if options.geojson {
            let geojson = out_dir.join(GEOJSON_FILE);
            write_geojson(&geojson, &solution.site_records())?;
            written.push(geojson);
        }
    } else {
        tracing::warn!("狀態 {}：不輸出站點與行政區明細", report.status_code);
    }

    let summary = out_dir.join(SUMMARY_FILE);
    write_summary_json(&summary, report)?;
    written.push(summary);

    tracing::info!("輸出 {} 個檔案至 {}", written.len(), out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evp_core::{District, GeoPoint, PlanConfig, Site};
    use evp_optimizer::{LinearProgram, MilpSolver, Planner, SolveOptions, SolveOutcome};
    use std::time::Duration;

    /// 回傳不動作方案的求解器
    struct Baseline(Vec<f64>);

    impl MilpSolver for Baseline {
        fn name(&self) -> &str {
            "baseline"
        }

        fn solve(&self, _program: &LinearProgram, _options: &SolveOptions) -> Result<SolveOutcome> {
            Ok(SolveOutcome::with_values(SolveStatus::Optimal, self.0.clone(), 0.0, Duration::ZERO))
        }
    }

    struct NoIncumbent;

    impl MilpSolver for NoIncumbent {
        fn name(&self) -> &str {
            "none"
        }

        fn solve(&self, _program: &LinearProgram, _options: &SolveOptions) -> Result<SolveOutcome> {
            Ok(SolveOutcome::without_values(SolveStatus::TimeLimitNoIncumbent, Duration::ZERO))
        }
    }

    fn districts() -> Vec<District> {
        let point = GeoPoint::new(-70.6, -33.4);
        vec![
            District::new("Macul").with_sites(vec![
                Site::new("A", "mall", point).with_demand_hint(40),
                Site::new("B", "fuel", point).with_existing_chargers(1).with_demand_hint(30),
            ]),
            District::new("Pirque"),
        ]
    }

    fn baseline_values(config: &PlanConfig) -> Vec<f64> {
        let horizon = config.planning_horizon().unwrap();
        let demand = evp_calc::DemandEstimator::new(&config.demand).build_table(&districts(), &horizon);
        evp_optimizer::ModelBuilder::new(config, &horizon, &demand)
            .build(&districts())
            .unwrap()
            .baseline
    }

    #[test]
    fn test_write_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlanConfig::default().with_months(2);
        let solver = Baseline(baseline_values(&config));
        let report = Planner::new(config, solver).plan(&districts()).unwrap();

        let written = write_outputs(&report, dir.path(), &OutputOptions { geojson: true }).unwrap();
        assert_eq!(written.len(), 6);

        let sites = std::fs::read_to_string(dir.path().join(SITES_FILE)).unwrap();
        let mut lines = sites.lines();
        assert!(lines.next().unwrap().starts_with("comuna,site_id,site_name,site_type,lon,lat,q_existed"));
        assert_eq!(lines.count(), 2);

        let periods = std::fs::read_to_string(dir.path().join(SITE_PERIODS_FILE)).unwrap();
        assert_eq!(periods.lines().count(), 1 + 4);

        // 無站點的行政區仍出現在彙總
        let districts = std::fs::read_to_string(dir.path().join(DISTRICTS_FILE)).unwrap();
        assert!(districts.lines().any(|l| l.starts_with("pirque,Pirque,0,")));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["status_code"], "OPTIMAL");
        assert_eq!(summary["months"], 2);
        assert_eq!(summary["global"]["sites"], 2);
    }

    #[test]
    fn test_no_rows_without_solution() {
        let dir = tempfile::tempdir().unwrap();
        let report = Planner::new(PlanConfig::default().with_months(1), NoIncumbent)
            .plan(&districts())
            .unwrap();

        let written = write_outputs(&report, dir.path(), &OutputOptions::default()).unwrap();
        assert_eq!(written, vec![dir.path().join(SUMMARY_FILE)]);
        assert!(!dir.path().join(SITES_FILE).exists());

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(summary["status_code"], "TIME_LIMIT_NO_SOLUTION");
        assert!(summary["global"].is_null());
    }

    #[test]
    fn test_demand_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlanConfig::default().with_months(3);
        let horizon = config.planning_horizon().unwrap();
        let demand = evp_calc::DemandEstimator::new(&config.demand).build_table(&districts(), &horizon);

        let path = dir.path().join("demand.csv");
        write_demand_csv(&path, &demand).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().next(), Some("district,site_id,period,demand"));
        assert_eq!(text.lines().count(), 1 + 2 * 3);
    }
}
