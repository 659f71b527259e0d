//! 規劃主流程
//!
//! 需求預測 → 求解前檢查 → 建模 → 目標 → 求解 → 解讀（或衝突集搜尋）

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use evp_calc::{DemandEstimator, DemandTable};
use evp_core::{District, PlanConfig, PlanError, PlanWarning, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::builder::ModelBuilder;
use crate::conflict::{ConflictFinder, ConflictSet};
use crate::extract::{PlanSolution, SolutionExtractor};
use crate::lp_format::write_lp_file;
use crate::objective::ObjectiveComposer;
use crate::precheck::PreSolveCheck;
use crate::problem::ModelStats;
use crate::solver::{MilpSolver, SolveOptions, SolveStatus};
use crate::summary::PlanSummary;

/// 模型檔名
pub const MODEL_FILE: &str = "model.lp";
/// 衝突子模型檔名
pub const CONFLICT_FILE: &str = "conflict.ilp";

/// 解的可行性驗證容差
const VERIFY_TOLERANCE: f64 = 1e-5;
/// 預算比較容差（貨幣單位）
const BUDGET_TOLERANCE: i64 = 1;

/// 一次規劃的完整報告
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub solver: String,
    pub months: u32,
    pub status: SolveStatus,
    pub status_code: String,
    pub warnings: Vec<PlanWarning>,
    pub model_stats: ModelStats,
    #[serde(skip)]
    pub demand: DemandTable,
    pub solution: Option<PlanSolution>,
    pub summary: Option<PlanSummary>,
    pub conflict: Option<ConflictSet>,
    pub model_path: Option<PathBuf>,
    pub conflict_path: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl PlanReport {
    /// 是否有可用的規劃解
    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// 是否有錯誤等級的警告
    pub fn has_errors(&self) -> bool {
        self.warnings.iter().any(PlanWarning::is_error)
    }
}

/// 規劃器
pub struct Planner<S: MilpSolver> {
    config: PlanConfig,
    solver: S,
    /// 模型檔與衝突檔的輸出目錄
    artifact_dir: Option<PathBuf>,
}

impl<S: MilpSolver> Planner<S> {
    pub fn new(config: PlanConfig, solver: S) -> Self {
        Self {
            config,
            solver,
            artifact_dir: None,
        }
    }

    /// 建構器模式：設置輸出目錄
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    fn artifact_path(&self, file: &str) -> Result<Option<PathBuf>> {
        match &self.artifact_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(Some(dir.join(file)))
            }
            None => Ok(None),
        }
    }

    /// 主規劃入口
    pub fn plan(&self, districts: &[District]) -> Result<PlanReport> {
        let site_count: usize = districts.iter().map(District::site_count).sum();
        tracing::info!(
            "開始規劃：行政區 {}，站點 {}，求解器 {}",
            districts.len(),
            site_count,
            self.solver.name()
        );
        let start_time = Instant::now();

        self.config.validate()?;
        if districts.is_empty() {
            return Err(PlanError::NoDistricts);
        }
        let horizon = self.config.planning_horizon()?;

        // Step 1: 需求預測
        tracing::debug!("Step 1: 需求預測");
        let demand = DemandEstimator::new(&self.config.demand).build_table(districts, &horizon);

        // Step 2: 求解前檢查
        tracing::debug!("Step 2: 求解前檢查");
        let mut warnings = PreSolveCheck::new(&self.config, &horizon).run(districts, &demand);

        // Step 3: 建模
        tracing::debug!("Step 3: 建模");
        let mut model = ModelBuilder::new(&self.config, &horizon, &demand).build(districts)?;
        let baseline_violations = model.program.check_assignment(&model.baseline, VERIFY_TOLERANCE);
        if let Some(first) = baseline_violations.first() {
            let warning = PlanWarning::warning(
                "model",
                format!("不動作方案違反 {} 條約束（例如 {first}），模型可能不可行", baseline_violations.len()),
            );
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        // Step 4: 目標函數
        tracing::debug!("Step 4: 目標函數");
        ObjectiveComposer::new(&self.config).compose(&mut model);
        let model_stats = model.program.stats();
        tracing::info!(
            "模型規模：變數 {}（二元 {}，整數 {}，連續 {}），約束 {}",
            model_stats.variables,
            model_stats.binaries,
            model_stats.integers,
            model_stats.continuous,
            model_stats.constraints
        );

        let model_path = if self.config.solver.write_model {
            match self.artifact_path(MODEL_FILE)? {
                Some(path) => {
                    write_lp_file(&model.program, &path)?;
                    Some(path)
                }
                None => {
                    tracing::warn!("未設置輸出目錄，略過模型檔輸出");
                    None
                }
            }
        } else {
            None
        };

        // Step 5: 求解
        tracing::debug!("Step 5: 求解");
        let options = SolveOptions::from_params(&self.config.solver);
        let outcome = self.solver.solve(&model.program, &options)?;
        tracing::info!("求解結束：{}，耗時 {:?}", outcome.status, outcome.elapsed);

        // Step 6: 解讀或診斷
        tracing::debug!("Step 6: 解讀結果");
        let mut solution = None;
        let mut summary = None;
        let mut conflict = None;
        let mut conflict_path = None;

        match &outcome.status {
            status if status.has_solution() => {
                let values = outcome
                    .values
                    .as_deref()
                    .ok_or_else(|| PlanError::Solver(format!("求解器回報 {status} 但未提供變數值")))?;

                let violations = model.program.check_assignment(values, VERIFY_TOLERANCE);
                for violation in violations.iter().take(10) {
                    warnings.push(PlanWarning::error("solution", format!("解違反約束 {violation}")));
                }
                if !violations.is_empty() {
                    tracing::error!("求解器回傳的解違反 {} 條約束", violations.len());
                }

                let extracted = SolutionExtractor::new(&self.config, &horizon).extract(
                    &model,
                    districts,
                    values,
                    outcome.objective.unwrap_or_default(),
                );
                let plan_summary = PlanSummary::from_solution(&extracted, &self.config, model.committed_upkeep);
                if !plan_summary.costs.within_budget(Decimal::from(BUDGET_TOLERANCE)) {
                    warnings.push(PlanWarning::error(
                        "budget",
                        format!(
                            "計入預算的成本 {} 超過預算 {}",
                            plan_summary.costs.budgeted_total, plan_summary.costs.budget
                        ),
                    ));
                }
                solution = Some(extracted);
                summary = Some(plan_summary);
            }
            SolveStatus::Infeasible => {
                tracing::warn!("模型不可行，開始搜尋衝突集");
                let params = &self.config.solver;
                let conflict_options = SolveOptions::new(
                    Duration::from_secs_f64(params.conflict_time_limit_secs),
                    params.mip_gap,
                )
                .with_threads(params.threads);
                let found = ConflictFinder::new(&self.solver, conflict_options, params.conflict_max_solves)
                    .find(&model.program)?;

                if let Some(set) = &found {
                    tracing::warn!("衝突集：{}", set.constraints.join(", "));
                    warnings.push(PlanWarning::error(
                        "model",
                        format!(
                            "模型不可行，衝突約束 {} 條{}：{}",
                            set.constraints.len(),
                            if set.minimal { "" } else { "（可能非最小）" },
                            set.constraints.join(", ")
                        ),
                    ));
                    if let Some(path) = self.artifact_path(CONFLICT_FILE)? {
                        write_lp_file(&set.to_program(&model.program), &path)?;
                        conflict_path = Some(path);
                    }
                }
                conflict = found;
            }
            status => {
                warnings.push(PlanWarning::error("solver", format!("求解未產生可用解：{status}")));
            }
        }

        let elapsed = start_time.elapsed();
        tracing::info!("規劃完成，耗時 {:?}", elapsed);

        Ok(PlanReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            solver: self.solver.name().to_string(),
            months: horizon.months,
            status_code: outcome.status.code(),
            status: outcome.status,
            warnings,
            model_stats,
            demand,
            solution,
            summary,
            conflict,
            model_path,
            conflict_path,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// 只輸出模型檔，不求解
pub fn export_model(config: &PlanConfig, districts: &[District], path: &Path) -> Result<ModelStats> {
    config.validate()?;
    let horizon = config.planning_horizon()?;
    let demand = DemandEstimator::new(&config.demand).build_table(districts, &horizon);
    let mut model = ModelBuilder::new(config, &horizon, &demand).build(districts)?;
    ObjectiveComposer::new(config).compose(&mut model);
    write_lp_file(&model.program, path)?;
    Ok(model.program.stats())
}
