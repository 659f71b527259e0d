//! good_lp 後端
//!
//! 預設使用純 Rust 的 microlp；啟用 `highs` feature 時改用 HiGHS。
//! 兩者都在求解過程中檢查時限與相對間隙。

use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolutionStatus,
    SolverModel, Variable, WithMipGap, WithTimeLimit,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::problem::{Domain, LinearExpr, LinearProgram, Relation, Sense};
use crate::solver::{MilpSolver, SolveOptions, SolveOutcome, SolveStatus};

/// 時限到達後的可行性檢查容差
const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// 後端回傳的變數值與終止原因
type RawResult = Result<(Vec<f64>, SolutionStatus), ResolutionError>;

/// good_lp 可用的後端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MicroLp,
    #[cfg(feature = "highs")]
    Highs,
}

/// good_lp 求解器
#[derive(Debug)]
pub struct GoodLpSolver {
    backend: Backend,
    threads_warned: AtomicBool,
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        #[cfg(feature = "highs")]
        let backend = Backend::Highs;
        #[cfg(not(feature = "highs"))]
        let backend = Backend::MicroLp;
        Self::with_backend(backend)
    }
}

impl GoodLpSolver {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            threads_warned: AtomicBool::new(false),
        }
    }

    /// 純 Rust 後端（單執行緒）
    pub fn microlp() -> Self {
        Self::with_backend(Backend::MicroLp)
    }

    #[cfg(feature = "highs")]
    pub fn highs() -> Self {
        Self::with_backend(Backend::Highs)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn run(&self, program: &LinearProgram, options: &SolveOptions) -> (RawResult, Duration) {
        let started = Instant::now();
        let Translation {
            vars,
            handles,
            objective,
            constraints,
        } = Translation::of(program);
        let unsolved = match program.sense() {
            Sense::Maximize => vars.maximise(objective),
            Sense::Minimize => vars.minimise(objective),
        };
        let seconds = options.time_limit.as_secs_f64();
        let gap = options.mip_gap as f32;

        let result = match self.backend {
            Backend::MicroLp => {
                if options.threads.is_some() && !self.threads_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!("microlp 後端為單執行緒，忽略執行緒數設定 {:?}", options.threads);
                }
                solve_model(unsolved.using(good_lp::microlp), constraints, &handles, seconds, gap)
            }
            #[cfg(feature = "highs")]
            Backend::Highs => {
                let mut model = unsolved.using(good_lp::highs);
                if let Some(threads) = options.threads {
                    model = model.set_option("threads", threads as i32);
                }
                solve_model(model, constraints, &handles, seconds, gap)
            }
        };

        (result, started.elapsed())
    }

    /// 以線性鬆弛估計相對間隙上界
    fn relaxation_gap(&self, program: &LinearProgram, options: &SolveOptions, incumbent: f64) -> Option<f64> {
        let relaxed = program.relaxed();
        let (result, _) = self.run(&relaxed, options);
        let (values, status) = result.ok()?;
        if !matches!(status, SolutionStatus::Optimal) {
            return None;
        }
        let bound = relaxed.objective().evaluate(&values);
        Some((bound - incumbent).abs() / incumbent.abs().max(1e-9))
    }
}

/// 套用時限與間隙後求解
fn solve_model<M>(model: M, constraints: Vec<Constraint>, handles: &[Variable], seconds: f64, gap: f32) -> RawResult
where
    M: SolverModel<Error = ResolutionError> + WithTimeLimit + WithMipGap,
{
    let mut model = model
        .with_time_limit(seconds)
        .with_mip_gap(gap)
        .map_err(|e| ResolutionError::Str(e.to_string()))?;
    for c in constraints {
        model.add_constraint(c);
    }
    let solution = model.solve()?;
    Ok((read_values(&solution, handles), solution.status()))
}

impl MilpSolver for GoodLpSolver {
    fn name(&self) -> &str {
        match self.backend {
            Backend::MicroLp => "microlp",
            #[cfg(feature = "highs")]
            Backend::Highs => "highs",
        }
    }

    fn solve(&self, program: &LinearProgram, options: &SolveOptions) -> evp_core::Result<SolveOutcome> {
        tracing::debug!(
            "{} 求解：變數 {}，約束 {}，時限 {:?}",
            self.name(),
            program.variables().len(),
            program.constraints().len(),
            options.time_limit
        );

        let (result, elapsed) = self.run(program, options);

        let outcome = match result {
            Ok((values, SolutionStatus::TimeLimit)) => {
                let objective = program.objective().evaluate(&values);
                if program.check_assignment(&values, FEASIBILITY_TOLERANCE).is_empty() {
                    let gap = self.relaxation_gap(program, options, objective);
                    SolveOutcome::with_values(
                        SolveStatus::TimeLimitWithIncumbent { gap },
                        values,
                        objective,
                        elapsed,
                    )
                } else {
                    SolveOutcome::without_values(SolveStatus::TimeLimitNoIncumbent, elapsed)
                }
            }
            // 達到要求的相對間隙視同最佳
            Ok((values, _)) => {
                let objective = program.objective().evaluate(&values);
                SolveOutcome::with_values(SolveStatus::Optimal, values, objective, elapsed)
            }
            Err(ResolutionError::Infeasible) => {
                SolveOutcome::without_values(SolveStatus::Infeasible, elapsed)
            }
            Err(ResolutionError::Unbounded) => {
                SolveOutcome::without_values(SolveStatus::Unbounded, elapsed)
            }
            // 時限內未找到可行解
            Err(_) if elapsed >= options.time_limit => {
                SolveOutcome::without_values(SolveStatus::TimeLimitNoIncumbent, elapsed)
            }
            Err(other) => SolveOutcome::without_values(SolveStatus::Other(other.to_string()), elapsed),
        };

        tracing::debug!("{} 求解結束：{}，耗時 {:?}", self.name(), outcome.status, outcome.elapsed);
        Ok(outcome)
    }
}

/// `LinearProgram` 翻譯為 good_lp 物件
struct Translation {
    vars: ProblemVariables,
    handles: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

impl Translation {
    fn of(program: &LinearProgram) -> Self {
        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = program
            .variables()
            .iter()
            .map(|decl| {
                let mut definition = variable().name(decl.name.clone());
                definition = match decl.domain {
                    Domain::Binary => definition.binary(),
                    Domain::Integer => definition.integer(),
                    Domain::Continuous => definition,
                };
                definition = definition.min(decl.lower);
                if let Some(upper) = decl.upper {
                    definition = definition.max(upper);
                }
                vars.add(definition)
            })
            .collect();

        let objective = expression(program.objective(), &handles);
        let constraints = program
            .constraints()
            .iter()
            .map(|c| {
                let lhs = expression(&c.expr, &handles);
                match c.relation {
                    Relation::Le => constraint::leq(lhs, c.rhs),
                    Relation::Ge => constraint::geq(lhs, c.rhs),
                    Relation::Eq => constraint::eq(lhs, c.rhs),
                }
            })
            .collect();

        Self {
            vars,
            handles,
            objective,
            constraints,
        }
    }
}

fn expression(expr: &LinearExpr, handles: &[Variable]) -> Expression {
    let mut result = Expression::from(expr.constant_value());
    for (var, coef) in expr.terms() {
        result += *coef * handles[var.index()];
    }
    result
}

fn read_values<S: Solution>(solution: &S, handles: &[Variable]) -> Vec<f64> {
    handles.iter().map(|var| solution.value(*var)).collect()
}
