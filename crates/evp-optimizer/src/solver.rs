//! 求解器介面
//!
//! 核心只依賴 `MilpSolver`；實際後端見 `backend` 模組。

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::problem::LinearProgram;

/// 求解選項
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// 牆鐘時限
    pub time_limit: Duration,
    /// 相對最佳化間隙
    pub mip_gap: f64,
    /// 執行緒數提示
    pub threads: Option<u32>,
}

impl SolveOptions {
    pub fn new(time_limit: Duration, mip_gap: f64) -> Self {
        Self {
            time_limit,
            mip_gap,
            threads: None,
        }
    }

    /// 建構器模式：設置執行緒數
    pub fn with_threads(mut self, threads: Option<u32>) -> Self {
        self.threads = threads;
        self
    }

    /// 由配置建立
    pub fn from_params(params: &evp_core::SolverParams) -> Self {
        Self::new(Duration::from_secs_f64(params.time_limit_secs), params.mip_gap)
            .with_threads(params.threads)
    }
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), 0.02)
    }
}

/// 求解狀態
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SolveStatus {
    /// 證明最佳
    Optimal,
    /// 到達時限但有可行解；gap 為相對間隙（若可得）
    TimeLimitWithIncumbent { gap: Option<f64> },
    /// 到達時限且無可行解
    TimeLimitNoIncumbent,
    /// 不可行
    Infeasible,
    /// 無界
    Unbounded,
    /// 其他終止狀態
    Other(String),
}

impl SolveStatus {
    /// 是否帶有可用的解
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::TimeLimitWithIncumbent { .. })
    }

    /// 狀態代碼
    pub fn code(&self) -> String {
        match self {
            SolveStatus::Optimal => "OPTIMAL".to_string(),
            SolveStatus::TimeLimitWithIncumbent { .. } => "TIME_LIMIT_WITH_SOLUTION".to_string(),
            SolveStatus::TimeLimitNoIncumbent => "TIME_LIMIT_NO_SOLUTION".to_string(),
            SolveStatus::Infeasible => "INFEASIBLE".to_string(),
            SolveStatus::Unbounded => "UNBOUNDED".to_string(),
            SolveStatus::Other(detail) => format!("STATUS_{detail}"),
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::TimeLimitWithIncumbent { gap: Some(gap) } => {
                write!(f, "{} (gap {:.2}%)", self.code(), gap * 100.0)
            }
            _ => f.write_str(&self.code()),
        }
    }
}

/// 求解結果
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// 依 `VarId` 索引的變數值；無解時為 None
    pub values: Option<Vec<f64>>,
    pub objective: Option<f64>,
    pub elapsed: Duration,
}

impl SolveOutcome {
    /// 有解的結果
    pub fn with_values(status: SolveStatus, values: Vec<f64>, objective: f64, elapsed: Duration) -> Self {
        Self {
            status,
            values: Some(values),
            objective: Some(objective),
            elapsed,
        }
    }

    /// 無解的結果
    pub fn without_values(status: SolveStatus, elapsed: Duration) -> Self {
        Self {
            status,
            values: None,
            objective: None,
            elapsed,
        }
    }
}

/// MILP 求解器
pub trait MilpSolver {
    /// 後端名稱
    fn name(&self) -> &str;

    /// 求解模型；回傳錯誤只代表後端本身失敗，不可行等狀態以 `SolveStatus` 表示
    fn solve(&self, program: &LinearProgram, options: &SolveOptions) -> evp_core::Result<SolveOutcome>;
}

impl<S: MilpSolver + ?Sized> MilpSolver for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, program: &LinearProgram, options: &SolveOptions) -> evp_core::Result<SolveOutcome> {
        (**self).solve(program, options)
    }
}

impl<S: MilpSolver + ?Sized> MilpSolver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, program: &LinearProgram, options: &SolveOptions) -> evp_core::Result<SolveOutcome> {
        (**self).solve(program, options)
    }
}
