//! 不可行模型的衝突集（IIS）搜尋
//!
//! 刪除過濾法：逐一移除約束，若剩餘約束仍不可行則永久移除，
//! 否則保留。結束時留下的約束集合不可行且任一約束都不可再刪。
//! 變數上下界視為固定背景，不參與過濾。

use serde::Serialize;

use crate::problem::LinearProgram;
use crate::solver::{MilpSolver, SolveOptions, SolveStatus};

/// 衝突集
#[derive(Debug, Clone, Serialize)]
pub struct ConflictSet {
    /// 約束在原模型中的索引
    pub indices: Vec<usize>,
    /// 約束名稱
    pub constraints: Vec<String>,
    /// 是否完成全部過濾（未達求解次數上限且每次求解都有定論）
    pub minimal: bool,
    /// 搜尋過程的求解次數
    pub solves: usize,
    /// 無法判定可行性（時限或其他狀態）而保留的約束數
    pub undecided: usize,
}

impl ConflictSet {
    /// 衝突只來自變數上下界
    pub fn bounds_only(&self) -> bool {
        self.indices.is_empty()
    }

    /// 衝突子模型（用於輸出 .ilp）
    pub fn to_program(&self, program: &LinearProgram) -> LinearProgram {
        let mut subset = program.restricted_to(&self.indices);
        subset.name = format!("{}_conflict", program.name);
        subset
    }
}

/// 子集求解的判定
enum Verdict {
    Infeasible,
    Feasible,
    /// 時限內未有定論
    Undecided,
}

/// 衝突集搜尋器
pub struct ConflictFinder<'a, S: MilpSolver + ?Sized> {
    solver: &'a S,
    options: SolveOptions,
    max_solves: usize,
}

impl<'a, S: MilpSolver + ?Sized> ConflictFinder<'a, S> {
    pub fn new(solver: &'a S, options: SolveOptions, max_solves: usize) -> Self {
        Self {
            solver,
            options,
            max_solves: max_solves.max(1),
        }
    }

    fn verdict(&self, program: &LinearProgram, indices: &[usize]) -> evp_core::Result<Verdict> {
        let subset = program.restricted_to(indices);
        let outcome = self.solver.solve(&subset, &self.options)?;
        Ok(match outcome.status {
            SolveStatus::Infeasible => Verdict::Infeasible,
            status if status.has_solution() => Verdict::Feasible,
            status => {
                tracing::debug!("子集求解無定論：{status}");
                Verdict::Undecided
            }
        })
    }

    /// 搜尋衝突集；模型本身可行時回傳 None
    pub fn find(&self, program: &LinearProgram) -> evp_core::Result<Option<ConflictSet>> {
        let all: Vec<usize> = (0..program.constraints().len()).collect();
        tracing::info!("開始衝突集搜尋：約束 {} 條", all.len());

        let mut solves = 1;
        match self.verdict(program, &all)? {
            Verdict::Infeasible => {}
            Verdict::Feasible => {
                tracing::info!("模型在零目標下可行，無衝突集");
                return Ok(None);
            }
            Verdict::Undecided => {
                tracing::warn!("無法確認完整模型不可行，略過衝突集搜尋");
                return Ok(None);
            }
        }

        let mut current = all;
        let mut minimal = true;
        let mut undecided = 0;
        let mut cursor = 0;
        while cursor < current.len() {
            if solves >= self.max_solves {
                tracing::warn!("衝突集搜尋達到求解上限 {}，結果可能非最小", self.max_solves);
                minimal = false;
                break;
            }

            let mut trial = current.clone();
            let removed = trial.remove(cursor);
            solves += 1;
            match self.verdict(program, &trial)? {
                Verdict::Infeasible => {
                    tracing::debug!("移除約束 {}", program.constraints()[removed].name);
                    current = trial;
                }
                Verdict::Feasible => cursor += 1,
                Verdict::Undecided => {
                    undecided += 1;
                    cursor += 1;
                }
            }
        }
        if undecided > 0 {
            tracing::warn!("{undecided} 條約束無法判定是否可刪，結果可能非最小");
            minimal = false;
        }

        let constraints: Vec<String> = current
            .iter()
            .map(|i| program.constraints()[*i].name.clone())
            .collect();
        tracing::info!("衝突集搜尋完成：{} 條約束，求解 {} 次", constraints.len(), solves);

        Ok(Some(ConflictSet {
            indices: current,
            constraints,
            minimal,
            solves,
            undecided,
        }))
    }
}
