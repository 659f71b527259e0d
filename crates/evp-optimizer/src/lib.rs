//! # EVP Optimizer
//!
//! 充電站與太陽能設置的多期混合整數規劃：建模、求解、解讀與彙總

pub mod backend;
pub mod builder;
pub mod conflict;
pub mod extract;
pub mod lp_format;
pub mod objective;
pub mod planner;
pub mod precheck;
pub mod problem;
pub mod solver;
pub mod summary;
pub mod variables;

// Re-export 主要類型
pub use backend::{Backend, GoodLpSolver};
pub use builder::{BuiltModel, ModelBuilder};
pub use conflict::{ConflictFinder, ConflictSet};
pub use extract::{
    DistrictPeriodOutcome, DistrictPlan, PlanSolution, SitePeriodDecision, SitePeriodRecord, SitePlan, SiteRecord,
    SolutionExtractor,
};
pub use lp_format::{render as render_lp, write_lp, write_lp_file};
pub use objective::{ObjectiveComposer, ObjectiveTerms};
pub use planner::{export_model, PlanReport, Planner, CONFLICT_FILE, MODEL_FILE};
pub use precheck::PreSolveCheck;
pub use problem::{Domain, LinearConstraint, LinearExpr, LinearProgram, ModelStats, Relation, Sense, VarId, Violation};
pub use solver::{MilpSolver, SolveOptions, SolveOutcome, SolveStatus};
pub use summary::{CostBreakdown, DistrictSummary, EquityStats, GlobalSummary, PlanSummary, TimelineRow};
