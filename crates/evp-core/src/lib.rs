//! # EVP Core
//!
//! 充電站與太陽能板規劃的核心資料模型與類型定義

pub mod config;
pub mod diagnostics;
pub mod district;
pub mod horizon;
pub mod site;

// Re-export 主要類型
pub use config::{
    ChargerMixParams, CostParams, CoverageBonus, DemandParams, EquityMode, EquityParams,
    HorizonParams, InfrastructureParams, ObjectiveParams, PlanConfig, SolverParams,
};
pub use diagnostics::{PlanWarning, WarningSeverity};
pub use district::{normalize_key, District};
pub use horizon::{Period, PlanningHorizon};
pub use site::{GeoPoint, Site, SiteId, OTHER_SITE_TYPE};

/// 規劃錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("配置錯誤: {0}")]
    Config(String),

    #[error("輸入資料錯誤: {0}")]
    InvalidInput(String),

    #[error("欄位對應錯誤: 缺少必要欄位 `{field}`（可接受名稱: {aliases}）")]
    MissingColumn { field: String, aliases: String },

    #[error("沒有可規劃的行政區")]
    NoDistricts,

    #[error("模型建構錯誤: {0}")]
    Model(String),

    #[error("求解器錯誤: {0}")]
    Solver(String),

    #[error("CSV 錯誤: {0}")]
    Csv(String),

    #[error("序列化錯誤: {0}")]
    Serialization(String),

    #[error("I/O 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
