//! 規劃配置模型
//!
//! 每次規劃建立一次 `PlanConfig`，之後以不可變參考傳遞給各元件。

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::horizon::PlanningHorizon;
use crate::{PlanError, Result};

/// 完整規劃配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub horizon: HorizonParams,
    pub demand: DemandParams,
    pub infrastructure: InfrastructureParams,
    pub costs: CostParams,
    pub equity: EquityParams,
    pub objective: ObjectiveParams,
    /// 慢充/快充組合（未設定時不建立相關變數）
    pub charger_mix: Option<ChargerMixParams>,
    pub solver: SolverParams,
}

impl PlanConfig {
    /// 從 TOML 字串載入並驗證
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PlanConfig =
            toml::from_str(text).map_err(|e| PlanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 從 TOML 檔案載入並驗證
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| PlanError::Config(format!("{}: {e}", path.display())))
    }

    /// 輸出為 TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlanError::Serialization(e.to_string()))
    }

    /// 建構規劃時界
    pub fn planning_horizon(&self) -> Result<PlanningHorizon> {
        PlanningHorizon::new(self.horizon.months, self.horizon.start)
    }

    /// 檢查參數合理性
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PlanError::Config(msg));

        if self.horizon.months == 0 {
            return fail("horizon.months 必須至少為 1".to_string());
        }
        for (name, value) in [
            ("demand.electrification_fraction", self.demand.electrification_fraction),
            ("demand.public_fraction", self.demand.public_fraction),
            ("demand.conservatism", self.demand.conservatism),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} 必須介於 0 與 1 之間，目前為 {value}"));
            }
        }
        if self.demand.avg_sites_per_district <= 0.0 || self.demand.avg_weight <= 0.0 {
            return fail("demand.avg_sites_per_district 與 demand.avg_weight 必須為正數".to_string());
        }
        if self.demand.annual_growth <= -1.0 {
            return fail(format!("demand.annual_growth 不可小於等於 -1，目前為 {}", self.demand.annual_growth));
        }
        if self.infrastructure.clients_per_charger <= 0.0 {
            return fail("infrastructure.clients_per_charger 必須為正數".to_string());
        }
        if self.infrastructure.energy_per_session_kwh < 0.0
            || self.infrastructure.panel_output_kwh < 0.0
            || self.infrastructure.grid_ceiling_kwh < 0.0
        {
            return fail("infrastructure 能源參數不可為負數".to_string());
        }
        if self.costs.money_scale <= Decimal::ZERO {
            return fail("costs.money_scale 必須為正數".to_string());
        }
        let costs = &self.costs;
        for (name, value) in [
            ("costs.activation", costs.activation),
            ("costs.charger_install", costs.charger_install),
            ("costs.charger_upkeep", costs.charger_upkeep),
            ("costs.panel_install", costs.panel_install),
            ("costs.panel_upkeep", costs.panel_upkeep),
            ("costs.grid_price_per_kwh", costs.grid_price_per_kwh),
            ("costs.budget", costs.budget),
        ] {
            if value < Decimal::ZERO {
                return fail(format!("{name} 不可為負數，目前為 {value}"));
            }
        }
        if self.equity.relaxed_margin < 0.0 {
            return fail("equity.relaxed_margin 不可為負數".to_string());
        }
        if !(0.0..=1.0).contains(&self.equity.envelope_slack) {
            return fail("equity.envelope_slack 必須介於 0 與 1 之間".to_string());
        }
        if let Some(ratio) = self.equity.cross_district_ratio {
            if ratio <= 0.0 {
                return fail(format!("equity.cross_district_ratio 必須為正數，目前為 {ratio}"));
            }
        }
        if let Some(ceiling) = self.equity.min_coverage_ceiling {
            if !(0.0..=1.0).contains(&ceiling) {
                return fail(format!("equity.min_coverage_ceiling 必須介於 0 與 1 之間，目前為 {ceiling}"));
            }
        }
        if !(0.0..=1.0).contains(&self.solver.mip_gap) {
            return fail(format!("solver.mip_gap 必須介於 0 與 1 之間，目前為 {}", self.solver.mip_gap));
        }
        if self.solver.time_limit_secs <= 0.0 {
            return fail("solver.time_limit_secs 必須為正數".to_string());
        }
        Ok(())
    }

    /// 建構器模式：設置月份數
    pub fn with_months(mut self, months: u32) -> Self {
        self.horizon.months = months;
        self
    }

    /// 建構器模式：設置預算
    pub fn with_budget(mut self, budget: Decimal) -> Self {
        self.costs.budget = budget;
        self
    }

    /// 建構器模式：設置公平性模式
    pub fn with_equity_mode(mut self, mode: EquityMode) -> Self {
        self.equity.mode = mode;
        self
    }

    /// 建構器模式：設置每樁服務客數
    pub fn with_clients_per_charger(mut self, clients: f64) -> Self {
        self.infrastructure.clients_per_charger = clients;
        self
    }

    /// 建構器模式：設置求解時限（秒）
    pub fn with_time_limit(mut self, secs: f64) -> Self {
        self.solver.time_limit_secs = secs;
        self
    }

    /// 建構器模式：設置相對間隙
    pub fn with_mip_gap(mut self, gap: f64) -> Self {
        self.solver.mip_gap = gap;
        self
    }

    /// 覆蓋率加成是否啟用
    pub fn coverage_bonus_enabled(&self) -> bool {
        match self.objective.coverage_bonus {
            CoverageBonus::Auto => self.equity.mode == EquityMode::Omitted,
            CoverageBonus::Always => true,
            CoverageBonus::Never => false,
        }
    }
}

/// 時界參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonParams {
    /// 月份數 M
    pub months: u32,
    /// 起始月份
    pub start: NaiveDate,
}

impl Default for HorizonParams {
    fn default() -> Self {
        Self {
            months: 12,
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

/// 需求估算參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandParams {
    /// 電動車比例
    pub electrification_fraction: f64,
    /// 每車每月充電次數
    pub charges_per_month: f64,
    /// 使用公共充電比例
    pub public_fraction: f64,
    /// 未知行政區的車隊規模
    pub default_fleet: u64,
    /// 車隊規模覆蓋（鍵值為正規化行政區名）
    pub fleet_overrides: BTreeMap<String, u64>,
    /// 已有充電樁的權重倍數
    pub existing_boost: f64,
    /// 每單位容量的權重增量
    pub capacity_weight: f64,
    /// 參考：每區平均站點數
    pub avg_sites_per_district: f64,
    /// 參考：平均權重
    pub avg_weight: f64,
    /// 保守係數
    pub conservatism: f64,
    /// 估算下限
    pub min_estimate: u32,
    /// 站點類型權重
    pub type_weights: BTreeMap<String, f64>,
    /// 未知類型權重
    pub default_type_weight: f64,
    /// 年成長率 g
    pub annual_growth: f64,
    /// 是否套用多期類型係數
    pub growth_type_factors_enabled: bool,
    /// 多期類型係數
    pub growth_type_factors: BTreeMap<String, f64>,
    /// 未知類型的多期係數
    pub default_growth_type_factor: f64,
    /// 使用資料來源預先計算的需求
    pub use_precomputed_demand: bool,
}

impl Default for DemandParams {
    fn default() -> Self {
        Self {
            electrification_fraction: 0.40,
            charges_per_month: 4.0,
            public_fraction: 0.60,
            default_fleet: 30_000,
            fleet_overrides: BTreeMap::new(),
            existing_boost: 2.5,
            capacity_weight: 0.05,
            avg_sites_per_district: 150.0,
            avg_weight: 1.2,
            conservatism: 0.3,
            min_estimate: 1,
            type_weights: default_type_weights(),
            default_type_weight: 0.5,
            annual_growth: 0.08,
            growth_type_factors_enabled: false,
            growth_type_factors: default_growth_type_factors(),
            default_growth_type_factor: 1.0,
            use_precomputed_demand: true,
        }
    }
}

fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn default_type_weights() -> BTreeMap<String, f64> {
    table(&[
        ("charging_station", 2.0),
        ("mall", 1.8),
        ("supermarket", 1.5),
        ("fuel", 1.4),
        ("parking", 1.3),
        ("university", 1.2),
        ("stadium", 1.1),
        ("hospital", 1.0),
        ("office", 0.8),
        ("commercial", 0.7),
        ("retail", 0.6),
        ("car_wash", 0.4),
        ("other", 0.5),
    ])
}

fn default_growth_type_factors() -> BTreeMap<String, f64> {
    table(&[
        ("parking", 1.0),
        ("fuel", 1.2),
        ("charging_station", 1.1),
        ("car_wash", 0.8),
        ("hospital", 1.8),
        ("university", 1.6),
        ("supermarket", 1.3),
        ("mall", 1.5),
        ("retail", 1.2),
        ("commercial", 1.1),
        ("office", 1.0),
        ("stadium", 2.0),
    ])
}

/// 基礎設施參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfrastructureParams {
    /// 每支充電樁每月服務客數 C
    pub clients_per_charger: f64,
    /// 每次充電耗電（kWh）
    pub energy_per_session_kwh: f64,
    /// 每片太陽能板每月發電量（kWh）
    pub panel_output_kwh: f64,
    /// 每站每月電網購電上限（kWh）
    pub grid_ceiling_kwh: f64,
    /// 未提供時的充電樁上限
    pub default_max_chargers: u32,
    /// 未提供時的太陽能板上限
    pub default_max_panels: u32,
    /// 既有設施之上的額外容量
    pub capacity_headroom: u32,
    /// 依站點類型的充電樁上限（載入時使用，優先於 default_max_chargers）
    pub type_max_chargers: BTreeMap<String, u32>,
}

impl Default for InfrastructureParams {
    fn default() -> Self {
        Self {
            clients_per_charger: 70.0,
            energy_per_session_kwh: 30.0,
            panel_output_kwh: 56.25,
            grid_ceiling_kwh: 10_000.0,
            default_max_chargers: 10,
            default_max_panels: 10,
            capacity_headroom: 0,
            type_max_chargers: BTreeMap::new(),
        }
    }
}

impl InfrastructureParams {
    /// 依類型取得預設充電樁上限
    pub fn default_charger_cap_for(&self, site_type: &str) -> u32 {
        self.type_max_chargers
            .get(site_type)
            .copied()
            .unwrap_or(self.default_max_chargers)
    }
}

/// 成本與預算參數（貨幣單位）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    /// 啟用成本 k
    pub activation: Decimal,
    /// 每支充電樁安裝成本 c
    pub charger_install: Decimal,
    /// 每支充電樁每月維護成本 h
    pub charger_upkeep: Decimal,
    /// 每片太陽能板安裝成本 v
    pub panel_install: Decimal,
    /// 每片太陽能板每月維護成本
    pub panel_upkeep: Decimal,
    /// 電網購電單價（每 kWh）
    pub grid_price_per_kwh: Decimal,
    /// 總預算 B
    pub budget: Decimal,
    /// 模型內金額縮放（避免係數過大）
    pub money_scale: Decimal,
    /// 既有設施維護費不佔用預算
    pub exempt_existing_upkeep: bool,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            activation: Decimal::new(6_500_000, 0),
            charger_install: Decimal::new(2_000_000, 0),
            charger_upkeep: Decimal::new(63_000, 0),
            panel_install: Decimal::new(900_000, 0),
            panel_upkeep: Decimal::new(625, 0),
            grid_price_per_kwh: Decimal::new(180, 0),
            budget: Decimal::new(500_000_000_000, 0),
            money_scale: Decimal::new(1_000_000, 0),
            exempt_existing_upkeep: true,
        }
    }
}

impl CostParams {
    /// 縮放後的模型係數
    pub fn scaled(&self, amount: Decimal) -> f64 {
        if self.money_scale.is_zero() {
            return 0.0;
        }
        (amount / self.money_scale).to_f64().unwrap_or(0.0)
    }

    /// 既有設施在整個時界的維護費
    pub fn committed_upkeep(&self, existing_chargers: u64, existing_panels: u64, months: u32) -> Decimal {
        let months = Decimal::from(months);
        (self.charger_upkeep * Decimal::from(existing_chargers)
            + self.panel_upkeep * Decimal::from(existing_panels))
            * months
    }
}

/// 公平性約束模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquityMode {
    /// D·phi + S = D
    Strict,
    /// phi 介於 1 − S/D ± margin
    Relaxed,
    /// 不定義 phi，改以覆蓋率加成
    Omitted,
}

impl std::str::FromStr for EquityMode {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(EquityMode::Strict),
            "relaxed" => Ok(EquityMode::Relaxed),
            "omitted" => Ok(EquityMode::Omitted),
            other => Err(PlanError::Config(format!("未知的公平性模式: {other}"))),
        }
    }
}

/// 公平性參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EquityParams {
    pub mode: EquityMode,
    /// relaxed 模式的容許帶寬
    pub relaxed_margin: f64,
    /// McCormick 下界的鬆弛（乘以 D）
    pub envelope_slack: f64,
    /// 跨區比例上限：phi_j ≤ ratio · phi_l
    pub cross_district_ratio: Option<f64>,
    /// 最終期 phi 上限（即最低覆蓋率 1 − ceiling）
    pub min_coverage_ceiling: Option<f64>,
}

impl Default for EquityParams {
    fn default() -> Self {
        Self {
            mode: EquityMode::Relaxed,
            relaxed_margin: 0.5,
            envelope_slack: 0.1,
            cross_district_ratio: None,
            min_coverage_ceiling: None,
        }
    }
}

/// 覆蓋率加成開關
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageBonus {
    /// 僅在公平性約束省略時啟用
    Auto,
    Always,
    Never,
}

/// 目標函數權重
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveParams {
    /// 每位服務客戶的價值 V
    pub client_value: f64,
    /// 每 kWh 太陽能的環境價值
    pub environmental_value: f64,
    pub coverage_bonus: CoverageBonus,
    /// 每 kWh 太陽能避免的 CO2（公斤），僅用於報表
    pub co2_kg_per_kwh: f64,
}

impl Default for ObjectiveParams {
    fn default() -> Self {
        Self {
            client_value: 1200.0,
            environmental_value: 50.0,
            coverage_bonus: CoverageBonus::Auto,
            co2_kg_per_kwh: 0.5,
        }
    }
}

/// 慢充/快充組合參數（每支每月可供電量）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerMixParams {
    pub slow_kwh_per_month: f64,
    pub fast_kwh_per_month: f64,
}

impl Default for ChargerMixParams {
    fn default() -> Self {
        Self {
            slow_kwh_per_month: 1188.0,
            fast_kwh_per_month: 2700.0,
        }
    }
}

/// 求解器參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// 時限（秒）
    pub time_limit_secs: f64,
    /// 相對最佳化間隙
    pub mip_gap: f64,
    /// 執行緒數提示
    pub threads: Option<u32>,
    /// 是否輸出 LP 模型檔
    pub write_model: bool,
    /// 衝突集搜尋的最多求解次數
    pub conflict_max_solves: usize,
    /// 衝突集搜尋中每次求解的時限（秒）
    pub conflict_time_limit_secs: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            time_limit_secs: 600.0,
            mip_gap: 0.02,
            threads: None,
            write_model: false,
            conflict_max_solves: 500,
            conflict_time_limit_secs: 30.0,
        }
    }
}
