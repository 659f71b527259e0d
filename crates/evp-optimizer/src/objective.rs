//! 目標函數組合
//!
//! max Σ psi·V + Σ s·B_CO2 [+ Σ (啟用站點數 / 站點總數)·V]

use evp_core::PlanConfig;

use crate::builder::BuiltModel;
use crate::problem::{LinearExpr, Sense};

/// 目標函數各項的權重摘要
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveTerms {
    pub equity_terms: usize,
    pub solar_terms: usize,
    pub coverage_terms: usize,
}

/// 目標函數組合器
pub struct ObjectiveComposer<'a> {
    config: &'a PlanConfig,
}

impl<'a> ObjectiveComposer<'a> {
    pub fn new(config: &'a PlanConfig) -> Self {
        Self { config }
    }

    /// 組合目標並寫入模型
    pub fn compose(&self, model: &mut BuiltModel) -> ObjectiveTerms {
        let weights = &self.config.objective;
        let mut objective = LinearExpr::new();
        let mut terms = ObjectiveTerms {
            equity_terms: 0,
            solar_terms: 0,
            coverage_terms: 0,
        };

        // 公平性加權的滿足需求
        for district in &model.index.districts {
            for vars in &district.periods {
                if vars.demand > 0 {
                    objective.add(vars.psi, weights.client_value);
                    terms.equity_terms += 1;
                }
            }
        }

        // 太陽能環境效益
        for site in &model.index.sites {
            for vars in &site.periods {
                objective.add(vars.solar, weights.environmental_value);
                terms.solar_terms += 1;
            }
        }

        // 覆蓋率加成：每區啟用站點比例
        if self.config.coverage_bonus_enabled() {
            for district in &model.index.districts {
                let site_count = model.index.sites_of(district.district).count();
                if site_count == 0 {
                    continue;
                }
                let weight = weights.client_value / site_count as f64;
                for site in model.index.sites_of(district.district) {
                    for vars in &site.periods {
                        objective.add(vars.active, weight);
                        terms.coverage_terms += 1;
                    }
                }
            }
        }

        tracing::debug!(
            "目標函數：公平項 {}，太陽能項 {}，覆蓋率項 {}",
            terms.equity_terms,
            terms.solar_terms,
            terms.coverage_terms
        );

        model.program.set_objective(objective, Sense::Maximize);
        terms
    }
}
