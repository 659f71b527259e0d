//! 行政區車隊規模查詢

use evp_core::{normalize_key, DemandParams, District};
use std::collections::BTreeMap;

/// 2023 年各行政區車隊規模（聖地牙哥都會區）
const FLEET_2023: &[(&str, u64)] = &[
    ("cerrillos", 35_000),
    ("cerro_navia", 42_000),
    ("colina", 58_000),
    ("conchali", 45_000),
    ("el_bosque", 52_000),
    ("estacion_central", 48_000),
    ("huechuraba", 38_000),
    ("independencia", 28_000),
    ("la_cisterna", 32_000),
    ("la_florida", 125_000),
    ("la_granja", 38_000),
    ("la_pintana", 55_000),
    ("la_reina", 42_000),
    ("lampa", 35_000),
    ("las_condes", 135_000),
    ("lo_barnechea", 48_000),
    ("lo_espejo", 35_000),
    ("lo_prado", 38_000),
    ("macul", 42_000),
    ("maipu", 185_000),
    ("nunoa", 75_000),
    ("padre_hurtado", 22_000),
    ("pedro_aguirre_cerda", 32_000),
    ("penaflor", 28_000),
    ("penalolen", 78_000),
    ("pirque", 12_000),
    ("providencia", 52_000),
    ("pudahuel", 65_000),
    ("puente_alto", 195_000),
    ("quilicura", 72_000),
    ("quinta_normal", 38_000),
    ("recoleta", 58_000),
    ("renca", 45_000),
    ("san_bernardo", 98_000),
    ("san_joaquin", 32_000),
    ("san_jose_de_maipo", 8_000),
    ("san_miguel", 35_000),
    ("san_ramon", 28_000),
    ("santiago", 65_000),
    ("vitacura", 48_000),
];

/// 車隊規模來源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetSource {
    /// 行政區資料本身
    District,
    /// 配置覆蓋
    Override,
    /// 內建登記表
    Registry,
    /// 預設值
    Fallback,
}

/// 車隊規模登記表
#[derive(Debug, Clone)]
pub struct FleetRegistry {
    table: BTreeMap<String, u64>,
    overrides: BTreeMap<String, u64>,
    fallback: u64,
}

impl FleetRegistry {
    /// 以內建登記表與配置覆蓋建立
    pub fn from_params(params: &DemandParams) -> Self {
        Self {
            table: FLEET_2023.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            overrides: params
                .fleet_overrides
                .iter()
                .map(|(k, v)| (normalize_key(k), *v))
                .collect(),
            fallback: params.default_fleet,
        }
    }

    /// 查詢行政區車隊規模及其來源
    pub fn lookup(&self, district: &District) -> (u64, FleetSource) {
        if let Some(fleet) = district.fleet_size {
            return (fleet, FleetSource::District);
        }
        if let Some(fleet) = self.overrides.get(&district.id) {
            return (*fleet, FleetSource::Override);
        }
        if let Some(fleet) = self.table.get(&district.id) {
            return (*fleet, FleetSource::Registry);
        }
        (self.fallback, FleetSource::Fallback)
    }

    pub fn fleet_of(&self, district: &District) -> u64 {
        self.lookup(district).0
    }

    /// 登記表內的行政區數
    pub fn known_districts(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Puente Alto", 195_000, FleetSource::Registry)]
    #[case("Ñuñoa", 75_000, FleetSource::Registry)]
    #[case("Isla de Maipo", 30_000, FleetSource::Fallback)]
    fn test_lookup(#[case] name: &str, #[case] expected: u64, #[case] source: FleetSource) {
        let registry = FleetRegistry::from_params(&DemandParams::default());
        assert_eq!(registry.lookup(&District::new(name)), (expected, source));
    }

    #[test]
    fn test_precedence() {
        let mut params = DemandParams::default();
        params.fleet_overrides.insert("Maipú".to_string(), 200_000);
        let registry = FleetRegistry::from_params(&params);

        assert_eq!(registry.known_districts(), 40);
        assert_eq!(
            registry.lookup(&District::new("maipu")),
            (200_000, FleetSource::Override)
        );
        assert_eq!(
            registry.lookup(&District::new("maipu").with_fleet_size(1_000)),
            (1_000, FleetSource::District)
        );
    }
}
