//! 輸入欄位對照表
//!
//! 每個邏輯欄位對應一組別名，依列出順序優先；比對時忽略大小寫與前後空白。

use csv::StringRecord;
use evp_core::{PlanError, Result};

const FIELD_COUNT: usize = 13;

/// 邏輯欄位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SiteId,
    Lon,
    Lat,
    Name,
    SiteType,
    ExistingChargers,
    ExistingPanels,
    MaxChargers,
    MaxPanels,
    DistanceM,
    Demand,
    District,
    Fleet,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::SiteId,
        Field::Lon,
        Field::Lat,
        Field::Name,
        Field::SiteType,
        Field::ExistingChargers,
        Field::ExistingPanels,
        Field::MaxChargers,
        Field::MaxPanels,
        Field::DistanceM,
        Field::Demand,
        Field::District,
        Field::Fleet,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::SiteId => "site_id",
            Field::Lon => "lon",
            Field::Lat => "lat",
            Field::Name => "name",
            Field::SiteType => "site_type",
            Field::ExistingChargers => "existing_chargers",
            Field::ExistingPanels => "existing_panels",
            Field::MaxChargers => "max_chargers",
            Field::MaxPanels => "max_panels",
            Field::DistanceM => "distance_m",
            Field::Demand => "demand",
            Field::District => "district",
            Field::Fleet => "fleet",
        }
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::SiteId => &["site_id", "id", "dpc_id", "osm_id"],
            Field::Lon => &["dpc_lon", "lon", "longitude", "x"],
            Field::Lat => &["dpc_lat", "lat", "latitude", "y"],
            Field::Name => &["dpc_name", "name", "nombre"],
            Field::SiteType => &["dpc_tipo_osm", "tipo_osm", "tipo", "site_type"],
            Field::ExistingChargers => &["cargadores_iniciales", "epsilon", "existing_chargers"],
            Field::ExistingPanels => &["paneles_iniciales", "delta", "existing_panels"],
            Field::MaxChargers => &["dpc_Pcap", "Pcap", "Zcap", "max_chargers"],
            Field::MaxPanels => &["dpc_Zmax", "Zmax", "max_panels"],
            Field::DistanceM => &["distancia_m", "distancia_asignacion_m", "distance_m"],
            Field::Demand => &["demand_estimated", "demanda", "demand"],
            Field::District => &["comuna", "district"],
            Field::Fleet => &["parque_vehicular", "fleet_size"],
        }
    }

    /// 每個檔案都必須具備的欄位
    pub fn always_required(&self) -> bool {
        matches!(self, Field::SiteId | Field::Lon | Field::Lat)
    }
}

/// 表頭解析結果：邏輯欄位 → 欄位索引
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: [Option<usize>; FIELD_COUNT],
}

fn slot(field: Field) -> usize {
    field as usize
}

impl ColumnMap {
    /// 解析表頭；`require_district` 為單檔模式
    pub fn resolve(headers: &StringRecord, require_district: bool) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut columns = [None; FIELD_COUNT];

        for field in Field::ALL {
            let found = field.aliases().iter().find_map(|alias| {
                let alias = alias.to_lowercase();
                normalized.iter().position(|h| *h == alias)
            });
            let required = field.always_required() || (require_district && field == Field::District);
            if found.is_none() && required {
                return Err(PlanError::MissingColumn {
                    field: field.key().to_string(),
                    aliases: field.aliases().join(", "),
                });
            }
            columns[slot(field)] = found;
        }

        Ok(Self { columns })
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns[slot(field)]
    }

    pub fn has(&self, field: Field) -> bool {
        self.index(field).is_some()
    }

    /// 取得欄位文字（空字串視為缺值）
    pub fn get<'r>(&self, record: &'r StringRecord, field: Field) -> Option<&'r str> {
        self.index(field)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
    }
}
