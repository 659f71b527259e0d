//! 候選站點模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 未知類型的站點統一歸類
pub const OTHER_SITE_TYPE: &str = "other";

/// 站點ID（行政區內唯一）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 經緯度座標（WGS84）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// 候選站點
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// 站點ID
    pub id: SiteId,

    /// 站點名稱
    pub name: Option<String>,

    /// 站點類型（已正規化為小寫，例如 parking、mall、fuel）
    pub site_type: String,

    /// 位置
    pub location: GeoPoint,

    /// 既有充電樁數量（epsilon）
    pub existing_chargers: u32,

    /// 既有太陽能板數量（delta）
    pub existing_panels: u32,

    /// 充電樁上限（Pcap）；None 表示使用配置預設值
    pub max_chargers: Option<u32>,

    /// 太陽能板上限（Zmax）；None 表示使用配置預設值
    pub max_panels: Option<u32>,

    /// 與既有充電設施的距離（公尺），僅透傳至輸出
    pub distance_to_existing_m: Option<f64>,

    /// 預先計算的每月需求（若資料來源已提供）
    pub demand_hint: Option<u32>,
}

impl Site {
    /// 創建新的候選站點（無既有設施）
    pub fn new(id: impl Into<String>, site_type: &str, location: GeoPoint) -> Self {
        Self {
            id: SiteId::new(id),
            name: None,
            site_type: Self::normalize_type(site_type),
            location,
            existing_chargers: 0,
            existing_panels: 0,
            max_chargers: None,
            max_panels: None,
            distance_to_existing_m: None,
            demand_hint: None,
        }
    }

    /// 站點類型正規化：小寫、去空白，空字串歸為 other
    pub fn normalize_type(raw: &str) -> String {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        if normalized.is_empty() {
            OTHER_SITE_TYPE.to_string()
        } else {
            normalized
        }
    }

    /// 建構器模式：設置名稱
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 建構器模式：設置既有充電樁
    pub fn with_existing_chargers(mut self, count: u32) -> Self {
        self.existing_chargers = count;
        self
    }

    /// 建構器模式：設置既有太陽能板
    pub fn with_existing_panels(mut self, count: u32) -> Self {
        self.existing_panels = count;
        self
    }

    /// 建構器模式：設置充電樁上限
    pub fn with_max_chargers(mut self, cap: u32) -> Self {
        self.max_chargers = Some(cap);
        self
    }

    /// 建構器模式：設置太陽能板上限
    pub fn with_max_panels(mut self, cap: u32) -> Self {
        self.max_panels = Some(cap);
        self
    }

    /// 建構器模式：設置距離
    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_to_existing_m = Some(meters);
        self
    }

    /// 建構器模式：設置預先計算的需求
    pub fn with_demand_hint(mut self, demand: u32) -> Self {
        self.demand_hint = Some(demand);
        self
    }

    /// q 旗標：是否已有充電樁
    pub fn q(&self) -> bool {
        self.existing_chargers > 0
    }

    /// q 旗標的數值形式（0 或 1）
    pub fn q_value(&self) -> u32 {
        u32::from(self.q())
    }

    /// 有效充電樁上限
    ///
    /// 既有數量超過名目上限時放寬，確保既有設施不會被迫減少。
    pub fn effective_max_chargers(&self, default_cap: u32, headroom: u32) -> u32 {
        let nominal = self.max_chargers.unwrap_or(default_cap);
        nominal.max(self.existing_chargers.saturating_add(headroom))
    }

    /// 有效太陽能板上限
    pub fn effective_max_panels(&self, default_cap: u32, headroom: u32) -> u32 {
        let nominal = self.max_panels.unwrap_or(default_cap);
        nominal.max(self.existing_panels.saturating_add(headroom))
    }

    /// 既有充電樁是否超過名目上限
    pub fn exceeds_charger_cap(&self) -> bool {
        matches!(self.max_chargers, Some(cap) if self.existing_chargers > cap)
    }

    /// 既有太陽能板是否超過名目上限
    pub fn exceeds_panel_cap(&self) -> bool {
        matches!(self.max_panels, Some(cap) if self.existing_panels > cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn origin() -> GeoPoint {
        GeoPoint::new(-70.65, -33.45)
    }

    #[rstest]
    #[case("Parking", "parking")]
    #[case("  charging station ", "charging_station")]
    #[case("car-wash", "car_wash")]
    #[case("", "other")]
    fn test_normalize_type(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Site::normalize_type(raw), expected);
    }

    #[test]
    fn test_q_flag() {
        let site = Site::new("S1", "mall", origin());
        assert!(!site.q());
        assert_eq!(site.q_value(), 0);

        let site = site.with_existing_chargers(2);
        assert!(site.q());
        assert_eq!(site.q_value(), 1);
    }

    #[test]
    fn test_effective_caps_widen_for_existing() {
        let site = Site::new("S1", "fuel", origin())
            .with_existing_chargers(8)
            .with_max_chargers(6)
            .with_existing_panels(2);

        assert!(site.exceeds_charger_cap());
        assert_eq!(site.effective_max_chargers(10, 0), 8);
        assert_eq!(site.effective_max_chargers(10, 5), 13);
        // 未設定上限時使用預設值
        assert_eq!(site.effective_max_panels(10, 0), 10);
        assert!(!site.exceeds_panel_cap());
    }

    #[test]
    fn test_effective_cap_exact_existing() {
        let site = Site::new("S1", "parking", origin())
            .with_existing_chargers(3)
            .with_max_chargers(3);
        assert!(!site.exceeds_charger_cap());
        assert_eq!(site.effective_max_chargers(10, 0), 3);
    }
}
