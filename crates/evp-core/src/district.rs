//! 行政區（comuna）模型

use serde::{Deserialize, Serialize};

use crate::site::Site;

/// 行政區名稱正規化為 ASCII 小寫鍵值
///
/// `"Ñuñoa"` → `"nunoa"`，`"Estación Central"` → `"estacion_central"`
pub fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let mapped = match ch {
            'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
            'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
            'ñ' | 'Ñ' => 'n',
            ' ' | '-' | '.' => '_',
            c if c.is_ascii_alphanumeric() || c == '_' => c.to_ascii_lowercase(),
            _ => continue,
        };
        // 合併連續底線
        if mapped == '_' && key.ends_with('_') {
            continue;
        }
        key.push(mapped);
    }
    key.trim_matches('_').to_string()
}

/// 行政區
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct District {
    /// 正規化鍵值
    pub id: String,

    /// 顯示名稱
    pub name: String,

    /// 車隊規模（若資料來源提供）
    pub fleet_size: Option<u64>,

    /// 候選站點
    pub sites: Vec<Site>,
}

impl District {
    /// 創建新的行政區
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: normalize_key(&name),
            name,
            fleet_size: None,
            sites: Vec::new(),
        }
    }

    /// 建構器模式：設置車隊規模
    pub fn with_fleet_size(mut self, fleet: u64) -> Self {
        self.fleet_size = Some(fleet);
        self
    }

    /// 建構器模式：設置站點
    pub fn with_sites(mut self, sites: Vec<Site>) -> Self {
        self.sites = sites;
        self
    }

    /// 添加站點
    pub fn add_site(&mut self, site: Site) {
        self.sites.push(site);
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// 既有充電樁總數
    pub fn existing_chargers(&self) -> u64 {
        self.sites.iter().map(|s| u64::from(s.existing_chargers)).sum()
    }

    /// 找出重複的站點ID
    pub fn duplicate_site_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for site in &self.sites {
            if !seen.insert(site.id.as_str()) {
                duplicates.push(site.id.to_string());
            }
        }
        duplicates
    }
}
