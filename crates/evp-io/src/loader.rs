//! 候選站點載入
//!
//! 支援兩種輸入：
//! - 目錄：每個行政區一個 CSV，檔名（不含副檔名）即行政區
//! - 單一 CSV：以行政區欄位分組
//!
//! 座標缺漏或數值無法解析的列會被略過並記錄警告；缺少必要欄位則整檔失敗。

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use evp_core::{normalize_key, District, GeoPoint, PlanError, PlanWarning, Result, Site};

use crate::schema::{ColumnMap, Field};

/// 載入結果
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub districts: Vec<District>,
    pub warnings: Vec<PlanWarning>,
    pub rows_read: usize,
    pub rows_skipped: usize,
}

impl LoadReport {
    pub fn site_count(&self) -> usize {
        self.districts.iter().map(District::site_count).sum()
    }
}

/// 依路徑型態載入（目錄或單檔）
pub fn load_sites(path: &Path) -> Result<LoadReport> {
    if path.is_dir() {
        load_directory(path)
    } else {
        load_file(path)
    }
}

/// 載入每區一檔的目錄
pub fn load_directory(dir: &Path) -> Result<LoadReport> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(PlanError::InvalidInput(format!("目錄 {} 中沒有 CSV 檔", dir.display())));
    }
    tracing::info!("載入站點目錄 {}：{} 個檔案", dir.display(), files.len());

    let mut collector = Collector::default();
    for file in &files {
        let district = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let reader = csv_reader(file)?;
        collector.read(reader, &file.display().to_string(), Some(&district))?;
    }
    Ok(collector.finish())
}

/// 載入含行政區欄位的單一檔案
pub fn load_file(path: &Path) -> Result<LoadReport> {
    tracing::info!("載入站點檔案 {}", path.display());
    let reader = csv_reader(path)?;
    let mut collector = Collector::default();
    collector.read(reader, &path.display().to_string(), None)?;
    Ok(collector.finish())
}

/// 從任意來源讀取（`district` 為 None 時使用行政區欄位）
pub fn load_reader<R: Read>(reader: R, source: &str, district: Option<&str>) -> Result<LoadReport> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut collector = Collector::default();
    collector.read(reader, source, district)?;
    Ok(collector.finish())
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| PlanError::Csv(format!("{}: {e}", path.display())))
}

/// 解析非負整數（接受 `3.0` 形式）
fn parse_count(raw: &str) -> Option<u32> {
    let value: f64 = raw.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX) {
        Some(value.round() as u32)
    } else {
        None
    }
}

fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

#[derive(Default)]
struct Collector {
    districts: Vec<District>,
    by_key: HashMap<String, usize>,
    seen: HashSet<(String, String)>,
    report: LoadReport,
}

impl Collector {
    fn district_mut(&mut self, name: &str) -> &mut District {
        let key = normalize_key(name);
        let index = match self.by_key.get(&key) {
            Some(index) => *index,
            None => {
                self.districts.push(District::new(name));
                self.by_key.insert(key, self.districts.len() - 1);
                self.districts.len() - 1
            }
        };
        &mut self.districts[index]
    }

    fn skip(&mut self, subject: String, message: String) {
        let warning = PlanWarning::warning(subject, message);
        tracing::warn!("{}", warning);
        self.report.warnings.push(warning);
        self.report.rows_skipped += 1;
    }

    fn read<R: Read>(&mut self, mut reader: csv::Reader<R>, source: &str, district: Option<&str>) -> Result<()> {
        let headers = reader
            .headers()
            .map_err(|e| PlanError::Csv(format!("{source}: {e}")))?
            .clone();
        let columns = ColumnMap::resolve(&headers, district.is_none())?;

        // 目錄模式下空檔案仍代表一個行政區
        if let Some(name) = district {
            self.district_mut(name);
        }

        for (row, record) in reader.records().enumerate() {
            // 表頭為第 1 行
            let line = row + 2;
            self.report.rows_read += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.skip(format!("{source}:{line}"), format!("無法讀取: {e}"));
                    continue;
                }
            };
            self.read_row(&columns, &record, source, line, district);
        }
        Ok(())
    }

    fn read_row(&mut self, columns: &ColumnMap, record: &StringRecord, source: &str, line: usize, district: Option<&str>) {
        let subject = format!("{source}:{line}");

        let district_name = match district {
            Some(name) => name.to_string(),
            None => match columns.get(record, Field::District) {
                Some(name) => name.to_string(),
                None => {
                    self.skip(subject, "缺少行政區".to_string());
                    return;
                }
            },
        };
        // 行政區即使所有列都被略過仍保留（彙總為零）
        self.district_mut(&district_name);

        let Some(id) = columns.get(record, Field::SiteId) else {
            self.skip(subject, "缺少站點ID".to_string());
            return;
        };
        let lon = columns.get(record, Field::Lon).and_then(|v| parse_coordinate(v, 180.0));
        let lat = columns.get(record, Field::Lat).and_then(|v| parse_coordinate(v, 90.0));
        let (Some(lon), Some(lat)) = (lon, lat) else {
            self.skip(format!("{subject} ({id})"), "座標缺漏或無效".to_string());
            return;
        };

        let site_type = columns.get(record, Field::SiteType).unwrap_or_default();
        let mut site = Site::new(id, site_type, GeoPoint::new(lon, lat));

        if let Some(name) = columns.get(record, Field::Name) {
            site = site.with_name(name);
        }

        // 數值欄位：有值但無法解析即略過整列
        let mut counts = [
            (Field::ExistingChargers, None),
            (Field::ExistingPanels, None),
            (Field::MaxChargers, None),
            (Field::MaxPanels, None),
            (Field::Demand, None),
        ];
        for (field, value) in counts.iter_mut() {
            if let Some(raw) = columns.get(record, *field) {
                match parse_count(raw) {
                    Some(parsed) => *value = Some(parsed),
                    None => {
                        self.skip(format!("{subject} ({id})"), format!("欄位 {} 無法解析: {raw}", field.key()));
                        return;
                    }
                }
            }
        }
        let [(_, chargers), (_, panels), (_, max_chargers), (_, max_panels), (_, demand)] = counts;

        site = site
            .with_existing_chargers(chargers.unwrap_or(0))
            .with_existing_panels(panels.unwrap_or(0));
        if let Some(cap) = max_chargers {
            site = site.with_max_chargers(cap);
        }
        if let Some(cap) = max_panels {
            site = site.with_max_panels(cap);
        }
        if let Some(demand) = demand {
            site = site.with_demand_hint(demand);
        }

        if let Some(raw) = columns.get(record, Field::DistanceM) {
            match raw.parse::<f64>() {
                Ok(meters) if meters.is_finite() && meters >= 0.0 => site = site.with_distance(meters),
                _ => {
                    let warning = PlanWarning::info(format!("{subject} ({id})"), format!("距離無法解析，忽略: {raw}"));
                    tracing::debug!("{}", warning);
                    self.report.warnings.push(warning);
                }
            }
        }

        let fleet = columns.get(record, Field::Fleet).and_then(|raw| raw.parse::<f64>().ok());

        let key = (normalize_key(&district_name), site.id.to_string());
        if !self.seen.insert(key) {
            let warning = PlanWarning::warning(
                format!("{}/{}", normalize_key(&district_name), site.id),
                format!("站點ID重複，保留第一筆（{subject}）"),
            );
            tracing::warn!("{}", warning);
            self.report.warnings.push(warning);
            self.report.rows_skipped += 1;
            return;
        }

        let district = self.district_mut(&district_name);
        if district.fleet_size.is_none() {
            if let Some(fleet) = fleet.filter(|f| f.is_finite() && *f > 0.0) {
                district.fleet_size = Some(fleet.round() as u64);
            }
        }
        district.add_site(site);
    }

    fn finish(mut self) -> LoadReport {
        self.report.districts = self.districts;
        tracing::info!(
            "載入完成：行政區 {}，站點 {}，略過 {} 列",
            self.report.districts.len(),
            self.report.site_count(),
            self.report.rows_skipped
        );
        self.report
    }
}
