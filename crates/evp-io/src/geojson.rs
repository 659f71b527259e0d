//! 站點 GeoJSON 輸出（點圖層，屬性取自最終期輸出列）

use std::path::Path;

use evp_core::Result;
use evp_optimizer::SiteRecord;
use serde_json::{json, Map, Value};

/// 站點轉為 FeatureCollection
pub fn sites_to_geojson(records: &[SiteRecord]) -> Result<Value> {
    let features = records
        .iter()
        .map(|record| -> Result<Value> {
            let properties = match serde_json::to_value(record)? {
                Value::Object(mut map) => {
                    map.remove("lon");
                    map.remove("lat");
                    map
                }
                _ => Map::new(),
            };
            Ok(json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [record.lon, record.lat],
                },
                "properties": properties,
            }))
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

pub fn write_geojson(path: &Path, records: &[SiteRecord]) -> Result<()> {
    let collection = sites_to_geojson(records)?;
    std::fs::write(path, serde_json::to_string_pretty(&collection)?)?;
    tracing::debug!("寫入 {}：{} 個站點", path.display(), records.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, active: bool) -> SiteRecord {
        SiteRecord {
            comuna: "macul".to_string(),
            site_id: id.to_string(),
            site_name: String::new(),
            site_type: "mall".to_string(),
            lon: -70.6,
            lat: -33.4,
            q_existed: false,
            existing_chargers: 0,
            existing_panels: 0,
            activated: active,
            activation_period: active.then_some(3),
            active,
            chargers_new: if active { 2 } else { 0 },
            chargers_total: if active { 2 } else { 0 },
            panels_new: 0,
            panels_total: 0,
            demand_estimated: 100,
            demand_satisfied: if active { 100 } else { 0 },
            demand_unsatisfied: if active { 0 } else { 100 },
            solar_used_kwh: 0.0,
            grid_used_kwh: 0.0,
            distance_to_existing_m: None,
        }
    }

    #[test]
    fn test_feature_collection() {
        let value = sites_to_geojson(&[record("A", true), record("B", false)]).unwrap();
        assert_eq!(value["type"], "FeatureCollection");

        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["coordinates"][0], -70.6);
        assert_eq!(features[0]["properties"]["activation_period"], 3);
        assert!(features[1]["properties"]["activation_period"].is_null());
        assert!(features[0]["properties"].get("lon").is_none());
    }
}
