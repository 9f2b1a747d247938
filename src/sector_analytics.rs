use rusqlite::params;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use crate::rate_rankings::{parse_category_param, parse_term_param};
use crate::snapshot_db::open_snapshot_db;

pub const SECTOR_MAJOR: &str = "시중은행";
pub const SECTOR_INTERNET: &str = "인터넷뱅크";
pub const SECTOR_REGIONAL: &str = "지방/기타은행";

const MAJOR_BANK_MARKERS: &[&str] = &[
    "국민", "신한", "우리", "하나", "농협", "기업", "SC제일", "씨티",
];
const INTERNET_BANK_MARKERS: &[&str] = &["카카오", "케이뱅크", "토스"];

#[derive(Debug, Deserialize)]
pub struct SectorAnalysisQueryRequest {
    pub category: Option<String>,
    pub term: Option<i64>,
}

/// Coarse bank grouping by substring match against the fixed name lists;
/// anything unmatched counts as regional/other.
pub fn classify_bank_sector(bank_name: &str) -> &'static str {
    if INTERNET_BANK_MARKERS.iter().any(|m| bank_name.contains(m)) {
        return SECTOR_INTERNET;
    }
    if MAJOR_BANK_MARKERS.iter().any(|m| bank_name.contains(m)) {
        return SECTOR_MAJOR;
    }
    SECTOR_REGIONAL
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

/// Mean max rate and product count per sector for one category/term. All
/// three sectors are always reported; empty sectors average to 0.
pub fn sector_analysis_query_at_db_path(
    db_path: &Path,
    req: SectorAnalysisQueryRequest,
) -> Result<Value, String> {
    let category = parse_category_param(req.category)?;
    let term = parse_term_param(req.term)?;

    let conn = open_snapshot_db(db_path)?;
    let mut stmt = conn
        .prepare(
            r#"
            SELECT p.bank_name, o.max_rate
            FROM products p
            JOIN rate_options o ON p.id = o.product_id
            WHERE p.category = ?1 AND o.term_months = ?2
            "#,
        )
        .map_err(|e| format!("섹터 분석 조회 실패: {e}"))?;
    let rows = stmt
        .query_map(params![category.as_str(), term], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })
        .map_err(|e| format!("섹터 분석 조회 실패: {e}"))?;

    let mut sums = [0.0_f64; 3];
    let mut counts = [0_i64; 3];
    for row in rows {
        let (bank_name, max_rate) = row.map_err(|e| format!("섹터 분석 읽기 실패: {e}"))?;
        let slot = match classify_bank_sector(&bank_name) {
            SECTOR_MAJOR => 0,
            SECTOR_INTERNET => 1,
            _ => 2,
        };
        sums[slot] += max_rate;
        counts[slot] += 1;
    }

    let sectors = [SECTOR_MAJOR, SECTOR_INTERNET, SECTOR_REGIONAL]
        .iter()
        .enumerate()
        .map(|(i, sector)| {
            let average = if counts[i] > 0 {
                round_to(sums[i] / counts[i] as f64, 2)
            } else {
                0.0
            };
            json!({
                "sector": sector,
                "average_rate": average,
                "count": counts[i],
            })
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "category": category.as_str(),
        "term": term,
        "sectors": sectors,
    }))
}
