use rusqlite::params;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::categories::{Category, ALL_CATEGORIES};
use crate::product_extract::SAVE_TERMS;
use crate::snapshot_db::{last_updated, open_snapshot_db, NO_DATA_SENTINEL};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct BestRatesQueryRequest {
    pub category: Option<String>,
    pub term: Option<i64>,
    pub limit: Option<u32>,
}

fn parse_limit(raw: Option<u32>, default_limit: u32, max_limit: u32) -> u32 {
    raw.unwrap_or(default_limit).clamp(1, max_limit)
}

pub(crate) fn parse_category_param(raw: Option<String>) -> Result<Category, String> {
    let text = raw.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Ok(Category::Deposit);
    }
    Category::parse(&text).ok_or_else(|| {
        format!(
            "지원하지 않는 카테고리: {text}（{} 중 선택）",
            ALL_CATEGORIES
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("/")
        )
    })
}

pub(crate) fn parse_term_param(raw: Option<i64>) -> Result<i64, String> {
    let term = raw.unwrap_or(12);
    if SAVE_TERMS.contains(&term) {
        Ok(term)
    } else {
        Err(format!(
            "지원하지 않는 기간: {term}개월（{} 중 선택）",
            SAVE_TERMS
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join("/")
        ))
    }
}

fn parse_tags_json(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!([]))
}

/// Best-rate ranking for one category/term. Deposit-style categories rank by
/// highest max rate, loan categories by lowest.
pub fn best_rates_query_at_db_path(
    db_path: &Path,
    req: BestRatesQueryRequest,
) -> Result<Value, String> {
    let category = parse_category_param(req.category)?;
    let term = parse_term_param(req.term)?;
    let limit = parse_limit(req.limit, DEFAULT_LIMIT, MAX_LIMIT) as i64;
    let order = if category.ranks_descending() {
        "DESC"
    } else {
        "ASC"
    };

    let conn = open_snapshot_db(db_path)?;
    let sql = format!(
        r#"
        SELECT p.id, p.bank_name, p.product_name, o.term_months,
               o.base_rate, o.max_rate, o.previous_max_rate,
               p.join_method, p.maturity_note, p.detail_note,
               p.pref_tags_json, p.difficulty_score
        FROM products p
        JOIN rate_options o ON p.id = o.product_id
        WHERE p.category = ?1 AND o.term_months = ?2
        ORDER BY o.max_rate {order}, p.bank_name ASC
        LIMIT ?3
        "#
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| format!("상품 순위 조회 실패: {e}"))?;
    let rows = stmt
        .query_map(params![category.as_str(), term, limit], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "bank": row.get::<_, String>(1)?,
                "name": row.get::<_, String>(2)?,
                "term": row.get::<_, i64>(3)?,
                "base_rate": row.get::<_, f64>(4)?,
                "max_rate": row.get::<_, f64>(5)?,
                "previous_max_rate": row.get::<_, f64>(6)?,
                "join_method": row.get::<_, String>(7)?,
                "maturity_note": row.get::<_, String>(8)?,
                "detail_note": row.get::<_, String>(9)?,
                "pref_tags": parse_tags_json(&row.get::<_, String>(10)?),
                "difficulty_score": row.get::<_, i64>(11)?,
            }))
        })
        .map_err(|e| format!("상품 순위 조회 실패: {e}"))?;

    let mut items = Vec::<Value>::new();
    for row in rows {
        items.push(row.map_err(|e| format!("상품 순위 읽기 실패: {e}"))?);
    }

    Ok(json!({
        "category": category.as_str(),
        "term": term,
        "order": order,
        "count": items.len(),
        "products": items,
    }))
}

/// Ingestion status: the last successful refresh stamp (or the no-data
/// sentinel) plus per-category product counts, zero rows included.
pub fn status_summary_query_at_db_path(db_path: &Path) -> Result<Value, String> {
    let conn = open_snapshot_db(db_path)?;

    let stamp = last_updated(&conn)?.unwrap_or_else(|| NO_DATA_SENTINEL.to_string());

    let mut stmt = conn
        .prepare("SELECT category, COUNT(*) FROM products GROUP BY category")
        .map_err(|e| format!("카테고리 집계 실패: {e}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| format!("카테고리 집계 실패: {e}"))?;
    let mut counts = HashMap::new();
    for row in rows {
        let (category, count) = row.map_err(|e| format!("카테고리 집계 읽기 실패: {e}"))?;
        counts.insert(category, count);
    }

    let categories = ALL_CATEGORIES
        .iter()
        .map(|c| {
            json!({
                "category": c.as_str(),
                "product_count": counts.get(c.as_str()).copied().unwrap_or(0),
            })
        })
        .collect::<Vec<_>>();
    let total = counts.values().sum::<i64>();

    Ok(json!({
        "last_updated": stamp,
        "total_products": total,
        "categories": categories,
    }))
}
