use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

use crate::categories::ImportCategory;
use crate::product_extract::{extract_products, ExtractOutcome};
use crate::sheet_reader::read_table_rows;
use crate::snapshot_db::{
    ensure_schema_ready, open_snapshot_db, replace_category_snapshot, stamp_last_updated,
};

#[derive(Debug, Deserialize)]
pub struct ExcelPreviewRequest {
    pub source_path: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExcelImportRequest {
    pub source_path: Option<String>,
    pub category: Option<String>,
}

pub fn resolve_source_path_text(raw: Option<String>) -> Result<String, String> {
    let path = raw.unwrap_or_default().trim().to_string();
    if path.is_empty() {
        return Err("source_path 필수".to_string());
    }
    Ok(path)
}

pub fn resolve_import_category(raw: Option<String>) -> Result<ImportCategory, String> {
    let text = raw.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Err("category 필수".to_string());
    }
    ImportCategory::parse(&text)
}

fn per_category_counts(outcome: &ExtractOutcome) -> Vec<Value> {
    let mut counts = Vec::new();
    for category in outcome
        .products
        .iter()
        .map(|p| p.category)
        .collect::<std::collections::BTreeSet<_>>()
    {
        let count = outcome
            .products
            .iter()
            .filter(|p| p.category == category)
            .count();
        counts.push(json!({
            "category": category.as_str(),
            "product_count": count,
        }));
    }
    counts
}

fn preview_rows(outcome: &ExtractOutcome) -> Vec<Value> {
    outcome
        .products
        .iter()
        .take(10)
        .map(|p| {
            json!({
                "id": p.id,
                "bank": p.bank_name,
                "name": p.product_name,
                "category": p.category.as_str(),
                "pref_tags": p.pref_tags,
                "difficulty_score": p.difficulty_score,
            })
        })
        .collect()
}

/// Parse a regulator spreadsheet without touching the store: header position,
/// resolved role mapping, and the first extracted products.
pub fn excel_preview_at_path(file_path: &Path, category: ImportCategory) -> Result<Value, String> {
    let rows = read_table_rows(file_path)?;
    let outcome = extract_products(&rows, category)?;

    Ok(json!({
        "file": file_path.to_string_lossy().to_string(),
        "category": category.as_str(),
        "header_row": outcome.header_row,
        "mapping": outcome.roles.resolved_labels(),
        "product_count": outcome.products.len(),
        "option_count": outcome.options.len(),
        "skipped_rows": outcome.skipped_rows,
        "category_counts": per_category_counts(&outcome),
        "preview_rows": preview_rows(&outcome),
    }))
}

/// End-to-end file ingestion: read, extract, atomically replace the target
/// categories, stamp the refresh time. Structural failures surface before any
/// write, so a bad file never disturbs the stored snapshot.
pub fn excel_import_at_db_path(
    db_path: &Path,
    file_path: &Path,
    category: ImportCategory,
) -> Result<Value, String> {
    let rows = read_table_rows(file_path)?;
    let outcome = extract_products(&rows, category)?;

    let mut conn = open_snapshot_db(db_path)?;
    ensure_schema_ready(&conn)?;

    let summary = replace_category_snapshot(&mut conn, category, &outcome.products, &outcome.options)?;
    let stamped = stamp_last_updated(&conn)?;

    Ok(json!({
        "db_path": db_path.to_string_lossy().to_string(),
        "file": file_path.to_string_lossy().to_string(),
        "category": category.as_str(),
        "replaced_categories": summary.categories,
        "imported_products": summary.inserted_products,
        "imported_options": summary.inserted_options,
        "deleted_products": summary.deleted_products,
        "carried_over_options": summary.carried_over_options,
        "skipped_rows": outcome.skipped_rows,
        "header_row": outcome.header_row,
        "mapping": outcome.roles.resolved_labels(),
        "category_counts": per_category_counts(&outcome),
        "last_updated": stamped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_db::test_support::create_temp_db;
    use rusqlite::Connection;
    use std::fs;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn create_temp_path(prefix: &str, ext: &str) -> PathBuf {
        let unique = format!("{prefix}_{}_{}.{}", std::process::id(), Uuid::new_v4(), ext);
        std::env::temp_dir().join(unique)
    }

    fn write_deposit_fixture(path: &Path) {
        let csv = "\
금융상품 통합 비교공시,,,,,\n\
기준일: 2026-08-28,,,,,\n\
금융회사명,상품명,세전 이자율,최고 우대금리,가입방법,우대조건\n\
국민은행,KB Star 정기예금,3.20%,3.80%,인터넷/영업점,급여이체 및 카드이용 시 우대\n\
카카오뱅크,카카오뱅크 정기예금,3.50%,4.20%,스마트폰,첫거래 고객 우대\n\
합계,-,-,-,-,-\n";
        fs::write(path, csv).expect("write deposit fixture");
    }

    fn write_credit_fixture(path: &Path) {
        let csv = "\
금융회사명,상품명,최저금리,최고금리,대출종류\n\
신한은행,신한 마이너스통장,5.10%,6.20%,한도대출\n\
신한은행,신한 직장인 일반대출,4.50%,5.90%,일반신용대출\n";
        fs::write(path, csv).expect("write credit fixture");
    }

    #[test]
    fn preview_reports_header_row_and_mapping_without_writing() {
        let csv_path = create_temp_path("ratewise_preview_fixture", "csv");
        write_deposit_fixture(&csv_path);

        let preview = excel_preview_at_path(&csv_path, ImportCategory::Deposit).expect("preview");
        assert_eq!(preview["header_row"], 2);
        assert_eq!(preview["product_count"], 2);
        assert_eq!(preview["skipped_rows"], 1);
        assert_eq!(preview["mapping"]["bank"], "금융회사명");
        assert_eq!(preview["mapping"]["max_rate"], "최고 우대금리");

        let _ = fs::remove_file(&csv_path);
    }

    #[test]
    fn import_twice_is_idempotent_except_for_trend_carry_over() {
        let db_path = create_temp_db();
        let csv_path = create_temp_path("ratewise_import_fixture", "csv");
        write_deposit_fixture(&csv_path);

        let first = excel_import_at_db_path(&db_path, &csv_path, ImportCategory::Deposit)
            .expect("first import");
        let second = excel_import_at_db_path(&db_path, &csv_path, ImportCategory::Deposit)
            .expect("second import");
        assert_eq!(first["imported_products"], 2);
        assert_eq!(second["imported_products"], 2);
        assert_eq!(first["carried_over_options"], 0);
        assert_eq!(second["carried_over_options"], 6);

        let conn = Connection::open(&db_path).expect("open for verification");
        let product_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE category='deposit'",
                [],
                |row| row.get(0),
            )
            .expect("count products");
        assert_eq!(product_count, 2, "re-import replaces, never accumulates");

        let (max_rate, previous_max): (f64, f64) = conn
            .query_row(
                "SELECT o.max_rate, o.previous_max_rate FROM rate_options o \
                 JOIN products p ON p.id=o.product_id \
                 WHERE p.bank_name='카카오뱅크' AND o.term_months=12",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query option");
        assert_eq!(max_rate, 4.2);
        assert_eq!(previous_max, 4.2, "identical input carries the same top rate");

        let _ = fs::remove_file(&csv_path);
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn credit_import_splits_and_replaces_both_categories() {
        let db_path = create_temp_db();
        let csv_path = create_temp_path("ratewise_credit_fixture", "csv");
        write_credit_fixture(&csv_path);

        let out = excel_import_at_db_path(&db_path, &csv_path, ImportCategory::Credit)
            .expect("credit import");
        assert_eq!(
            out["replaced_categories"],
            serde_json::json!(["credit_general", "credit_limit"])
        );

        let conn = Connection::open(&db_path).expect("open for verification");
        let limit_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE category='credit_limit'",
                [],
                |row| row.get(0),
            )
            .expect("count credit_limit");
        let general_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE category='credit_general'",
                [],
                |row| row.get(0),
            )
            .expect("count credit_general");
        assert_eq!(limit_count, 1);
        assert_eq!(general_count, 1);

        let _ = fs::remove_file(&csv_path);
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn unrecognized_schema_leaves_the_store_untouched() {
        let db_path = create_temp_db();
        let good_path = create_temp_path("ratewise_good_fixture", "csv");
        write_deposit_fixture(&good_path);
        excel_import_at_db_path(&db_path, &good_path, ImportCategory::Deposit)
            .expect("seed import");

        let bad_path = create_temp_path("ratewise_bad_fixture", "csv");
        fs::write(&bad_path, "이름,수익률\nA,3.5\n").expect("write bad fixture");
        let err = excel_import_at_db_path(&db_path, &bad_path, ImportCategory::Deposit)
            .expect_err("schema must not resolve");
        assert!(err.contains("필수 항목"), "{err}");

        let conn = Connection::open(&db_path).expect("open for verification");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE category='deposit'",
                [],
                |row| row.get(0),
            )
            .expect("count products");
        assert_eq!(count, 2, "failed ingestion must not disturb the snapshot");

        let _ = fs::remove_file(&good_path);
        let _ = fs::remove_file(&bad_path);
        let _ = fs::remove_file(&db_path);
    }
}
