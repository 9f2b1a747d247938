use chrono::Local;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::categories::{Category, ImportCategory};
use crate::product_extract::{ProductRecord, RateOptionRecord};

pub const LAST_UPDATED_KEY: &str = "last_updated";
pub const NO_DATA_SENTINEL: &str = "데이터 없음";

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!("../db/migrations/0001_init.sql"),
    ),
    (
        "0002_add_trend_columns.sql",
        include_str!("../db/migrations/0002_add_trend_columns.sql"),
    ),
];

#[derive(Debug, Serialize)]
pub struct SnapshotDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReplaceSummary {
    pub categories: Vec<String>,
    pub deleted_products: usize,
    pub inserted_products: usize,
    pub inserted_options: usize,
    pub carried_over_options: usize,
}

pub fn open_snapshot_db(db_path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(db_path).map_err(|e| format!("데이터베이스 열기 실패: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("foreign_keys 설정 실패: {e}"))?;
    Ok(conn)
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

pub fn apply_embedded_migrations(db_path: &Path) -> Result<SnapshotDbMigrateResult, String> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("데이터베이스 디렉터리 생성 실패: {e}"))?;
    }

    let mut conn = open_snapshot_db(db_path)?;
    ensure_schema_migrations_table(&conn)
        .map_err(|e| format!("schema_migrations 초기화 실패: {e}"))?;

    let already = load_applied_versions(&conn)
        .map_err(|e| format!("적용된 마이그레이션 조회 실패: {e}"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(|e| format!("마이그레이션 트랜잭션 시작 실패 ({version}): {e}"))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("마이그레이션 실행 실패 ({version}): {e}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("schema_migrations 기록 실패 ({version}): {e}"))?;
        tx.commit()
            .map_err(|e| format!("마이그레이션 커밋 실패 ({version}): {e}"))?;
        applied_now.push((*version).to_string());
    }

    Ok(SnapshotDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
    })
}

/// Fails when the snapshot tables are missing or stale, instead of writing
/// into a half-migrated database.
pub fn ensure_schema_ready(conn: &Connection) -> Result<(), String> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('meta','products','rate_options')",
        )
        .map_err(|e| format!("테이블 확인 실패: {e}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| format!("테이블 조회 실패: {e}"))?;
    let mut table_names = HashSet::new();
    for row in rows {
        table_names.insert(row.map_err(|e| format!("테이블 이름 읽기 실패: {e}"))?);
    }
    let required_tables = ["meta", "products", "rate_options"];
    let missing_tables = required_tables
        .iter()
        .filter(|t| !table_names.contains(**t))
        .copied()
        .collect::<Vec<_>>();
    if !missing_tables.is_empty() {
        return Err(format!(
            "필수 테이블이 없습니다: {}。먼저 마이그레이션을 실행하세요.",
            missing_tables.join(", ")
        ));
    }

    let mut stmt = conn
        .prepare("PRAGMA table_info(rate_options)")
        .map_err(|e| format!("rate_options 컬럼 조회 실패: {e}"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| format!("rate_options 컬럼 조회 실패: {e}"))?;
    let mut col_set = HashSet::new();
    for col in cols {
        col_set.insert(col.map_err(|e| format!("rate_options 컬럼 읽기 실패: {e}"))?);
    }
    if !col_set.contains("previous_max_rate") {
        return Err("rate_options에 previous_max_rate 컬럼이 없습니다. 최신 마이그레이션을 실행하세요.".to_string());
    }

    Ok(())
}

fn category_placeholders(categories: &[Category]) -> (String, Vec<String>) {
    let placeholders = (1..=categories.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let values = categories
        .iter()
        .map(|c| c.as_str().to_string())
        .collect::<Vec<_>>();
    (placeholders, values)
}

/// Wholesale snapshot replacement for one import target, as a single
/// transaction: capture the prior max rates, clear every affected category
/// (both credit variants together for a credit upload), insert the new rows
/// with the carried-over previous max. Any failure rolls the whole batch
/// back and leaves the prior snapshot intact.
pub fn replace_category_snapshot(
    conn: &mut Connection,
    target: ImportCategory,
    products: &[ProductRecord],
    options: &[RateOptionRecord],
) -> Result<ReplaceSummary, String> {
    let categories = target.storage_categories();
    let (placeholders, category_values) = category_placeholders(categories);

    let tx = conn
        .transaction()
        .map_err(|e| format!("스냅샷 교체 트랜잭션 시작 실패: {e}"))?;

    // prior top rates must be read before the delete step
    let mut prior_max: HashMap<(String, i64), f64> = HashMap::new();
    {
        let sql = format!(
            "SELECT o.product_id, o.term_months, o.max_rate
             FROM rate_options o
             JOIN products p ON p.id = o.product_id
             WHERE p.category IN ({placeholders})"
        );
        let mut stmt = tx
            .prepare(&sql)
            .map_err(|e| format!("이전 금리 조회 실패: {e}"))?;
        let rows = stmt
            .query_map(params_from_iter(category_values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })
            .map_err(|e| format!("이전 금리 조회 실패: {e}"))?;
        for row in rows {
            let (product_id, term, max_rate) =
                row.map_err(|e| format!("이전 금리 읽기 실패: {e}"))?;
            prior_max.insert((product_id, term), max_rate);
        }
    }

    let sql = format!(
        "DELETE FROM rate_options WHERE product_id IN (SELECT id FROM products WHERE category IN ({placeholders}))"
    );
    tx.execute(&sql, params_from_iter(category_values.iter()))
        .map_err(|e| format!("기존 금리 옵션 삭제 실패: {e}"))?;
    let sql = format!("DELETE FROM products WHERE category IN ({placeholders})");
    let deleted_products = tx
        .execute(&sql, params_from_iter(category_values.iter()))
        .map_err(|e| format!("기존 상품 삭제 실패: {e}"))?;

    for product in products {
        if !categories.contains(&product.category) {
            return Err(format!(
                "카테고리 불일치: 상품 {}(은)는 {}에 속하지만 교체 대상은 [{}]입니다",
                product.id,
                product.category.as_str(),
                category_values.join(", ")
            ));
        }
        let tags_json = serde_json::to_string(&product.pref_tags)
            .map_err(|e| format!("우대 태그 직렬화 실패: {e}"))?;
        tx.execute(
            r#"
            INSERT INTO products
                (id, bank_name, product_name, category, join_method, maturity_note,
                 detail_note, pref_tags_json, difficulty_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                product.id,
                product.bank_name,
                product.product_name,
                product.category.as_str(),
                product.join_method,
                product.maturity_note,
                product.detail_note,
                tags_json,
                product.difficulty_score,
            ],
        )
        .map_err(|e| format!("상품 {} 삽입 실패: {e}", product.id))?;
    }

    let mut carried_over = 0usize;
    for option in options {
        let key = (option.product_id.clone(), option.term_months);
        let previous_max = match prior_max.get(&key) {
            Some(prior) => {
                carried_over += 1;
                *prior
            }
            // new product: no trend yet, previous equals current
            None => option.max_rate,
        };
        tx.execute(
            r#"
            INSERT INTO rate_options (product_id, term_months, base_rate, max_rate, previous_max_rate)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                option.product_id,
                option.term_months,
                option.base_rate,
                option.max_rate,
                previous_max,
            ],
        )
        .map_err(|e| format!("금리 옵션 삽입 실패 ({}): {e}", option.product_id))?;
    }

    tx.commit()
        .map_err(|e| format!("스냅샷 교체 커밋 실패: {e}"))?;

    Ok(ReplaceSummary {
        categories: category_values,
        deleted_products,
        inserted_products: products.len(),
        inserted_options: options.len(),
        carried_over_options: carried_over,
    })
}

pub fn stamp_last_updated(conn: &Connection) -> Result<String, String> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![LAST_UPDATED_KEY, now],
    )
    .map_err(|e| format!("갱신 시각 기록 실패: {e}"))?;
    Ok(now)
}

pub fn last_updated(conn: &Connection) -> Result<Option<String>, String> {
    let mut stmt = conn
        .prepare("SELECT value FROM meta WHERE key = ?1")
        .map_err(|e| format!("갱신 시각 조회 실패: {e}"))?;
    let mut rows = stmt
        .query_map(params![LAST_UPDATED_KEY], |row| row.get::<_, String>(0))
        .map_err(|e| format!("갱신 시각 조회 실패: {e}"))?;
    match rows.next() {
        Some(row) => Ok(Some(row.map_err(|e| format!("갱신 시각 읽기 실패: {e}"))?)),
        None => Ok(None),
    }
}
