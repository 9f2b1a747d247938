use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

use crate::categories::{ImportCategory, ALL_IMPORT_CATEGORIES};
use crate::product_extract::{
    classify_credit_row, stable_product_id, ProductRecord, RateOptionRecord, SAVE_TERMS,
};
use crate::snapshot_db::{
    ensure_schema_ready, open_snapshot_db, replace_category_snapshot, stamp_last_updated,
};

/// An opaque feed of already-normalized products, the same shape extraction
/// emits. The remote regulator API client implements this; the built-in
/// sample catalog stands in when no feed is configured.
pub trait ProductSource {
    fn fetch(
        &self,
        category: ImportCategory,
    ) -> Result<(Vec<ProductRecord>, Vec<RateOptionRecord>), String>;
}

const SAMPLE_BANKS: &[&str] = &[
    "국민은행",
    "신한은행",
    "우리은행",
    "하나은행",
    "NH농협은행",
    "IBK기업은행",
    "SC제일은행",
    "SH수협은행",
    "부산은행",
    "대구은행",
    "광주은행",
    "전북은행",
    "경남은행",
    "제주은행",
    "카카오뱅크",
    "케이뱅크",
    "토스뱅크",
];

const SAMPLE_DEPOSIT_NAMES: &[(&str, &str)] = &[
    ("국민은행", "KB Star 정기예금"),
    ("신한은행", "쏠편한 정기예금"),
    ("우리은행", "WON플러스예금"),
    ("하나은행", "하나의 정기예금"),
    ("NH농협은행", "NH올원e예금"),
    ("IBK기업은행", "IBK D-Day통장"),
    ("SC제일은행", "퍼스트정기예금"),
    ("SH수협은행", "헤이(Hey)정기예금"),
    ("부산은행", "더조은 정기예금"),
    ("대구은행", "iM뱅크 주거래우대예금"),
    ("광주은행", "플러스모아예금"),
    ("전북은행", "JB다이렉트예금"),
    ("경남은행", "BNK마이존예금"),
    ("제주은행", "제주드림 정기예금"),
    ("카카오뱅크", "카카오뱅크 정기예금"),
    ("케이뱅크", "코드K 정기예금"),
    ("토스뱅크", "먼저 이자 받는 예금"),
];

const SAMPLE_SAVING_NAMES: &[(&str, &str)] = &[
    ("국민은행", "KB국민행복적금"),
    ("신한은행", "신한 알.쏠 적금"),
    ("우리은행", "우리 200일 적금"),
    ("하나은행", "내맘적금 (자유적립식)"),
    ("NH농협은행", "NH통합적금"),
    ("IBK기업은행", "IBK평생한가족적금"),
    ("SC제일은행", "에이스적금"),
    ("SH수협은행", "SH월복리적금"),
    ("부산은행", "메리트적금"),
    ("대구은행", "DGB꿈나무적금"),
    ("광주은행", "꿀적금"),
    ("전북은행", "짠테크적금"),
    ("경남은행", "행복드림적금"),
    ("제주은행", "탐라적금"),
    ("카카오뱅크", "26주적금"),
    ("케이뱅크", "챌린지박스"),
    ("토스뱅크", "토스뱅크 자유적금"),
];

const SAMPLE_PREF_POOL: &[&str] = &[
    "급여이체",
    "첫 거래 우대",
    "자동이체실적",
    "모바일 앱 이용",
    "마케팅동의",
    "카드이용실적",
    "오픈뱅킹등록",
];

const INTERNET_SAMPLE_BANKS: &[&str] = &["카카오뱅크", "케이뱅크", "토스뱅크"];

/// Deterministic stand-in for the remote feed: same banks and product names
/// as the live catalog, rates derived from a name hash so repeated syncs are
/// reproducible (and trend carry-over is a real no-change, not noise).
pub struct SampleCatalog;

fn hash_unit(seed: &str) -> f64 {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes());
    let bytes = digest.as_bytes();
    let v = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    v as f64 / u32::MAX as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn scaled_rate(seed: &str, lo: f64, hi: f64) -> f64 {
    round2(lo + hash_unit(seed) * (hi - lo))
}

fn sample_pref_tags(seed: &str) -> Vec<String> {
    let start = (hash_unit(&format!("{seed}:tag_start")) * SAMPLE_PREF_POOL.len() as f64) as usize;
    let count = 2 + (hash_unit(&format!("{seed}:tag_count")) * 3.0) as usize;
    (0..count.min(SAMPLE_PREF_POOL.len()))
        .map(|i| {
            SAMPLE_PREF_POOL[(start + i) % SAMPLE_PREF_POOL.len()]
                .replace(' ', "")
        })
        .collect()
}

fn sample_product_name(category: ImportCategory, bank: &str) -> Vec<String> {
    match category {
        ImportCategory::Deposit => SAMPLE_DEPOSIT_NAMES
            .iter()
            .find(|(b, _)| *b == bank)
            .map(|(_, n)| vec![n.to_string()])
            .unwrap_or_else(|| vec![format!("{bank} 정기예금")]),
        ImportCategory::Saving => SAMPLE_SAVING_NAMES
            .iter()
            .find(|(b, _)| *b == bank)
            .map(|(_, n)| vec![n.to_string()])
            .unwrap_or_else(|| vec![format!("{bank} 자유적금")]),
        ImportCategory::Demand => vec![format!("{bank} 파킹통장")],
        ImportCategory::Mortgage => vec![format!("{bank} 주택담보대출(아파트)")],
        ImportCategory::Credit => {
            let mut names = vec![format!("{bank} 직장인 신용대출")];
            // limit-loan rows so a credit sync exercises the category split
            if INTERNET_SAMPLE_BANKS.contains(&bank) {
                names.push(format!("{bank} 마이너스통장"));
            }
            names
        }
    }
}

impl ProductSource for SampleCatalog {
    fn fetch(
        &self,
        category: ImportCategory,
    ) -> Result<(Vec<ProductRecord>, Vec<RateOptionRecord>), String> {
        let (base_lo, base_hi) = match category {
            ImportCategory::Credit | ImportCategory::Mortgage => (3.5, 4.8),
            _ => (3.0, 3.8),
        };

        let mut products = Vec::new();
        let mut options = Vec::new();
        for bank in SAMPLE_BANKS.iter().copied() {
            for name in sample_product_name(category, bank) {
                let storage_category = match category {
                    ImportCategory::Credit => classify_credit_row(&name),
                    other => other.storage_categories()[0],
                };
                let id = stable_product_id(storage_category, bank, &name);
                let seed = format!("sample:{}:{bank}:{name}", category.as_str());

                let pref_tags = sample_pref_tags(&seed);
                let difficulty = (pref_tags.len() as i64).min(3);
                products.push(ProductRecord {
                    id: id.clone(),
                    bank_name: bank.to_string(),
                    product_name: name.clone(),
                    category: storage_category,
                    join_method: "스마트폰 / 인터넷 / 영업점".to_string(),
                    maturity_note: "만기 시 일시 지급 (복리 효과)".to_string(),
                    detail_note: "우대금리 조건: 급여이체, 적립식 이체 등 충족 시 최대 1.0%p 우대 제공"
                        .to_string(),
                    pref_tags,
                    difficulty_score: difficulty,
                });

                let base_rate = scaled_rate(&format!("{seed}:base"), base_lo, base_hi);
                let max_rate =
                    round2(base_rate + scaled_rate(&format!("{seed}:spread"), 0.1, 1.2));
                for term in SAVE_TERMS {
                    options.push(RateOptionRecord {
                        product_id: id.clone(),
                        term_months: *term,
                        base_rate,
                        max_rate,
                    });
                }
            }
        }
        Ok((products, options))
    }
}

/// Refresh every raw category from the source, then stamp `last_updated`.
/// A category whose fetch fails is skipped, keeping its previously stored
/// snapshot; a storage failure still aborts the run, since a broken database
/// would poison every later category too.
pub fn sync_all_at_db_path(db_path: &Path, source: &dyn ProductSource) -> Result<Value, String> {
    let mut conn = open_snapshot_db(db_path)?;
    ensure_schema_ready(&conn)?;

    let mut results = Vec::<Value>::new();
    let mut refreshed = 0usize;
    for target in ALL_IMPORT_CATEGORIES {
        match source.fetch(*target) {
            Ok((products, options)) => {
                let summary =
                    replace_category_snapshot(&mut conn, *target, &products, &options)?;
                refreshed += 1;
                results.push(json!({
                    "category": target.as_str(),
                    "status": "refreshed",
                    "replaced_categories": summary.categories,
                    "imported_products": summary.inserted_products,
                    "imported_options": summary.inserted_options,
                    "carried_over_options": summary.carried_over_options,
                }));
            }
            Err(err) => {
                // fetch failure fails soft: the prior snapshot stays live
                results.push(json!({
                    "category": target.as_str(),
                    "status": "skipped",
                    "error": err,
                }));
            }
        }
    }

    let stamped = if refreshed > 0 {
        Some(stamp_last_updated(&conn)?)
    } else {
        None
    };

    Ok(json!({
        "db_path": db_path.to_string_lossy().to_string(),
        "refreshed_categories": refreshed,
        "skipped_categories": ALL_IMPORT_CATEGORIES.len() - refreshed,
        "last_updated": stamped,
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_db::test_support::create_temp_db;
    use rusqlite::Connection;
    use std::fs;

    struct FailingSource;
    impl ProductSource for FailingSource {
        fn fetch(
            &self,
            _category: ImportCategory,
        ) -> Result<(Vec<ProductRecord>, Vec<RateOptionRecord>), String> {
            Err("원격 API 시간 초과".to_string())
        }
    }

    struct FlakySource;
    impl ProductSource for FlakySource {
        fn fetch(
            &self,
            category: ImportCategory,
        ) -> Result<(Vec<ProductRecord>, Vec<RateOptionRecord>), String> {
            if category == ImportCategory::Deposit {
                Err("원격 API 시간 초과".to_string())
            } else {
                SampleCatalog.fetch(category)
            }
        }
    }

    #[test]
    fn sample_catalog_is_deterministic() {
        let (products_a, options_a) = SampleCatalog
            .fetch(ImportCategory::Deposit)
            .expect("fetch a");
        let (products_b, options_b) = SampleCatalog
            .fetch(ImportCategory::Deposit)
            .expect("fetch b");

        assert_eq!(products_a.len(), SAMPLE_BANKS.len());
        assert_eq!(options_a.len(), SAMPLE_BANKS.len() * SAVE_TERMS.len());
        for (a, b) in products_a.iter().zip(&products_b) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.pref_tags, b.pref_tags);
        }
        for (a, b) in options_a.iter().zip(&options_b) {
            assert_eq!(a.base_rate, b.base_rate);
            assert_eq!(a.max_rate, b.max_rate);
        }
    }

    #[test]
    fn sample_options_keep_max_at_or_above_base() {
        for target in ALL_IMPORT_CATEGORIES {
            let (_, options) = SampleCatalog.fetch(*target).expect("fetch");
            for option in options {
                assert!(
                    option.max_rate >= option.base_rate,
                    "{target:?}: {} < {}",
                    option.max_rate,
                    option.base_rate
                );
            }
        }
    }

    #[test]
    fn sample_credit_feed_populates_both_credit_categories() {
        let (products, _) = SampleCatalog
            .fetch(ImportCategory::Credit)
            .expect("fetch credit");
        let limit = products
            .iter()
            .filter(|p| p.category == crate::categories::Category::CreditLimit)
            .count();
        let general = products
            .iter()
            .filter(|p| p.category == crate::categories::Category::CreditGeneral)
            .count();
        assert!(limit > 0, "sample credit feed needs limit-loan rows");
        assert!(general > 0);
    }

    #[test]
    fn sync_all_refreshes_every_raw_category_and_stamps_time() {
        let db_path = create_temp_db();
        let out = sync_all_at_db_path(&db_path, &SampleCatalog).expect("sync");
        assert_eq!(out["refreshed_categories"], ALL_IMPORT_CATEGORIES.len());
        assert!(out["last_updated"].is_string());

        let conn = Connection::open(&db_path).expect("open for verification");
        for category in ["deposit", "saving", "demand", "credit_general", "mortgage"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM products WHERE category=?1",
                    [category],
                    |row| row.get(0),
                )
                .expect("count");
            assert!(count > 0, "category {category} should be populated");
        }

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn fetch_failure_keeps_previous_snapshot_and_skips_stamp() {
        let db_path = create_temp_db();
        sync_all_at_db_path(&db_path, &SampleCatalog).expect("seed sync");

        let out = sync_all_at_db_path(&db_path, &FailingSource).expect("failing sync");
        assert_eq!(out["refreshed_categories"], 0);
        assert!(out["last_updated"].is_null());

        let conn = Connection::open(&db_path).expect("open for verification");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .expect("count");
        assert!(count > 0, "failed fetches must leave prior data intact");

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn partial_failure_refreshes_the_healthy_categories() {
        let db_path = create_temp_db();
        let out = sync_all_at_db_path(&db_path, &FlakySource).expect("flaky sync");
        assert_eq!(out["refreshed_categories"], ALL_IMPORT_CATEGORIES.len() - 1);
        assert_eq!(out["skipped_categories"], 1);
        assert!(out["last_updated"].is_string());

        let _ = fs::remove_file(&db_path);
    }
}
