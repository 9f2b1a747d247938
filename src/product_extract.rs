use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::categories::{Category, ImportCategory};
use crate::column_roles::{locate_header_row, resolve_roles, RoleMap};
use crate::text_normalize::{clean_rate_value, is_missing_cell, normalize_key, trim_cell};

/// Terms are synthesized uniformly because the source spreadsheets have no
/// reliable per-term breakdown; the ranking query always asks for a term.
pub const SAVE_TERMS: &[i64] = &[12, 24, 36];

pub const JOIN_METHOD_PLACEHOLDER: &str = "정보 없음";
pub const MATURITY_NOTE_PLACEHOLDER: &str = "상세 정보 참조";
pub const DEFAULT_PREF_TAG: &str = "일반";

const PREF_KEYWORDS: &[&str] = &[
    "첫거래",
    "첫 거래",
    "급여",
    "자동이체",
    "카드",
    "앱",
    "마케팅",
    "오픈뱅킹",
];

const LIMIT_LOAN_MARKERS: &[&str] = &["마이너스", "한도대출"];

const MAX_DIFFICULTY_SCORE: i64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub bank_name: String,
    pub product_name: String,
    #[serde(serialize_with = "serialize_category")]
    pub category: Category,
    pub join_method: String,
    pub maturity_note: String,
    pub detail_note: String,
    pub pref_tags: Vec<String>,
    pub difficulty_score: i64,
}

fn serialize_category<S: serde::Serializer>(c: &Category, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(c.as_str())
}

#[derive(Debug, Clone, Serialize)]
pub struct RateOptionRecord {
    pub product_id: String,
    pub term_months: i64,
    pub base_rate: f64,
    pub max_rate: f64,
}

#[derive(Debug)]
pub struct ExtractOutcome {
    pub products: Vec<ProductRecord>,
    pub options: Vec<RateOptionRecord>,
    pub header_row: usize,
    pub roles: RoleMap,
    pub skipped_rows: usize,
}

/// Stable product identity from the normalized (bank, product name) composite
/// key. Row order can change between refreshes; hashing the key keeps the id
/// and therefore the rate trend attached to the logical product.
pub fn stable_product_id(category: Category, bank_name: &str, product_name: &str) -> String {
    let seed = format!(
        "ratewise:product:{}:{}:{}",
        category.as_str(),
        normalize_key(bank_name),
        normalize_key(product_name)
    );
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes());
    let hex = digest.simple().to_string();
    format!("prd_{}", &hex[..12])
}

/// Limit/overdraft loans share a spreadsheet with installment credit; the
/// product name is the only signal that tells them apart.
pub fn classify_credit_row(product_name: &str) -> Category {
    let name = normalize_key(product_name);
    if LIMIT_LOAN_MARKERS.iter().any(|m| name.contains(m)) {
        Category::CreditLimit
    } else {
        Category::CreditGeneral
    }
}

fn scan_pref_tags(detail_note: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for keyword in PREF_KEYWORDS {
        if detail_note.contains(keyword) {
            let tag = keyword.replace(' ', "");
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    if tags.is_empty() {
        tags.push(DEFAULT_PREF_TAG.to_string());
    }
    tags
}

fn difficulty_score(tags: &[String]) -> i64 {
    if tags.len() == 1 && tags[0] == DEFAULT_PREF_TAG {
        return 0;
    }
    (tags.len() as i64).min(MAX_DIFFICULTY_SCORE)
}

fn row_cell(row: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i).cloned())
        .map(|s| trim_cell(&s))
        .unwrap_or_default()
}

fn placeholder_if_missing(value: String, placeholder: &str) -> String {
    if is_missing_cell(&value) {
        placeholder.to_string()
    } else {
        value
    }
}

/// Concatenate every unclaimed column as `[header] value`, keeping the
/// information the canonical schema has no field for.
fn build_detail_note(row: &[String], roles: &RoleMap) -> String {
    let mut parts = Vec::new();
    for idx in roles.unclaimed_columns() {
        let header = match roles.headers.get(idx) {
            Some(h) if !h.is_empty() => h,
            _ => continue,
        };
        let value = row_cell(row, Some(idx));
        if is_missing_cell(&value) {
            continue;
        }
        parts.push(format!("[{header}] {value}"));
    }
    parts.join(" | ")
}

/// Turn raw sheet rows into normalized products and per-term rate options.
/// Structural failures (no usable header) are the only hard errors; row-level
/// anomalies are coerced or skipped.
pub fn extract_products(
    rows: &[Vec<String>],
    import_category: ImportCategory,
) -> Result<ExtractOutcome, String> {
    if rows.is_empty() {
        return Err("빈 테이블입니다.".to_string());
    }

    let header_row = locate_header_row(rows);
    let roles = resolve_roles(&rows[header_row], import_category.rate_family())?;

    let mut products = Vec::new();
    let mut options = Vec::new();
    let mut used_ids = HashSet::new();
    let mut skipped_rows = 0usize;

    for (offset, row) in rows[(header_row + 1)..].iter().enumerate() {
        let bank_name = row_cell(row, roles.bank);
        let product_name = row_cell(row, roles.name);
        if is_missing_cell(&bank_name) || is_missing_cell(&product_name) {
            skipped_rows += 1;
            continue;
        }

        let base_rate = clean_rate_value(&row_cell(row, roles.base_rate));
        let mut max_rate = clean_rate_value(&row_cell(row, roles.max_rate));
        // a displayed ceiling can never sit below the floor
        if max_rate < base_rate {
            max_rate = base_rate;
        }
        if base_rate == 0.0 && max_rate == 0.0 {
            // section headers and subtotal rows left in the export
            skipped_rows += 1;
            continue;
        }

        let category = match import_category {
            ImportCategory::Credit => classify_credit_row(&product_name),
            other => other.storage_categories()[0],
        };

        let mut id = stable_product_id(category, &bank_name, &product_name);
        if !used_ids.insert(id.clone()) {
            // same bank+name twice in one batch; positional fallback
            id = format!("{id}_{}", header_row + 1 + offset);
            used_ids.insert(id.clone());
        }

        let detail_note = build_detail_note(row, &roles);
        let pref_tags = scan_pref_tags(&detail_note);
        let difficulty = difficulty_score(&pref_tags);

        products.push(ProductRecord {
            id: id.clone(),
            bank_name,
            product_name,
            category,
            join_method: placeholder_if_missing(
                row_cell(row, roles.join_method),
                JOIN_METHOD_PLACEHOLDER,
            ),
            maturity_note: placeholder_if_missing(
                row_cell(row, roles.maturity_note),
                MATURITY_NOTE_PLACEHOLDER,
            ),
            detail_note,
            difficulty_score: difficulty,
            pref_tags,
        });

        for term in SAVE_TERMS {
            options.push(RateOptionRecord {
                product_id: id.clone(),
                term_months: *term,
                base_rate,
                max_rate,
            });
        }
    }

    Ok(ExtractOutcome {
        products,
        options,
        header_row,
        roles,
        skipped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(table: &[&[&str]]) -> Vec<Vec<String>> {
        table
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn deposit_rows_extract_with_banner_above_header() {
        let table = rows(&[
            &["금융상품 비교공시"],
            &["(기준일: 2026-08-01)"],
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리", "가입방법", "우대조건"],
            &["국민은행", "KB Star 정기예금", "3.20%", "3.80%", "인터넷", "급여이체, 카드이용 시 우대"],
            &["합계", "-", "-", "-", "-", "-"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract deposit");
        assert_eq!(outcome.header_row, 2);
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.options.len(), SAVE_TERMS.len());
        assert_eq!(outcome.skipped_rows, 1);

        let p = &outcome.products[0];
        assert_eq!(p.bank_name, "국민은행");
        assert_eq!(p.category, Category::Deposit);
        assert!(p.detail_note.contains("[우대조건]"));
        assert_eq!(p.pref_tags, vec!["급여".to_string(), "카드".to_string()]);
        assert_eq!(p.difficulty_score, 2);

        let o = &outcome.options[0];
        assert_eq!(o.base_rate, 3.2);
        assert_eq!(o.max_rate, 3.8);
    }

    #[test]
    fn missing_max_rate_coerces_to_base() {
        let table = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["토스뱅크", "먼저 이자 받는 예금", "3.50%", "-"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract");
        assert_eq!(outcome.options[0].base_rate, 3.5);
        assert_eq!(outcome.options[0].max_rate, 3.5);
    }

    #[test]
    fn zero_rate_rows_are_dropped_as_non_data() {
        let table = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["부산은행", "구분선", "-", "-"],
            &["부산은행", "더조은 정기예금", "3.1", "3.6"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract");
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.products[0].product_name, "더조은 정기예금");
        assert_eq!(outcome.skipped_rows, 1);
    }

    #[test]
    fn credit_sheet_splits_limit_and_general_rows() {
        let table = rows(&[
            &["금융회사명", "상품명", "최저금리", "최고금리"],
            &["신한은행", "신한 마이너스통장", "5.1", "6.2"],
            &["신한은행", "신한 직장인 일반대출", "4.5", "5.9"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Credit).expect("extract credit");
        let categories = outcome
            .products
            .iter()
            .map(|p| p.category)
            .collect::<Vec<_>>();
        assert_eq!(categories, vec![Category::CreditLimit, Category::CreditGeneral]);
    }

    #[test]
    fn padding_rows_with_nan_markers_are_skipped() {
        let table = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["nan", "nan", "nan", "nan"],
            &["", "", "", ""],
            &["케이뱅크", "코드K 정기예금", "3.4", "3.9"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract");
        assert_eq!(outcome.products.len(), 1);
        assert_eq!(outcome.skipped_rows, 2);
    }

    #[test]
    fn no_keyword_match_yields_the_general_tag_at_zero_difficulty() {
        let table = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리", "유의사항"],
            &["제주은행", "제주드림 정기예금", "3.0", "3.2", "중도해지 시 금리 적용 안내"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract");
        let p = &outcome.products[0];
        assert_eq!(p.pref_tags, vec![DEFAULT_PREF_TAG.to_string()]);
        assert_eq!(p.difficulty_score, 0);
    }

    #[test]
    fn difficulty_score_caps_at_three() {
        let tags = ["급여", "카드", "앱", "자동이체"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        assert_eq!(difficulty_score(&tags), 3);
    }

    #[test]
    fn same_product_gets_same_id_across_runs_despite_row_moves() {
        let first = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["하나은행", "하나의 정기예금", "3.2", "3.7"],
            &["우리은행", "WON플러스예금", "3.3", "3.8"],
        ]);
        let reordered = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["우리은행", "WON플러스예금", "3.3", "3.8"],
            &["하나은행", "하나의 정기예금", "3.2", "3.7"],
        ]);

        let a = extract_products(&first, ImportCategory::Deposit).expect("run 1");
        let b = extract_products(&reordered, ImportCategory::Deposit).expect("run 2");

        let find = |out: &ExtractOutcome, bank: &str| {
            out.products
                .iter()
                .find(|p| p.bank_name == bank)
                .map(|p| p.id.clone())
                .expect("product present")
        };
        assert_eq!(find(&a, "하나은행"), find(&b, "하나은행"));
        assert_eq!(find(&a, "우리은행"), find(&b, "우리은행"));
    }

    #[test]
    fn duplicate_composite_keys_fall_back_to_positional_ids() {
        let table = rows(&[
            &["금융회사명", "상품명", "세전 이자율", "최고 우대금리"],
            &["광주은행", "플러스모아예금", "3.1", "3.5"],
            &["광주은행", "플러스모아예금", "3.2", "3.6"],
        ]);

        let outcome = extract_products(&table, ImportCategory::Deposit).expect("extract");
        assert_eq!(outcome.products.len(), 2);
        assert_ne!(outcome.products[0].id, outcome.products[1].id);
    }
}
