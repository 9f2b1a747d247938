use std::collections::BTreeMap;

use crate::text_normalize::normalize_header;

/// How many leading rows to inspect when hunting for the real header row.
/// Regulator exports routinely stack a title banner above it.
pub const HEADER_SCAN_LIMIT: usize = 10;

/// Every known export variant labels its institution column with this stem
/// (금융회사 / 금융회사명 / 금융회사 명).
pub const BANK_HEADER_MARKER: &str = "금융회사";

/// Which base/max rate column vocabulary a spreadsheet uses. Credit-loan
/// exports publish min/avg/max rates, everything else pre-tax and
/// preferential rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateFamily {
    DepositLike,
    CreditLike,
}

const BANK_CANDIDATES: &[&str] = &["금융회사", "금융회사명", "금융기관"];
const NAME_CANDIDATES: &[&str] = &["상품명", "금융상품명"];
const JOIN_CANDIDATES: &[&str] = &["가입방법", "가입경로", "가입제한"];
const MATURITY_CANDIDATES: &[&str] = &["만기 후 이자율", "만기후이자율", "이자지급방식", "이자 지급"];

const DEPOSIT_BASE_CANDIDATES: &[&str] = &["세전 이자율", "저축 금리", "기준금리", "기본금리", "연리"];
const DEPOSIT_MAX_CANDIDATES: &[&str] = &["최고 우대금리", "우대금리", "최고금리"];
const CREDIT_BASE_CANDIDATES: &[&str] = &["최저 금리", "최저금리", "평균 금리", "평균금리"];
const CREDIT_MAX_CANDIDATES: &[&str] = &["최고 금리", "최고금리", "최대금리"];

/// Resolved column positions for one header row. Indices point into the
/// header row; `headers` keeps the normalized labels for diagnostics and
/// detail-note tagging.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    pub headers: Vec<String>,
    pub bank: Option<usize>,
    pub name: Option<usize>,
    pub base_rate: Option<usize>,
    pub max_rate: Option<usize>,
    pub join_method: Option<usize>,
    pub maturity_note: Option<usize>,
}

impl RoleMap {
    fn claimed(&self, idx: usize) -> bool {
        [
            self.bank,
            self.name,
            self.base_rate,
            self.max_rate,
            self.join_method,
            self.maturity_note,
        ]
        .iter()
        .any(|slot| *slot == Some(idx))
    }

    /// Columns no role claimed; their cells feed the free-text detail note.
    pub fn unclaimed_columns(&self) -> Vec<usize> {
        (0..self.headers.len())
            .filter(|idx| !self.claimed(*idx))
            .collect()
    }

    /// role → resolved header label, for import previews.
    pub fn resolved_labels(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let mut put = |role: &str, slot: Option<usize>| {
            if let Some(idx) = slot {
                if let Some(label) = self.headers.get(idx) {
                    out.insert(role.to_string(), label.clone());
                }
            }
        };
        put("bank", self.bank);
        put("name", self.name);
        put("base_rate", self.base_rate);
        put("max_rate", self.max_rate);
        put("join_method", self.join_method);
        put("maturity_note", self.maturity_note);
        out
    }
}

/// First header label containing any candidate wins; candidates are tried in
/// priority order, matching is substring, never exact.
fn find_role_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    for candidate in candidates {
        for (idx, header) in headers.iter().enumerate() {
            if header.contains(candidate) {
                return Some(idx);
            }
        }
    }
    None
}

/// Map semantic roles onto the actual header labels of one export. Fails only
/// when the bank or product-name column cannot be located; every other role
/// is optional and degrades to a placeholder downstream.
pub fn resolve_roles(raw_headers: &[String], family: RateFamily) -> Result<RoleMap, String> {
    let headers = raw_headers
        .iter()
        .map(|h| normalize_header(h))
        .collect::<Vec<_>>();

    let (base_candidates, max_candidates) = match family {
        RateFamily::DepositLike => (DEPOSIT_BASE_CANDIDATES, DEPOSIT_MAX_CANDIDATES),
        RateFamily::CreditLike => (CREDIT_BASE_CANDIDATES, CREDIT_MAX_CANDIDATES),
    };

    let mut map = RoleMap {
        headers: headers.clone(),
        bank: find_role_column(&headers, BANK_CANDIDATES),
        name: find_role_column(&headers, NAME_CANDIDATES),
        base_rate: find_role_column(&headers, base_candidates),
        max_rate: find_role_column(&headers, max_candidates),
        join_method: find_role_column(&headers, JOIN_CANDIDATES),
        maturity_note: find_role_column(&headers, MATURITY_CANDIDATES),
    };

    if map.bank.is_none() || map.name.is_none() {
        return Err(format!(
            "필수 항목(은행명, 상품명)을 찾을 수 없는 양식입니다. 감지된 헤더: [{}]",
            headers.join(", ")
        ));
    }

    // A column can satisfy both rate roles in degenerate exports; keep the
    // pair distinct so max falls back to base instead of shadowing it.
    if map.base_rate.is_some() && map.base_rate == map.max_rate {
        map.max_rate = None;
    }

    Ok(map)
}

/// Scan the first rows of a raw table for the one that actually holds the
/// header labels. Falls back to row 0 when the marker never appears; the
/// required-column check in `resolve_roles` then produces the diagnostic.
pub fn locate_header_row(rows: &[Vec<String>]) -> usize {
    for (idx, row) in rows.iter().take(HEADER_SCAN_LIMIT).enumerate() {
        if row
            .iter()
            .any(|cell| normalize_header(cell).contains(BANK_HEADER_MARKER))
        {
            return idx;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deposit_roles_resolve_with_candidate_priority() {
        let map = resolve_roles(
            &headers(&[
                "금융회사명",
                "상품명",
                "세전\n이자율(%)",
                "최고 우대금리(%)",
                "가입방법",
                "우대조건",
            ]),
            RateFamily::DepositLike,
        )
        .expect("deposit roles");
        assert_eq!(map.bank, Some(0));
        assert_eq!(map.name, Some(1));
        assert_eq!(map.base_rate, Some(2));
        assert_eq!(map.max_rate, Some(3));
        assert_eq!(map.join_method, Some(4));
        assert_eq!(map.unclaimed_columns(), vec![5]);
    }

    #[test]
    fn credit_family_uses_min_avg_vocabulary() {
        let map = resolve_roles(
            &headers(&["금융회사", "금융상품명", "최저금리", "최고금리", "대출종류"]),
            RateFamily::CreditLike,
        )
        .expect("credit roles");
        assert_eq!(map.base_rate, Some(2));
        assert_eq!(map.max_rate, Some(3));
        // 대출종류 stays unclaimed and feeds the detail note
        assert_eq!(map.unclaimed_columns(), vec![4]);
    }

    #[test]
    fn missing_required_columns_report_detected_headers() {
        let err = resolve_roles(
            &headers(&["이름", "금리", "비고"]),
            RateFamily::DepositLike,
        )
        .expect_err("schema must not resolve");
        assert!(err.contains("필수 항목"));
        assert!(err.contains("비고"), "diagnostic lists detected headers: {err}");
    }

    #[test]
    fn header_row_found_below_title_banner() {
        let rows = vec![
            vec!["금융상품 비교공시".to_string()],
            vec!["(2026년 8월 기준)".to_string()],
            vec!["금융회사명".to_string(), "상품명".to_string()],
            vec!["국민은행".to_string(), "정기예금".to_string()],
        ];
        assert_eq!(locate_header_row(&rows), 2);
    }

    #[test]
    fn header_scan_falls_back_to_first_row() {
        let rows = vec![
            vec!["은행".to_string(), "상품".to_string()],
            vec!["A".to_string(), "B".to_string()],
        ];
        assert_eq!(locate_header_row(&rows), 0);
    }
}
