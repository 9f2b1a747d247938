use calamine::{open_workbook_auto, Reader};
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::OnceLock;

use crate::text_normalize::trim_cell;

fn tr_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("tr").expect("invalid tr selector"))
}

fn read_workbook_rows(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| format!("통합문서 열기 실패: {e}"))?;
    let sheet_names = workbook.sheet_names().to_owned();
    let first_sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| "통합문서에 시트가 없습니다".to_string())?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| format!("시트 읽기 실패: {e}"))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| trim_cell(&cell.to_string()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    if rows.is_empty() {
        return Err("통합문서에 데이터 행이 없습니다".to_string());
    }
    Ok(rows)
}

/// The regulator publishes ".xls" files that are really HTML tables; pull the
/// tr/td grid out of those.
fn read_html_table_rows(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let html = std::fs::read_to_string(path).map_err(|e| format!("파일 읽기 실패: {e}"))?;
    if !html.contains('<') {
        return Err("HTML 테이블 형식이 아닙니다".to_string());
    }
    let doc = Html::parse_document(&html);
    let mut rows = Vec::new();
    for tr in doc.select(tr_selector()) {
        let row = tr
            .children()
            .filter_map(scraper::ElementRef::wrap)
            .filter(|cell| {
                let name = cell.value().name();
                name.eq_ignore_ascii_case("td") || name.eq_ignore_ascii_case("th")
            })
            .map(|cell| trim_cell(&cell.text().collect::<Vec<_>>().join(" ")))
            .collect::<Vec<_>>();
        if row.iter().any(|c| !c.is_empty()) {
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Err("HTML 문서에서 테이블 행을 찾지 못했습니다".to_string());
    }
    Ok(rows)
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("CSV 읽기 실패: {e}"))?;

    let mut rows = Vec::new();
    for rec in reader.records() {
        let rec = rec.map_err(|e| format!("CSV 행 읽기 실패: {e}"))?;
        rows.push(rec.iter().map(trim_cell).collect());
    }
    if rows.is_empty() {
        return Err("CSV에 데이터 행이 없습니다".to_string());
    }
    Ok(rows)
}

type ReadStrategy = (&'static str, fn(&Path) -> Result<Vec<Vec<String>>, String>);

const WORKBOOK_FIRST: &[ReadStrategy] = &[
    ("workbook", read_workbook_rows),
    ("html_table", read_html_table_rows),
];
const CSV_FIRST: &[ReadStrategy] = &[("csv", read_csv_rows)];
const ANY_FORMAT: &[ReadStrategy] = &[
    ("workbook", read_workbook_rows),
    ("html_table", read_html_table_rows),
    ("csv", read_csv_rows),
];

/// Read a raw tabular file as rows of trimmed cell text. Strategies are tried
/// in order for the file's extension; when every strategy fails the combined
/// reasons come back as one unreadable-file error.
pub fn read_table_rows(path: &Path) -> Result<Vec<Vec<String>>, String> {
    if !path.exists() {
        return Err(format!("파일을 찾을 수 없습니다: {}", path.to_string_lossy()));
    }
    if !path.is_file() {
        return Err(format!("경로가 파일이 아닙니다: {}", path.to_string_lossy()));
    }

    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let strategies = match suffix.as_str() {
        "xls" | "xlsx" => WORKBOOK_FIRST,
        "csv" => CSV_FIRST,
        _ => ANY_FORMAT,
    };

    let mut reasons = Vec::new();
    for (label, strategy) in strategies {
        match strategy(path) {
            Ok(rows) => return Ok(rows),
            Err(err) => reasons.push(format!("{label}: {err}")),
        }
    }
    Err(format!(
        "파일 형식을 분석할 수 없습니다（{}）",
        reasons.join(" / ")
    ))
}
