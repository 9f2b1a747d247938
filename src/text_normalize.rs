use regex::Regex;
use std::sync::OnceLock;

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

fn non_numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9.]").expect("invalid numeric strip regex"))
}

pub fn trim_cell(text: &str) -> String {
    text.trim()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Header labels in the regulator exports carry line breaks and doubled
/// spaces; collapse all runs of whitespace to one space for comparison.
pub fn normalize_header(raw: &str) -> String {
    ws_re().replace_all(&trim_cell(raw), " ").trim().to_string()
}

pub fn normalize_key(key: &str) -> String {
    trim_cell(key)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Strip everything that is not a digit or decimal point (percent signs,
/// commas, units) and parse the remainder. Cells with no numeric content
/// normalize to 0.0, never to an error.
pub fn clean_rate_value(raw: &str) -> f64 {
    let stripped = non_numeric_re().replace_all(raw, "");
    if stripped.is_empty() {
        return 0.0;
    }
    stripped.parse::<f64>().unwrap_or(0.0)
}

/// Padding/footer rows in the exports show up as empty cells or pandas-style
/// "nan" markers.
pub fn is_missing_cell(text: &str) -> bool {
    let t = trim_cell(text);
    t.is_empty() || t.eq_ignore_ascii_case("nan") || t == "-"
}
