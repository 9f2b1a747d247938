use ratewise::{
    apply_embedded_migrations, best_rates_query_at_db_path, excel_import_at_db_path,
    excel_preview_at_path, resolve_import_category, resolve_source_path_text,
    sector_analysis_query_at_db_path, status_summary_query_at_db_path, sync_all_at_db_path,
    BestRatesQueryRequest, ExcelImportRequest, ExcelPreviewRequest, SampleCatalog,
    SectorAnalysisQueryRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    endpoint: AdapterEndpoint,
    #[serde(default)]
    query: Value,
    dataset: AdapterDataset,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterDataset {
    db_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

fn classify_error_message(message: &str) -> String {
    if message.contains("필수 항목") || message.contains("감지된 헤더") {
        return "SCHEMA_NOT_RECOGNIZED_ERROR".to_string();
    }

    let unreadable_keywords = [
        "파일 형식을 분석할 수 없습니다",
        "파일을 찾을 수 없습니다",
        "경로가 파일이 아닙니다",
    ];
    if unreadable_keywords.iter().any(|k| message.contains(k)) {
        return "UNREADABLE_FILE_ERROR".to_string();
    }

    if message.contains("마이그레이션") {
        return "MIGRATION_REQUIRED_ERROR".to_string();
    }

    let validation_keywords = ["필수", "지원하지 않는", "중 선택"];
    if validation_keywords.iter().any(|k| message.contains(k)) {
        return "VALIDATION_ERROR".to_string();
    }

    "UNKNOWN_ERROR".to_string()
}

fn error_response(
    category: impl Into<String>,
    message: impl Into<String>,
    error_type: impl Into<String>,
) -> AdapterResponse {
    AdapterResponse::Error {
        error: AdapterErrorBody {
            category: category.into(),
            message: message.into(),
            error_type: error_type.into(),
        },
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_stdin_json() -> Result<Value, String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| format!("stdin 읽기 실패: {e}"))?;
    if raw.trim().is_empty() {
        return Err("empty stdin request".to_string());
    }
    serde_json::from_str::<Value>(&raw).map_err(|e| format!("invalid JSON request: {e}"))
}

fn query_or_empty(query: Value) -> Value {
    if query.is_null() {
        json!({})
    } else {
        query
    }
}

fn dispatch(req: AdapterRequest) -> Result<Value, String> {
    if req.schema_version != 1 {
        return Err(format!(
            "unsupported schema_version: {}",
            req.schema_version
        ));
    }

    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.endpoint.path missing".to_string())?;
    let db_path = req
        .dataset
        .db_path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.dataset.db_path missing".to_string())?;

    match path {
        "/api/products" => {
            let query_req: BestRatesQueryRequest = serde_json::from_value(query_or_empty(req.query))
                .map_err(|e| format!("request.query invalid for products: {e}"))?;
            best_rates_query_at_db_path(Path::new(db_path), query_req)
        }
        "/api/sectors" => {
            let query_req: SectorAnalysisQueryRequest = serde_json::from_value(query_or_empty(req.query))
                .map_err(|e| format!("request.query invalid for sectors: {e}"))?;
            sector_analysis_query_at_db_path(Path::new(db_path), query_req)
        }
        "/api/status" => status_summary_query_at_db_path(Path::new(db_path)),
        "/api/migrate" => apply_embedded_migrations(Path::new(db_path))
            .and_then(|result| serde_json::to_value(result).map_err(|e| e.to_string())),
        "/api/preview" => {
            let query_req: ExcelPreviewRequest = serde_json::from_value(query_or_empty(req.query))
                .map_err(|e| format!("request.query invalid for preview: {e}"))?;
            let source_path = resolve_source_path_text(query_req.source_path)?;
            let category = resolve_import_category(query_req.category)?;
            excel_preview_at_path(Path::new(&source_path), category)
        }
        "/api/import" => {
            let query_req: ExcelImportRequest = serde_json::from_value(query_or_empty(req.query))
                .map_err(|e| format!("request.query invalid for import: {e}"))?;
            let source_path = resolve_source_path_text(query_req.source_path)?;
            let category = resolve_import_category(query_req.category)?;
            excel_import_at_db_path(Path::new(db_path), Path::new(&source_path), category)
        }
        "/api/sync" => sync_all_at_db_path(Path::new(db_path), &SampleCatalog),
        _ => Err(format!("unsupported endpoint path: {path}")),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");

    let resp = match read_stdin_json()
        .and_then(|v| {
            serde_json::from_value::<AdapterRequest>(v)
                .map_err(|e| format!("request root invalid: {e}"))
        })
        .and_then(dispatch)
    {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(message) => {
            let category = if message.starts_with("unsupported endpoint path:") {
                "UNSUPPORTED_ENDPOINT".to_string()
            } else if message.starts_with("unsupported schema_version:")
                || message.starts_with("request.")
                || message.starts_with("invalid JSON request:")
                || message == "empty stdin request"
            {
                "ADAPTER_PROTOCOL_ERROR".to_string()
            } else {
                classify_error_message(&message)
            };
            error_response(category, message, "AdapterError")
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}
