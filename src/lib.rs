mod categories;
mod column_roles;
mod excel_import;
mod product_extract;
mod product_sync;
mod rate_rankings;
mod sector_analytics;
mod sheet_reader;
mod snapshot_db;
mod text_normalize;

pub use categories::{Category, ImportCategory, ALL_CATEGORIES, ALL_IMPORT_CATEGORIES};
pub use column_roles::{locate_header_row, resolve_roles, RateFamily, RoleMap};
pub use excel_import::{
    excel_import_at_db_path, excel_preview_at_path, resolve_import_category,
    resolve_source_path_text, ExcelImportRequest, ExcelPreviewRequest,
};
pub use product_extract::{
    classify_credit_row, extract_products, stable_product_id, ExtractOutcome, ProductRecord,
    RateOptionRecord, SAVE_TERMS,
};
pub use product_sync::{sync_all_at_db_path, ProductSource, SampleCatalog};
pub use rate_rankings::{
    best_rates_query_at_db_path, status_summary_query_at_db_path, BestRatesQueryRequest,
};
pub use sector_analytics::{
    classify_bank_sector, sector_analysis_query_at_db_path, SectorAnalysisQueryRequest,
};
pub use sheet_reader::read_table_rows;
pub use snapshot_db::{
    apply_embedded_migrations, open_snapshot_db, replace_category_snapshot, stamp_last_updated,
    ReplaceSummary, SnapshotDbMigrateResult,
};
