use crate::column_roles::RateFamily;

/// Storage-side product families. Credit imports are split row-by-row into
/// the two credit variants, every other import maps onto exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Deposit,
    Saving,
    Demand,
    CreditGeneral,
    CreditLimit,
    Mortgage,
}

pub const ALL_CATEGORIES: &[Category] = &[
    Category::Deposit,
    Category::Saving,
    Category::Demand,
    Category::CreditGeneral,
    Category::CreditLimit,
    Category::Mortgage,
];

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Deposit => "deposit",
            Category::Saving => "saving",
            Category::Demand => "demand",
            Category::CreditGeneral => "credit_general",
            Category::CreditLimit => "credit_limit",
            Category::Mortgage => "mortgage",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        match raw.trim().to_lowercase().as_str() {
            "deposit" => Some(Category::Deposit),
            "saving" => Some(Category::Saving),
            "demand" => Some(Category::Demand),
            "credit_general" => Some(Category::CreditGeneral),
            "credit_limit" => Some(Category::CreditLimit),
            "mortgage" => Some(Category::Mortgage),
            _ => None,
        }
    }

    /// Higher max rate wins for deposit-style products, lower wins for loans.
    pub fn ranks_descending(self) -> bool {
        matches!(
            self,
            Category::Deposit | Category::Saving | Category::Demand
        )
    }
}

/// Raw upload/fetch targets. `Credit` covers both credit variants because the
/// regulator publishes installment and limit loans in one spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportCategory {
    Deposit,
    Saving,
    Demand,
    Credit,
    Mortgage,
}

pub const ALL_IMPORT_CATEGORIES: &[ImportCategory] = &[
    ImportCategory::Deposit,
    ImportCategory::Saving,
    ImportCategory::Demand,
    ImportCategory::Credit,
    ImportCategory::Mortgage,
];

impl ImportCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportCategory::Deposit => "deposit",
            ImportCategory::Saving => "saving",
            ImportCategory::Demand => "demand",
            ImportCategory::Credit => "credit",
            ImportCategory::Mortgage => "mortgage",
        }
    }

    pub fn parse(raw: &str) -> Result<ImportCategory, String> {
        match raw.trim().to_lowercase().as_str() {
            "deposit" => Ok(ImportCategory::Deposit),
            "saving" => Ok(ImportCategory::Saving),
            "demand" => Ok(ImportCategory::Demand),
            "credit" => Ok(ImportCategory::Credit),
            "mortgage" => Ok(ImportCategory::Mortgage),
            other => Err(format!(
                "지원하지 않는 카테고리: {other}（deposit/saving/demand/credit/mortgage 중 선택）"
            )),
        }
    }

    /// Storage categories an ingestion for this target replaces as one unit.
    pub fn storage_categories(self) -> &'static [Category] {
        match self {
            ImportCategory::Deposit => &[Category::Deposit],
            ImportCategory::Saving => &[Category::Saving],
            ImportCategory::Demand => &[Category::Demand],
            ImportCategory::Credit => &[Category::CreditGeneral, Category::CreditLimit],
            ImportCategory::Mortgage => &[Category::Mortgage],
        }
    }

    /// Only credit spreadsheets use the min/avg rate schema; mortgage exports
    /// reuse the deposit-style column names.
    pub fn rate_family(self) -> RateFamily {
        match self {
            ImportCategory::Credit => RateFamily::CreditLike,
            _ => RateFamily::DepositLike,
        }
    }
}
