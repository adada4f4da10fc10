use serde::Serialize;
use service_core::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Page/page_size from a list query, clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.page_size - 1) / self.page_size
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: pagination.total_pages(total),
        }
    }

    /// A single page holding everything.
    pub fn all(items: Vec<T>) -> Self {
        let total = items.len() as i64;
        Self {
            items,
            total,
            page: 1,
            page_size: total.max(1),
            total_pages: i64::from(total > 0),
        }
    }
}

/// Upper-cased ISO-4217 code, or `BadRequest`.
pub fn normalize_currency(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "currency must be a three-letter ISO-4217 code, got '{}'",
            raw
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = Pagination::new(None, None);
        assert_eq!((p.page, p.page_size, p.offset()), (1, 50, 0));

        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!((p.page, p.page_size), (1, 200));

        let p = Pagination::new(Some(3), Some(0));
        assert_eq!((p.page_size, p.offset()), (1, 2));
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(Some(1), Some(20));
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(20), 1);
        assert_eq!(p.total_pages(21), 2);
    }

    #[test]
    fn currency_is_normalized() {
        assert_eq!(normalize_currency("eur").unwrap(), "EUR");
        assert!(normalize_currency("EURO").is_err());
        assert!(normalize_currency("E1R").is_err());
    }
}
