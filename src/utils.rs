use serde::Serialize;

/// Success envelope. Failures never go through here, see `AppError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationParams {
    pub page: u64,
    pub limit: u64,
}

impl PaginationParams {
    pub const DEFAULT_LIMIT: u64 = 20;
    pub const MAX_LIMIT: u64 = 100;
    /// Keeps `offset()` within a signed 64-bit skip for any limit.
    pub const MAX_PAGE: u64 = i64::MAX as u64 / Self::MAX_LIMIT;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, Self::MAX_PAGE);
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);

        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, params: PaginationParams, total: u64) -> Self {
        let total_pages = total.div_ceil(params.limit);

        Self {
            items,
            pagination: PaginationMeta {
                page: params.page,
                limit: params.limit,
                total,
                total_pages,
                has_next: params.page < total_pages,
                has_prev: params.page > 1,
            },
        }
    }
}

pub fn validate_email(email: &str) -> bool {
    // Simple email validation
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps() {
        let params = PaginationParams::new(Some(0), Some(1000));
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, PaginationParams::MAX_LIMIT);
        assert_eq!(PaginationParams::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let params = PaginationParams::new(Some(u64::MAX), Some(1000));
        assert_eq!(params.page, PaginationParams::MAX_PAGE);
        assert!(params.offset() <= i64::MAX as u64);

        let params = PaginationParams {
            page: u64::MAX,
            limit: u64::MAX,
        };
        assert_eq!(params.offset(), u64::MAX);
    }

    #[test]
    fn pagination_meta() {
        let page = PaginatedResponse::new(vec![1, 2], PaginationParams::new(Some(2), Some(2)), 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
        assert!(page.pagination.has_prev);

        let empty = PaginatedResponse::<u8>::new(vec![], PaginationParams::new(None, None), 0);
        assert_eq!(empty.pagination.total_pages, 0);
        assert!(!empty.pagination.has_next);
    }

    #[test]
    fn emails() {
        assert!(validate_email("ada@example.com"));
        assert!(!validate_email("ada.example.com"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("ada@example."));
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn welcome_envelope_shape() {
        let value = serde_json::to_value(ApiResponse::message("hi")).unwrap();
        assert_eq!(value, serde_json::json!({"status": "success", "message": "hi"}));
    }
}
