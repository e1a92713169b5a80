use serde::{Deserialize, Serialize};

/// Uniform HTTP response envelope shared by the gateway and the worker
/// status APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub message: String,

    pub meta: PaginationMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub limit: u64,
    pub page: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: message.into(),
            meta: PaginationMeta::default(),
        }
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: message.into(),
            meta: PaginationMeta::default(),
        }
    }
}
