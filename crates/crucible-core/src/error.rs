use std::fmt;

/// Request failed validation or exceeded a documented cap. Carried inside
/// `anyhow::Error` chains; the HTTP layer downcasts it to a 400.
#[derive(Debug, Clone)]
pub struct InvalidRequest {
    pub field: &'static str,
    pub message: String,
}

impl InvalidRequest {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for InvalidRequest {}

/// Unknown run id, uploaded-file id, or artifact id.
#[derive(Debug, Clone)]
pub struct NotFound {
    pub what: &'static str,
    pub id: String,
}

impl NotFound {
    pub fn new(what: &'static str, id: impl Into<String>) -> Self {
        Self {
            what,
            id: id.into(),
        }
    }
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not found: {}", self.what, self.id)
    }
}

impl std::error::Error for NotFound {}

/// Admission rejected by the per-tenant token bucket.
#[derive(Debug, Clone)]
pub struct RateLimited {
    pub tenant: String,
}

impl RateLimited {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
        }
    }
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate limit exceeded for tenant {}", self.tenant)
    }
}

impl std::error::Error for RateLimited {}
