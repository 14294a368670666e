//! Startup configuration validation.
//!
//! Fails fast with a descriptive diagnostic list rather than letting a
//! service discover a missing DSN or empty registry endpoint list deep into
//! its first request.

use crate::schema::ResonanceConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate required fields are present and sane before a service starts.
#[must_use]
pub fn validate(config: &ResonanceConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.storage.dsn.trim().is_empty() {
        result.error("storage.dsn", "storage DSN must not be empty");
    }
    if config.storage.max_connections == 0 {
        result.error("storage.max_connections", "must be at least 1");
    }

    if config.kv.url.trim().is_empty() {
        result.error("kv.url", "kv url must not be empty");
    }

    if config.bus.url.trim().is_empty() {
        result.error("bus.url", "bus url must not be empty");
    }
    if config.bus.push_subject.trim().is_empty() {
        result.error("bus.push_subject", "push subject must not be empty");
    }

    if config.registry.endpoints.is_empty() {
        result.error("registry.endpoints", "at least one endpoint is required");
    }
    if config.registry.lease_ttl_secs <= 0 {
        result.error("registry.lease_ttl_secs", "must be positive");
    }

    if config.gateway.max_payload_bytes == 0 {
        result.warn("gateway.max_payload_bytes", "0 disables inbound frames entirely");
    }

    result
}
