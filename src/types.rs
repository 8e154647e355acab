/// Shared types used across the codebase

use serde::Serialize;

/// Non-fatal problem attached to a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: &'static str,
    pub message: String,
}

impl Warning {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// A workflow result plus whatever degraded along the way.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub data: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn new(data: T) -> Self {
        Self { data, warnings: Vec::new() }
    }

    pub fn warn(mut self, warning: Option<Warning>) -> Self {
        self.warnings.extend(warning);
        self
    }
}
