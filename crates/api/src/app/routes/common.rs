use axum::http::StatusCode;
use chrono::NaiveDate;

use verenigingen_auth::{CommandAuthorization, Permission};
use verenigingen_core::{AggregateId, Money};

use crate::app::errors;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path/body aggregate id or produce a 400 response.
pub fn parse_aggregate_id(raw: &str, field: &'static str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {field}"),
        )
    })
}

/// Parse an ISO date ("2025-08-06") or produce a 400 response.
pub fn parse_date(raw: &str, field: &'static str) -> Result<NaiveDate, axum::response::Response> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_date",
            format!("{field} must be an ISO date (YYYY-MM-DD)"),
        )
    })
}

/// Parse a decimal euro amount ("12.50") or produce a 400 response.
pub fn parse_amount(raw: &str, field: &'static str) -> Result<Money, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_amount",
            format!("{field} must be a decimal euro amount"),
        )
    })
}
