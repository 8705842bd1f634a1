use std::net::IpAddr;

use bastion_core::time::parse_ts;
use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError, ValidationErrors};
use crate::types::{JobType, ScheduleRequest, SupportedJobTypes};

/// A request that passed every check and can be written as-is.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub description: String,
    pub job_type: JobType,
    pub start_at: DateTime<Utc>,
    pub finish_at: DateTime<Utc>,
    /// Canonical textual form of each address, in request order.
    pub whitelist: Vec<String>,
}

/// Check a raw request before anything touches the database.
///
/// The job type is resolved first and fails on its own with `InvalidType`.
/// All remaining problems are collected into one `Validation` error so the
/// caller sees every offending field at once.
pub fn validate(
    request: &ScheduleRequest,
    job_types: &SupportedJobTypes,
    max_whitelist_ips: usize,
) -> Result<ValidatedRequest> {
    let job_type = job_types.resolve(&request.job_type)?;
    let mut errors = ValidationErrors::default();

    if request.description.trim().is_empty() {
        errors.add("description", "blank");
    }

    let start_at = timestamp(&request.start_at, "start_at", &mut errors);
    let finish_at = timestamp(&request.finish_at, "finish_at", &mut errors);
    if let (Some(start), Some(finish)) = (start_at, finish_at) {
        if start >= finish {
            errors.add("finish_at", "must_be_after_start_at");
        }
    }

    if request.whitelist_ip.len() > max_whitelist_ips {
        errors.add("whitelist_ip", "too_many");
    }
    let whitelist: Vec<String> = request
        .whitelist_ip
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| match raw.trim().parse::<IpAddr>() {
            Ok(addr) => Some(addr.to_string()),
            Err(_) => {
                errors.add(format!("whitelist_ip[{i}]"), "invalid");
                None
            }
        })
        .collect();

    match (start_at, finish_at) {
        (Some(start_at), Some(finish_at)) if errors.is_empty() => Ok(ValidatedRequest {
            description: request.description.clone(),
            job_type,
            start_at,
            finish_at,
            whitelist,
        }),
        _ => Err(SchedulerError::Validation(errors)),
    }
}

fn timestamp(raw: &str, field: &str, errors: &mut ValidationErrors) -> Option<DateTime<Utc>> {
    if raw.trim().is_empty() {
        errors.add(field, "blank");
        return None;
    }
    let parsed = parse_ts(raw);
    if parsed.is_none() {
        errors.add(field, "invalid");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            description: "scheduled upgrade".to_string(),
            job_type: "maintenance".to_string(),
            start_at: "2026-03-01T02:00:00Z".to_string(),
            finish_at: "2026-03-01T04:00:00Z".to_string(),
            whitelist_ip: vec![],
        }
    }

    fn field_errors(req: &ScheduleRequest) -> ValidationErrors {
        match validate(req, &SupportedJobTypes::default(), 4) {
            Err(SchedulerError::Validation(e)) => e,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        let v = validate(&request(), &SupportedJobTypes::default(), 4).unwrap();
        assert_eq!(v.job_type, JobType::Maintenance);
        assert!(v.start_at < v.finish_at);
    }

    #[test]
    fn invalid_type_wins_over_field_errors() {
        let mut req = request();
        req.job_type = "unsupported".to_string();
        req.description = String::new();
        let err = validate(&req, &SupportedJobTypes::default(), 4).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidType { .. }));
    }

    #[test]
    fn whitespace_description_is_blank() {
        let mut req = request();
        req.description = "   ".to_string();
        assert!(field_errors(&req).has("description"));
    }

    #[test]
    fn missing_and_malformed_timestamps() {
        let mut req = request();
        req.start_at = String::new();
        req.finish_at = "tomorrow-ish".to_string();
        let errors = field_errors(&req);
        assert!(errors.has("start_at"));
        assert!(errors.has("finish_at"));
    }

    #[test]
    fn equal_or_reversed_window_is_rejected() {
        let mut req = request();
        req.finish_at = req.start_at.clone();
        assert!(field_errors(&req).has("finish_at"));

        let mut req = request();
        std::mem::swap(&mut req.start_at, &mut req.finish_at);
        assert!(field_errors(&req).has("finish_at"));
    }

    #[test]
    fn finish_beyond_year_9999_is_invalid_not_a_store_failure() {
        let mut req = request();
        req.start_at = "9999-12-31T22:00:00Z".to_string();
        req.finish_at = "9999-12-31T23:30:00-01:00".to_string();
        let errors = field_errors(&req);
        assert!(errors.has("finish_at"));
        assert!(!errors.has("start_at"));
        assert_eq!(errors.0[0].error, "invalid");
    }

    #[test]
    fn whitelist_bound_is_enforced() {
        let mut req = request();
        req.whitelist_ip = (1..=5).map(|i| format!("10.0.0.{i}")).collect();
        assert!(field_errors(&req).has("whitelist_ip"));
    }

    #[test]
    fn bad_whitelist_entry_is_indexed() {
        let mut req = request();
        req.whitelist_ip = vec!["10.0.0.5".to_string(), "not-an-ip".to_string()];
        let errors = field_errors(&req);
        assert!(errors.has("whitelist_ip[1]"));
        assert!(!errors.has("whitelist_ip[0]"));
    }

    #[test]
    fn whitelist_keeps_order_and_canonicalises() {
        let mut req = request();
        req.whitelist_ip = vec![
            "5.6.7.8".to_string(),
            " 1.2.3.4 ".to_string(),
            "2001:db8:0:0:0:0:0:1".to_string(),
        ];
        let v = validate(&req, &SupportedJobTypes::default(), 4).unwrap();
        assert_eq!(v.whitelist, vec!["5.6.7.8", "1.2.3.4", "2001:db8::1"]);
    }
}
