//! Query-string parsing for patch listings.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::errors::PatchworkError;
use crate::models::{LookupKey, PatchFilter, PatchOrder};

/// Build a filter from raw `(key, value)` query pairs. Repeated `state`
/// keys accumulate; for every other key the last occurrence wins. Empty
/// values are ignored and unknown keys are ignored.
pub fn parse_patch_filter(pairs: &[(String, String)]) -> Result<PatchFilter, PatchworkError> {
    let mut filter = PatchFilter::default();

    for (key, value) in pairs {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "state" => filter.states.push(value.to_string()),
            "project" => filter.project = Some(LookupKey::parse(value)),
            "submitter" => filter.submitter = Some(LookupKey::parse(value)),
            "delegate" => filter.delegate = Some(LookupKey::parse(value)),
            "archived" => filter.archived = Some(parse_bool("archived", value)?),
            "q" => filter.q = Some(value.to_string()),
            "since" => filter.since = Some(parse_datetime("since", value)?),
            "before" => filter.before = Some(parse_datetime("before", value)?),
            "order" => {
                filter.order = value
                    .parse::<PatchOrder>()
                    .map_err(|message| PatchworkError::InvalidField {
                        field: "order",
                        message,
                    })?
            }
            _ => {}
        }
    }

    Ok(filter)
}

pub(crate) fn parse_bool(field: &'static str, value: &str) -> Result<bool, PatchworkError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(PatchworkError::InvalidField {
            field,
            message: format!("'{}' is not a valid boolean.", value),
        }),
    }
}

/// Accept RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` timestamp, or a bare
/// date. Timezone-aware values are converted to UTC.
fn parse_datetime(field: &'static str, value: &str) -> Result<NaiveDateTime, PatchworkError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    if let Some(ts) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(ts);
    }
    Err(PatchworkError::InvalidField {
        field,
        message: "Enter a valid date/time.".to_string(),
    })
}
