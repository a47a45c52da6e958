//! Annotation keys and format validation
//!
//! Annotations are free-form strings, so each tuning annotation the operators
//! understand is checked here before it can reach a controller.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Maximum number (or fraction) of nodes replaced at once during updates
pub const UPDATE_MAX_BATCH_SIZE: &str = "alpha.aws.warden.io/update-max-batch-size";
/// Pause between node replacement batches
pub const UPDATE_PAUSE_TIME: &str = "alpha.aws.warden.io/update-pause-time";
/// Require instance metadata service v2
pub const METADATA_V2: &str = "alpha.aws.warden.io/metadata-v2";
/// Provisioned IOPS of the etcd volume
pub const ETCD_VOLUME_IOPS: &str = "alpha.aws.warden.io/etcd-volume-iops";
/// Throughput (MiB/s) of the etcd volume
pub const ETCD_VOLUME_THROUGHPUT: &str = "alpha.aws.warden.io/etcd-volume-throughput";
/// Pod CIDR handed to Cilium
pub const CILIUM_POD_CIDR: &str = "cilium.warden.io/pod-cidr";

/// Longest allowed pause between batches
pub const MAX_PAUSE_TIME: Duration = Duration::from_secs(3600);

static ISO8601_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(?P<w>\d+)W)?(?:(?P<d>\d+)D)?(?:T(?:(?P<h>\d+)H)?(?:(?P<m>\d+)M)?(?:(?P<s>\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("duration regex is valid")
});

/// Accepted format of an annotation value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationFormat {
    /// Positive integer, or decimal in (0, 1]
    BatchSize,
    /// ISO-8601 duration no longer than [`MAX_PAUSE_TIME`]
    PauseTime,
    /// Exactly `"true"` or `"false"`
    Boolean,
    /// Integer within a closed interval
    IntRange { min: i64, max: i64 },
}

/// Annotations checked on every validated object
pub const VALIDATED_ANNOTATIONS: &[(&str, AnnotationFormat)] = &[
    (UPDATE_MAX_BATCH_SIZE, AnnotationFormat::BatchSize),
    (UPDATE_PAUSE_TIME, AnnotationFormat::PauseTime),
    (METADATA_V2, AnnotationFormat::Boolean),
    (ETCD_VOLUME_IOPS, AnnotationFormat::IntRange { min: 3000, max: 16000 }),
    (ETCD_VOLUME_THROUGHPUT, AnnotationFormat::IntRange { min: 125, max: 1000 }),
];

/// An annotation value that does not match its format
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("annotation {key} has invalid value '{value}': {reason}")]
pub struct AnnotationViolation {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl AnnotationFormat {
    /// Check a single value, returning the reason on failure
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            Self::BatchSize => check_batch_size(value),
            Self::PauseTime => {
                let pause = parse_iso8601_duration(value)
                    .ok_or_else(|| "must be an ISO 8601 duration such as PT15M".to_string())?;
                if pause > MAX_PAUSE_TIME {
                    return Err("must not exceed one hour".to_string());
                }
                Ok(())
            }
            Self::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err("must be either \"true\" or \"false\"".to_string()),
            },
            Self::IntRange { min, max } => {
                let parsed: i64 = value
                    .parse()
                    .map_err(|_| "must be an integer".to_string())?;
                if parsed < *min || parsed > *max {
                    return Err(format!("must be between {min} and {max}"));
                }
                Ok(())
            }
        }
    }
}

fn check_batch_size(value: &str) -> Result<(), String> {
    const REASON: &str = "must be a positive integer or a decimal between 0 and 1";

    if let Ok(count) = value.parse::<i64>() {
        return if count > 0 { Ok(()) } else { Err(REASON.to_string()) };
    }
    match value.parse::<f64>() {
        Ok(fraction) if fraction.is_finite() && fraction > 0.0 && fraction <= 1.0 => Ok(()),
        _ => Err(REASON.to_string()),
    }
}

/// Parse an ISO-8601 duration (weeks, days, hours, minutes, seconds)
///
/// Years and months have no fixed length and are rejected.
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    if value == "P" || value == "PT" || value.ends_with('T') {
        return None;
    }
    let captures = ISO8601_DURATION.captures(value)?;

    let unit = |name: &str, seconds: f64| -> Option<f64> {
        match captures.name(name) {
            Some(m) => m.as_str().parse::<f64>().ok().map(|n| n * seconds),
            None => Some(0.0),
        }
    };

    let total = unit("w", 604_800.0)?
        + unit("d", 86_400.0)?
        + unit("h", 3_600.0)?
        + unit("m", 60.0)?
        + unit("s", 1.0)?;

    Duration::try_from_secs_f64(total).ok()
}

/// Validate every known annotation present on an object
pub fn validate_annotations(
    annotations: &BTreeMap<String, String>,
) -> Result<(), AnnotationViolation> {
    for (key, format) in VALIDATED_ANNOTATIONS {
        let Some(value) = annotations.get(*key) else {
            continue;
        };
        format.check(value).map_err(|reason| AnnotationViolation {
            key: key.to_string(),
            value: value.clone(),
            reason,
        })?;
    }
    Ok(())
}
