//! Segment requests and their validation.
//!
//! Every per-segment problem is collected rather than stopping at the first
//! one, so callers can show all of them at once. Whole-request checks (count
//! and total duration) run regardless of per-segment failures.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::sources::{SourceRef, SourceRegistry};
use crate::timecode::Timecode;

/// One requested time range of one source video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Caller-assigned identifier, used to key validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(alias = "url")]
    pub source_url: String,

    pub start_time: String,

    pub end_time: String,
}

impl Segment {
    pub fn new(
        source_url: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source_url: source_url.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Key under which this segment's errors are reported
    pub fn error_key(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("segment-{}", index + 1))
    }
}

/// Bounds enforced on a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub min_segments: usize,
    pub max_segments: usize,
    pub max_total_secs: u64,
    pub min_segment_secs: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_segments: 1,
            max_segments: 10,
            max_total_secs: 20 * 60,
            min_segment_secs: 1,
        }
    }
}

/// Problem with a single segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentIssue {
    InvalidSourceUrl,
    InvalidStartTime,
    InvalidEndTime,
    StartNotBeforeEnd,
    TooShort { min_secs: u64 },
}

impl fmt::Display for SegmentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentIssue::InvalidSourceUrl => write!(f, "Invalid source URL"),
            SegmentIssue::InvalidStartTime => {
                write!(f, "Invalid start time format. Use HH:MM:SS, MM:SS, or SS")
            }
            SegmentIssue::InvalidEndTime => {
                write!(f, "Invalid end time format. Use HH:MM:SS, MM:SS, or SS")
            }
            SegmentIssue::StartNotBeforeEnd => write!(f, "Start time must precede end time"),
            SegmentIssue::TooShort { min_secs } => {
                write!(f, "Segment too short (minimum {})", plural_seconds(*min_secs))
            }
        }
    }
}

impl Serialize for SegmentIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Problem with the request as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIssue {
    TooFewSegments { min: usize },
    TooManySegments { max: usize },
    TotalDurationExceeded { max_secs: u64, total_secs: u64 },
}

impl fmt::Display for RequestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIssue::TooFewSegments { min } => {
                let noun = if *min == 1 { "segment" } else { "segments" };
                write!(f, "Need at least {} {}", min, noun)
            }
            RequestIssue::TooManySegments { max } => write!(f, "Maximum {} segments allowed", max),
            RequestIssue::TotalDurationExceeded { max_secs, .. } if max_secs % 60 == 0 => {
                write!(f, "Total duration exceeds {} minute limit", max_secs / 60)
            }
            RequestIssue::TotalDurationExceeded { max_secs, .. } => {
                write!(f, "Total duration exceeds {} limit", plural_seconds(*max_secs))
            }
        }
    }
}

impl Serialize for RequestIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn plural_seconds(secs: u64) -> String {
    if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{} seconds", secs)
    }
}

/// Aggregate outcome of validating a segment list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub global_errors: Vec<RequestIssue>,
    pub per_segment_errors: BTreeMap<String, Vec<SegmentIssue>>,
    /// Sum of the durations of the segments that passed their own checks
    pub total_duration_secs: u64,
}

impl ValidationResult {
    /// Total number of problems found
    pub fn issue_count(&self) -> usize {
        self.global_errors.len() + self.per_segment_errors.values().map(Vec::len).sum::<usize>()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            return write!(f, "valid ({}s total)", self.total_duration_secs);
        }

        let mut messages: Vec<String> = self.global_errors.iter().map(ToString::to_string).collect();
        for (key, issues) in &self.per_segment_errors {
            for issue in issues {
                messages.push(format!("{}: {}", key, issue));
            }
        }
        write!(f, "{}", messages.join("; "))
    }
}

/// A segment that passed validation, ready for the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSegment {
    /// Position in the request, starting at zero
    pub index: usize,
    pub source: SourceRef,
    pub start: Timecode,
    pub end: Timecode,
}

impl PlannedSegment {
    pub fn duration_secs(&self) -> u64 {
        self.end.as_secs().saturating_sub(self.start.as_secs())
    }
}

/// Enforces per-segment and whole-request constraints
pub struct SegmentValidator {
    limits: ValidationLimits,
    sources: SourceRegistry,
}

impl SegmentValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self::with_sources(limits, SourceRegistry::new())
    }

    pub fn with_sources(limits: ValidationLimits, sources: SourceRegistry) -> Self {
        Self { limits, sources }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Check one segment, returning every problem found
    pub fn validate_segment(&self, segment: &Segment) -> Vec<SegmentIssue> {
        self.inspect(segment).1
    }

    /// Check a whole request
    pub fn validate(&self, segments: &[Segment]) -> ValidationResult {
        let mut global_errors = Vec::new();
        let mut per_segment_errors: BTreeMap<String, Vec<SegmentIssue>> = BTreeMap::new();
        let mut total_duration_secs: u64 = 0;

        if segments.len() < self.limits.min_segments {
            global_errors.push(RequestIssue::TooFewSegments {
                min: self.limits.min_segments,
            });
        }

        if segments.len() > self.limits.max_segments {
            global_errors.push(RequestIssue::TooManySegments {
                max: self.limits.max_segments,
            });
        }

        for (index, segment) in segments.iter().enumerate() {
            let (duration, issues) = self.inspect(segment);
            if issues.is_empty() {
                total_duration_secs = total_duration_secs.saturating_add(duration.unwrap_or(0));
            } else {
                // Ids are caller-chosen and may repeat.
                per_segment_errors
                    .entry(segment.error_key(index))
                    .or_default()
                    .extend(issues);
            }
        }

        if total_duration_secs > self.limits.max_total_secs {
            global_errors.push(RequestIssue::TotalDurationExceeded {
                max_secs: self.limits.max_total_secs,
                total_secs: total_duration_secs,
            });
        }

        ValidationResult {
            is_valid: global_errors.is_empty() && per_segment_errors.is_empty(),
            global_errors,
            per_segment_errors,
            total_duration_secs,
        }
    }

    /// Validate and, on success, resolve every segment for the pipeline
    pub fn plan(&self, segments: &[Segment]) -> Result<Vec<PlannedSegment>, ValidationResult> {
        let result = self.validate(segments);
        if !result.is_valid {
            return Err(result);
        }

        let mut planned = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let resolved = self.sources.resolve(&segment.source_url).zip(
                segment
                    .start_time
                    .parse::<Timecode>()
                    .ok()
                    .zip(segment.end_time.parse::<Timecode>().ok()),
            );
            match resolved {
                Some((source, (start, end))) => planned.push(PlannedSegment {
                    index,
                    source,
                    start,
                    end,
                }),
                // validate() already accepted this segment
                None => return Err(result),
            }
        }

        Ok(planned)
    }

    fn inspect(&self, segment: &Segment) -> (Option<u64>, Vec<SegmentIssue>) {
        let mut issues = Vec::new();

        if self.sources.content_key(&segment.source_url).is_none() {
            issues.push(SegmentIssue::InvalidSourceUrl);
        }

        let start = segment.start_time.parse::<Timecode>().ok();
        if start.is_none() {
            issues.push(SegmentIssue::InvalidStartTime);
        }

        let end = segment.end_time.parse::<Timecode>().ok();
        if end.is_none() {
            issues.push(SegmentIssue::InvalidEndTime);
        }

        let mut duration = None;
        if let (Some(start), Some(end)) = (start, end) {
            match start.duration_until(end) {
                Ok(secs) if secs < self.limits.min_segment_secs => {
                    issues.push(SegmentIssue::TooShort {
                        min_secs: self.limits.min_segment_secs,
                    });
                }
                Ok(secs) => duration = Some(secs),
                Err(_) => issues.push(SegmentIssue::StartNotBeforeEnd),
            }
        }

        (duration, issues)
    }
}

impl Default for SegmentValidator {
    fn default() -> Self {
        Self::new(ValidationLimits::default())
    }
}
