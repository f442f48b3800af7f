//! Recorded interaction steps.
//!
//! A step timeline is produced by the recording layer: one entry per
//! browser interaction, in the order the interactions were performed.
//! Start times are non-decreasing but recorded windows may overlap
//! because of timing imprecision; resolving that is the cue builder's job.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stepcast_common::error::{StepcastError, StepcastResult};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Display/subtitle label. Steps without one produce no subtitle.
    #[serde(default)]
    pub text: Option<String>,

    /// Seconds, relative to the timeline reference.
    pub start_time: f64,

    /// Seconds, `>= 0`.
    #[serde(default)]
    pub duration: f64,

    /// Explicit end, when the recorder logged one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl Step {
    /// Create a labelled step.
    pub fn new(text: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            text: Some(text.into()),
            start_time,
            duration,
            end_time: None,
        }
    }

    /// Raw end: the later of the explicit end and `start + duration`.
    pub fn end(&self) -> f64 {
        let derived = self.start_time + self.duration;
        match self.end_time {
            Some(explicit) => explicit.max(derived),
            None => derived,
        }
    }

    /// Trimmed, non-empty label.
    pub fn label(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Check the step against the timeline contract.
    ///
    /// Negative durations are rejected rather than clamped.
    pub fn validate(&self, index: usize) -> StepcastResult<()> {
        if !self.start_time.is_finite() {
            return Err(StepcastError::invalid_step(
                index,
                format!("start time is not finite ({})", self.start_time),
            ));
        }
        if !self.duration.is_finite() {
            return Err(StepcastError::invalid_step(
                index,
                format!("duration is not finite ({})", self.duration),
            ));
        }
        if self.duration < 0.0 {
            return Err(StepcastError::invalid_step(
                index,
                format!("duration must not be negative ({})", self.duration),
            ));
        }
        if let Some(end) = self.end_time {
            if !end.is_finite() {
                return Err(StepcastError::invalid_step(
                    index,
                    format!("end time is not finite ({end})"),
                ));
            }
        }
        Ok(())
    }

    fn shifted(&self, offset: f64) -> Self {
        Self {
            text: self.text.clone(),
            start_time: (self.start_time - offset).max(0.0),
            duration: self.duration,
            end_time: self.end_time.map(|end| (end - offset).max(0.0)),
        }
    }
}

/// Ordered list of recorded steps (`steps.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTimeline {
    /// Recording/test name, used for the title card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Wall-clock time the recording was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,

    /// Step-clock timestamp at which the capture file begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_started_at: Option<f64>,

    /// Steps in recording order.
    pub steps: Vec<Step>,
}

impl StepTimeline {
    /// Create a timeline whose times are already relative to the capture.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Parse a timeline from JSON.
    pub fn from_json(json: &str) -> StepcastResult<Self> {
        let timeline: Self = serde_json::from_str(json)?;
        timeline.validate()?;
        Ok(timeline)
    }

    /// Load and validate a timeline file.
    pub fn load(path: impl AsRef<Path>) -> StepcastResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StepcastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let timeline = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            steps = timeline.steps.len(),
            "Loaded step timeline"
        );
        Ok(timeline)
    }

    /// Validate every step.
    pub fn validate(&self) -> StepcastResult<()> {
        if let Some(reference) = self.capture_started_at {
            if !reference.is_finite() {
                return Err(StepcastError::conflict(format!(
                    "captureStartedAt is not finite ({reference})"
                )));
            }
        }
        self.steps
            .iter()
            .enumerate()
            .try_for_each(|(index, step)| step.validate(index))
    }

    /// Steps rebased onto the capture clock; times before capture start clamp to 0.
    pub fn relative_to_capture(&self) -> Vec<Step> {
        let offset = self.capture_started_at.unwrap_or(0.0);
        self.steps.iter().map(|step| step.shifted(offset)).collect()
    }

    /// Number of steps carrying a subtitle label.
    pub fn labelled_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.label().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
