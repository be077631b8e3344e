//! Pluggable telemetry and scoring collaborators
//!
//! The hygiene sensor feed and the AI inspection scorer are external
//! services. These traits keep the sync layer independent of where the
//! numbers come from; the simulated implementations exist for demo runs
//! without a live backend and feed the same ingestion paths real events
//! use.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::types::{
    Alert, AlertKind, AlertSeverity, HygieneSample, InspectionResult, Result, SensorBreakdown,
};

/// Source of hygiene score samples
pub trait TelemetryFeed: Send {
    /// Produce the next sample for the feed's block
    fn next_sample(&mut self) -> HygieneSample;

    /// Occasionally produce an alert alongside the sample stream
    fn maybe_alert(&mut self) -> Option<Alert>;
}

/// External inspection scorer: image in, score/label out
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn inspect(&self, image_url: &str) -> Result<InspectionResult>;
}

/// Label for a hygiene score
pub fn score_label(score: f64) -> &'static str {
    if score >= 85.0 {
        "excellent"
    } else if score >= 70.0 {
        "good"
    } else if score >= 50.0 {
        "fair"
    } else {
        "poor"
    }
}

/// Random-walk telemetry for demo runs: scores in 60-100, roughly one
/// alert per ten samples.
pub struct SimulatedTelemetry {
    block_id: String,
    alert_chance: f64,
}

impl SimulatedTelemetry {
    pub fn new(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            alert_chance: 0.1,
        }
    }

    fn random_score() -> f64 {
        rand::thread_rng().gen_range(60.0..=100.0)
    }
}

impl TelemetryFeed for SimulatedTelemetry {
    fn next_sample(&mut self) -> HygieneSample {
        HygieneSample {
            block_id: self.block_id.clone(),
            score: Self::random_score(),
            timestamp: Utc::now(),
            sensors: SensorBreakdown {
                cleanliness: Self::random_score(),
                odor: Self::random_score(),
                usage: Self::random_score(),
                maintenance: Self::random_score(),
            },
        }
    }

    fn maybe_alert(&mut self) -> Option<Alert> {
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() >= self.alert_chance {
            return None;
        }

        let kind = match rng.gen_range(0..3) {
            0 => AlertKind::Maintenance,
            1 => AlertKind::Cleanliness,
            _ => AlertKind::Usage,
        };
        let severity = match rng.gen_range(0..3) {
            0 => AlertSeverity::Low,
            1 => AlertSeverity::Medium,
            _ => AlertSeverity::High,
        };

        Some(Alert {
            id: format!("alert-{}", Uuid::new_v4()),
            kind,
            block_id: self.block_id.clone(),
            severity,
            message: "System detected anomaly requiring attention".to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
            assigned_to: None,
        })
    }
}

/// Random inspection scores with threshold-derived labels
#[derive(Default)]
pub struct SimulatedScoring;

#[async_trait]
impl ScoringService for SimulatedScoring {
    async fn inspect(&self, _image_url: &str) -> Result<InspectionResult> {
        let score = rand::thread_rng().gen_range(40.0..=100.0);
        Ok(InspectionResult {
            score,
            label: score_label(score).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_labels_at_thresholds() {
        assert_eq!(score_label(85.0), "excellent");
        assert_eq!(score_label(70.0), "good");
        assert_eq!(score_label(50.0), "fair");
        assert_eq!(score_label(49.9), "poor");
    }

    #[test]
    fn test_simulated_samples_in_range() {
        let mut feed = SimulatedTelemetry::new("b1");
        for _ in 0..100 {
            let sample = feed.next_sample();
            assert_eq!(sample.block_id, "b1");
            assert!((60.0..=100.0).contains(&sample.score));
        }
    }

    #[tokio::test]
    async fn test_simulated_scoring_labels_match_score() {
        let scorer = SimulatedScoring;
        let result = scorer.inspect("http://example.com/photo.jpg").await.unwrap();
        assert_eq!(result.label, score_label(result.score));
    }
}
