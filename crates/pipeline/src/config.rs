//! Generation targets and tuning knobs for the workflows.

use serde::{Deserialize, Serialize};

/// Pipeline configuration. Every field has a default, so an empty
/// `[pipeline]` table (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Personas per project.
    pub persona_count: usize,
    /// Pain points per persona.
    pub pain_point_count: usize,
    /// Solutions per persona.
    pub solution_count: usize,
    /// User stories per project.
    pub user_story_count: usize,
    /// Concurrent data-flow generations in the user-story fan-out.
    pub fanout_concurrency: usize,
    /// Relevance score stamped on every solution/pain-point mapping.
    pub relevance_score: f64,
    /// Model identifier passed to the generation capability.
    pub model: String,
    /// Completion size limit per call.
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            persona_count: 5,
            pain_point_count: 3,
            solution_count: 5,
            user_story_count: 6,
            fanout_concurrency: 3,
            relevance_score: 0.8,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the workflows cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        let counts = [
            ("persona_count", self.persona_count),
            ("pain_point_count", self.pain_point_count),
            ("solution_count", self.solution_count),
            ("user_story_count", self.user_story_count),
            ("fanout_concurrency", self.fanout_concurrency),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(format!("{name} must be at least 1"));
            }
        }
        if !(0.0..=1.0).contains(&self.relevance_score) {
            return Err(format!(
                "relevance_score must be within [0, 1], got {}",
                self.relevance_score
            ));
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.solution_count, 5);
        assert_eq!(config.fanout_concurrency, 3);
    }

    #[test]
    fn zero_count_rejected() {
        let config = PipelineConfig {
            pain_point_count: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("pain_point_count"), "{err}");
    }

    #[test]
    fn relevance_out_of_range_rejected() {
        let config = PipelineConfig {
            relevance_score: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"user_story_count": 8}"#).unwrap();
        assert_eq!(config.user_story_count, 8);
        assert_eq!(config.persona_count, 5);
    }
}
