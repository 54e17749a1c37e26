use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::predict::PredictorKind;

/// Parameters of a linking run.
///
/// Every field has a default, so a TOML file only needs to name what it changes:
///
/// ```toml
/// search_range = 2.0
/// memory = 3
/// pos_columns = ["x", "y"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Maximum displacement of a particle between two consecutive frames
    pub search_range: f64,
    /// Number of frames a particle may vanish and still keep its trajectory id
    pub memory: usize,
    /// Largest sub-network (in source particles) solved exactly
    pub max_subnet_size: usize,
    /// Lower bound for the search range when breaking up oversized sub-networks.
    /// `None` disables adaptive search.
    pub adaptive_stop: Option<f64>,
    /// Factor applied to the search range at each adaptive step
    pub adaptive_step: f64,
    /// Columns holding the particle coordinates, one per dimension
    pub pos_columns: Vec<String>,
    /// Integer column giving the frame of each observation
    pub frame_column: String,
    /// Name of the trajectory id column written to the output
    pub particle_column: String,
    /// How tracks are extrapolated before candidate search
    pub predictor: PredictorKind,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            search_range: 1.5,
            memory: 0,
            max_subnet_size: 45,
            adaptive_stop: None,
            adaptive_step: 0.95,
            pos_columns: vec!["x".to_string(), "y".to_string(), "z".to_string()],
            frame_column: "frame".to_string(),
            particle_column: "particle".to_string(),
            predictor: PredictorKind::NearestVelocity,
        }
    }
}

impl LinkConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(s)?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LinkError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.search_range.is_finite() || self.search_range <= 0.0 {
            return Err(LinkError::InvalidConfig(format!(
                "search_range must be a positive number, got {}",
                self.search_range
            )));
        }
        if self.max_subnet_size == 0 {
            return Err(LinkError::InvalidConfig(
                "max_subnet_size must be at least 1".to_string(),
            ));
        }
        if self.pos_columns.is_empty() {
            return Err(LinkError::InvalidConfig(
                "at least one position column is required".to_string(),
            ));
        }
        if let Some(stop) = self.adaptive_stop {
            if !stop.is_finite() || stop <= 0.0 {
                return Err(LinkError::InvalidConfig(format!(
                    "adaptive_stop must be a positive number, got {}",
                    stop
                )));
            }
        }
        if !(self.adaptive_step > 0.0 && self.adaptive_step < 1.0) {
            return Err(LinkError::InvalidConfig(format!(
                "adaptive_step must lie strictly between 0 and 1, got {}",
                self.adaptive_step
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_driver_settings() {
        let config = LinkConfig::default();
        assert_eq!(config.search_range, 1.5);
        assert_eq!(config.max_subnet_size, 45);
        assert_eq!(config.memory, 0);
        assert_eq!(config.pos_columns, vec!["x", "y", "z"]);
        assert_eq!(config.frame_column, "frame");
        assert_eq!(config.predictor, PredictorKind::NearestVelocity);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LinkConfig::from_toml_str(
            "search_range = 2.5\nmemory = 3\npredictor = \"drift\"\npos_columns = [\"x\", \"y\"]\n",
        )
        .unwrap();
        assert_eq!(config.search_range, 2.5);
        assert_eq!(config.memory, 3);
        assert_eq!(config.predictor, PredictorKind::Drift);
        assert_eq!(config.pos_columns, vec!["x", "y"]);
        assert_eq!(config.max_subnet_size, 45);
        assert_eq!(config.particle_column, "particle");
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = LinkConfig::from_toml_str("search_range = \"far\"").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = LinkConfig::from_toml_str("serach_range = 3.0").unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LinkConfig::default();
        config.search_range = 0.0;
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));

        let mut config = LinkConfig::default();
        config.pos_columns.clear();
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.adaptive_step = 1.0;
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.adaptive_stop = Some(-1.0);
        assert!(config.validate().is_err());
    }
}
