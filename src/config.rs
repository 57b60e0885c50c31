use serde::{Deserialize, Serialize};

/// Tuning knobs for row evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalculationConfig {
    /// Rows evaluated between progress log lines.
    pub chunk_size: usize,
    /// Per-row failures logged individually per execution; the rest are summarised.
    pub max_logged_failures: usize,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            max_logged_failures: 10,
        }
    }
}

impl CalculationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = CalculationConfig::from_json_str(r#"{"chunkSize": 2}"#).unwrap();
        assert_eq!(config.chunk_size, 2);
        assert_eq!(config.max_logged_failures, 10);
        assert_eq!(
            CalculationConfig::from_json_str("{}").unwrap(),
            CalculationConfig::default()
        );
    }
}
