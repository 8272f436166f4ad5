use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::matching::GROUP_FACTOR_COLUMN;

/// Matching parameters shared by every batch of a run.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PsmConfig {
    /// Number of donor candidates considered per target row.
    pub n_neighbors: usize,
    /// Columns present in both tables, used only to estimate propensity.
    /// May include `group_factor` when `group_column` is set.
    pub covariates: Vec<String>,
    /// Field whose distinct values get factorized into `group_factor`.
    #[serde(default)]
    pub group_column: Option<String>,
    /// Donor-only columns copied onto each matched target row.
    pub donor_columns: Vec<String>,
    /// Matching-only covariate columns removed from the enriched output.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Seed for the match draws. Unseeded runs vary by design.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// One target/donor file pair, typically one local authority.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct BatchSpec {
    pub id: String,
    pub target: String,
    pub donor: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RunConfig {
    pub psm: PsmConfig,
    #[serde(default)]
    pub batches: Vec<BatchSpec>,
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RunConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.psm.validate()?;
        let mut seen = HashSet::new();
        for batch in &self.batches {
            if batch.id.trim().is_empty() {
                return Err(ConfigError::MissingField { field: "batches.id" });
            }
            if !seen.insert(batch.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "batches.id",
                    reason: format!("duplicate batch id '{}'", batch.id),
                });
            }
        }
        Ok(())
    }
}

impl PsmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_neighbors == 0 {
            return Err(ConfigError::InvalidValue {
                field: "psm.n_neighbors",
                reason: "must be > 0".into(),
            });
        }
        if self.covariates.is_empty() {
            return Err(ConfigError::MissingField {
                field: "psm.covariates",
            });
        }
        if self.donor_columns.is_empty() {
            return Err(ConfigError::MissingField {
                field: "psm.donor_columns",
            });
        }

        let mut seen = HashSet::new();
        for name in &self.covariates {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "psm.covariates",
                    reason: format!("duplicate covariate '{}'", name),
                });
            }
        }
        for name in &self.donor_columns {
            if self.covariates.iter().any(|c| c == name) {
                return Err(ConfigError::InvalidValue {
                    field: "psm.donor_columns",
                    reason: format!("'{}' is also listed as a covariate", name),
                });
            }
        }
        if self.covariates.iter().any(|c| c == GROUP_FACTOR_COLUMN)
            && self.group_column.is_none()
        {
            return Err(ConfigError::MissingField {
                field: "psm.group_column",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PsmConfig {
        PsmConfig {
            n_neighbors: 5,
            covariates: vec!["tenure".into(), "accom_type".into(), "group_factor".into()],
            group_column: Some("area".into()),
            donor_columns: vec!["floor_area".into(), "accom_age".into(), "gas".into()],
            drop_columns: vec!["tenure".into()],
            seed: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let mut config = base_config();
        config.n_neighbors = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "psm.n_neighbors",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_covariates_rejected() {
        let mut config = base_config();
        config.covariates.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField {
                field: "psm.covariates"
            })
        ));
    }

    #[test]
    fn test_donor_column_overlapping_covariate_rejected() {
        let mut config = base_config();
        config.donor_columns.push("tenure".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_group_factor_requires_group_column() {
        let mut config = base_config();
        config.group_column = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField {
                field: "psm.group_column"
            })
        ));
    }

    #[test]
    fn test_run_config_duplicate_batch_ids_rejected() {
        let run = RunConfig {
            psm: base_config(),
            batches: vec![
                BatchSpec {
                    id: "E06000001".into(),
                    target: "a.csv".into(),
                    donor: "b.csv".into(),
                },
                BatchSpec {
                    id: "E06000001".into(),
                    target: "c.csv".into(),
                    donor: "d.csv".into(),
                },
            ],
            output_dir: None,
        };
        assert!(run.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
psm:
  n_neighbors: 5
  covariates: [tenure, accom_type, group_factor]
  group_column: area
  donor_columns: [floor_area, accom_age, gas]
  drop_columns: [tenure]
batches:
  - id: E06000001
    target: data/target/E06000001.csv
    donor: data/donor/E06000001.csv
output_dir: data/output
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.psm.n_neighbors, 5);
        assert_eq!(config.batches.len(), 1);
        assert!(config.validate().is_ok());
    }
}
