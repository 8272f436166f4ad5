use indicatif::{ProgressBar, ProgressStyle};
use std::env;

/// Progress display settings, loaded from the environment so batch jobs can
/// turn the bar off without touching the run config.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub show_memory: bool,
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        let enabled = env::var("ENRICH_PROGRESS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let show_memory = env::var("ENRICH_PROGRESS_MEMORY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self {
            enabled,
            show_memory,
        }
    }

    pub fn create_batch_bar(&self, total_batches: u64) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }
        let pb = ProgressBar::new(total_batches);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_defaults() {
        std::env::remove_var("ENRICH_PROGRESS");
        std::env::remove_var("ENRICH_PROGRESS_MEMORY");
        let config = ProgressConfig::from_env();
        assert!(config.enabled);
        assert!(!config.show_memory);
    }

    #[test]
    fn test_disabled_config_creates_no_bar() {
        let config = ProgressConfig {
            enabled: false,
            show_memory: false,
        };
        assert!(config.create_batch_bar(4).is_none());
    }
}
