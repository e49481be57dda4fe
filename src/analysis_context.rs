use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// How the cohesion filter treats players that lose links when others are pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Evaluate every member once against the community as detected.
    #[default]
    SinglePass,
    /// Re-evaluate the survivors until nobody else is removed.
    UntilStable,
}

/// Every tunable of a roster analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisContext {
    pub min_matches_for_connection: u32,
    pub min_team_matches: usize,

    pub min_roster_size: usize,
    pub max_roster_size: usize,

    pub min_cooccurrence_games: u32,
    pub min_cooccurrence_percentage: f64,
    pub filter_mode: FilterMode,

    // Community detection
    pub detector_seed: Option<u64>,
    pub max_iterations: usize,
    pub max_levels: usize,
    pub resolution: f64,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self {
            min_matches_for_connection: 5,
            min_team_matches: 10,

            min_roster_size: 2,
            max_roster_size: 10,

            min_cooccurrence_games: 5,
            min_cooccurrence_percentage: 0.10,
            filter_mode: FilterMode::SinglePass,

            detector_seed: None,
            max_iterations: 100,
            max_levels: 10,
            resolution: 1.0,
        }
    }
}

impl AnalysisContext {
    /// Reads a context from a JSON file. Fields left out keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&data).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_roster_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "min_roster_size must be at least 2, got {}",
                self.min_roster_size
            )));
        }
        if self.max_roster_size < self.min_roster_size {
            return Err(Error::InvalidConfig(format!(
                "max_roster_size ({}) is below min_roster_size ({})",
                self.max_roster_size, self.min_roster_size
            )));
        }
        if !(0.0..=1.0).contains(&self.min_cooccurrence_percentage) {
            return Err(Error::InvalidConfig(format!(
                "min_cooccurrence_percentage must lie in [0, 1], got {}",
                self.min_cooccurrence_percentage
            )));
        }
        if self.max_iterations == 0 || self.max_levels == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations and max_levels must be positive".to_string(),
            ));
        }
        if self.resolution <= 0.0 || !self.resolution.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "resolution must be a positive number, got {}",
                self.resolution
            )));
        }

        Ok(())
    }

    /// Links a member needs inside a community of `community_size` players.
    pub fn required_links(&self, community_size: usize) -> usize {
        let scaled = (community_size as f64 * self.min_cooccurrence_percentage).floor() as usize;
        scaled.max(1)
    }

    pub fn roster_size_allowed(&self, size: usize) -> bool {
        (self.min_roster_size..=self.max_roster_size).contains(&size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let ctx = AnalysisContext::default();
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.min_matches_for_connection, 5);
        assert_eq!(ctx.min_team_matches, 10);
        assert_eq!(ctx.filter_mode, FilterMode::SinglePass);
    }

    #[test]
    fn required_links_floors_and_never_drops_below_one() {
        let ctx = AnalysisContext::default();
        assert_eq!(ctx.required_links(2), 1);
        assert_eq!(ctx.required_links(9), 1);
        assert_eq!(ctx.required_links(10), 1);
        assert_eq!(ctx.required_links(25), 2);

        let strict = AnalysisContext {
            min_cooccurrence_percentage: 0.5,
            ..AnalysisContext::default()
        };
        assert_eq!(strict.required_links(5), 2);
        assert_eq!(strict.required_links(6), 3);
    }

    #[test]
    fn rejects_inverted_roster_bounds() {
        let ctx = AnalysisContext {
            min_roster_size: 6,
            max_roster_size: 4,
            ..AnalysisContext::default()
        };
        assert!(matches!(ctx.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        let ctx = AnalysisContext {
            min_cooccurrence_percentage: 1.5,
            ..AnalysisContext::default()
        };
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let ctx: AnalysisContext =
            serde_json::from_str(r#"{ "min_team_matches": 3, "filter_mode": "until_stable" }"#).unwrap();

        assert_eq!(ctx.min_team_matches, 3);
        assert_eq!(ctx.filter_mode, FilterMode::UntilStable);
        assert_eq!(ctx.max_roster_size, 10);
    }
}
