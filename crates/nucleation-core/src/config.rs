//! Configuration loading and typed config structures for the nucleation
//! protocol.
//!
//! The canonical configuration lives in `nucleation-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure, a loader that reads the file, and
//! [`SimulationConfig::validate`], which checks the values and produces the
//! dimension-typed [`NucleationParams`] the pipeline runs on.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::probability::{ProbabilityModel, uniform_cell_measure, uniform_grid_spacing};
use crate::refinement::RefinementParams;
use crate::sampler::{Measure, SamplerParams};
use crate::schedule::StepClock;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or inconsistent with another value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `nucleation-config.yaml`. Every section has
/// defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Nucleation model constants and acceptance rules.
    #[serde(default)]
    pub nucleation: NucleationConfig,

    /// Domain geometry.
    #[serde(default)]
    pub domain: DomainConfig,

    /// Refinement level bounds.
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Timestepping.
    #[serde(default)]
    pub time: TimeConfig,

    /// Worker count, seeding, and output.
    #[serde(default)]
    pub run: RunConfig,

    /// Analytic driving field used by the engine.
    #[serde(default)]
    pub field: FieldConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the run section:
    /// - `NUCLEATION_WORKERS` overrides `run.workers`
    /// - `NUCLEATION_SEED` overrides `run.seed`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.run.apply_env_overrides();
        Ok(config)
    }

    /// Validate the configuration for a `D`-dimensional domain and build the
    /// typed parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate<const D: usize>(&self) -> Result<NucleationParams<D>, ConfigError> {
        let n = &self.nucleation;
        let domain = &self.domain;

        let extents: [f64; D] = domain.extents.as_slice().try_into().map_err(|_err| invalid(format!(
            "domain.extents has {} entries, expected {D}",
            domain.extents.len()
        )))?;
        if extents.iter().any(|e| !e.is_finite() || *e <= 0.0) {
            return Err(invalid("domain.extents must all be positive and finite".to_owned()));
        }

        let periodic: [bool; D] = if domain.periodic.is_empty() {
            [false; D]
        } else {
            domain.periodic.as_slice().try_into().map_err(|_err| invalid(format!(
                "domain.periodic has {} entries, expected {D}",
                domain.periodic.len()
            )))?
        };

        require_non_negative("nucleation.k1", n.k1)?;
        require_non_negative("nucleation.k2", n.k2)?;
        require_non_negative("nucleation.boundary_margin", n.boundary_margin)?;
        require_non_negative("nucleation.min_separation", n.min_separation)?;
        require_non_negative("nucleation.event_radius", n.event_radius)?;
        require_non_negative("nucleation.hold_duration", n.hold_duration)?;
        require_non_negative("nucleation.freeze_radius", n.freeze_radius)?;
        if !n.saturation_floor.is_finite() || !n.suppression_threshold.is_finite() {
            return Err(invalid(
                "nucleation.saturation_floor and suppression_threshold must be finite".to_owned(),
            ));
        }
        if n.skip_steps == 0 {
            return Err(invalid("nucleation.skip_steps must be at least 1".to_owned()));
        }
        if !self.time.timestep.is_finite() || self.time.timestep <= 0.0 {
            return Err(invalid("time.timestep must be positive".to_owned()));
        }
        if domain.element_degree == 0 {
            return Err(invalid("domain.element_degree must be at least 1".to_owned()));
        }
        if self.refinement.min_level > self.refinement.max_level {
            return Err(invalid(format!(
                "refinement.min_level ({}) exceeds max_level ({})",
                self.refinement.min_level, self.refinement.max_level
            )));
        }
        if self.run.workers == 0 {
            return Err(invalid("run.workers must be at least 1".to_owned()));
        }

        let measure = match n.measure {
            MeasureMode::Quadrature => Measure::Quadrature,
            MeasureMode::UniformGrid => {
                let first_extent = extents.first().copied().unwrap_or(1.0);
                let spacing =
                    uniform_grid_spacing(first_extent, domain.refine_factor, domain.element_degree);
                Measure::UniformGrid {
                    cell_measure: uniform_cell_measure::<D>(spacing),
                }
            }
        };

        Ok(NucleationParams {
            model: ProbabilityModel {
                k1: n.k1,
                k2: n.k2,
                saturation_floor: n.saturation_floor,
                timestep: self.time.timestep,
                skip_steps: n.skip_steps,
            },
            sampler: SamplerParams {
                extents,
                periodic,
                boundary_margin: n.boundary_margin,
                min_separation: n.min_separation,
                event_radius: n.event_radius,
                hold_duration: n.hold_duration,
                suppression_threshold: n.suppression_threshold,
                measure,
            },
            refinement: RefinementParams {
                min_level: self.refinement.min_level,
                max_level: self.refinement.max_level,
                freeze_radius: n.freeze_radius,
            },
        })
    }
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and non-negative, got {value}")))
    }
}

/// Validated, dimension-typed parameters for one nucleation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NucleationParams<const D: usize> {
    /// Probability model constants.
    pub model: ProbabilityModel,
    /// Sampler eligibility and acceptance parameters.
    pub sampler: SamplerParams<D>,
    /// Refinement trigger parameters.
    pub refinement: RefinementParams,
}

impl<const D: usize> NucleationParams<D> {
    /// Minimum allowed distance between any two accepted events.
    pub const fn min_separation(&self) -> f64 {
        self.sampler.min_separation
    }

    /// A step clock at step 0 for this schedule.
    pub const fn clock(&self) -> StepClock {
        StepClock::new(self.model.timestep, self.model.skip_steps)
    }
}

/// How the per-sample measure in the probability formula is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureMode {
    /// Use each sample's quadrature weight.
    #[default]
    Quadrature,
    /// Use a fixed cell measure derived from the finest uniform spacing.
    UniformGrid,
}

/// Nucleation model constants and acceptance rules.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NucleationConfig {
    /// Rate prefactor.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// Rate exponent constant.
    #[serde(default = "default_k2")]
    pub k2: f64,

    /// Field value below which there is no driving force.
    #[serde(default = "default_saturation_floor")]
    pub saturation_floor: f64,

    /// Run the pipeline every this many steps.
    #[serde(default = "default_skip_steps")]
    pub skip_steps: u32,

    /// Width of the excluded band along non-periodic boundaries.
    #[serde(default = "default_boundary_margin")]
    pub boundary_margin: f64,

    /// Minimum distance between any two accepted events.
    #[serde(default = "default_min_separation")]
    pub min_separation: f64,

    /// Radius assigned to every new event.
    #[serde(default = "default_event_radius")]
    pub event_radius: f64,

    /// Hold period assigned to every new event.
    #[serde(default)]
    pub hold_duration: f64,

    /// Samples whose suppression value reaches this are ineligible.
    #[serde(default = "default_suppression_threshold")]
    pub suppression_threshold: f64,

    /// Cells with a sample this close to a new event get refined.
    #[serde(default = "default_freeze_radius")]
    pub freeze_radius: f64,

    /// Measure used by the probability formula.
    #[serde(default)]
    pub measure: MeasureMode,
}

impl Default for NucleationConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            k2: default_k2(),
            saturation_floor: default_saturation_floor(),
            skip_steps: default_skip_steps(),
            boundary_margin: default_boundary_margin(),
            min_separation: default_min_separation(),
            event_radius: default_event_radius(),
            hold_duration: 0.0,
            suppression_threshold: default_suppression_threshold(),
            freeze_radius: default_freeze_radius(),
            measure: MeasureMode::default(),
        }
    }
}

/// Domain geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DomainConfig {
    /// Length of the domain along each axis; the origin is at zero.
    #[serde(default = "default_extents")]
    pub extents: Vec<f64>,

    /// Per-axis periodicity. Empty means no axis is periodic.
    #[serde(default)]
    pub periodic: Vec<bool>,

    /// Polynomial degree of the discretization, used for uniform spacing.
    #[serde(default = "default_element_degree")]
    pub element_degree: u32,

    /// Global refinement count, used for uniform spacing.
    #[serde(default = "default_refine_factor")]
    pub refine_factor: u32,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            extents: default_extents(),
            periodic: Vec::new(),
            element_degree: default_element_degree(),
            refine_factor: default_refine_factor(),
        }
    }
}

/// Refinement level bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RefinementConfig {
    /// Coarsest level of the mesh.
    #[serde(default = "default_min_level")]
    pub min_level: u32,

    /// Finest level a cell may be refined to.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: default_max_level(),
        }
    }
}

/// Timestepping.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeConfig {
    /// Simulation time per step.
    #[serde(default = "default_timestep")]
    pub timestep: f64,

    /// Number of steps the engine runs.
    #[serde(default = "default_steps")]
    pub steps: u32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timestep: default_timestep(),
            steps: default_steps(),
        }
    }
}

/// Worker count, seeding, and output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunConfig {
    /// Number of cooperating workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Base seed for per-worker random sources (`None` = OS entropy).
    #[serde(default)]
    pub seed: Option<u64>,

    /// Where to write the final event log as JSON (`None` = don't write).
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl RunConfig {
    /// Override run settings with environment variables when set and
    /// parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Some(workers) = env_parse::<usize>("NUCLEATION_WORKERS") {
            self.workers = workers;
        }
        if let Some(seed) = env_parse::<u64>("NUCLEATION_SEED") {
            self.seed = Some(seed);
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            seed: None,
            output: None,
        }
    }
}

/// Analytic driving field used by the engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldConfig {
    /// Field value at the domain center.
    #[serde(default = "default_peak_value")]
    pub peak_value: f64,

    /// Linear decrease of the field per unit distance from the center.
    #[serde(default = "default_falloff")]
    pub falloff: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            peak_value: default_peak_value(),
            falloff: default_falloff(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_k1() -> f64 {
    100.0
}

const fn default_k2() -> f64 {
    1.0
}

const fn default_saturation_floor() -> f64 {
    0.1
}

const fn default_skip_steps() -> u32 {
    10
}

const fn default_boundary_margin() -> f64 {
    0.05
}

const fn default_min_separation() -> f64 {
    0.1
}

const fn default_event_radius() -> f64 {
    0.02
}

const fn default_suppression_threshold() -> f64 {
    0.1
}

const fn default_freeze_radius() -> f64 {
    0.05
}

fn default_extents() -> Vec<f64> {
    vec![1.0, 1.0]
}

const fn default_element_degree() -> u32 {
    1
}

const fn default_refine_factor() -> u32 {
    4
}

const fn default_min_level() -> u32 {
    4
}

const fn default_max_level() -> u32 {
    6
}

const fn default_timestep() -> f64 {
    0.01
}

const fn default_steps() -> u32 {
    500
}

const fn default_workers() -> usize {
    4
}

const fn default_peak_value() -> f64 {
    0.5
}

const fn default_falloff() -> f64 {
    0.3
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        let params = config.validate::<2>().unwrap();
        assert_eq!(params.model.skip_steps, 10);
        assert_eq!(params.sampler.periodic, [false, false]);
        assert_eq!(params.refinement.max_level, 6);
        assert!(matches!(params.sampler.measure, Measure::Quadrature));
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
nucleation:
  k1: 250.0
  k2: 2.0
  saturation_floor: 0.05
  skip_steps: 5
  boundary_margin: 0.1
  min_separation: 0.2
  event_radius: 0.03
  hold_duration: 0.5
  suppression_threshold: 0.2
  freeze_radius: 0.08
  measure: uniform_grid

domain:
  extents: [2.0, 1.0]
  periodic: [true, false]
  element_degree: 2
  refine_factor: 3

refinement:
  min_level: 3
  max_level: 5

time:
  timestep: 0.005
  steps: 40

run:
  workers: 3
  seed: 11
  output: events.json

field:
  peak_value: 0.8
  falloff: 0.5

logging:
  level: debug
  format: json
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.nucleation.skip_steps, 5);
        assert_eq!(config.domain.periodic, vec![true, false]);
        assert_eq!(config.time.steps, 40);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.run.output, Some(PathBuf::from("events.json")));

        let params = config.validate::<2>().unwrap();
        assert_eq!(params.sampler.periodic, [true, false]);
        // spacing = 2.0 / (2^3 * 2) = 0.125, measure = spacing^2
        assert!(matches!(
            params.sampler.measure,
            Measure::UniformGrid { cell_measure } if (cell_measure - 0.015_625).abs() < 1e-12
        ));
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(SimulationConfig::parse("").is_ok());
    }

    #[test]
    fn parse_minimal_yaml_keeps_defaults() {
        let config = SimulationConfig::parse("nucleation:\n  k1: 7.0\n").unwrap();
        assert!((config.nucleation.k1 - 7.0).abs() < f64::EPSILON);
        assert!((config.nucleation.k2 - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.refinement.min_level, 4);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let config = SimulationConfig::default();
        assert!(matches!(config.validate::<3>(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_skip_steps_is_rejected() {
        let mut config = SimulationConfig::default();
        config.nucleation.skip_steps = 0;
        assert!(config.validate::<2>().is_err());
    }

    #[test]
    fn inverted_levels_are_rejected() {
        let mut config = SimulationConfig::default();
        config.refinement.min_level = 7;
        assert!(config.validate::<2>().is_err());
    }

    #[test]
    fn negative_separation_is_rejected() {
        let mut config = SimulationConfig::default();
        config.nucleation.min_separation = -0.1;
        assert!(config.validate::<2>().is_err());
    }

    #[test]
    fn clock_follows_the_validated_schedule() {
        let mut config = SimulationConfig::default();
        config.nucleation.skip_steps = 3;
        config.time.timestep = 0.5;
        let params = config.validate::<2>().unwrap();
        assert_eq!(params.model.skip_steps, 3);
        assert!((params.model.timestep - 0.5).abs() < f64::EPSILON);

        let mut clock = params.clock();
        assert!(clock.is_nucleation_step());
        clock.advance().unwrap();
        assert!(!clock.is_nucleation_step());
        clock.advance().unwrap();
        clock.advance().unwrap();
        assert!(clock.is_nucleation_step());
        assert!((clock.time() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("nucleation-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
