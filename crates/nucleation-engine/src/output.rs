//! JSON run report.

use std::path::Path;

use chrono::{DateTime, Utc};
use nucleation_core::config::SimulationConfig;
use nucleation_core::event_log::EventLog;
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::runner::SimulationResult;

/// Everything written at the end of a run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a, const D: usize> {
    /// Unique, time-ordered id of this run.
    pub run_id: Uuid,
    /// Wall-clock time the report was produced.
    pub finished_at: DateTime<Utc>,
    /// Steps executed.
    pub total_steps: u32,
    /// Steps on which the pipeline ran.
    pub pipeline_runs: u32,
    /// Candidates dropped by the resolver.
    pub conflicts: usize,
    /// Final degree-of-freedom count per rank.
    pub final_dofs: &'a [u64],
    /// Finest cell level reached per rank.
    pub finest_levels: &'a [Option<u32>],
    /// The configuration the run used.
    pub config: &'a SimulationConfig,
    /// The agreed event log.
    pub events: &'a EventLog<D>,
}

impl<'a, const D: usize> RunReport<'a, D> {
    /// Build a report for a finished run.
    pub fn new(config: &'a SimulationConfig, result: &'a SimulationResult<D>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            finished_at: Utc::now(),
            total_steps: result.total_steps,
            pipeline_runs: result.pipeline_runs,
            conflicts: result.conflicts,
            final_dofs: &result.final_dofs,
            finest_levels: &result.finest_levels,
            config,
            events: &result.log,
        }
    }
}

/// Write the report as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns [`EngineError::Serialize`] or [`EngineError::Output`].
pub fn write_report<const D: usize>(path: &Path, report: &RunReport<'_, D>) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use nucleation_types::{EventId, NucleationEvent, Nucleus, Point};

    use super::*;

    fn result() -> SimulationResult<2> {
        let log = EventLog::from_events(vec![NucleationEvent {
            id: EventId(0),
            nucleus: Nucleus {
                center: Point::new([0.4, 0.6]),
                radius: 0.02,
                created_at: 0.1,
                hold_duration: 0.0,
                created_step: 10,
            },
        }])
        .unwrap();
        SimulationResult {
            log,
            total_steps: 20,
            pipeline_runs: 2,
            conflicts: 1,
            final_dofs: vec![256, 260],
            final_cells: vec![64, 67],
            finest_levels: vec![Some(3), Some(4)],
            messages_sent: vec![8, 16],
        }
    }

    #[test]
    fn report_serializes_events_and_config() {
        let config = SimulationConfig::default();
        let result = result();
        let report = RunReport::new(&config, &result);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["total_steps"], 20);
        assert_eq!(value["finest_levels"][1], 4);
        assert_eq!(value["events"][0]["id"], 0);
        assert_eq!(value["events"][0]["center"][1], 0.6);
        assert_eq!(value["config"]["nucleation"]["measure"], "quadrature");
        assert!(value["run_id"].is_string());
    }

    #[test]
    fn report_is_written_to_disk() {
        let config = SimulationConfig::default();
        let result = result();
        let report = RunReport::new(&config, &result);
        let path = std::env::temp_dir().join(format!("nucleation-report-{}.json", report.run_id));

        write_report(&path, &report).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["run_id"], report.run_id.to_string());
    }
}
