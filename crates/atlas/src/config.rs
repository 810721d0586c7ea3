//! # Simulation Configuration
//!
//! Everything the world and scheduler need at startup, loaded once from TOML.
//!
//! ```toml
//! entity_capacity = 100000
//! window_size = 17
//! lattice = [1024, 64, 1024]
//! cell_size = 64.0
//! parallel = true
//! failure_policy = "skip_failed"
//! load_retry_frames = 30
//! persistence_dir = "cells"
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::{Path, PathBuf};

use atlas_core::{SimError, SimResult};
use atlas_shared::constants::{
    CELL_SIZE, DEFAULT_WINDOW_SIZE, WORLD_CELLS_X, WORLD_CELLS_Y, WORLD_CELLS_Z,
};
use atlas_shared::Vec3;
use atlas_world::{GridConfig, WorldLattice};
use serde::{Deserialize, Serialize};

/// What the scheduler does when a system's phase call fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stay in the failed phase until the failed systems succeed or are
    /// explicitly skipped.
    #[default]
    Halt,
    /// Report the failure and advance anyway.
    SkipFailed,
}

/// Startup configuration for a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Maximum number of live entities.
    pub entity_capacity: usize,
    /// Active window edge length in cells. Must be odd.
    pub window_size: u32,
    /// World lattice size in cells (x, y, z).
    pub lattice: [u32; 3],
    /// Cell edge length in world units.
    pub cell_size: f32,
    /// Run non-conflicting systems of a phase on scoped threads.
    pub parallel: bool,
    /// Phase failure handling.
    pub failure_policy: FailurePolicy,
    /// Frames to wait before retrying a failed cell load.
    pub load_retry_frames: u64,
    /// Directory for cell records. In-memory store when absent.
    pub persistence_dir: Option<PathBuf>,
    /// Run cell I/O on the simulation thread instead of a worker.
    pub inline_io: bool,
    /// Expected deliveries per frame.
    pub event_queue_hint: usize,
    /// Initial focus point.
    pub focus: Vec3,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 100_000,
            window_size: DEFAULT_WINDOW_SIZE,
            lattice: [WORLD_CELLS_X, WORLD_CELLS_Y, WORLD_CELLS_Z],
            cell_size: CELL_SIZE,
            parallel: true,
            failure_policy: FailurePolicy::Halt,
            load_retry_frames: 30,
            persistence_dir: None,
            inline_io: false,
            event_queue_hint: 1024,
            focus: Vec3::ZERO,
        }
    }
}

impl SimulationConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed TOML, unknown keys or failed validation.
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SimError::InvalidConfig(format!("simulation config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the file cannot be read, otherwise as `from_toml_str`.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::IoFailure(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded simulation config");
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> SimResult<()> {
        if self.entity_capacity == 0 {
            return Err(SimError::InvalidConfig("entity capacity must be non-zero".into()));
        }
        if self.lattice.contains(&0) {
            return Err(SimError::InvalidConfig(format!(
                "lattice dimensions must be non-zero, got {:?}",
                self.lattice
            )));
        }
        let grid = self.grid_config();
        grid.validate()?;
        let focus = atlas_world::CellCoord::from_position(self.focus, self.cell_size)
            .map_err(|e| SimError::InvalidConfig(format!("initial focus: {e}")))?;
        if !grid.lattice.contains(focus) {
            return Err(SimError::InvalidConfig(format!(
                "initial focus cell {focus} is outside the lattice"
            )));
        }
        Ok(())
    }

    /// Active grid parameters.
    #[must_use]
    pub fn grid_config(&self) -> GridConfig {
        let [x, y, z] = self.lattice;
        GridConfig {
            cell_size: self.cell_size,
            window_size: self.window_size,
            lattice: WorldLattice::new(x, y, z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_config(), GridConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            window_size = 5
            lattice = [32, 8, 32]
            failure_policy = "skip_failed"
            persistence_dir = "cells"
            "#,
        )
        .unwrap();

        assert_eq!(config.window_size, 5);
        assert_eq!(config.failure_policy, FailurePolicy::SkipFailed);
        assert_eq!(config.persistence_dir, Some(PathBuf::from("cells")));
        assert_eq!(config.entity_capacity, SimulationConfig::default().entity_capacity);
    }

    #[test]
    fn test_rejects_bad_values() {
        for text in [
            "window_size = 4",
            "entity_capacity = 0",
            "lattice = [4, 4, 4]",
            "lattice = [0, 64, 64]",
            "cell_size = -1.0",
            "focus = { x = 1.0e9, y = 0.0, z = 0.0 }",
        ] {
            assert!(
                matches!(
                    SimulationConfig::from_toml_str(text),
                    Err(SimError::InvalidConfig(_))
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            SimulationConfig::from_toml_str("window_size = "),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("no_such_field = 1"),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.toml");
        std::fs::write(&path, "parallel = false\ninline_io = true\n").unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert!(!config.parallel);
        assert!(config.inline_io);

        assert!(matches!(
            SimulationConfig::load(dir.path().join("missing.toml")),
            Err(SimError::IoFailure(_))
        ));
    }
}
