use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: i32 },
    #[error("ground height {ground} must leave room above the coal seam ({seam} rows)")]
    SeamAboveGround { ground: i32, seam: i32 },
    #[error("ground height {ground} must be below the grid height {height}")]
    GroundAboveGrid { ground: i32, height: i32 },
    #[error("at least 2 processes are required (1 coordinator + 1 worker), got {0}")]
    TooFewProcesses(usize),
}

/// Simulation parameters, consumed once at startup. Base dimensions are in
/// model units; `x_res`/`y_res` scale them to grid cells, so a resolution
/// sweep changes two numbers and leaves the scenario alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: i32,
    pub height: i32,
    pub x_res: i32,
    pub y_res: i32,
    pub iterations: u32,
    pub coal_seam_height: i32,
    pub drill_length: i32,
    pub ground_height: i32,
    /// Base RNG seed; each worker offsets it by its rank. Unset draws from
    /// the OS.
    pub seed: Option<u64>,
    pub lock_retry_limit: u32,
    pub lock_retry_delay_us: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            width: 600,
            height: 100,
            x_res: 1,
            y_res: 1,
            iterations: 500,
            coal_seam_height: 10,
            drill_length: 240,
            ground_height: 90,
            seed: None,
            lock_retry_limit: 10_000,
            lock_retry_delay_us: 100,
        }
    }
}

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn grid_width(&self) -> i32 {
        self.width * self.x_res
    }

    pub fn grid_height(&self) -> i32 {
        self.height * self.y_res
    }

    pub fn seam_rows(&self) -> i32 {
        self.coal_seam_height * self.y_res
    }

    pub fn drill_cells(&self) -> i32 {
        self.drill_length * self.x_res
    }

    pub fn ground_row(&self) -> i32 {
        self.ground_height * self.y_res
    }

    /// Per-step chance that a rising void collapses, scaled so a bubble is
    /// likely to die somewhere on its climb from the seam to the surface.
    pub fn kill_bubble(&self) -> f64 {
        0.2 / (self.ground_row() - self.seam_rows() * 2) as f64
    }

    /// Startup validation; `processes` counts the coordinator plus all
    /// workers and must be checked before any grid is allocated.
    pub fn validate(&self, processes: usize) -> Result<(), ConfigError> {
        for (field, value) in [
            ("width", self.width),
            ("height", self.height),
            ("x_res", self.x_res),
            ("y_res", self.y_res),
            ("coal_seam_height", self.coal_seam_height),
            ("drill_length", self.drill_length),
            ("ground_height", self.ground_height),
        ] {
            if value <= 0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if processes < 2 {
            return Err(ConfigError::TooFewProcesses(processes));
        }
        if self.ground_row() >= self.grid_height() {
            return Err(ConfigError::GroundAboveGrid {
                ground: self.ground_row(),
                height: self.grid_height(),
            });
        }
        // The kill_bubble denominator must stay positive.
        if self.ground_row() <= self.seam_rows() * 2 {
            return Err(ConfigError::SeamAboveGround {
                ground: self.ground_row(),
                seam: self.seam_rows(),
            });
        }
        Ok(())
    }
}
