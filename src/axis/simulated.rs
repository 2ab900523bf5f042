//! Simulated axis collection.
//!
//! `SimulatedAxes` keeps positions in memory and never sleeps, so scans and
//! rasters complete instantly. Every executed command is appended to a
//! journal. Several collections can share one journal to check the order in
//! which a composite commands its parts.
//!
//! # Example
//!
//! ```
//! use apt_motion::axis::{AxisCollection, SimulatedAxes};
//!
//! # tokio_test::block_on(async {
//! let stage = SimulatedAxes::with_range("xy", 2, (0.0, 25.0), "mm").unwrap();
//! stage.move_to(&[1.0, 2.0], true).await.unwrap();
//! stage.move_to(&[0.5, 0.5], false).await.unwrap();
//! assert_eq!(stage.position().await.unwrap(), vec![1.5, 2.5]);
//! # });
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::axis::{
    axis_steps, check_axis_count, raster_by_moves, typewriter_grid, validate_limits,
    AxisCollection, AxisLimits,
};
use crate::error::{AppResult, MotionError};

/// Command executed by a [`SimulatedAxes`].
#[derive(Debug, Clone, PartialEq)]
pub enum AxisCommand {
    /// Move to `position`, or by it when `absolute` is false.
    Move {
        /// Target or offset, one entry per axis.
        position: Vec<f64>,
        /// Whether `position` is a target rather than an offset.
        absolute: bool,
    },
    /// Native raster handled by the simulated controller as one command.
    Raster {
        /// First grid corner.
        start: Vec<f64>,
        /// Last grid corner.
        stop: Vec<f64>,
        /// Points per axis.
        num: Vec<usize>,
        /// Dwell at each point.
        dwell: Option<Duration>,
        /// Reject out-of-range points instead of clamping them.
        strict: bool,
    },
}

/// Journal line: which collection executed which command.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Label of the executing collection.
    pub label: String,
    /// What it executed.
    pub command: AxisCommand,
}

/// Command log that several stages can append to, in execution order.
pub type Journal = Arc<Mutex<Vec<JournalEntry>>>;

/// In-memory stage.
pub struct SimulatedAxes {
    label: String,
    limits: Vec<AxisLimits>,
    units: Vec<String>,
    position: Arc<RwLock<Vec<f64>>>,
    native_raster: bool,
    move_history: Mutex<Vec<AxisCommand>>,
    journal: Journal,
    fail_next_move: Mutex<Option<String>>,
}

impl SimulatedAxes {
    /// Stage with one entry of `limits` and `units` per axis.
    ///
    /// Every axis starts at 0 clamped into its limits.
    ///
    /// # Errors
    /// - `AxisCountMismatch` when `units` and `limits` differ in length
    /// - `InvalidArgument` when a range is reversed or has a NaN bound
    pub fn new(
        label: impl Into<String>,
        limits: Vec<AxisLimits>,
        units: Vec<String>,
    ) -> AppResult<Self> {
        check_axis_count("units", limits.len(), units.len())?;
        validate_limits(&limits)?;
        let position = limits.iter().map(|l| l.clamp(0.0)).collect();
        Ok(Self {
            label: label.into(),
            limits,
            units,
            position: Arc::new(RwLock::new(position)),
            native_raster: false,
            move_history: Mutex::new(Vec::new()),
            journal: Arc::new(Mutex::new(Vec::new())),
            fail_next_move: Mutex::new(None),
        })
    }

    /// `axes` identical axes sharing one range and unit.
    pub fn with_range(
        label: impl Into<String>,
        axes: usize,
        range: (f64, f64),
        unit: &str,
    ) -> AppResult<Self> {
        Self::new(
            label,
            vec![AxisLimits::from(range); axes],
            vec![unit.to_string(); axes],
        )
    }

    /// Raster as a single native command instead of point by point.
    pub fn with_native_raster(mut self) -> Self {
        self.native_raster = true;
        self
    }

    /// Append executed commands to `journal` instead of a private one.
    pub fn sharing_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Label given at construction.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Handle to the journal this stage writes to.
    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    /// Commands executed by this collection, in order.
    pub fn commands(&self) -> Vec<AxisCommand> {
        self.journal
            .lock()
            .iter()
            .filter(|entry| entry.label == self.label)
            .map(|entry| entry.command.clone())
            .collect()
    }

    /// Moves requested through `move_to`.
    pub fn move_history(&self) -> Vec<AxisCommand> {
        self.move_history.lock().clone()
    }

    /// Make the next `move_raw` fail without moving.
    pub fn fail_next_move(&self, reason: impl Into<String>) {
        *self.fail_next_move.lock() = Some(reason.into());
    }

    fn log(&self, command: AxisCommand) {
        self.journal.lock().push(JournalEntry {
            label: self.label.clone(),
            command,
        });
    }
}

impl fmt::Display for SimulatedAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Simulated({})", self.label)
    }
}

#[async_trait]
impl AxisCollection for SimulatedAxes {
    async fn position(&self) -> AppResult<Vec<f64>> {
        Ok(self.position.read().await.clone())
    }

    fn limits(&self) -> Vec<AxisLimits> {
        self.limits.clone()
    }

    fn units(&self) -> Vec<String> {
        self.units.clone()
    }

    fn axis_count(&self) -> usize {
        self.limits.len()
    }

    fn hardware_scannable(&self) -> u32 {
        u32::from(self.native_raster)
    }

    fn describe(&self) -> String {
        self.to_string()
    }

    async fn move_raw(&self, position: &[f64], absolute: bool) -> AppResult<()> {
        check_axis_count("position", self.axis_count(), position.len())?;
        if let Some(reason) = self.fail_next_move.lock().take() {
            return Err(MotionError::Io(std::io::Error::other(reason)));
        }

        let mut current = self.position.write().await;
        let targets = position
            .iter()
            .zip(current.iter())
            .zip(&self.limits)
            .enumerate()
            .map(|(axis, ((&value, &now), limit))| {
                let target = if absolute { value } else { now + value };
                limit.check(axis, target)
            })
            .collect::<AppResult<Vec<f64>>>()?;

        debug!(stage = %self.label, from = ?*current, to = ?targets, "move");
        *current = targets;
        drop(current);

        self.log(AxisCommand::Move {
            position: position.to_vec(),
            absolute,
        });
        Ok(())
    }

    fn record_move(&self, position: &[f64], absolute: bool) {
        self.move_history.lock().push(AxisCommand::Move {
            position: position.to_vec(),
            absolute,
        });
    }

    async fn raster(
        &self,
        start: &[f64],
        stop: &[f64],
        num: &[usize],
        dwell: Option<Duration>,
        strict: bool,
    ) -> AppResult<()> {
        if !self.native_raster {
            return raster_by_moves(self, start, stop, num, dwell, strict).await;
        }

        let steps = axis_steps(start, stop, num, &self.limits, strict)?;
        let last = typewriter_grid(&steps).pop().unwrap_or_default();
        debug!(stage = %self.label, ?start, ?stop, ?num, "native raster");

        *self.position.write().await = last;
        self.log(AxisCommand::Raster {
            start: start.to_vec(),
            stop: stop.to_vec(),
            num: num.to_vec(),
            dwell,
            strict,
        });
        Ok(())
    }
}
