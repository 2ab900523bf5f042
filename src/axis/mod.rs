//! Axis collections.
//!
//! An [`AxisCollection`] is an ordered set of positioning axes that can be
//! moved together, scanned through an arbitrary list of points, or rastered
//! over a regular grid. Collections are shared through `Arc<dyn AxisCollection>`
//! so the same stage can be used directly and as part of a composite.
//!
//! ## Implementations
//!
//! - [`SimulatedAxes`]: in-memory stage for tests and dry runs
//! - [`AptAxes`]: one APT controller channel per axis
//! - [`CompositeAxes`]: a major and a minor collection joined perpendicularly;
//!   composites nest, so more than two axis sets are built by nesting
//!
//! ## Positions and units
//!
//! Positions are plain `f64` values in each axis's own unit as reported by
//! [`AxisCollection::units`]. Converting between units is the caller's job.

pub mod apt;
pub mod composite;
pub mod grid;
pub mod simulated;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{AppResult, MotionError};

pub use apt::{AptAxes, AptAxisConfig, AxisCommandSet, MotorCommands};
pub use composite::CompositeAxes;
pub use grid::{axis_steps, check_axis_count, linspace, scan_points, typewriter_grid};
pub use simulated::{AxisCommand, Journal, JournalEntry, SimulatedAxes};

/// Travel range of one axis, inclusive at both ends.
///
/// Ranges with `lower > upper` or NaN bounds are rejected by [`AxisLimits::validate`],
/// which every collection and raster runs before using them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    /// Lowest reachable position.
    pub lower: f64,
    /// Highest reachable position.
    pub upper: f64,
}

impl AxisLimits {
    /// Range from `lower` to `upper`, unchecked until [`AxisLimits::validate`].
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// `InvalidArgument` unless `lower <= upper` and neither bound is NaN.
    pub fn validate(&self, axis: usize) -> AppResult<()> {
        if self.lower <= self.upper {
            Ok(())
        } else {
            Err(MotionError::InvalidArgument(format!(
                "axis {} limits [{}, {}] are not an ordered range",
                axis, self.lower, self.upper
            )))
        }
    }

    /// True when `value` lies within the range, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Nearest value inside the limits. Never panics, even on invalid limits.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// `value` unchanged if inside the limits, otherwise `OutOfLimits` for `axis`.
    pub fn check(&self, axis: usize, value: f64) -> AppResult<f64> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(MotionError::OutOfLimits {
                axis,
                value,
                lower: self.lower,
                upper: self.upper,
            })
        }
    }
}

/// Validate every range of a collection, in axis order.
pub fn validate_limits(limits: &[AxisLimits]) -> AppResult<()> {
    limits
        .iter()
        .enumerate()
        .try_for_each(|(axis, limit)| limit.validate(axis))
}

impl From<(f64, f64)> for AxisLimits {
    fn from((lower, upper): (f64, f64)) -> Self {
        Self::new(lower, upper)
    }
}

/// Notification emitted while a scan runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Before the first move; carries the full per-axis coordinate set.
    Start {
        /// Per-axis coordinate lists.
        coords: Vec<Vec<f64>>,
        /// Dwell requested for each point.
        dwell: Option<Duration>,
    },
    /// After the move to one point.
    Step {
        /// Position just reached, one entry per axis.
        point: Vec<f64>,
        /// Dwell requested at this point.
        dwell: Option<Duration>,
    },
    /// After the last point.
    Complete {
        /// Per-axis coordinate lists, as in `Start`.
        coords: Vec<Vec<f64>>,
        /// Dwell requested for each point.
        dwell: Option<Duration>,
    },
}

/// Receiver of scan notifications, e.g. a detector that acquires at each step.
pub trait ScanObserver: Send + Sync {
    /// Called synchronously, in order, for every event of a scan.
    fn notify(&self, event: &ScanEvent);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn notify(&self, _event: &ScanEvent) {}
}

/// Observer that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, oldest first.
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }
}

impl ScanObserver for RecordingObserver {
    fn notify(&self, event: &ScanEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Forward events to a channel; a closed receiver is ignored.
impl ScanObserver for mpsc::UnboundedSender<ScanEvent> {
    fn notify(&self, event: &ScanEvent) {
        let _ = self.send(event.clone());
    }
}

/// Addressable set of positioning axes.
///
/// Per-axis outputs (`position`, `limits`, `units`) and per-axis arguments
/// share one axis order. Implementors provide `move_raw`; the provided
/// `move_to`, `scan` and `raster` build on it.
#[async_trait]
pub trait AxisCollection: Send + Sync {
    /// Current position of every axis.
    async fn position(&self) -> AppResult<Vec<f64>>;

    fn limits(&self) -> Vec<AxisLimits>;

    fn units(&self) -> Vec<String>;

    fn axis_count(&self) -> usize;

    /// Number of parts of this collection that raster in hardware.
    fn hardware_scannable(&self) -> u32 {
        0
    }

    /// Short human-readable identification.
    fn describe(&self) -> String;

    /// Move without any bookkeeping. `position` has one entry per axis.
    async fn move_raw(&self, position: &[f64], absolute: bool) -> AppResult<()>;

    /// Hook for move-history bookkeeping; called by `move_to` only.
    fn record_move(&self, _position: &[f64], _absolute: bool) {}

    /// Move every axis, absolutely or relative to the current position.
    async fn move_to(&self, position: &[f64], absolute: bool) -> AppResult<()> {
        check_axis_count("position", self.axis_count(), position.len())?;
        self.record_move(position, absolute);
        self.move_raw(position, absolute).await
    }

    /// Visit each point of `coords` (one sequence per axis) in order.
    ///
    /// The generic path: one `move_raw` per point, notifying `observer`
    /// before, at every step and after.
    async fn scan(
        &self,
        coords: &[Vec<f64>],
        dwell: Option<Duration>,
        observer: &dyn ScanObserver,
    ) -> AppResult<()> {
        scan_by_moves(self, coords, dwell, observer).await
    }

    /// Visit the regular grid spanned by `start`, `stop` and `num` in
    /// typewriter order (first axis slowest).
    ///
    /// The generic path moves to every grid point in turn; collections that
    /// raster in hardware override this.
    async fn raster(
        &self,
        start: &[f64],
        stop: &[f64],
        num: &[usize],
        dwell: Option<Duration>,
        strict: bool,
    ) -> AppResult<()> {
        raster_by_moves(self, start, stop, num, dwell, strict).await
    }
}

/// Raster implemented as one absolute move per grid point.
///
/// The whole grid is validated before the first move.
pub async fn raster_by_moves<A: AxisCollection + ?Sized>(
    axes: &A,
    start: &[f64],
    stop: &[f64],
    num: &[usize],
    dwell: Option<Duration>,
    strict: bool,
) -> AppResult<()> {
    let steps = axis_steps(start, stop, num, &axes.limits(), strict)?;
    let points = typewriter_grid(&steps);
    debug!(
        axes = %axes.describe(),
        points = points.len(),
        ?dwell,
        "generic raster"
    );
    for point in &points {
        axes.move_raw(point, true).await?;
    }
    Ok(())
}

/// Scan implemented as a sequence of moves.
///
/// All coordinates are validated before the first move or notification.
pub async fn scan_by_moves<A: AxisCollection + ?Sized>(
    axes: &A,
    coords: &[Vec<f64>],
    dwell: Option<Duration>,
    observer: &dyn ScanObserver,
) -> AppResult<()> {
    let points = scan_points(coords, axes.axis_count())?;
    debug!(axes = %axes.describe(), points = points.len(), ?dwell, "scan");

    observer.notify(&ScanEvent::Start {
        coords: coords.to_vec(),
        dwell,
    });

    for point in points {
        axes.move_raw(&point, true).await?;
        observer.notify(&ScanEvent::Step { point, dwell });
    }

    observer.notify(&ScanEvent::Complete {
        coords: coords.to_vec(),
        dwell,
    });
    Ok(())
}
