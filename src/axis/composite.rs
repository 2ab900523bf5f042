//! Perpendicular composition of two axis collections.
//!
//! A `CompositeAxes` addresses the axes of a *major* collection followed by
//! those of a *minor* collection. Moves are split between the two, major
//! first. A raster steps the major axes through their grid and hands the
//! whole minor sub-raster to the minor collection at each major point, so a
//! minor stage that rasters in hardware keeps doing so.
//!
//! Composites are themselves [`AxisCollection`]s and can be nested:
//!
//! ```text
//! Perpendicular(Perpendicular(x, y), z)  ->  axes [x, y, z]
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::axis::{
    axis_steps, check_axis_count, scan_by_moves, typewriter_grid, AxisCollection, AxisLimits,
    ScanObserver,
};
use crate::error::AppResult;

/// A major and a minor axis collection joined into one.
pub struct CompositeAxes {
    major: Arc<dyn AxisCollection>,
    minor: Arc<dyn AxisCollection>,
    n_major: usize,
    n_minor: usize,
    move_history: Mutex<Vec<(Vec<f64>, bool)>>,
}

impl CompositeAxes {
    /// Join `major` and `minor`. Axis counts are fixed from here on.
    pub fn new(major: Arc<dyn AxisCollection>, minor: Arc<dyn AxisCollection>) -> Self {
        let n_major = major.axis_count();
        let n_minor = minor.axis_count();
        Self {
            major,
            minor,
            n_major,
            n_minor,
            move_history: Mutex::new(Vec::new()),
        }
    }

    /// The outer, slower collection.
    pub fn major(&self) -> &Arc<dyn AxisCollection> {
        &self.major
    }

    pub fn minor(&self) -> &Arc<dyn AxisCollection> {
        &self.minor
    }

    /// The collection that moves most often during a raster.
    pub fn finest_axes(&self) -> Arc<dyn AxisCollection> {
        Arc::clone(&self.minor)
    }

    /// Moves requested through `move_to` on the composite itself.
    pub fn move_history(&self) -> Vec<(Vec<f64>, bool)> {
        self.move_history.lock().clone()
    }

    fn split<'a, T>(&self, values: &'a [T]) -> (&'a [T], &'a [T]) {
        values.split_at(self.n_major)
    }
}

impl fmt::Display for CompositeAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Perpendicular({}, {})",
            self.major.describe(),
            self.minor.describe()
        )
    }
}

#[async_trait]
impl AxisCollection for CompositeAxes {
    async fn position(&self) -> AppResult<Vec<f64>> {
        let mut position = self.major.position().await?;
        position.extend(self.minor.position().await?);
        Ok(position)
    }

    fn limits(&self) -> Vec<AxisLimits> {
        let mut limits = self.major.limits();
        limits.extend(self.minor.limits());
        limits
    }

    fn units(&self) -> Vec<String> {
        let mut units = self.major.units();
        units.extend(self.minor.units());
        units
    }

    fn axis_count(&self) -> usize {
        self.n_major + self.n_minor
    }

    fn hardware_scannable(&self) -> u32 {
        self.major.hardware_scannable() + self.minor.hardware_scannable()
    }

    fn describe(&self) -> String {
        self.to_string()
    }

    async fn move_raw(&self, position: &[f64], absolute: bool) -> AppResult<()> {
        check_axis_count("position", self.axis_count(), position.len())?;
        let (major, minor) = self.split(position);
        self.major.move_to(major, absolute).await?;
        self.minor.move_to(minor, absolute).await
    }

    fn record_move(&self, position: &[f64], absolute: bool) {
        self.move_history.lock().push((position.to_vec(), absolute));
    }

    async fn scan(
        &self,
        coords: &[Vec<f64>],
        dwell: Option<Duration>,
        observer: &dyn ScanObserver,
    ) -> AppResult<()> {
        info!(axes = %self, "composite scan");
        scan_by_moves(self, coords, dwell, observer).await
    }

    async fn raster(
        &self,
        start: &[f64],
        stop: &[f64],
        num: &[usize],
        dwell: Option<Duration>,
        strict: bool,
    ) -> AppResult<()> {
        check_axis_count("start", self.axis_count(), start.len())?;
        check_axis_count("stop", self.axis_count(), stop.len())?;
        check_axis_count("num", self.axis_count(), num.len())?;

        let (major_start, minor_start) = self.split(start);
        let (major_stop, minor_stop) = self.split(stop);
        let (major_num, minor_num) = self.split(num);

        let major_steps = axis_steps(
            major_start,
            major_stop,
            major_num,
            &self.major.limits(),
            strict,
        )?;
        // The minor grid is walked by the minor collection; check it up front
        axis_steps(
            minor_start,
            minor_stop,
            minor_num,
            &self.minor.limits(),
            strict,
        )?;

        let major_points = typewriter_grid(&major_steps);
        info!(
            axes = %self,
            major_points = major_points.len(),
            ?dwell,
            "composite raster"
        );

        for (index, coord) in major_points.iter().enumerate() {
            debug!(index, ?coord, "major step");
            self.major.move_to(coord, true).await?;
            self.minor
                .raster(minor_start, minor_stop, minor_num, dwell, strict)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{
        AxisCommand, Journal, NullObserver, RecordingObserver, ScanEvent, SimulatedAxes,
    };
    use crate::error::MotionError;

    struct Rig {
        journal: Journal,
        major: Arc<SimulatedAxes>,
        minor: Arc<SimulatedAxes>,
        composite: CompositeAxes,
    }

    fn rig(native_minor: bool) -> Rig {
        let journal: Journal = Arc::default();
        let major = Arc::new(
            SimulatedAxes::new(
                "major",
                vec![AxisLimits::new(0.0, 10.0), AxisLimits::new(0.0, 20.0)],
                vec!["mm".into(), "mm".into()],
            )
            .unwrap()
            .sharing_journal(journal.clone()),
        );
        let minor = SimulatedAxes::with_range("minor", 1, (0.0, 5.0), "um")
            .unwrap()
            .sharing_journal(journal.clone());
        let minor = Arc::new(if native_minor {
            minor.with_native_raster()
        } else {
            minor
        });
        let composite = CompositeAxes::new(major.clone(), minor.clone());
        Rig {
            journal,
            major,
            minor,
            composite,
        }
    }

    fn labels(journal: &Journal) -> Vec<String> {
        journal.lock().iter().map(|e| e.label.clone()).collect()
    }

    #[tokio::test]
    async fn test_concatenated_views() {
        let rig = rig(true);
        let composite = &rig.composite;

        assert_eq!(composite.axis_count(), 3);
        assert_eq!(
            composite.limits(),
            vec![
                AxisLimits::new(0.0, 10.0),
                AxisLimits::new(0.0, 20.0),
                AxisLimits::new(0.0, 5.0),
            ]
        );
        assert_eq!(composite.units(), vec!["mm", "mm", "um"]);
        assert_eq!(composite.hardware_scannable(), 1);
        assert_eq!(
            composite.to_string(),
            "Perpendicular(Simulated(major), Simulated(minor))"
        );
        assert_eq!(composite.finest_axes().describe(), "Simulated(minor)");
    }

    #[tokio::test]
    async fn test_move_splits_major_then_minor() {
        let rig = rig(false);
        rig.composite.move_to(&[1.0, 2.0, 3.0], true).await.unwrap();

        assert_eq!(labels(&rig.journal), vec!["major", "minor"]);
        assert_eq!(
            rig.major.move_history(),
            vec![AxisCommand::Move {
                position: vec![1.0, 2.0],
                absolute: true
            }]
        );
        assert_eq!(
            rig.minor.move_history(),
            vec![AxisCommand::Move {
                position: vec![3.0],
                absolute: true
            }]
        );
        assert_eq!(rig.composite.move_history(), vec![(vec![1.0, 2.0, 3.0], true)]);
        assert_eq!(rig.composite.position().await.unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_relative_move_is_forwarded_relative() {
        let rig = rig(false);
        rig.composite.move_to(&[1.0, 1.0, 1.0], true).await.unwrap();
        rig.composite.move_to(&[0.5, 0.5, 0.5], false).await.unwrap();
        assert_eq!(rig.composite.position().await.unwrap(), vec![1.5, 1.5, 1.5]);
    }

    #[tokio::test]
    async fn test_major_failure_skips_minor() {
        let rig = rig(false);
        rig.major.fail_next_move("stalled");

        assert!(rig.composite.move_to(&[1.0, 2.0, 3.0], true).await.is_err());
        assert!(rig.minor.move_history().is_empty());
        assert!(rig.journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_length_touches_nothing() {
        let rig = rig(false);

        let err = rig.composite.move_to(&[1.0, 2.0], true).await.unwrap_err();
        assert!(matches!(
            err,
            MotionError::AxisCountMismatch {
                argument: "position",
                expected: 3,
                actual: 2
            }
        ));

        let err = rig
            .composite
            .raster(&[0.0, 0.0, 0.0], &[1.0, 1.0], &[2, 2, 2], None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::AxisCountMismatch { argument: "stop", .. }));

        let err = rig
            .composite
            .scan(&[vec![1.0], vec![2.0]], None, &NullObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::AxisCountMismatch { argument: "coords", .. }));

        assert!(rig.journal.lock().is_empty());
        assert!(rig.composite.move_history().is_empty());
    }

    #[tokio::test]
    async fn test_raster_hands_minor_grid_to_native_minor() {
        let rig = rig(true);
        let dwell = Some(Duration::from_millis(10));

        rig.composite
            .raster(&[0.0, 0.0, 0.0], &[10.0, 0.0, 5.0], &[2, 1, 50], dwell, true)
            .await
            .unwrap();

        let minor_raster = AxisCommand::Raster {
            start: vec![0.0],
            stop: vec![5.0],
            num: vec![50],
            dwell,
            strict: true,
        };
        let commands: Vec<AxisCommand> =
            rig.journal.lock().iter().map(|e| e.command.clone()).collect();
        assert_eq!(
            commands,
            vec![
                AxisCommand::Move {
                    position: vec![0.0, 0.0],
                    absolute: true
                },
                minor_raster.clone(),
                AxisCommand::Move {
                    position: vec![10.0, 0.0],
                    absolute: true
                },
                minor_raster,
            ]
        );
    }

    #[tokio::test]
    async fn test_raster_typewriter_order_on_major() {
        let rig = rig(true);
        rig.composite
            .raster(&[0.0, 0.0, 0.0], &[1.0, 2.0, 0.0], &[2, 2, 1], None, true)
            .await
            .unwrap();

        let majors: Vec<Vec<f64>> = rig
            .major
            .move_history()
            .into_iter()
            .map(|c| match c {
                AxisCommand::Move { position, .. } => position,
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(
            majors,
            vec![vec![0.0, 0.0], vec![0.0, 2.0], vec![1.0, 0.0], vec![1.0, 2.0]]
        );
    }

    #[tokio::test]
    async fn test_strict_raster_rejects_before_motion() {
        let rig = rig(true);

        let err = rig
            .composite
            .raster(&[0.0, 0.0, 0.0], &[1.0, 1.0, 9.0], &[2, 2, 3], None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MotionError::OutOfLimits { axis: 0, .. }));
        assert!(rig.journal.lock().is_empty());

        // Clamped rasters run
        rig.composite
            .raster(&[0.0, 0.0, 0.0], &[1.0, 1.0, 9.0], &[2, 2, 3], None, false)
            .await
            .unwrap();
        assert_eq!(rig.major.move_history().len(), 4);
    }

    #[tokio::test]
    async fn test_scan_events_and_history() {
        let rig = rig(false);
        let observer = RecordingObserver::new();
        let coords = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![0.5, 1.5]];
        let dwell = Some(Duration::from_millis(1));

        rig.composite.scan(&coords, dwell, &observer).await.unwrap();

        assert_eq!(
            observer.events(),
            vec![
                ScanEvent::Start {
                    coords: coords.clone(),
                    dwell
                },
                ScanEvent::Step {
                    point: vec![1.0, 3.0, 0.5],
                    dwell
                },
                ScanEvent::Step {
                    point: vec![2.0, 4.0, 1.5],
                    dwell
                },
                ScanEvent::Complete { coords, dwell },
            ]
        );
        assert!(rig.composite.move_history().is_empty());
        assert_eq!(rig.major.move_history().len(), 2);
        assert_eq!(rig.minor.move_history().len(), 2);
        assert_eq!(rig.composite.position().await.unwrap(), vec![2.0, 4.0, 1.5]);
    }

    #[tokio::test]
    async fn test_nested_composites() {
        let journal: Journal = Arc::default();
        let x = Arc::new(
            SimulatedAxes::with_range("x", 1, (0.0, 1.0), "mm")
                .unwrap()
                .sharing_journal(journal.clone()),
        );
        let y = Arc::new(
            SimulatedAxes::with_range("y", 1, (0.0, 2.0), "mm")
                .unwrap()
                .sharing_journal(journal.clone()),
        );
        let z = Arc::new(
            SimulatedAxes::with_range("z", 1, (0.0, 3.0), "um")
                .unwrap()
                .sharing_journal(journal.clone()),
        );
        let xy = Arc::new(CompositeAxes::new(x, y));
        let xyz = CompositeAxes::new(xy, z);

        assert_eq!(xyz.axis_count(), 3);
        assert_eq!(xyz.units(), vec!["mm", "mm", "um"]);
        assert_eq!(
            xyz.describe(),
            "Perpendicular(Perpendicular(Simulated(x), Simulated(y)), Simulated(z))"
        );

        xyz.move_to(&[0.5, 1.0, 1.5], true).await.unwrap();
        assert_eq!(labels(&journal), vec!["x", "y", "z"]);
        assert_eq!(xyz.position().await.unwrap(), vec![0.5, 1.0, 1.5]);
    }
}
