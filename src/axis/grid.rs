//! Argument checks and grid construction shared by axis collections.

use crate::axis::{validate_limits, AxisLimits};
use crate::error::{AppResult, MotionError};

/// Fail unless `actual` equals the number of axes.
pub fn check_axis_count(argument: &'static str, expected: usize, actual: usize) -> AppResult<()> {
    if expected != actual {
        return Err(MotionError::AxisCountMismatch {
            argument,
            expected,
            actual,
        });
    }
    Ok(())
}

/// `num` evenly spaced values from `start` to `stop` inclusive.
///
/// A single point sits at `start`.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut values: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            // Land exactly on the endpoint despite rounding
            values[num - 1] = stop;
            values
        }
    }
}

/// Cartesian product of per-axis values, first axis varying slowest.
///
/// For axes `[[a0, a1], [b0, b1, b2]]` the order is
/// `(a0,b0) (a0,b1) (a0,b2) (a1,b0) (a1,b1) (a1,b2)`.
pub fn typewriter_grid(axes: &[Vec<f64>]) -> Vec<Vec<f64>> {
    axes.iter().fold(vec![Vec::new()], |prefixes, values| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |&value| {
                    let mut point = Vec::with_capacity(prefix.len() + 1);
                    point.extend_from_slice(prefix);
                    point.push(value);
                    point
                })
            })
            .collect()
    })
}

/// Validate raster arguments against `limits` and discretise each axis.
///
/// With `strict`, any grid value outside its axis limits is an error;
/// otherwise values are clamped into the limits.
pub fn axis_steps(
    start: &[f64],
    stop: &[f64],
    num: &[usize],
    limits: &[AxisLimits],
    strict: bool,
) -> AppResult<Vec<Vec<f64>>> {
    check_axis_count("start", limits.len(), start.len())?;
    check_axis_count("stop", limits.len(), stop.len())?;
    check_axis_count("num", limits.len(), num.len())?;
    validate_limits(limits)?;

    start
        .iter()
        .zip(stop)
        .zip(num)
        .zip(limits)
        .enumerate()
        .map(|(axis, (((&first, &last), &points), limit))| {
            if points == 0 {
                return Err(MotionError::InvalidArgument(format!(
                    "axis {} raster needs at least one point",
                    axis
                )));
            }
            linspace(first, last, points)
                .into_iter()
                .map(|value| {
                    if strict {
                        limit.check(axis, value)
                    } else {
                        Ok(limit.clamp(value))
                    }
                })
                .collect::<AppResult<Vec<f64>>>()
        })
        .collect()
}

/// Transpose per-axis scan sequences into per-point coordinates.
///
/// Every axis must supply the same number of points.
pub fn scan_points(coords: &[Vec<f64>], axis_count: usize) -> AppResult<Vec<Vec<f64>>> {
    check_axis_count("coords", axis_count, coords.len())?;

    let num_points = coords.first().map_or(0, Vec::len);
    if let Some((axis, seq)) = coords
        .iter()
        .enumerate()
        .find(|(_, seq)| seq.len() != num_points)
    {
        return Err(MotionError::InvalidArgument(format!(
            "scan coordinates for axis {} have {} points, axis 0 has {}",
            axis,
            seq.len(),
            num_points
        )));
    }

    Ok((0..num_points)
        .map(|i| coords.iter().map(|seq| seq[i]).collect())
        .collect())
}
