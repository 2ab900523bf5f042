//! Query timeout modes.
//!
//! A query may wait for as long as the transport's own read timeout allows
//! (`Inherit`), forever (`Indefinite`) or for a bounded duration (`After`).
//! Unitful durations are normalised to seconds through [`TimeQuantity`]; a
//! bare number is already in seconds.

use std::time::Duration;

use crate::error::{AppResult, MotionError};

/// Anything that can be rescaled to a magnitude in seconds.
///
/// Implement this for the quantity type of whatever unit library the caller
/// uses; the engine only ever asks for the magnitude in seconds.
pub trait TimeQuantity {
    fn rescale_seconds(&self) -> f64;
}

impl TimeQuantity for Duration {
    fn rescale_seconds(&self) -> f64 {
        self.as_secs_f64()
    }
}

impl TimeQuantity for f64 {
    fn rescale_seconds(&self) -> f64 {
        *self
    }
}

impl TimeQuantity for u64 {
    fn rescale_seconds(&self) -> f64 {
        *self as f64
    }
}

/// How long `query_packet` keeps re-sending and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryTimeout {
    /// Defer to the transport: exactly one read attempt.
    #[default]
    Inherit,
    /// Never give up on elapsed time.
    Indefinite,
    /// Give up once more than this much time has elapsed since the first attempt.
    After(Duration),
}

impl QueryTimeout {
    /// Normalise a unitful (or bare, seconds) value into a bounded timeout.
    ///
    /// Negative, NaN or infinite magnitudes are rejected.
    pub fn from_quantity<Q: TimeQuantity + ?Sized>(quantity: &Q) -> AppResult<Self> {
        let seconds = quantity.rescale_seconds();
        Duration::try_from_secs_f64(seconds)
            .map(QueryTimeout::After)
            .map_err(|_| {
                MotionError::InvalidArgument(format!("timeout of {} s is not a valid duration", seconds))
            })
    }

    /// Map an optional configured timeout: absent means inherit.
    pub fn from_setting(setting: Option<Duration>) -> Self {
        setting.map_or(QueryTimeout::Inherit, QueryTimeout::After)
    }

    /// True once `elapsed` exceeds the budget. `Inherit` is handled by the
    /// caller before the budget is consulted.
    pub(crate) fn is_exhausted(&self, elapsed: Duration) -> bool {
        match self {
            QueryTimeout::After(limit) => elapsed > *limit,
            QueryTimeout::Inherit | QueryTimeout::Indefinite => false,
        }
    }
}

impl From<Duration> for QueryTimeout {
    fn from(duration: Duration) -> Self {
        QueryTimeout::After(duration)
    }
}
