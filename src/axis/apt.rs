//! Axis collection backed by an APT motor controller.
//!
//! Each axis maps to one controller channel. Positions are converted to
//! encoder counts with a per-axis scale factor.
//!
//! ## Move protocol
//!
//! An absolute move is queried with `MOT_MOVE_ABSOLUTE` and completes when the
//! controller answers `MOT_MOVE_COMPLETED`. The engine re-sends a request on
//! every poll, which is harmless for an absolute target. Relative moves are
//! therefore turned into absolute targets from a fresh position readout
//! before anything is sent.

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::axis::{check_axis_count, AxisCollection, AxisLimits};
use crate::error::{AppResult, MotionError};
use crate::hardware::Transport;
use crate::protocol::{AptEngine, AptPacket, Clock, QueryTimeout, TokioClock};

/// Wiring of one axis to a controller channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AptAxisConfig {
    /// APT destination address of the controller (e.g. 0x50 for a generic USB unit).
    pub destination: u8,
    /// Channel identifier, starting at 1.
    pub channel: u16,
    /// Encoder counts per unit of travel.
    pub counts_per_unit: f64,
    /// Unit of travel, e.g. "mm".
    pub unit: String,
    /// Travel limits, in `unit`.
    pub limits: AxisLimits,
}

impl AptAxisConfig {
    /// Position in counts, rounded to the nearest count.
    pub fn to_counts(&self, position: f64) -> AppResult<i32> {
        let counts = (position * self.counts_per_unit).round();
        if !counts.is_finite() || counts < f64::from(i32::MIN) || counts > f64::from(i32::MAX) {
            return Err(MotionError::InvalidArgument(format!(
                "position {} {} does not fit the encoder range",
                position, self.unit
            )));
        }
        Ok(counts as i32)
    }

    /// Position for a raw encoder count.
    pub fn from_counts(&self, counts: i32) -> f64 {
        f64::from(counts) / self.counts_per_unit
    }
}

/// Encoding of the motor messages an [`AptAxes`] needs.
pub trait AxisCommandSet: Send + Sync {
    /// Request an absolute move of `axis` to `counts`.
    fn move_absolute(&self, axis: &AptAxisConfig, counts: i32) -> AppResult<AptPacket>;

    /// Message identifier announcing the end of a move.
    fn move_completed_id(&self) -> u16;

    /// Request the position counter of `axis`.
    fn request_position(&self, axis: &AptAxisConfig) -> AppResult<AptPacket>;

    /// Message identifier of the position reply.
    fn position_reply_id(&self) -> u16;

    /// Position counter carried by `reply`.
    fn decode_position(&self, axis: &AptAxisConfig, reply: &AptPacket) -> AppResult<i32>;
}

/// Generic APT motor messages understood by most Thorlabs motion controllers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotorCommands;

impl MotorCommands {
    /// Request the position counter of a channel.
    pub const MOT_REQ_POSCOUNTER: u16 = 0x0411;
    /// Position counter reply.
    pub const MOT_GET_POSCOUNTER: u16 = 0x0412;
    /// Absolute move request.
    pub const MOT_MOVE_ABSOLUTE: u16 = 0x0453;
    /// Sent by the controller when a move has finished.
    pub const MOT_MOVE_COMPLETED: u16 = 0x0464;

    /// Source address of the host PC.
    pub const HOST: u8 = 0x01;
}

impl AxisCommandSet for MotorCommands {
    fn move_absolute(&self, axis: &AptAxisConfig, counts: i32) -> AppResult<AptPacket> {
        let mut data = BytesMut::with_capacity(6);
        data.put_u16_le(axis.channel);
        data.put_i32_le(counts);
        AptPacket::with_data(
            Self::MOT_MOVE_ABSOLUTE,
            axis.destination,
            Self::HOST,
            data.freeze(),
        )
    }

    fn move_completed_id(&self) -> u16 {
        Self::MOT_MOVE_COMPLETED
    }

    fn request_position(&self, axis: &AptAxisConfig) -> AppResult<AptPacket> {
        let channel = u8::try_from(axis.channel).map_err(|_| {
            MotionError::InvalidArgument(format!(
                "channel {} does not fit a header parameter",
                axis.channel
            ))
        })?;
        AptPacket::short(
            Self::MOT_REQ_POSCOUNTER,
            channel,
            0,
            axis.destination,
            Self::HOST,
        )
    }

    fn position_reply_id(&self) -> u16 {
        Self::MOT_GET_POSCOUNTER
    }

    fn decode_position(&self, axis: &AptAxisConfig, reply: &AptPacket) -> AppResult<i32> {
        let mut data = reply.data().cloned().unwrap_or_default();
        if data.len() < 6 {
            return Err(MotionError::MalformedPacket(format!(
                "position reply carries {} data bytes, expected 6",
                data.len()
            )));
        }
        let channel = data.get_u16_le();
        if channel != axis.channel {
            return Err(MotionError::MalformedPacket(format!(
                "position reply for channel {}, expected {}",
                channel, axis.channel
            )));
        }
        Ok(data.get_i32_le())
    }
}

/// Axes driven through an [`AptEngine`], one channel per axis.
pub struct AptAxes<T, C = TokioClock, S = MotorCommands> {
    label: String,
    engine: Mutex<AptEngine<T, C>>,
    axes: Vec<AptAxisConfig>,
    commands: S,
}

impl<T: Transport, C: Clock> AptAxes<T, C, MotorCommands> {
    /// Axes speaking the generic motor messages of [`MotorCommands`].
    ///
    /// # Errors
    /// See [`AptAxes::with_commands`].
    pub fn new(
        label: impl Into<String>,
        engine: AptEngine<T, C>,
        axes: Vec<AptAxisConfig>,
    ) -> AppResult<Self> {
        Self::with_commands(label, engine, axes, MotorCommands)
    }
}

impl<T: Transport, C: Clock, S: AxisCommandSet> AptAxes<T, C, S> {
    /// Axes encoding their messages with `commands`.
    ///
    /// # Errors
    /// `InvalidArgument` when an axis has reversed or NaN limits, or a scale
    /// that is zero or not finite.
    pub fn with_commands(
        label: impl Into<String>,
        engine: AptEngine<T, C>,
        axes: Vec<AptAxisConfig>,
        commands: S,
    ) -> AppResult<Self> {
        for (index, axis) in axes.iter().enumerate() {
            axis.limits.validate(index)?;
            if !axis.counts_per_unit.is_finite() || axis.counts_per_unit == 0.0 {
                return Err(MotionError::InvalidArgument(format!(
                    "axis {} has unusable scale of {} counts per {}",
                    index, axis.counts_per_unit, axis.unit
                )));
            }
        }
        Ok(Self {
            label: label.into(),
            engine: Mutex::new(engine),
            axes,
            commands,
        })
    }

    /// Per-axis wiring, in axis order.
    pub fn axes(&self) -> &[AptAxisConfig] {
        &self.axes
    }

    /// Release the engine and its transport.
    pub fn into_engine(self) -> AptEngine<T, C> {
        self.engine.into_inner()
    }

    async fn read_counts(
        &self,
        engine: &mut AptEngine<T, C>,
        axis: &AptAxisConfig,
    ) -> AppResult<i32> {
        let request = self.commands.request_position(axis)?;
        let expected = self.commands.position_reply_id();
        let timeout = engine.settings().default_query_timeout();
        let reply = engine
            .query_packet(&request, Some(expected), timeout)
            .await?
            .ok_or(MotionError::NoResponse { expected })?;
        self.commands.decode_position(axis, &reply)
    }
}

impl<T, C, S> fmt::Display for AptAxes<T, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Apt({}, {} axes)", self.label, self.axes.len())
    }
}

#[async_trait]
impl<T, C, S> AxisCollection for AptAxes<T, C, S>
where
    T: Transport,
    C: Clock,
    S: AxisCommandSet,
{
    async fn position(&self) -> AppResult<Vec<f64>> {
        let mut engine = self.engine.lock().await;
        let mut position = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let counts = self.read_counts(&mut engine, axis).await?;
            position.push(axis.from_counts(counts));
        }
        Ok(position)
    }

    fn limits(&self) -> Vec<AxisLimits> {
        self.axes.iter().map(|a| a.limits).collect()
    }

    fn units(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.unit.clone()).collect()
    }

    fn axis_count(&self) -> usize {
        self.axes.len()
    }

    fn describe(&self) -> String {
        self.to_string()
    }

    async fn move_raw(&self, position: &[f64], absolute: bool) -> AppResult<()> {
        check_axis_count("position", self.axes.len(), position.len())?;
        let mut engine = self.engine.lock().await;

        let mut targets = Vec::with_capacity(self.axes.len());
        for (index, (axis, &value)) in self.axes.iter().zip(position).enumerate() {
            let target = if absolute {
                value
            } else {
                axis.from_counts(self.read_counts(&mut engine, axis).await?) + value
            };
            let target = axis.limits.check(index, target)?;
            targets.push(axis.to_counts(target)?);
        }

        let timeout = QueryTimeout::After(engine.settings().move_timeout);
        for (axis, &counts) in self.axes.iter().zip(&targets) {
            debug!(stage = %self.label, channel = axis.channel, counts, "move absolute");
            let request = self.commands.move_absolute(axis, counts)?;
            let expected = self.commands.move_completed_id();
            engine
                .query_packet(&request, Some(expected), timeout)
                .await?
                .ok_or(MotionError::NoResponse { expected })?;
        }

        info!(stage = %self.label, ?position, absolute, "move complete");
        Ok(())
    }
}
