//! Core audio fork types and constants.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::ForkError;

/// Samples per frame requested from the frame source (20 ms at 8 kHz).
pub const SAMPLES_PER_FRAME: usize = 160;

/// Default sample rate of signed-linear frames.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Bytes per signed 16-bit linear sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Which leg(s) of the call are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Audio heard by the channel (read leg).
    In,
    /// Audio spoken by the channel (write leg).
    Out,
    /// Both legs mixed.
    #[default]
    Both,
}

impl Direction {
    /// Short name used in logs and listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Both => "both",
        }
    }

    /// Check if the read leg is part of this direction.
    pub fn includes_read(&self) -> bool {
        matches!(self, Self::In | Self::Both)
    }

    /// Check if the write leg is part of this direction.
    pub fn includes_write(&self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }

    /// Check if audio tagged `other` should be forwarded for this direction.
    pub fn accepts(&self, other: Direction) -> bool {
        *self == Self::Both || *self == other
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ForkError;

    /// Accepts `in`/`read`, `out`/`write` and `both`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" | "read" => Ok(Self::In),
            "out" | "write" => Ok(Self::Out),
            "both" => Ok(Self::Both),
            other => Err(ForkError::invalid_config(format!(
                "invalid direction '{other}', expected in, out or both"
            ))),
        }
    }
}

/// Lifecycle status reported by a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Frames are being produced.
    Running,
    /// A stop was requested; no more frames will be handed out.
    ShuttingDown,
    /// The session ended.
    Done,
}

impl SourceStatus {
    /// Check if the source still produces frames.
    pub fn is_running(&self) -> bool {
        *self == SourceStatus::Running
    }
}

/// Minimum accepted volume level.
pub const MIN_VOLUME_LEVEL: i8 = -4;
/// Maximum accepted volume level.
pub const MAX_VOLUME_LEVEL: i8 = 4;

/// Per-leg volume levels in the range -4..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeAdjust {
    read: i8,
    write: i8,
}

impl VolumeAdjust {
    /// Create an adjustment for the read (heard) and write (spoken) legs.
    pub fn new(read: i8, write: i8) -> Result<Self, ForkError> {
        Ok(Self {
            read: check_level("read", read)?,
            write: check_level("write", write)?,
        })
    }

    /// Apply the same level to both legs.
    pub fn both(level: i8) -> Result<Self, ForkError> {
        Self::new(level, level)
    }

    /// Read leg level.
    pub fn read(&self) -> i8 {
        self.read
    }

    /// Write leg level.
    pub fn write(&self) -> i8 {
        self.write
    }

    /// Gain factor for the read leg.
    pub fn read_factor(&self) -> i32 {
        volume_factor(self.read)
    }

    /// Gain factor for the write leg.
    pub fn write_factor(&self) -> i32 {
        volume_factor(self.write)
    }

    /// Gain factor for audio of both legs already mixed together.
    ///
    /// Uses the average of the two levels, rounded toward zero.
    pub fn mixed_factor(&self) -> i32 {
        volume_factor((self.read + self.write) / 2)
    }

    /// Gain factor for audio tagged with `direction`.
    pub fn factor_for(&self, direction: Direction) -> i32 {
        match direction {
            Direction::In => self.read_factor(),
            Direction::Out => self.write_factor(),
            Direction::Both => self.mixed_factor(),
        }
    }

    /// Check if neither leg is adjusted.
    pub fn is_neutral(&self) -> bool {
        self.read == 0 && self.write == 0
    }
}

fn check_level(leg: &str, level: i8) -> Result<i8, ForkError> {
    if (MIN_VOLUME_LEVEL..=MAX_VOLUME_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(ForkError::invalid_config(format!(
            "{leg} volume must be between {MIN_VOLUME_LEVEL} and {MAX_VOLUME_LEVEL}, not {level}"
        )))
    }
}

/// Convert a volume level into a gain factor.
///
/// Positive factors multiply samples, negative factors divide by their
/// magnitude and zero leaves audio untouched.
pub fn volume_factor(level: i8) -> i32 {
    match level {
        0 => 0,
        x if x > 0 => 1 << x,
        x => -(1 << x.unsigned_abs()),
    }
}

/// Opaque identifier handed to the control plane for a running fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = ForkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ForkError::invalid_config(format!("malformed fork id '{s}': {e}")))
    }
}
