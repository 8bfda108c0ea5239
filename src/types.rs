use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of equipment behind one bridged session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Indoor cycling trainer or smart bike
    Bike,
    /// Treadmill
    Treadmill,
    /// Rowing ergometer
    Rower,
    /// Elliptical trainer
    Elliptical,
    /// Kind not yet determined
    Unknown,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bike => write!(f, "Bike"),
            Self::Treadmill => write!(f, "Treadmill"),
            Self::Rower => write!(f, "Rower"),
            Self::Elliptical => write!(f, "Elliptical"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Identifier for one metric channel owned by a [`crate::DeviceState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricId {
    /// Instantaneous speed, km/h
    Speed,
    /// Pedal or stroke cadence, rpm/spm
    Cadence,
    /// Heart rate, bpm
    HeartRate,
    /// Resistance level, device units
    Resistance,
    /// Mechanical power, watts
    Power,
    /// Cumulative distance, km
    Distance,
    /// Cumulative energy, kcal
    Calories,
    /// Cumulative work, joules
    Joules,
    /// Cumulative elevation climbed, meters
    ElevationGain,
    /// Estimated weight loss, kg
    WeightLoss,
    /// Power relative to body weight, W/kg
    WattsPerKg,
    /// Metabolic equivalents estimated from power
    Mets,
    /// Inclination / grade, percent
    Inclination,
    /// Wall-clock workout time, seconds
    Elapsed,
    /// Time spent actually moving, seconds
    Moving,
}

impl MetricId {
    /// Every metric channel, in declaration order
    pub const ALL: [Self; 15] = [
        Self::Speed,
        Self::Cadence,
        Self::HeartRate,
        Self::Resistance,
        Self::Power,
        Self::Distance,
        Self::Calories,
        Self::Joules,
        Self::ElevationGain,
        Self::WeightLoss,
        Self::WattsPerKg,
        Self::Mets,
        Self::Inclination,
        Self::Elapsed,
        Self::Moving,
    ];

    /// Reset policy applied by [`crate::DeviceState::clear_stats`]
    ///
    /// Cumulative channels reset fully; rate-like channels keep their live
    /// display value across a stats clear. This table replaces the per-call
    /// boolean the original drivers passed ad hoc.
    #[must_use]
    pub const fn reset_policy(self) -> ResetPolicy {
        match self {
            Self::Distance
            | Self::Calories
            | Self::Joules
            | Self::ElevationGain
            | Self::Elapsed
            | Self::Moving => ResetPolicy::Full,
            _ => ResetPolicy::PreserveCurrent,
        }
    }

    /// Whether lap statistics are kept for this channel
    ///
    /// Only the cumulative workout channels carry a lap window; instantaneous
    /// channels report the same value inside and outside a lap.
    #[must_use]
    pub const fn lap_tracked(self) -> bool {
        matches!(
            self,
            Self::Distance | Self::Calories | Self::Joules | Self::Elapsed | Self::Moving
        )
    }
}

/// What `clear` does to a metric's live display value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// Zero accumulators and the current value
    Full,
    /// Zero accumulators, keep the current value on screen
    PreserveCurrent,
}

/// Two-point heart-rate to power calibration
///
/// Linear interpolation between two measured (heart rate, watts) pairs,
/// used when no power meter is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerHrCalibration {
    /// Lower calibration heart rate, bpm
    pub heart_rate_low: f64,
    /// Watts measured at the lower heart rate
    pub watts_low: f64,
    /// Upper calibration heart rate, bpm
    pub heart_rate_high: f64,
    /// Watts measured at the upper heart rate
    pub watts_high: f64,
}

/// Read-only configuration snapshot handed to the metric engine each tick
///
/// The engine never reads persisted settings itself; the driver captures
/// whatever store it uses into this snapshot before calling
/// [`crate::DeviceState::tick`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Apply requested resistance to the hardware even in simulation mode
    /// (consumed by driver actuation, carried here so one snapshot covers
    /// the whole tick path)
    pub force_resistance: bool,
    /// Let elapsed time advance while stationary
    pub continuous_moving: bool,
    /// Keep updating power from the external source while paused
    /// (FTP-test style holds)
    pub instant_power_on_pause: bool,
    /// Rider body weight, kg
    pub body_weight_kg: f64,
    /// Rider age, years (calorie estimation)
    pub age_years: f64,
    /// Heart-rate based power estimation, if calibrated
    pub power_from_heart_rate: Option<PowerHrCalibration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_resistance: false,
            continuous_moving: true,
            instant_power_on_pause: false,
            body_weight_kg: 75.0,
            age_years: 35.0,
            power_from_heart_rate: None,
        }
    }
}

/// A duration rendered as hours, minutes and seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutTime {
    /// Whole hours
    pub hours: u32,
    /// Minutes within the hour
    pub minutes: u8,
    /// Seconds within the minute
    pub seconds: u8,
}

impl WorkoutTime {
    /// Split a second count into hours / minutes / seconds
    ///
    /// Negative inputs clamp to zero.
    #[must_use]
    pub fn from_seconds(total: f64) -> Self {
        let total = if total.is_finite() && total > 0.0 {
            total as u64
        } else {
            0
        };
        Self {
            hours: (total / 3600) as u32,
            minutes: ((total % 3600) / 60) as u8,
            seconds: (total % 60) as u8,
        }
    }

    /// Pace (time per kilometer) for a speed in km/h
    ///
    /// Zero or negative speed renders as 0:00:00, matching the original's
    /// "no pace while stationary" display behavior.
    #[must_use]
    pub fn pace_from_speed(speed_kmh: f64) -> Self {
        if speed_kmh <= 0.0 {
            return Self::from_seconds(0.0);
        }
        Self::from_seconds(3600.0 / speed_kmh)
    }

    /// Total seconds represented
    #[must_use]
    pub const fn total_seconds(&self) -> u64 {
        self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64
    }
}

impl fmt::Display for WorkoutTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workout_time_split() {
        let t = WorkoutTime::from_seconds(3725.0);
        assert_eq!(t.hours, 1);
        assert_eq!(t.minutes, 2);
        assert_eq!(t.seconds, 5);
        assert_eq!(format!("{t}"), "1:02:05");
        assert_eq!(t.total_seconds(), 3725);
    }

    #[test]
    fn test_workout_time_clamps_negative() {
        let t = WorkoutTime::from_seconds(-10.0);
        assert_eq!(t.total_seconds(), 0);
    }

    #[test]
    fn test_pace_from_speed() {
        // 12 km/h is a 5:00 min/km pace
        let pace = WorkoutTime::pace_from_speed(12.0);
        assert_eq!(pace.minutes, 5);
        assert_eq!(pace.seconds, 0);

        let stationary = WorkoutTime::pace_from_speed(0.0);
        assert_eq!(stationary.total_seconds(), 0);
    }

    #[test]
    fn test_reset_policy_table() {
        assert_eq!(MetricId::Distance.reset_policy(), ResetPolicy::Full);
        assert_eq!(MetricId::Elapsed.reset_policy(), ResetPolicy::Full);
        assert_eq!(
            MetricId::Speed.reset_policy(),
            ResetPolicy::PreserveCurrent
        );
        assert_eq!(
            MetricId::HeartRate.reset_policy(),
            ResetPolicy::PreserveCurrent
        );
    }

    #[test]
    fn test_lap_table() {
        assert!(MetricId::Distance.lap_tracked());
        assert!(MetricId::Elapsed.lap_tracked());
        assert!(!MetricId::Speed.lap_tracked());
        assert!(!MetricId::Power.lap_tracked());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.continuous_moving);
        assert!(!config.instant_power_on_pause);
        assert!((config.body_weight_kg - 75.0).abs() < f64::EPSILON);
    }
}
