use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::PowerHrCalibration;

/// Kilocalories burned per kilogram of body fat
const KCAL_PER_KG: f64 = 7700.0;

/// How a metric folds new samples into its running sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accumulator {
    /// Rate over time: sum is Σ(value·Δt), average is time-weighted
    Continuous,
    /// Discrete samples: sum is Σvalue, average is per-sample
    EventCount,
}

/// Lap-scoped statistics window
#[derive(Debug, Clone, Copy, Default)]
struct LapWindow {
    tracking: bool,
    sum: f64,
    sample_count: f64,
    max: f64,
    start_value: f64,
}

/// A single time-weighted scalar channel with running statistics
///
/// Holds the latest sample plus sum/count/max accumulators for computing the
/// session average and maximum, a mirror of those scoped to the current lap,
/// and a pause flag that freezes accumulation without hiding the live value.
/// A `Metric` never performs I/O and accepts any numeric input as-is.
#[derive(Debug, Clone)]
pub struct Metric {
    current: f64,
    accumulator: Accumulator,
    sum: f64,
    sample_count: f64,
    max: f64,
    lap: LapWindow,
    paused: bool,
    pause_exempt: bool,
    last_changed: Option<Instant>,
}

impl Metric {
    /// New metric with the given accumulation mode and zeroed state
    #[must_use]
    pub fn new(accumulator: Accumulator) -> Self {
        Self {
            current: 0.0,
            accumulator,
            sum: 0.0,
            sample_count: 0.0,
            max: 0.0,
            lap: LapWindow::default(),
            paused: false,
            pause_exempt: false,
            last_changed: None,
        }
    }

    /// New time-weighted (rate) metric
    #[must_use]
    pub fn continuous() -> Self {
        Self::new(Accumulator::Continuous)
    }

    /// New per-sample (event) metric
    #[must_use]
    pub fn event_count() -> Self {
        Self::new(Accumulator::EventCount)
    }

    /// Keep accumulating even while paused
    ///
    /// Used for the heart-rate display, which must keep tracking the rider
    /// through a pause.
    #[must_use]
    pub fn pause_exempt(mut self) -> Self {
        self.pause_exempt = true;
        self
    }

    /// Latest instantaneous sample
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.current
    }

    /// Session maximum
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Session average; 0 if nothing has been recorded
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.sample_count > 0.0 {
            self.sum / self.sample_count
        } else {
            0.0
        }
    }

    /// When the value last changed, if it ever has
    #[must_use]
    pub const fn last_changed(&self) -> Option<Instant> {
        self.last_changed
    }

    /// Record a new sample
    ///
    /// `elapsed_secs` is the wall-clock delta since the previous sample and
    /// weights the running sum for [`Accumulator::Continuous`] metrics; it is
    /// ignored for event-count metrics. While paused only the live value
    /// moves, unless this metric is pause-exempt.
    pub fn set_value(&mut self, value: f64, elapsed_secs: f64) {
        self.current = value;
        self.last_changed = Some(Instant::now());

        if self.paused && !self.pause_exempt {
            return;
        }

        let (delta_sum, delta_count) = match self.accumulator {
            Accumulator::Continuous => (value * elapsed_secs, elapsed_secs),
            Accumulator::EventCount => (value, 1.0),
        };

        self.sum += delta_sum;
        self.sample_count += delta_count;
        if value > self.max {
            self.max = value;
        }

        if self.lap.tracking {
            self.lap.sum += delta_sum;
            self.lap.sample_count += delta_count;
            if value > self.lap.max {
                self.lap.max = value;
            }
        }
    }

    /// Add `delta` to the current value and record the result
    ///
    /// Compound-assignment form used by the engine for cumulative channels
    /// (`distance += ...`, `joules += ...`).
    pub fn add(&mut self, delta: f64, elapsed_secs: f64) {
        self.set_value(self.current + delta, elapsed_secs);
    }

    /// Freeze or resume accumulation; the live value keeps updating either way
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Open (`tracked == true`) or close the lap window
    ///
    /// Opening resets the lap statistics and anchors the lap start at the
    /// current value; closing simply stops lap accumulation. Session totals
    /// are never touched.
    pub fn set_lap(&mut self, tracked: bool) {
        if tracked {
            self.lap = LapWindow {
                tracking: true,
                sum: 0.0,
                sample_count: 0.0,
                max: 0.0,
                start_value: self.current,
            };
        } else {
            self.lap.tracking = false;
        }
    }

    /// Value accumulated since the lap opened (cumulative channels)
    #[must_use]
    pub fn lap_value(&self) -> f64 {
        if self.lap.tracking {
            self.current - self.lap.start_value
        } else {
            0.0
        }
    }

    /// Average over the current lap; 0 outside a lap
    #[must_use]
    pub fn lap_average(&self) -> f64 {
        if self.lap.tracking && self.lap.sample_count > 0.0 {
            self.lap.sum / self.lap.sample_count
        } else {
            0.0
        }
    }

    /// Maximum over the current lap
    #[must_use]
    pub fn lap_max(&self) -> f64 {
        if self.lap.tracking {
            self.lap.max
        } else {
            0.0
        }
    }

    /// Zero accumulators and the lap window
    ///
    /// The live value survives unless `reset_also_current` is set, so a lap
    /// stop can clear statistics without blanking the display.
    pub fn clear(&mut self, reset_also_current: bool) {
        self.sum = 0.0;
        self.sample_count = 0.0;
        self.max = 0.0;
        let tracking = self.lap.tracking;
        self.lap = LapWindow {
            tracking,
            ..LapWindow::default()
        };
        if reset_also_current {
            self.current = 0.0;
        }
        self.lap.start_value = self.current;
    }

    /// METs estimated from mechanical power (linear approximation)
    #[must_use]
    pub fn mets_from_power(watts: f64) -> f64 {
        0.048 * watts + 1.19
    }

    /// Body-fat kilograms burned for a calorie total
    #[must_use]
    pub fn weight_loss_kg(kcal: f64) -> f64 {
        kcal / KCAL_PER_KG
    }

    /// Kilocalories burned over a workout, from average heart rate
    ///
    /// Keytel et al. regression, assuming unknown VO2max; heart rate in bpm,
    /// elapsed time in seconds.
    #[must_use]
    pub fn calories_from_heart_rate(
        average_hr: f64,
        elapsed_secs: f64,
        weight_kg: f64,
        age_years: f64,
    ) -> f64 {
        let kcal_per_minute =
            (-55.0969 + 0.6309 * average_hr + 0.1988 * weight_kg + 0.2017 * age_years) / 4.184;
        (kcal_per_minute * elapsed_secs / 60.0).max(0.0)
    }

    /// Watts estimated from heart rate via a two-point calibration
    ///
    /// Linear interpolation (and extrapolation) through the two calibration
    /// pairs, clamped at zero.
    #[must_use]
    pub fn watts_from_heart_rate(heart_rate: f64, calibration: &PowerHrCalibration) -> f64 {
        let span = calibration.heart_rate_high - calibration.heart_rate_low;
        if span.abs() < f64::EPSILON {
            return calibration.watts_low.max(0.0);
        }
        let slope = (calibration.watts_high - calibration.watts_low) / span;
        let watts = calibration.watts_low + slope * (heart_rate - calibration.heart_rate_low);
        watts.max(0.0)
    }
}
