use std::time::Instant;
use tracing::debug;

use crate::{
    metric::Metric,
    types::{DeviceKind, EngineConfig, MetricId, ResetPolicy, WorkoutTime},
};

/// Target state requested through the virtual-peripheral role
///
/// Written by the command router, read by driver actuation logic (resistance
/// curves, motor control) which lives outside this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetState {
    /// Requested simulated grade, percent scaled by 100 (fixed point, as the
    /// actuation layer expects it)
    pub grade: Option<f64>,
    /// Rolling-resistance coefficient from the last simulation-parameters
    /// command
    pub rolling_resistance: f64,
    /// Wind-resistance coefficient from the last simulation-parameters
    /// command
    pub wind_resistance: f64,
    /// Requested resistance level, if any
    pub resistance: Option<f64>,
    /// Requested target power in watts, if any (erg mode)
    pub power: Option<f64>,
}

/// State of one bridged equipment session
///
/// Owns every metric channel, the workout timers, the pause/lap flags and the
/// target fields the command router writes. One `DeviceState` belongs to
/// exactly one driver context; all mutation must be serialized by the owner.
#[derive(Debug, Clone)]
pub struct DeviceState {
    kind: DeviceKind,
    paused: bool,
    first_tick_done: bool,
    last_tick_at: Option<Instant>,

    speed: Metric,
    cadence: Metric,
    heart_rate: Metric,
    resistance: Metric,
    power: Metric,
    distance: Metric,
    calories: Metric,
    joules: Metric,
    elevation_gain: Metric,
    weight_loss: Metric,
    watts_per_kg: Metric,
    mets: Metric,
    inclination: Metric,
    elapsed: Metric,
    moving: Metric,

    targets: TargetState,
    crank_revolutions: u32,
    last_crank_event_time: u16,
}

impl DeviceState {
    /// New session state for the given equipment kind, all channels zeroed
    #[must_use]
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            paused: false,
            first_tick_done: false,
            last_tick_at: None,
            speed: Metric::continuous(),
            cadence: Metric::continuous(),
            heart_rate: Metric::continuous().pause_exempt(),
            resistance: Metric::continuous(),
            power: Metric::continuous(),
            distance: Metric::continuous(),
            calories: Metric::continuous(),
            joules: Metric::continuous(),
            elevation_gain: Metric::continuous(),
            weight_loss: Metric::continuous(),
            watts_per_kg: Metric::continuous(),
            mets: Metric::continuous(),
            inclination: Metric::continuous(),
            elapsed: Metric::continuous(),
            moving: Metric::continuous(),
            targets: TargetState::default(),
            crank_revolutions: 0,
            last_crank_event_time: 0,
        }
    }

    /// Equipment kind behind this session
    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Whether the workout is paused
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// When the engine last ticked
    #[must_use]
    pub const fn last_tick_at(&self) -> Option<Instant> {
        self.last_tick_at
    }

    /// Target fields last requested through the virtual peripheral
    #[must_use]
    pub const fn targets(&self) -> &TargetState {
        &self.targets
    }

    /// Read one metric channel
    #[must_use]
    pub fn metric(&self, id: MetricId) -> &Metric {
        match id {
            MetricId::Speed => &self.speed,
            MetricId::Cadence => &self.cadence,
            MetricId::HeartRate => &self.heart_rate,
            MetricId::Resistance => &self.resistance,
            MetricId::Power => &self.power,
            MetricId::Distance => &self.distance,
            MetricId::Calories => &self.calories,
            MetricId::Joules => &self.joules,
            MetricId::ElevationGain => &self.elevation_gain,
            MetricId::WeightLoss => &self.weight_loss,
            MetricId::WattsPerKg => &self.watts_per_kg,
            MetricId::Mets => &self.mets,
            MetricId::Inclination => &self.inclination,
            MetricId::Elapsed => &self.elapsed,
            MetricId::Moving => &self.moving,
        }
    }

    /// Mutable access to one metric channel, for raw sensor callbacks
    pub fn metric_mut(&mut self, id: MetricId) -> &mut Metric {
        match id {
            MetricId::Speed => &mut self.speed,
            MetricId::Cadence => &mut self.cadence,
            MetricId::HeartRate => &mut self.heart_rate,
            MetricId::Resistance => &mut self.resistance,
            MetricId::Power => &mut self.power,
            MetricId::Distance => &mut self.distance,
            MetricId::Calories => &mut self.calories,
            MetricId::Joules => &mut self.joules,
            MetricId::ElevationGain => &mut self.elevation_gain,
            MetricId::WeightLoss => &mut self.weight_loss,
            MetricId::WattsPerKg => &mut self.watts_per_kg,
            MetricId::Mets => &mut self.mets,
            MetricId::Inclination => &mut self.inclination,
            MetricId::Elapsed => &mut self.elapsed,
            MetricId::Moving => &mut self.moving,
        }
    }

    /// One metric-engine tick
    ///
    /// Advances timers and derived channels given the wall-clock delta since
    /// the previous tick, measured by the caller against a monotonic clock.
    /// `use_external_power` substitutes `external_power_watts` for the power
    /// channel (power meter, trainer telemetry). The configuration snapshot
    /// is read-only; nothing here touches persisted settings.
    ///
    /// The very first tick only records the timestamp: with no previous tick
    /// there is no interval to integrate over. Calling twice with the same
    /// delta double-counts; the caller owns the timer.
    pub fn tick(
        &mut self,
        elapsed_seconds: f64,
        use_external_power: bool,
        external_power_watts: f64,
        config: &EngineConfig,
    ) {
        let dt = elapsed_seconds;
        let speed_now = self.speed.value();

        if self.first_tick_done && !self.paused {
            if speed_now > 0.0 || config.continuous_moving {
                self.elapsed.add(dt, dt);
            }
            if speed_now > 0.0 {
                self.moving.add(dt, dt);
                self.joules.add(self.power.value() * dt, dt);
                self.weight_loss
                    .set_value(Metric::weight_loss_kg(self.calories.value()), dt);
                if use_external_power {
                    self.power.set_value(external_power_watts, dt);
                }
                self.watts_per_kg
                    .set_value(self.power.value() / config.body_weight_kg, dt);
            } else if self.power.value() > 0.0 {
                // no phantom power while stationary
                self.power.set_value(0.0, dt);
                self.watts_per_kg.set_value(0.0, dt);
            }
        } else if self.paused && config.instant_power_on_pause {
            // FTP-test style hold: power keeps tracking through the pause
            if use_external_power {
                self.power.set_value(external_power_watts, dt);
            }
            self.watts_per_kg
                .set_value(self.power.value() / config.body_weight_kg, dt);
        } else if self.power.value() > 0.0 {
            self.power.set_value(0.0, dt);
            self.watts_per_kg.set_value(0.0, dt);
        }

        self.mets
            .set_value(Metric::mets_from_power(self.power.value()), dt);

        if self.inclination.value() > 0.0 {
            let climb =
                (speed_now / 3600.0) * 1000.0 * (self.inclination.value() / 100.0) * dt;
            self.elevation_gain.add(climb, dt);
        }

        self.last_tick_at = Some(Instant::now());
        self.first_tick_done = true;
    }

    /// Integrate distance from the current speed over a tick interval
    ///
    /// Every driver update loop runs this right after [`Self::tick`]; kept
    /// separate because some equipment reports odometer readings directly
    /// instead.
    pub fn integrate_distance(&mut self, elapsed_seconds: f64) {
        if self.paused || !self.first_tick_done {
            return;
        }
        let delta_km = self.speed.value() / 3600.0 * elapsed_seconds;
        self.distance.add(delta_km, elapsed_seconds);
    }

    /// Accumulate calories from the average heart rate seen so far
    ///
    /// Used by equipment that reports no energy channel of its own. Replaces
    /// the calorie total outright; callers layering a stop-reset accumulator
    /// on top keep that bookkeeping themselves.
    pub fn update_calories_from_heart_rate(&mut self, elapsed_seconds: f64, config: &EngineConfig) {
        if self.heart_rate.value() <= 0.0 {
            return;
        }
        let kcal = Metric::calories_from_heart_rate(
            self.heart_rate.average(),
            self.elapsed.value(),
            config.body_weight_kg,
            config.age_years,
        );
        self.calories.set_value(kcal, elapsed_seconds);
    }

    /// Estimate power from heart rate when no power source exists
    ///
    /// No-op unless the configuration snapshot carries a calibration and the
    /// heart-rate channel has a reading.
    pub fn update_power_from_heart_rate(&mut self, elapsed_seconds: f64, config: &EngineConfig) {
        let Some(calibration) = &config.power_from_heart_rate else {
            return;
        };
        if self.heart_rate.value() <= 0.0 {
            return;
        }
        let watts = Metric::watts_from_heart_rate(self.heart_rate.value(), calibration);
        self.power.set_value(watts, elapsed_seconds);
    }

    /// Advance crank bookkeeping from the cadence channel
    ///
    /// Revolution count and 1/1024 s event time feed cycling-speed-and-cadence
    /// style telemetry upstream.
    pub fn advance_cranks(&mut self) {
        let cadence = self.cadence.value();
        if cadence > 0.0 {
            self.crank_revolutions = self.crank_revolutions.wrapping_add(1);
            let interval = (1024.0 / (cadence / 60.0)) as u16;
            self.last_crank_event_time = self.last_crank_event_time.wrapping_add(interval);
        }
    }

    /// Total crank revolutions recorded
    #[must_use]
    pub const fn crank_revolutions(&self) -> u32 {
        self.crank_revolutions
    }

    /// Timestamp of the last crank event, 1/1024 s units, wrapping
    #[must_use]
    pub const fn last_crank_event_time(&self) -> u16 {
        self.last_crank_event_time
    }

    /// Pause or resume the workout, fanned out to every metric channel
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        for id in MetricId::ALL {
            self.metric_mut(id).set_paused(paused);
        }
    }

    /// Start a lap on every lap-tracked channel
    pub fn start_lap(&mut self) {
        for id in MetricId::ALL {
            let tracked = id.lap_tracked();
            self.metric_mut(id).set_lap(tracked);
        }
    }

    /// Reset workout statistics according to each channel's reset policy
    ///
    /// Cumulative channels lose their totals; live display channels (speed,
    /// heart rate, power, ...) keep their current reading.
    pub fn clear_stats(&mut self) {
        for id in MetricId::ALL {
            let reset_current = matches!(id.reset_policy(), ResetPolicy::Full);
            self.metric_mut(id).clear(reset_current);
        }
    }

    /// Record a simulated-grade request from the virtual peripheral
    ///
    /// `grade` is percent scaled by 100, the fixed-point form the actuation
    /// layer consumes.
    pub fn request_grade(&mut self, grade: f64, rolling_resistance: f64, wind_resistance: f64) {
        debug!(grade, rolling_resistance, wind_resistance, "grade requested");
        self.targets.grade = Some(grade);
        self.targets.rolling_resistance = rolling_resistance;
        self.targets.wind_resistance = wind_resistance;
    }

    /// Record a resistance-level request
    pub fn request_resistance(&mut self, level: f64) {
        self.targets.resistance = Some(level);
    }

    /// Record a target-power (erg mode) request
    pub fn request_power(&mut self, watts: f64) {
        self.targets.power = Some(watts);
    }

    /// Total workout time as hours:minutes:seconds
    #[must_use]
    pub fn elapsed_time(&self) -> WorkoutTime {
        WorkoutTime::from_seconds(self.elapsed.value())
    }

    /// Moving time as hours:minutes:seconds
    #[must_use]
    pub fn moving_time(&self) -> WorkoutTime {
        WorkoutTime::from_seconds(self.moving.value())
    }

    /// Time since the current lap opened
    #[must_use]
    pub fn lap_elapsed_time(&self) -> WorkoutTime {
        WorkoutTime::from_seconds(self.elapsed.lap_value())
    }

    /// Current pace, time per kilometer
    #[must_use]
    pub fn current_pace(&self) -> WorkoutTime {
        WorkoutTime::pace_from_speed(self.speed.value())
    }

    /// Session-average pace, time per kilometer
    #[must_use]
    pub fn average_pace(&self) -> WorkoutTime {
        WorkoutTime::pace_from_speed(self.speed.average())
    }

    /// Best pace of the session, time per kilometer
    #[must_use]
    pub fn max_pace(&self) -> WorkoutTime {
        WorkoutTime::pace_from_speed(self.speed.max())
    }

    /// Odometer reading, km
    #[must_use]
    pub fn odometer(&self) -> f64 {
        self.distance.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticked(kind: DeviceKind) -> DeviceState {
        // first tick only arms the engine
        let mut device = DeviceState::new(kind);
        device.tick(0.2, false, 0.0, &EngineConfig::default());
        device
    }

    #[test]
    fn test_first_tick_accumulates_nothing() {
        let mut device = DeviceState::new(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(20.0, 0.0);
        device.tick(1.0, false, 0.0, &EngineConfig::default());
        assert!((device.metric(MetricId::Elapsed).value()).abs() < f64::EPSILON);
        assert!((device.metric(MetricId::Moving).value()).abs() < f64::EPSILON);
        assert!(device.last_tick_at().is_some());
    }

    #[test]
    fn test_engine_scenario_watts_per_kg_and_mets() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(20.0, 0.0);
        device.metric_mut(MetricId::Power).set_value(150.0, 0.0);

        let config = EngineConfig {
            body_weight_kg: 75.0,
            ..EngineConfig::default()
        };
        device.tick(1.0, false, 0.0, &config);

        assert!((device.metric(MetricId::WattsPerKg).value() - 2.0).abs() < 1e-9);
        assert!((device.metric(MetricId::Mets).value() - 8.39).abs() < 1e-9);
        assert!((device.metric(MetricId::Moving).value() - 1.0).abs() < 1e-9);
        assert!((device.metric(MetricId::Elapsed).value() - 1.0).abs() < 1e-9);
        assert!((device.metric(MetricId::Joules).value() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_requires_speed() {
        let mut device = ticked(DeviceKind::Bike);
        let config = EngineConfig::default(); // continuous_moving on
        device.tick(2.0, false, 0.0, &config);
        assert!((device.metric(MetricId::Elapsed).value() - 2.0).abs() < 1e-9);
        assert!((device.metric(MetricId::Moving).value()).abs() < f64::EPSILON);

        let strict = EngineConfig {
            continuous_moving: false,
            ..EngineConfig::default()
        };
        device.tick(2.0, false, 0.0, &strict);
        // stationary with continuous_moving off: elapsed frozen too
        assert!((device.metric(MetricId::Elapsed).value() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_phantom_power_zeroed_when_stationary() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Power).set_value(180.0, 0.0);
        device.tick(1.0, false, 0.0, &EngineConfig::default());
        assert!((device.metric(MetricId::Power).value()).abs() < f64::EPSILON);
        assert!((device.metric(MetricId::WattsPerKg).value()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_external_power_override() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(25.0, 0.0);
        device.tick(1.0, true, 210.0, &EngineConfig::default());
        assert!((device.metric(MetricId::Power).value() - 210.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_instant_power_on_pause() {
        let mut device = ticked(DeviceKind::Bike);
        device.set_paused(true);
        let config = EngineConfig {
            instant_power_on_pause: true,
            ..EngineConfig::default()
        };
        device.tick(1.0, true, 300.0, &config);
        assert!((device.metric(MetricId::Power).value() - 300.0).abs() < f64::EPSILON);
        assert!((device.metric(MetricId::WattsPerKg).value() - 4.0).abs() < f64::EPSILON);
        // timers never advance while paused
        assert!((device.metric(MetricId::Elapsed).value()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pause_without_instant_power_zeroes_power() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Power).set_value(150.0, 0.0);
        device.set_paused(true);
        device.tick(1.0, true, 150.0, &EngineConfig::default());
        assert!((device.metric(MetricId::Power).value()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_elevation_gain_integration() {
        let mut device = ticked(DeviceKind::Treadmill);
        device.metric_mut(MetricId::Speed).set_value(10.0, 0.0);
        device.metric_mut(MetricId::Inclination).set_value(5.0, 0.0);
        device.tick(3.6, false, 0.0, &EngineConfig::default());
        // 10 km/h = 2.777 m/s, 5% grade for 3.6 s climbs 0.5 m
        assert!((device.metric(MetricId::ElevationGain).value() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_distance_integration() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(36.0, 0.0);
        device.integrate_distance(10.0);
        // 36 km/h for 10 s is 100 m
        assert!((device.odometer() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_clear_stats_policies() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(30.0, 1.0);
        device.metric_mut(MetricId::Distance).set_value(2.5, 1.0);
        device.clear_stats();

        // live display survives for rate channels, cumulative channels reset
        assert!((device.metric(MetricId::Speed).value() - 30.0).abs() < f64::EPSILON);
        assert!((device.metric(MetricId::Speed).average()).abs() < f64::EPSILON);
        assert!((device.metric(MetricId::Distance).value()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lap_elapsed_time() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Speed).set_value(20.0, 0.0);
        device.tick(60.0, false, 0.0, &EngineConfig::default());
        device.start_lap();
        device.tick(30.0, false, 0.0, &EngineConfig::default());

        assert_eq!(device.elapsed_time().total_seconds(), 90);
        assert_eq!(device.lap_elapsed_time().total_seconds(), 30);
    }

    #[test]
    fn test_pace_accessors() {
        let mut device = ticked(DeviceKind::Treadmill);
        device.metric_mut(MetricId::Speed).set_value(12.0, 1.0);
        assert_eq!(device.current_pace().minutes, 5);
        assert_eq!(device.max_pace().minutes, 5);
    }

    #[test]
    fn test_crank_bookkeeping() {
        let mut device = ticked(DeviceKind::Bike);
        device.metric_mut(MetricId::Cadence).set_value(60.0, 0.0);
        device.advance_cranks();
        assert_eq!(device.crank_revolutions(), 1);
        // one revolution per second at 60 rpm: 1024 ticks
        assert_eq!(device.last_crank_event_time(), 1024);

        device.metric_mut(MetricId::Cadence).set_value(0.0, 0.0);
        device.advance_cranks();
        assert_eq!(device.crank_revolutions(), 1);
    }

    #[test]
    fn test_calories_and_power_from_heart_rate() {
        use crate::types::PowerHrCalibration;

        let mut device = ticked(DeviceKind::Rower);
        device.metric_mut(MetricId::Speed).set_value(10.0, 0.0);
        device
            .metric_mut(MetricId::HeartRate)
            .set_value(150.0, 1.0);
        for _ in 0..30 {
            device.tick(1.0, false, 0.0, &EngineConfig::default());
        }
        device.update_calories_from_heart_rate(1.0, &EngineConfig::default());
        assert!(device.metric(MetricId::Calories).value() > 0.0);

        let config = EngineConfig {
            power_from_heart_rate: Some(PowerHrCalibration {
                heart_rate_low: 100.0,
                watts_low: 50.0,
                heart_rate_high: 200.0,
                watts_high: 350.0,
            }),
            ..EngineConfig::default()
        };
        device.update_power_from_heart_rate(1.0, &config);
        assert!((device.metric(MetricId::Power).value() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_grade_request_targets() {
        let mut device = DeviceState::new(DeviceKind::Bike);
        device.request_grade(250.0, 0.004, 0.6);
        let targets = device.targets();
        assert!((targets.grade.unwrap() - 250.0).abs() < f64::EPSILON);
        assert!((targets.rolling_resistance - 0.004).abs() < f64::EPSILON);
        assert!((targets.wind_resistance - 0.6).abs() < f64::EPSILON);
    }
}
