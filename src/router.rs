//! Inbound command routing for the virtual-peripheral control point
//!
//! Training applications write simulation commands at the virtual peripheral;
//! this router decodes them into target state on the owning [`DeviceState`]
//! and builds the three-byte acknowledgement the protocol expects.

use bytes::Buf;
use tracing::debug;

use crate::{
    device::DeviceState,
    error::{BridgeError, Result},
    types::DeviceKind,
};

/// Opcode: set simulation parameters (rider weight, rolling and wind
/// resistance coefficients)
pub const OPCODE_SIM_PARAMETERS: u8 = 0x11;
/// Opcode: set simulated grade
pub const OPCODE_SIM_GRADE: u8 = 0x46;

/// First byte of every acknowledgement reply
pub const RESPONSE_CODE: u8 = 0x80;
/// Success status closing every acknowledgement reply
pub const RESPONSE_SUCCESS: u8 = 0x01;

/// Decodes control-point writes into device target state
///
/// Holds the calibration fields parsed out of simulation-parameters commands
/// so a later grade command can forward the full resistance model. One router
/// per bridged device; calls must be serialized by the owner.
#[derive(Debug, Clone, Default)]
pub struct CommandRouter {
    weight_kg: f64,
    rolling_resistance: f64,
    wind_resistance: f64,
    last_grade_pct: f64,
}

impl CommandRouter {
    /// New router with zeroed calibration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rider weight from the last simulation-parameters command, kg
    #[must_use]
    pub const fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    /// Rolling-resistance coefficient from the last parameters command
    #[must_use]
    pub const fn rolling_resistance(&self) -> f64 {
        self.rolling_resistance
    }

    /// Wind-resistance coefficient from the last parameters command
    #[must_use]
    pub const fn wind_resistance(&self) -> f64 {
        self.wind_resistance
    }

    /// Last simulated grade decoded, percent
    #[must_use]
    pub const fn last_grade_pct(&self) -> f64 {
        self.last_grade_pct
    }

    /// Process one inbound control-point write
    ///
    /// The opcode is byte 0 of the payload and is acted on only for bike-type
    /// devices; treadmill and elliptical writes are accepted but currently
    /// route nowhere. Every non-empty payload gets the same three-byte
    /// acknowledgement `[RESPONSE_CODE, opcode, RESPONSE_SUCCESS]`, including
    /// unrecognized opcodes: the ack means "syntactically accepted", not
    /// "semantically processed".
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidCommand`] for an empty payload; no reply bytes
    /// exist in that case and no state was touched.
    pub fn process(&mut self, device: &mut DeviceState, payload: &[u8]) -> Result<Vec<u8>> {
        let Some(&opcode) = payload.first() else {
            return Err(BridgeError::InvalidCommand);
        };

        if device.kind() == DeviceKind::Bike {
            match opcode {
                OPCODE_SIM_PARAMETERS if payload.len() >= 7 => {
                    let mut fields = &payload[1..7];
                    self.weight_kg = f64::from(fields.get_u16_le()) / 100.0;
                    self.rolling_resistance = f64::from(fields.get_u16_le()) / 1000.0;
                    self.wind_resistance = f64::from(fields.get_u16_le()) / 1000.0;
                    debug!(
                        weight = self.weight_kg,
                        rrc = self.rolling_resistance,
                        wrc = self.wind_resistance,
                        "simulation parameters"
                    );
                }
                OPCODE_SIM_GRADE if payload.len() >= 3 => {
                    let mut field = &payload[1..3];
                    let raw = field.get_u16_le();
                    let grade = (f64::from(raw) / 65535.0).mul_add(2.0, -1.0) * 100.0;
                    debug!(raw, grade, "simulation grade");
                    self.last_grade_pct = grade;
                    // actuation expects grade in fixed-point hundredths
                    device.request_grade(
                        grade * 100.0,
                        self.rolling_resistance,
                        self.wind_resistance,
                    );
                }
                other => {
                    debug!(opcode = other, "unhandled control-point opcode");
                }
            }
        }

        Ok(vec![RESPONSE_CODE, opcode, RESPONSE_SUCCESS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike() -> DeviceState {
        DeviceState::new(DeviceKind::Bike)
    }

    #[test]
    fn test_sim_parameters_scaling() {
        let mut router = CommandRouter::new();
        let mut device = bike();
        // weight 75.00 kg, rrc 0.004, wrc 0.510
        let payload = [
            OPCODE_SIM_PARAMETERS,
            0x4C,
            0x1D, // 7500
            0x04,
            0x00, // 4
            0xFE,
            0x01, // 510
        ];
        let reply = router.process(&mut device, &payload).unwrap();

        assert!((router.weight_kg() - 75.0).abs() < 1e-9);
        assert!((router.rolling_resistance() - 0.004).abs() < 1e-9);
        assert!((router.wind_resistance() - 0.510).abs() < 1e-9);
        assert_eq!(reply, vec![RESPONSE_CODE, OPCODE_SIM_PARAMETERS, RESPONSE_SUCCESS]);
    }

    #[test]
    fn test_sim_parameters_small_weight() {
        let mut router = CommandRouter::new();
        let mut device = bike();
        let payload = [OPCODE_SIM_PARAMETERS, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00];
        router.process(&mut device, &payload).unwrap();
        assert!((router.weight_kg() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_sim_grade_endpoints() {
        let mut router = CommandRouter::new();
        let mut device = bike();

        router
            .process(&mut device, &[OPCODE_SIM_GRADE, 0xFF, 0xFF])
            .unwrap();
        assert!((router.last_grade_pct() - 100.0).abs() < 1e-9);

        router
            .process(&mut device, &[OPCODE_SIM_GRADE, 0x00, 0x00])
            .unwrap();
        assert!((router.last_grade_pct() + 100.0).abs() < 1e-9);

        router
            .process(&mut device, &[OPCODE_SIM_GRADE, 0xFF, 0x7F])
            .unwrap();
        assert!(router.last_grade_pct().abs() < 0.01);
    }

    #[test]
    fn test_sim_grade_forwards_fixed_point() {
        let mut router = CommandRouter::new();
        let mut device = bike();

        // arm the resistance model first
        let params = [OPCODE_SIM_PARAMETERS, 0x4C, 0x1D, 0x04, 0x00, 0xFE, 0x01];
        router.process(&mut device, &params).unwrap();
        router
            .process(&mut device, &[OPCODE_SIM_GRADE, 0xFF, 0xFF])
            .unwrap();

        let targets = device.targets();
        // +100% forwarded as hundredths
        assert!((targets.grade.unwrap() - 10000.0).abs() < 1e-6);
        assert!((targets.rolling_resistance - 0.004).abs() < 1e-9);
        assert!((targets.wind_resistance - 0.510).abs() < 1e-9);
    }

    #[test]
    fn test_short_grade_payload_ignored_but_acked() {
        let mut router = CommandRouter::new();
        let mut device = bike();
        let reply = router
            .process(&mut device, &[OPCODE_SIM_GRADE, 0x42])
            .unwrap();
        assert_eq!(reply, vec![RESPONSE_CODE, OPCODE_SIM_GRADE, RESPONSE_SUCCESS]);
        assert!(device.targets().grade.is_none());
    }

    #[test]
    fn test_unknown_opcode_acked_without_mutation() {
        let mut router = CommandRouter::new();
        let mut device = bike();
        let reply = router.process(&mut device, &[0x7E, 0x01, 0x02]).unwrap();
        assert_eq!(reply, vec![RESPONSE_CODE, 0x7E, RESPONSE_SUCCESS]);
        assert!(device.targets().grade.is_none());
        assert!(router.weight_kg().abs() < f64::EPSILON);
    }

    #[test]
    fn test_treadmill_payload_pass_through() {
        let mut router = CommandRouter::new();
        let mut device = DeviceState::new(DeviceKind::Treadmill);
        let payload = [OPCODE_SIM_GRADE, 0xFF, 0xFF];
        let reply = router.process(&mut device, &payload).unwrap();
        // acked, but no bike-side state change
        assert_eq!(reply, vec![RESPONSE_CODE, OPCODE_SIM_GRADE, RESPONSE_SUCCESS]);
        assert!(device.targets().grade.is_none());
        assert!(router.last_grade_pct().abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_payload_is_invalid() {
        let mut router = CommandRouter::new();
        let mut device = bike();
        assert!(matches!(
            router.process(&mut device, &[]),
            Err(BridgeError::InvalidCommand)
        ));
    }
}
