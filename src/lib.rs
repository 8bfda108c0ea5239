#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Ergobridge 🚴
//!
//! Core engine for bridging physical exercise equipment (bikes, treadmills,
//! rowers, ellipticals) to a uniform virtual fitness peripheral that training
//! applications consume as a single standard protocol.
//!
//! Vendor drivers, radios and serial ports live outside this crate. What
//! lives here is the part every driver shares:
//!
//! - **Metric engine** ([`DeviceState`], [`Metric`]): time-weighted workout
//!   accumulators with pause/lap/clear semantics and the derived-value
//!   formulas (calories, METs, elevation gain, weight loss, watts per kg).
//! - **Frame codec** ([`csafe`]): the checksummed, byte-stuffed serial frame
//!   format used by rowing ergometers, with streaming reassembly through
//!   [`csafe::FrameReader`].
//! - **Command router** ([`CommandRouter`]): decodes the simulation-mode
//!   writes arriving through the virtual-peripheral role into target state
//!   and builds the acknowledgement replies.
//!
//! ## Quick Start
//!
//! ```
//! use ergobridge::{CommandRouter, DeviceKind, DeviceState, EngineConfig, MetricId};
//!
//! let mut bike = DeviceState::new(DeviceKind::Bike);
//! let config = EngineConfig::default();
//!
//! // driver tick loop: arm the engine, then feed sensor readings
//! bike.tick(0.2, false, 0.0, &config);
//! bike.metric_mut(MetricId::Speed).set_value(30.0, 0.2);
//! bike.metric_mut(MetricId::Power).set_value(180.0, 0.2);
//! bike.tick(0.2, false, 0.0, &config);
//! bike.integrate_distance(0.2);
//!
//! // a training app asks for a 2% simulated grade
//! let mut router = CommandRouter::new();
//! let reply = router.process(&mut bike, &[0x46, 0x8F, 0x82])?;
//! assert_eq!(reply.len(), 3);
//! # Ok::<(), ergobridge::BridgeError>(())
//! ```
//!
//! ## Threading
//!
//! A [`DeviceState`] is owned by exactly one driver context; ticks, sensor
//! callbacks and routed commands must be serialized onto it. Every operation
//! here is bounded, synchronous and free of I/O.

/// CSAFE-style frame codec and streaming reassembly
pub mod csafe;
/// Device session state and the per-tick metric engine
pub mod device;
/// Error types and handling
pub mod error;
/// Single metric channel and derived-value formulas
pub mod metric;
/// Virtual-peripheral command routing
pub mod router;
/// Shared type definitions and configuration snapshots
pub mod types;

// Re-export the main types for convenient usage
pub use csafe::{Command, CommandRegistry, FrameReader, Response};
pub use device::{DeviceState, TargetState};
pub use error::{BridgeError, Result};
pub use metric::{Accumulator, Metric};
pub use router::CommandRouter;
pub use types::{
    DeviceKind, EngineConfig, MetricId, PowerHrCalibration, ResetPolicy, WorkoutTime,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
