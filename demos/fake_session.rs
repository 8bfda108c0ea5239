//! Synthetic bike session driving the full bridge core without hardware.
//!
//! Ramps speed and power through a short workout, routes a couple of
//! simulation commands at the device, and prints the telemetry a driver
//! would report upstream.

use ergobridge::{
    router::{OPCODE_SIM_GRADE, OPCODE_SIM_PARAMETERS},
    CommandRouter, DeviceKind, DeviceState, EngineConfig, MetricId,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut bike = DeviceState::new(DeviceKind::Bike);
    let mut router = CommandRouter::new();
    let config = EngineConfig::default();
    let tick_secs = 0.2;

    // training app pushes the rider/road model, then a 3% climb
    router.process(
        &mut bike,
        &[OPCODE_SIM_PARAMETERS, 0x4C, 0x1D, 0x04, 0x00, 0xFE, 0x01],
    )?;
    router.process(&mut bike, &[OPCODE_SIM_GRADE, 0xD7, 0x83])?;

    for step in 0..600 {
        let ramp = f64::from(step % 300) / 300.0;
        bike.metric_mut(MetricId::Speed)
            .set_value(24.0 + 8.0 * ramp, tick_secs);
        bike.metric_mut(MetricId::Power)
            .set_value(170.0 + 60.0 * ramp, tick_secs);
        bike.metric_mut(MetricId::Cadence)
            .set_value(85.0 + 10.0 * ramp, tick_secs);
        bike.metric_mut(MetricId::HeartRate)
            .set_value(120.0 + 35.0 * ramp, tick_secs);

        bike.tick(tick_secs, false, 0.0, &config);
        bike.integrate_distance(tick_secs);
        bike.advance_cranks();
        bike.update_calories_from_heart_rate(tick_secs, &config);

        if step == 300 {
            bike.start_lap();
        }
    }

    println!("elapsed        {}", bike.elapsed_time());
    println!("moving         {}", bike.moving_time());
    println!("lap elapsed    {}", bike.lap_elapsed_time());
    println!("distance       {:.2} km", bike.odometer());
    println!("pace           {} /km", bike.current_pace());
    println!(
        "power          {:.0} W (avg {:.0}, max {:.0})",
        bike.metric(MetricId::Power).value(),
        bike.metric(MetricId::Power).average(),
        bike.metric(MetricId::Power).max(),
    );
    println!(
        "watts/kg       {:.2}",
        bike.metric(MetricId::WattsPerKg).value()
    );
    println!("mets           {:.2}", bike.metric(MetricId::Mets).value());
    println!(
        "calories       {:.1} kcal",
        bike.metric(MetricId::Calories).value()
    );
    println!(
        "target grade   {:?} (rrc {:.3}, wrc {:.3})",
        bike.targets().grade,
        bike.targets().rolling_resistance,
        bike.targets().wind_resistance,
    );

    Ok(())
}
