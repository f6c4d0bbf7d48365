//! Listener Routing Example
//!
//! Drives a kernel with simulated hardware and a mock clock, showing how
//! sensor events reach listeners.
//!
//! ## What You'll Learn
//!
//! - Fitting sensors through settings
//! - Adding listeners from the console and from code
//! - Stepping the kernel one tick at a time
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_listener_routing
//! ```

use clb_core::events::{Event, Trigger};
use clb_core::hal::{EnvironmentSample, ScriptedInput, SimulatedEnvironment, SimulatedPin};
use clb_core::listener::{ListenerBuffer, ListenerConfig};
use clb_core::output::StdoutSink;
use clb_core::processes::{ConsoleProcess, MessagesProcess};
use clb_core::sensors::{ClockSensor, EnvironmentSensor, MotionSensor};
use clb_core::time::MockTimeSource;
use clb_core::{Kernel, KernelConfig};

/// 2024-01-01 08:59:58 UTC
const START: u64 = 1_704_099_598_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Connected Little Boxes Listener Routing Example");
    println!("===============================================\n");

    let time = MockTimeSource::wall_clock(START);
    let environment = SimulatedEnvironment::at(0x77, EnvironmentSample::new(19.0, 40.0, 1005.0));
    let pin = SimulatedPin::new();

    let mut kernel = Kernel::builder(KernelConfig::default())
        .output(StdoutSink)
        .time_source(time.clone())
        .build();
    kernel.register_process(Box::new(MessagesProcess::new()))?;
    kernel.register_process(Box::new(ConsoleProcess::new(ScriptedInput::new())))?;
    kernel.register_sensor(Box::new(ClockSensor::new()))?;
    kernel.register_sensor(Box::new(EnvironmentSensor::new(environment.clone())))?;
    kernel.register_sensor(Box::new(MotionSensor::new(pin.clone())))?;
    kernel.setup();

    // Fit the hardware, then restart the sensors so they probe again
    for line in ["bme280sensorfitted=yes", "bme280envnoOfAverages=1", "pirsensorfitted=yes"] {
        kernel.perform_console_line(line);
    }
    kernel.shutdown();
    kernel.setup();

    kernel.perform_console_line("addlistener bme280 tempchanged console kitchen");
    kernel.perform_console_line("addlistener pir triggered console hall motion in the hall");

    let hour = ListenerConfig::new("chime", Trigger::event(Event::Hour));
    kernel.add_listener_transport(
        "clock",
        hour,
        Box::new(|destination: &str, buffer: &ListenerBuffer| {
            println!("[{}] hour {} at {}", destination, buffer.value, buffer.message());
        }),
    )?;

    println!("\nTicking once a second:");
    for second in 0..6 {
        match second {
            2 => environment.set_sample(EnvironmentSample::new(20.5, 41.0, 1005.0)),
            4 => pin.set_level(true),
            _ => {}
        }
        kernel.tick();
        time.advance(1000);
    }

    println!();
    kernel.perform_console_line("listeners");
    kernel.perform_console_line("readings");
    Ok(())
}
