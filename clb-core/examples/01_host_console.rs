//! Host Console Example
//!
//! Runs the kernel on a desktop machine with the serial console attached to
//! standard input and output. Settings are kept in a directory, so changes
//! survive between runs.
//!
//! ## What You'll Learn
//!
//! - Loading a `KernelConfig` from JSON
//! - Wiring a kernel to a file store, the system clock and stdio
//! - Registering the built-in processes and sensors
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_host_console -- ./box-settings ./device.json
//! ```
//!
//! Type `help` for the command list. The simulated PIR input is fitted
//! with `pirsensorfitted=yes` followed by `restart`.

use clb_core::hal::{EnvironmentSample, SimulatedEnvironment, SimulatedPin, StdinSource};
use clb_core::output::StdoutSink;
use clb_core::processes::{ConsoleProcess, MessagesProcess};
use clb_core::sensors::{ClockSensor, EnvironmentSensor, MotionSensor};
use clb_core::settings::FileStore;
use clb_core::time::SystemTime;
use clb_core::{Kernel, KernelConfig, RestartMode};

fn load_config(path: Option<String>) -> KernelConfig {
    let Some(path) = path else {
        return KernelConfig::default();
    };
    match std::fs::read_to_string(&path).map(|text| serde_json::from_str(&text)) {
        Ok(Ok(config)) => config,
        Ok(Err(err)) => {
            eprintln!("{} is not a valid config: {}", path, err);
            KernelConfig::default()
        }
        Err(err) => {
            eprintln!("cannot read {}: {}", path, err);
            KernelConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let settings_dir = args.next().unwrap_or_else(|| String::from("clb-settings"));
    let config = load_config(args.next());

    let environment = SimulatedEnvironment::at(0x76, EnvironmentSample::new(21.0, 45.0, 1012.0));

    let mut kernel = Kernel::builder(config)
        .store(FileStore::open(&settings_dir)?)
        .output(StdoutSink)
        .time_source(SystemTime)
        .build();
    kernel.register_process(Box::new(MessagesProcess::new()))?;
    kernel.register_process(Box::new(ConsoleProcess::new(StdinSource::spawn())))?;
    kernel.register_sensor(Box::new(ClockSensor::new()))?;
    kernel.register_sensor(Box::new(EnvironmentSensor::new(environment)))?;
    kernel.register_sensor(Box::new(MotionSensor::new(SimulatedPin::new())))?;

    println!("{} version {}", kernel.device().name, clb_core::VERSION);
    println!("settings: {:?}", kernel.setup());

    let mode = kernel.run();
    kernel.shutdown();
    match mode {
        RestartMode::Cold => println!("restart requested; run again to boot with the saved settings"),
        RestartMode::ConfigHost => println!("configuration hosting is not available on the host build"),
    }
    Ok(())
}
