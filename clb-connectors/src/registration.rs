//! Device registration
//!
//! Once the MQTT link and the clock are both up, the device announces itself
//! with two messages:
//!
//! - `registered`: identity, friendly name and the names of the OK processes
//!   and sensors
//! - `connected`: the reset reason and code from the last boot
//!
//! The process drops back to waiting whenever the link goes down, and
//! announces itself again once it returns.

use clb_core::commands::{Command, CommandBuffer, CommandCollection, CommandItem};
use clb_core::constants::{CONNECTED_TOPIC, REGISTERED_TOPIC};
use clb_core::entity::{Entity, Process, ProcessContext, StatusBoard};
use clb_core::field::validators;
use clb_core::settings::SettingsBlock;
use clb_core::{CommandError, CommandResult, DeviceInfo, Kernel, Status};
use serde_json::{json, Value};

use crate::mqtt::WAITING_FOR_MQTT;

clb_core::settings_block! {
    /// Settings for [`RegistrationProcess`]
    pub struct RegistrationSettings => "registration", "Device registration" {
        friendly_name: String = String::new() => "friendlyName", "Friendly name", max = 30,
            validate = validators::topic_safe;
    }
}

/// Body of the `registered` message.
pub fn registration_payload(device: &DeviceInfo, friendly_name: &str, board: &StatusBoard) -> Value {
    json!({
        "name": device.name,
        "processor": device.processor,
        "friendlyName": friendly_name,
        "version": device.version,
        "macAddress": device.mac_string(),
        "processes": board.ok_processes_with_commands(),
        "sensors": board.ok_sensors(),
    })
}

/// Body of the `connected` message.
pub fn connection_payload(device: &DeviceInfo) -> Value {
    json!({
        "name": device.name,
        "reset": device.reset_reason,
        "cpu": device.processor,
        "resetcode": device.reset_code,
    })
}

fn friendly_name(kernel: &Kernel) -> String {
    kernel
        .registry()
        .setting_value("friendlyName")
        .and_then(|value| value.as_text().map(String::from))
        .unwrap_or_default()
}

fn register(kernel: &mut Kernel, _buffer: &CommandBuffer) -> CommandResult<()> {
    let board = kernel.registry().status_board();
    let registration = registration_payload(kernel.device(), &friendly_name(kernel), &board).to_string();
    let connection = connection_payload(kernel.device()).to_string();
    kernel.publish(REGISTERED_TOPIC, &registration).map_err(CommandError::Publish)?;
    kernel.publish(CONNECTED_TOPIC, &connection).map_err(CommandError::Publish)?;
    kernel.display_message(&registration);
    Ok(())
}

fn get_setup(kernel: &mut Kernel, _buffer: &CommandBuffer) -> CommandResult<()> {
    let board = kernel.registry().status_board();
    let setup = json!({
        "name": kernel.device().name,
        "processes": board.ok_processes_with_commands(),
        "sensors": board.ok_sensors(),
    });
    kernel.display_message(&setup.to_string());
    Ok(())
}

fn get_settings(kernel: &mut Kernel, buffer: &CommandBuffer) -> CommandResult<()> {
    let name = buffer.text("name").unwrap_or_default();
    let settings = kernel
        .registry()
        .settings_json(name)
        .ok_or_else(|| CommandError::UnknownProcess(name.to_string()))?;
    kernel.display_message(&settings.to_string());
    Ok(())
}

static GET_SETTINGS_ITEMS: [CommandItem; 1] =
    [CommandItem::text("name", "Process or sensor name")];

static REGISTRATION_COMMANDS: CommandCollection = CommandCollection {
    description: "Device registration and setup queries",
    commands: &[
        Command {
            name: "register",
            description: "Publish the registration messages again",
            items: &[],
            action: register,
        },
        Command {
            name: "getsetup",
            description: "Show the active processes and sensors",
            items: &[],
            action: get_setup,
        },
        Command {
            name: "getsettings",
            description: "Show the settings of a process or sensor",
            items: &GET_SETTINGS_ITEMS,
            action: get_settings,
        },
    ],
};

#[derive(Debug, Default)]
pub struct RegistrationProcess {
    settings: RegistrationSettings,
}

impl RegistrationProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: RegistrationSettings) -> Self {
        Self { settings }
    }

    fn ready(ctx: &ProcessContext<'_>) -> bool {
        let board = ctx.board();
        board.process_status("mqtt") == Some(Status::Ok) && board.sensor_status("clock") == Some(Status::Ok)
    }

    fn announce(&self, ctx: &mut ProcessContext<'_>) {
        let registration = registration_payload(ctx.device(), &self.settings.friendly_name, ctx.board());
        let connection = connection_payload(ctx.device());
        log::info!("registering as {}", ctx.device().name);
        ctx.publish(REGISTERED_TOPIC, &registration.to_string());
        ctx.publish(CONNECTED_TOPIC, &connection.to_string());
    }
}

impl Entity for RegistrationProcess {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn settings(&self) -> Option<&dyn SettingsBlock> {
        Some(&self.settings)
    }

    fn settings_mut(&mut self) -> Option<&mut dyn SettingsBlock> {
        Some(&mut self.settings)
    }

    fn status_message(&self, status: Status) -> String {
        match status {
            Status::Ok => "registered".to_string(),
            WAITING_FOR_MQTT => "waiting for MQTT and clock".to_string(),
            other => other.to_string(),
        }
    }
}

impl Process for RegistrationProcess {
    fn commands(&self) -> Option<&'static CommandCollection> {
        Some(&REGISTRATION_COMMANDS)
    }

    fn start(&mut self, _ctx: &mut ProcessContext<'_>) -> Status {
        WAITING_FOR_MQTT
    }

    fn update(&mut self, status: Status, ctx: &mut ProcessContext<'_>) -> Status {
        if !Self::ready(ctx) {
            return WAITING_FOR_MQTT;
        }
        if status != Status::Ok {
            self.announce(ctx);
        }
        Status::Ok
    }
}
