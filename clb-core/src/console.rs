//! Built-in console commands
//!
//! Each entry in [`CONSOLE_COMMANDS`] is a name, a one-line description and
//! a handler that receives the kernel plus the rest of the line. Names
//! match case-insensitively and only as a whole first word.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde_json::{json, Value};

use crate::kernel::Kernel;
use crate::status::RestartMode;

/// One built-in console command
#[derive(Debug, Clone, Copy)]
pub struct ConsoleCommand {
    pub name: &'static str,
    pub description: &'static str,
    /// Handler; the second argument is the trimmed remainder of the line
    pub run: fn(&mut Kernel, &str),
}

/// Every built-in console command, in help order.
pub static CONSOLE_COMMANDS: &[ConsoleCommand] = &[
    ConsoleCommand { name: "help", description: "show this list", run: help },
    ConsoleCommand { name: "settings", description: "show settings, optionally filtered", run: settings },
    ConsoleCommand { name: "dump", description: "dump settings as key=value lines", run: dump },
    ConsoleCommand { name: "save", description: "save settings to storage", run: save },
    ConsoleCommand { name: "status", description: "show process and sensor status", run: status },
    ConsoleCommand { name: "restart", description: "restart the device", run: restart },
    ConsoleCommand { name: "host", description: "restart into configuration hosting", run: host },
    ConsoleCommand { name: "clear", description: "factory reset and restart", run: clear },
    ConsoleCommand { name: "commands", description: "describe remote commands", run: commands },
    ConsoleCommand { name: "commandsjson", description: "describe remote commands as JSON", run: commands_json },
    ConsoleCommand { name: "sensors", description: "list sensors", run: sensors },
    ConsoleCommand { name: "sensorsjson", description: "list sensors and triggers as JSON", run: sensors_json },
    ConsoleCommand { name: "readings", description: "show current readings as JSON", run: readings },
    ConsoleCommand { name: "listeners", description: "list sensor listeners", run: listeners },
    ConsoleCommand {
        name: "addlistener",
        description: "addlistener <sensor> <trigger> <process> <destination> [message]",
        run: add_listener,
    },
    ConsoleCommand { name: "clearalllisteners", description: "remove every listener", run: clear_all_listeners },
    ConsoleCommand {
        name: "clearsensorlisteners",
        description: "clearsensorlisteners <sensor>",
        run: clear_sensor_listeners,
    },
    ConsoleCommand { name: "storage", description: "list stored settings records", run: storage },
    ConsoleCommand { name: "exportsettings", description: "export settings as JSON", run: export_settings },
    ConsoleCommand { name: "importsettings", description: "importsettings <json>", run: import_settings },
    ConsoleCommand { name: "test", description: "test <sensor>; ESC or endtest stops", run: test },
    ConsoleCommand { name: "endtest", description: "end a sensor test", run: end_test },
];

/// Command named by the first word of `line`, with the remaining text.
pub fn find(line: &str) -> Option<(&'static ConsoleCommand, &str)> {
    let line = line.trim_start();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line.trim_end(), ""),
    };
    CONSOLE_COMMANDS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(word))
        .map(|c| (c, rest))
}

fn filter(args: &str) -> Option<&str> {
    (!args.is_empty()).then_some(args)
}

fn help(kernel: &mut Kernel, _args: &str) {
    let mut text = String::from("Commands:\n");
    for command in CONSOLE_COMMANDS {
        text.push_str(&format!("    {} - {}\n", command.name, command.description));
    }
    text.push_str("Enter a setting key to view it, or key=value to change it.");
    kernel.reply(&text);
}

fn settings(kernel: &mut Kernel, args: &str) {
    let mut text = String::new();
    if kernel.registry().display_all_settings(filter(args), &mut text) == 0 {
        kernel.reply("no matching settings");
    } else {
        kernel.reply(text.trim_end());
    }
}

fn dump(kernel: &mut Kernel, args: &str) {
    let mut text = String::new();
    kernel.registry().dump_all_settings(filter(args), &mut text);
    // Only the final newline; text values may end in spaces
    kernel.reply(text.strip_suffix('\n').unwrap_or(&text));
}

fn save(kernel: &mut Kernel, _args: &str) {
    match kernel.save_settings() {
        Ok(_) => kernel.reply("settings saved"),
        Err(err) => kernel.reply(&format!("settings save failed: {}", err)),
    }
}

fn status(kernel: &mut Kernel, _args: &str) {
    let registry = kernel.registry();
    let mut lines: Vec<String> = Vec::new();
    lines.push(String::from("Processes:"));
    for (_, process, status) in registry.processes() {
        lines.push(format!("    {}: {}", process.name(), process.status_message(status)));
    }
    lines.push(String::from("Sensors:"));
    for (_, sensor, status) in registry.sensors() {
        lines.push(format!("    {}: {}", sensor.name(), sensor.status_message(status)));
    }
    kernel.reply(&lines.join("\n"));
}

fn restart(kernel: &mut Kernel, _args: &str) {
    kernel.reply("restarting");
    kernel.request_restart(RestartMode::Cold);
}

fn host(kernel: &mut Kernel, _args: &str) {
    kernel.reply("restarting into configuration hosting");
    kernel.request_restart(RestartMode::ConfigHost);
}

fn clear(kernel: &mut Kernel, _args: &str) {
    kernel.reply("clearing settings");
    kernel.factory_reset();
}

fn commands(kernel: &mut Kernel, _args: &str) {
    let mut text = String::new();
    for (process, collection) in kernel.registry().command_collections() {
        collection.describe_text(process, &mut text);
    }
    if text.is_empty() {
        kernel.reply("no remote commands");
    } else {
        kernel.reply(text.trim_end());
    }
}

fn commands_json(kernel: &mut Kernel, _args: &str) {
    let collections: Vec<Value> = kernel
        .registry()
        .command_collections()
        .map(|(process, collection)| collection.to_json(process))
        .collect();
    let text = Value::Array(collections).to_string();
    kernel.reply(&text);
}

fn sensors(kernel: &mut Kernel, _args: &str) {
    let lines: Vec<String> = kernel
        .registry()
        .sensors()
        .map(|(_, sensor, status)| format!("    {} version {}: {}", sensor.name(), sensor.version(), status))
        .collect();
    if lines.is_empty() {
        kernel.reply("no sensors");
    } else {
        kernel.reply(&lines.join("\n"));
    }
}

fn sensors_json(kernel: &mut Kernel, _args: &str) {
    let sensors: Vec<Value> = kernel
        .registry()
        .sensors()
        .map(|(_, sensor, status)| {
            let triggers: Vec<&str> = sensor.event_binders().iter().map(|b| b.name).collect();
            json!({
                "name": sensor.name(),
                "version": sensor.version(),
                "status": status.label(),
                "triggers": triggers,
            })
        })
        .collect();
    let text = json!({ "sensors": sensors }).to_string();
    kernel.reply(&text);
}

fn readings(kernel: &mut Kernel, _args: &str) {
    let text = kernel.registry().readings_json(kernel.now()).to_string();
    kernel.reply(&text);
}

fn listeners(kernel: &mut Kernel, _args: &str) {
    let registry = kernel.registry();
    let mut lines = Vec::new();
    for (handle, sensor, _) in registry.sensors() {
        let Some(list) = registry.listeners(handle) else {
            continue;
        };
        for listener in list.iter() {
            lines.push(format!(
                "    {}: {} channels {:#04x} -> {} \"{}\" ({} sent)",
                sensor.name(),
                listener.config.trigger.event,
                listener.config.trigger.channels.bits(),
                listener.transport_description(),
                listener.config.destination,
                listener.deliveries(),
            ));
        }
    }
    if lines.is_empty() {
        kernel.reply("no listeners");
    } else {
        kernel.reply(&lines.join("\n"));
    }
}

/// First whitespace-separated word of `text` and the remainder.
fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    Some((&text[..end], &text[end..]))
}

fn add_listener(kernel: &mut Kernel, args: &str) {
    let mut words = Vec::new();
    let mut rest = args;
    while words.len() < 4 {
        let Some((word, remainder)) = split_word(rest) else {
            break;
        };
        words.push(word);
        rest = remainder;
    }
    let [sensor, trigger, process, destination] = words[..] else {
        kernel.reply("usage: addlistener <sensor> <trigger> <process> <destination> [message]");
        return;
    };
    let message = filter(rest.trim());
    match kernel.add_listener(sensor, trigger, process, destination, message) {
        Ok(()) => kernel.reply("listener added"),
        Err(err) => kernel.reply(&format!("listener not added: {}", err)),
    }
}

fn clear_all_listeners(kernel: &mut Kernel, _args: &str) {
    kernel.registry_mut().clear_all_listeners();
    kernel.reply("listeners cleared");
}

fn clear_sensor_listeners(kernel: &mut Kernel, args: &str) {
    if kernel.registry_mut().clear_sensor_listeners(args) {
        kernel.reply("listeners cleared");
    } else {
        kernel.reply("sensor not found");
    }
}

fn storage(kernel: &mut Kernel, _args: &str) {
    match kernel.stored_records() {
        Ok(names) if names.is_empty() => kernel.reply("storage is empty"),
        Ok(names) => kernel.reply(&format!("stored: {}", names.join(", "))),
        Err(err) => kernel.reply(&format!("storage unavailable: {}", err)),
    }
}

fn export_settings(kernel: &mut Kernel, _args: &str) {
    let text = kernel.registry().export_settings_json().to_string();
    kernel.reply(&text);
}

fn import_settings(kernel: &mut Kernel, args: &str) {
    let Ok(json) = serde_json::from_str::<Value>(args) else {
        kernel.reply("import failed: not valid JSON");
        return;
    };
    match kernel.registry_mut().import_settings_json(&json) {
        Ok(report) => {
            let mut text = format!("{} settings applied", report.applied);
            if !report.rejected.is_empty() {
                text.push_str(&format!(", rejected: {}", report.rejected.join(", ")));
            }
            kernel.reply(&text);
        }
        Err(err) => kernel.reply(&format!("import failed: {}", err)),
    }
}

fn test(kernel: &mut Kernel, args: &str) {
    if kernel.start_sensor_test(args) {
        kernel.reply("testing sensor; press ESC or enter endtest to stop");
    } else {
        kernel.reply("sensor not found");
    }
}

fn end_test(kernel: &mut Kernel, _args: &str) {
    kernel.end_sensor_test();
}
