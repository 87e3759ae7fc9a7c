/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The diagnostics console: command registration, dispatch and the async run
//! loop, fed by a stdin reader thread.
//!
//! A console failure never takes the bring-up down with it: the run loop logs
//! handler errors and keeps going, and input lines are dropped once the line
//! queue is full.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::error::{Error, ErrorCode};
use crate::nvs::Nvs;
use crate::stack::Stack;
use crate::telemetry::{self, MetricValue, Metrics};
use crate::utils::std_mutex::StdRawMutex;

#[cfg(feature = "controller")]
use crate::controller::ControllerClient;
#[cfg(feature = "thread-br")]
use crate::thread_br::ThreadBorderRouter;

/// Capacity of the command registry
pub const MAX_COMMANDS: usize = 16;

/// Maximum length of an input line
pub const MAX_LINE: usize = 128;

/// Maximum number of tokens on an input line
pub const MAX_ARGS: usize = 8;

/// Depth of the input line queue
const QUEUE_DEPTH: usize = 4;

/// A console command handler.
pub type CommandHandler = fn(&CommandContext<'_>, &[&str]) -> Result<(), Error>;

/// A registered console command.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

/// References handed to command handlers.
pub struct CommandContext<'a> {
    pub metrics: &'a Metrics,
    pub nvs: &'a Nvs,
    pub stack: &'a Stack<'a>,
    /// The endpoint commands target by default. Placeholder, 0 on bring-up.
    pub switch_endpoint_id: u16,
    #[cfg(feature = "controller")]
    pub controller: Option<&'a ControllerClient>,
    #[cfg(feature = "thread-br")]
    pub thread_br: Option<&'a ThreadBorderRouter>,
}

/// The interactive console.
///
/// Shareable with the stdin reader thread: registration and the line queue
/// are both behind thread-safe primitives.
pub struct Console {
    commands: Mutex<StdRawMutex, RefCell<heapless::Vec<Command, MAX_COMMANDS>>>,
    lines: Channel<StdRawMutex, heapless::String<MAX_LINE>, QUEUE_DEPTH>,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            commands: Mutex::new(RefCell::new(heapless::Vec::new())),
            lines: Channel::new(),
        }
    }

    /// Register a set of commands.
    ///
    /// Fails with `Duplicate` on a name clash and `ResourceExhausted` when
    /// the registry is full.
    pub fn register(&self, set: &[Command]) -> Result<(), Error> {
        self.commands.lock(|commands| {
            let mut commands = commands.borrow_mut();

            for cmd in set {
                if commands.iter().any(|c| c.name == cmd.name) {
                    Err(ErrorCode::Duplicate)?;
                }

                commands
                    .push(*cmd)
                    .map_err(|_| Error::new(ErrorCode::ResourceExhausted))?;
            }

            Ok(())
        })
    }

    /// Enqueue an input line. Called by the stdin reader thread; drops the
    /// line when the queue is full.
    pub fn feed(&self, line: &str) {
        let mut owned = heapless::String::new();

        for c in line.chars() {
            if owned.push(c).is_err() {
                warn!("Truncating console input to {MAX_LINE} characters");
                break;
            }
        }

        if self.lines.try_send(owned).is_err() {
            warn!("Console queue full, dropping input line");
        }
    }

    /// Tokenize and execute one input line.
    pub fn dispatch(&self, ctx: &CommandContext<'_>, line: &str) -> Result<(), Error> {
        let mut argv: heapless::Vec<&str, MAX_ARGS> = heapless::Vec::new();

        for token in line.split_whitespace() {
            argv.push(token)
                .map_err(|_| Error::new(ErrorCode::InvalidArgument))?;
        }

        let Some(name) = argv.first() else {
            return Ok(());
        };

        if *name == "help" {
            self.commands.lock(|commands| {
                info!("help: List the registered commands");
                for cmd in commands.borrow().iter() {
                    info!("{}: {}", cmd.name, cmd.help);
                }
            });

            return Ok(());
        }

        let handler = self.commands.lock(|commands| {
            commands
                .borrow()
                .iter()
                .find(|c| c.name == *name)
                .map(|c| c.handler)
        });

        match handler {
            Some(handler) => handler(ctx, &argv[1..]),
            None => Err(ErrorCode::NotFound.into()),
        }
    }

    /// Run the console: await input lines and dispatch them, absorbing
    /// handler failures.
    pub async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), Error> {
        info!("Console ready; type 'help' for the command list");

        loop {
            let line = self.lines.receive().await;

            if let Err(e) = self.dispatch(ctx, &line) {
                warn!("Command '{}' failed: {}", line.as_str(), e);
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the stdin reader thread feeding the given console.
pub fn spawn_stdin_reader(
    console: &'static Console,
) -> Result<std::thread::JoinHandle<()>, Error> {
    let handle = std::thread::Builder::new()
        .name("console-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();

            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => console.feed(line.trim_end()),
                    Err(e) => {
                        warn!("Console stdin error: {e}");
                        break;
                    }
                }
            }
        })?;

    Ok(handle)
}

/// Register the diagnostics command set.
pub fn diagnostics_register_commands(console: &Console) -> Result<(), Error> {
    console.register(&[
        Command {
            name: "metrics",
            help: "Dump the telemetry metrics",
            handler: cmd_metrics,
        },
        Command {
            name: "device-info",
            help: "Print the device identity",
            handler: cmd_device_info,
        },
        Command {
            name: "mem",
            help: "Print the memory footprint of the runtime objects",
            handler: cmd_mem,
        },
        Command {
            name: "stats",
            help: "Print the transport counters",
            handler: cmd_stats,
        },
    ])
}

/// Register the Wi-Fi command set.
pub fn wifi_register_commands(console: &Console) -> Result<(), Error> {
    console.register(&[
        Command {
            name: "wifi-status",
            help: "Show the provisioned Wi-Fi network",
            handler: cmd_wifi_status,
        },
        Command {
            name: "wifi-connect",
            help: "wifi-connect <ssid> <passphrase>: provision a Wi-Fi network",
            handler: cmd_wifi_connect,
        },
    ])
}

/// Register the controller command set.
#[cfg(feature = "controller")]
pub fn controller_register_commands(console: &Console) -> Result<(), Error> {
    console.register(&[
        Command {
            name: "controller-info",
            help: "Show the controller client state",
            handler: cmd_controller_info,
        },
        Command {
            name: "pairing",
            help: "pairing <node-id> <pin>: commission a node onto the fabric",
            handler: cmd_pairing,
        },
    ])
}

/// Register the Thread border-router command set.
#[cfg(feature = "thread-br")]
pub fn thread_br_register_commands(console: &Console) -> Result<(), Error> {
    console.register(&[Command {
        name: "br-status",
        help: "Show the Thread border-router state",
        handler: cmd_br_status,
    }])
}

fn cmd_metrics(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    ctx.metrics.for_each(|key, value| match value {
        MetricValue::Unsigned(v) => info!("{key}: {v}"),
        MetricValue::Str(v) => info!("{key}: {v}"),
    });

    Ok(())
}

fn cmd_device_info(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    telemetry::device_info_dump(ctx.stack.dev_det());

    Ok(())
}

fn cmd_mem(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    info!(
        "Hub memory: Stack={}B, Metrics={}B, Console={}B",
        core::mem::size_of_val(ctx.stack),
        core::mem::size_of_val(ctx.metrics),
        core::mem::size_of::<Console>()
    );

    Ok(())
}

fn cmd_stats(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    info!(
        "Transport: {} packets / {} bytes received, {} events dispatched",
        ctx.stack.rx_packets(),
        ctx.stack.rx_bytes(),
        ctx.stack.events_dispatched()
    );

    Ok(())
}

fn cmd_wifi_status(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    let mut buf = [0; 64];

    match ctx.nvs.get("wifi", "ssid", &mut buf)? {
        Some(ssid) => info!("Provisioned for SSID '{}'", core::str::from_utf8(ssid)?),
        None => info!("No Wi-Fi network provisioned"),
    }

    Ok(())
}

fn cmd_wifi_connect(ctx: &CommandContext<'_>, args: &[&str]) -> Result<(), Error> {
    let [ssid, passphrase] = args else {
        return Err(ErrorCode::InvalidArgument.into());
    };

    ctx.nvs.set("wifi", "ssid", ssid.as_bytes())?;
    ctx.nvs.set("wifi", "psk", passphrase.as_bytes())?;

    info!("Provisioned Wi-Fi network '{ssid}'");

    Ok(())
}

#[cfg(feature = "controller")]
fn cmd_controller_info(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    let client = ctx.controller.ok_or(ErrorCode::InvalidState)?;

    info!(
        "Controller: state {:?}, node id {}, fabric id {}, port {}",
        client.state(),
        client.node_id(),
        client.fabric_id(),
        client.port()
    );

    Ok(())
}

#[cfg(feature = "controller")]
fn cmd_pairing(ctx: &CommandContext<'_>, args: &[&str]) -> Result<(), Error> {
    use crate::controller::ControllerState;

    let client = ctx.controller.ok_or(ErrorCode::InvalidState)?;

    let [node_id, pin] = args else {
        return Err(ErrorCode::InvalidArgument.into());
    };

    let node_id: u64 = node_id
        .parse()
        .map_err(|_| Error::new(ErrorCode::InvalidArgument))?;
    let pin: u32 = pin
        .parse()
        .map_err(|_| Error::new(ErrorCode::InvalidArgument))?;

    if client.state() != ControllerState::Commissioner {
        Err(ErrorCode::InvalidState)?;
    }

    info!(
        "Commissioning node {node_id} with setup PIN {pin} (default endpoint {})",
        ctx.switch_endpoint_id
    );

    Ok(())
}

#[cfg(feature = "thread-br")]
fn cmd_br_status(ctx: &CommandContext<'_>, _args: &[&str]) -> Result<(), Error> {
    let br = ctx.thread_br.ok_or(ErrorCode::InvalidState)?;

    if br.is_launched() {
        info!("Thread border router: running");
    } else {
        info!("Thread border router: not launched");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DeviceInfo;
    use crate::utils::rand::dummy_rand;

    const DEV_DET: DeviceInfo<'static> = DeviceInfo {
        vid: 0xfff1,
        pid: 0x8001,
        hw_ver: 1,
        sw_ver: 1,
        sw_ver_str: "1.0",
        serial_no: "test-serial",
        device_name: "Test Hub",
        vendor_name: "Test Vendor",
        product_name: "Test Product",
    };

    fn test_nvs(tag: &str) -> Nvs {
        let dir = std::env::temp_dir()
            .join("rs-hub-shell-tests")
            .join(format!("{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let nvs = Nvs::new(&dir);
        nvs.init().unwrap();

        nvs
    }

    fn test_ctx<'a>(metrics: &'a Metrics, nvs: &'a Nvs, stack: &'a Stack<'a>) -> CommandContext<'a> {
        CommandContext {
            metrics,
            nvs,
            stack,
            switch_endpoint_id: 0,
            #[cfg(feature = "controller")]
            controller: None,
            #[cfg(feature = "thread-br")]
            thread_br: None,
        }
    }

    #[test]
    fn registration_rejects_duplicates() {
        let console = Console::new();

        diagnostics_register_commands(&console).unwrap();
        assert_eq!(
            diagnostics_register_commands(&console).unwrap_err().code(),
            ErrorCode::Duplicate
        );
    }

    #[test]
    fn dispatches_registered_commands() {
        let console = Console::new();
        diagnostics_register_commands(&console).unwrap();
        wifi_register_commands(&console).unwrap();

        let metrics = Metrics::new();
        let nvs = test_nvs("dispatch");
        let stack = Stack::new(&DEV_DET, dummy_rand, 0);
        let ctx = test_ctx(&metrics, &nvs, &stack);

        console.dispatch(&ctx, "help").unwrap();
        console.dispatch(&ctx, "metrics").unwrap();
        console.dispatch(&ctx, "mem").unwrap();
        console.dispatch(&ctx, "").unwrap();

        console
            .dispatch(&ctx, "wifi-connect home-net hunter2")
            .unwrap();
        console.dispatch(&ctx, "wifi-status").unwrap();

        let mut buf = [0; 64];
        assert_eq!(
            nvs.get("wifi", "ssid", &mut buf).unwrap(),
            Some(&b"home-net"[..])
        );
    }

    #[test]
    fn unknown_command_is_not_found() {
        let console = Console::new();

        let metrics = Metrics::new();
        let nvs = test_nvs("unknown");
        let stack = Stack::new(&DEV_DET, dummy_rand, 0);
        let ctx = test_ctx(&metrics, &nvs, &stack);

        assert_eq!(
            console.dispatch(&ctx, "frobnicate").unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let console = Console::new();
        wifi_register_commands(&console).unwrap();

        let metrics = Metrics::new();
        let nvs = test_nvs("badargs");
        let stack = Stack::new(&DEV_DET, dummy_rand, 0);
        let ctx = test_ctx(&metrics, &nvs, &stack);

        assert_eq!(
            console.dispatch(&ctx, "wifi-connect").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            console
                .dispatch(&ctx, "wifi-connect a b c d e f g h i")
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn full_queue_drops_lines() {
        let console = Console::new();

        for _ in 0..QUEUE_DEPTH + 3 {
            console.feed("metrics");
        }

        for _ in 0..QUEUE_DEPTH {
            assert!(console.lines.try_receive().is_ok());
        }
        assert!(console.lines.try_receive().is_err());
    }

    #[cfg(feature = "controller")]
    #[test]
    fn pairing_requires_commissioner_state() {
        use crate::controller::ControllerClient;

        let console = Console::new();
        controller_register_commands(&console).unwrap();

        let metrics = Metrics::new();
        let nvs = test_nvs("pairing");
        let stack = Stack::new(&DEV_DET, dummy_rand, 0);
        let client = ControllerClient::new(dummy_rand);

        let mut ctx = test_ctx(&metrics, &nvs, &stack);
        ctx.controller = Some(&client);

        assert_eq!(
            console
                .dispatch(&ctx, "pairing 55 20202021")
                .unwrap_err()
                .code(),
            ErrorCode::InvalidState
        );

        {
            let guard = stack.lock().unwrap();
            client.init(&guard, 112233, 1, 5580).unwrap();
            client.setup_commissioner(&guard).unwrap();
        }

        console.dispatch(&ctx, "pairing 55 20202021").unwrap();
        console.dispatch(&ctx, "controller-info").unwrap();

        assert_eq!(
            console
                .dispatch(&ctx, "pairing nope 20202021")
                .unwrap_err()
                .code(),
            ErrorCode::InvalidArgument
        );
    }
}
