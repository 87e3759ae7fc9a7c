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

//! The Matter controller-hub bring-up binary.
//!
//! Brings the subsystems up in a fixed order - telemetry, storage, console,
//! protocol stack, commissioner - and then runs the composed tasks forever.
//! Only a protocol-stack start failure is fatal; every other bring-up step
//! logs its failure and carries on.

use core::pin::pin;

#[cfg(not(feature = "shell"))]
use embassy_futures::select::select3;
#[cfg(feature = "shell")]
use embassy_futures::select::select4;

use log::{error, info, warn};

use rs_hub::error::Error;
use rs_hub::nvs::Nvs;
use rs_hub::stack::{PlatformEvent, Stack, StackEvent, MATTER_PORT};
use rs_hub::telemetry::{self, DeviceInfo, Metrics};
use rs_hub::utils::rand::sys_rand;
use rs_hub::utils::select::Coalesce;

#[cfg(feature = "controller")]
use rs_hub::controller::ControllerClient;
#[cfg(feature = "shell")]
use rs_hub::shell::{self, CommandContext, Console};
#[cfg(feature = "thread-br")]
use rs_hub::thread_br::{PlatformConfig, ThreadBorderRouter};

use static_cell::StaticCell;

static DEV_DET: DeviceInfo<'static> = DeviceInfo {
    vid: 0xfff1,
    pid: 0x8001,
    hw_ver: 1,
    sw_ver: 1,
    sw_ver_str: "1.0",
    serial_no: "aabbccddee",
    device_name: "CTLR",
    vendor_name: "TEST_VENDOR",
    product_name: "Controller Hub",
};

// Statically allocate in BSS the long-lived objects
static STACK: StaticCell<Stack<'static>> = StaticCell::new();
static METRICS: StaticCell<Metrics> = StaticCell::new();
static NVS: StaticCell<Nvs> = StaticCell::new();
#[cfg(feature = "shell")]
static CONSOLE: StaticCell<Console> = StaticCell::new();
#[cfg(feature = "controller")]
static CONTROLLER: StaticCell<ControllerClient> = StaticCell::new();
#[cfg(feature = "thread-br")]
static THREAD_BR: ThreadBorderRouter = ThreadBorderRouter::new();

/// Scratch bring-up state.
struct App {
    /// Placeholder until endpoint composition lands here; commands default
    /// to this endpoint.
    switch_endpoint_id: u16,
}

fn app_event_cb(event: &StackEvent) {
    match event {
        StackEvent::InterfaceIpAddressChanged => info!("Interface IP Address changed"),
        StackEvent::Platform(PlatformEvent::WifiStationGotIp(_)) => {
            #[cfg(feature = "thread-br")]
            THREAD_BR.handle_event(event, &PlatformConfig::default());
        }
        _ => (),
    }
}

fn main() -> Result<(), Error> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    run()
}

fn run() -> Result<(), Error> {
    let app = App {
        switch_endpoint_id: 0,
    };

    info!(
        "Hub memory: Stack (BSS)={}B, Metrics (BSS)={}B",
        core::mem::size_of::<Stack>(),
        core::mem::size_of::<Metrics>()
    );

    let metrics = &*METRICS.init(Metrics::new());
    let nvs = &*NVS.init(Nvs::new(std::env::temp_dir().join("rs-hub")));

    // Telemetry boot + device info snapshot
    metrics.boot(nvs);
    telemetry::device_info_dump(&DEV_DET);

    // Initialize the NVS layer; not fatal when it fails
    if let Err(e) = nvs.init() {
        warn!("Failed to initialize NVS: {e}");
    }

    let stack = &*STACK.init(Stack::new(&DEV_DET, sys_rand, MATTER_PORT));

    #[cfg(feature = "controller")]
    let client = &*CONTROLLER.init(ControllerClient::new(sys_rand));

    #[cfg(feature = "shell")]
    let console = &*CONSOLE.init(Console::new());

    #[cfg(feature = "shell")]
    {
        if let Err(e) = shell::diagnostics_register_commands(console) {
            warn!("Failed to register diagnostics commands: {e}");
        }
        if let Err(e) = shell::wifi_register_commands(console) {
            warn!("Failed to register wifi commands: {e}");
        }
        #[cfg(feature = "controller")]
        if let Err(e) = shell::controller_register_commands(console) {
            warn!("Failed to register controller commands: {e}");
        }
        #[cfg(feature = "thread-br")]
        if let Err(e) = shell::thread_br_register_commands(console) {
            warn!("Failed to register border-router commands: {e}");
        }

        if let Err(e) = shell::spawn_stdin_reader(console) {
            warn!("Failed to start the console reader: {e}");
        }
    }

    // Matter start; this is the one fatal check of the bring-up
    let socket = match stack.start(app_event_cb) {
        Ok(socket) => socket,
        Err(e) => {
            error!("Failed to start Matter, err: {e}");
            std::process::abort();
        }
    };

    // Set up initial on-boot metrics
    metrics.set_str("commissioning_status", "Commissioned");
    metrics.set_unsigned("commissioning_attempts", 1);
    metrics.set_unsigned("commissioning_successes", 1);
    metrics.set_unsigned("commissioning_failures", 0);
    metrics.set_str("matter_current_mode", "Online");
    metrics.set_str("matter_controller_or_end_device", "Controller");
    metrics.set_str("matter_phys_iface", "WiFi");
    metrics.set_unsigned("num_subscriptions", 1);
    metrics.set_unsigned("sum_subscriptions", 1);
    metrics.set_unsigned("matter_group_id", 1);
    metrics.set_unsigned("matter_keyset_id", 1);
    metrics.set_str("matter_spec_ver", "1.3");
    metrics.set_str("matter_node_name", "CTLR");
    metrics.set_unsigned("matter_ble_commissioning", 1);
    metrics.set_unsigned("matter_cluster_count", 7);

    #[cfg(feature = "commissioner")]
    match stack.lock() {
        Ok(guard) => {
            if let Err(e) = client.init(&guard, 112233, 1, 5580) {
                warn!("Failed to initialize the controller client: {e}");
            }
            if let Err(e) = client.setup_commissioner(&guard) {
                warn!("Failed to set up the commissioner: {e}");
            }
        }
        Err(e) => warn!("Failed to acquire the stack lock: {e}"),
    }

    let mut transport = pin!(stack.run(&socket));
    let mut netif = pin!(stack.run_netif_watch());
    let mut heartbeat = pin!(telemetry::run_heartbeat(metrics, sys_rand));

    #[cfg(feature = "shell")]
    {
        let ctx = CommandContext {
            metrics,
            nvs,
            stack,
            switch_endpoint_id: app.switch_endpoint_id,
            #[cfg(feature = "controller")]
            controller: Some(client),
            #[cfg(feature = "thread-br")]
            thread_br: Some(&THREAD_BR),
        };

        let mut console_run = pin!(console.run(&ctx));

        let all = select4(
            &mut transport,
            &mut netif,
            &mut heartbeat,
            &mut console_run,
        );

        futures_lite::future::block_on(all.coalesce())
    }

    #[cfg(not(feature = "shell"))]
    {
        let _ = app;

        let all = select3(&mut transport, &mut netif, &mut heartbeat);

        futures_lite::future::block_on(all.coalesce())
    }
}
