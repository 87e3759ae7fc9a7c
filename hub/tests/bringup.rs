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

//! Bring-up sequencing tests: only a stack start failure is fatal, every
//! other step of the sequence absorbs its own failures.

#![cfg(all(feature = "shell", feature = "controller"))]

use std::net::UdpSocket;

use rs_hub::controller::{ControllerClient, ControllerState};
use rs_hub::error::ErrorCode;
use rs_hub::nvs::Nvs;
use rs_hub::shell::{self, CommandContext, Console};
use rs_hub::stack::{Stack, StackEvent};
use rs_hub::telemetry::{self, DeviceInfo, MetricValue, Metrics};
use rs_hub::utils::rand::dummy_rand;

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

fn event_cb(_event: &StackEvent) {}

fn temp_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join("rs-hub-bringup-tests")
        .join(format!("{}-{}", tag, std::process::id()))
}

#[test]
fn full_sequence_happy_path() {
    let dir = temp_dir("happy");
    let _ = std::fs::remove_dir_all(&dir);

    let metrics = Metrics::new();
    let nvs = Nvs::new(&dir);

    // Telemetry boot + device info snapshot
    assert_eq!(metrics.boot(&nvs), 1);
    telemetry::device_info_dump(&DEV_DET);

    // NVS init
    nvs.init().unwrap();

    // Console registration
    let console = Console::new();
    shell::diagnostics_register_commands(&console).unwrap();
    shell::wifi_register_commands(&console).unwrap();
    shell::controller_register_commands(&console).unwrap();

    // Matter start
    let stack = Stack::new(&DEV_DET, dummy_rand, 0);
    let _socket = stack.start(event_cb).unwrap();
    assert!(stack.is_running());

    // On-boot metrics
    metrics.set_str("commissioning_status", "Commissioned");
    metrics.set_unsigned("matter_cluster_count", 7);

    // Commissioner setup, bracketed by the stack lock
    let client = ControllerClient::new(dummy_rand);
    {
        let guard = stack.lock().unwrap();
        client.init(&guard, 112233, 1, 5580).unwrap();
        client.setup_commissioner(&guard).unwrap();
    }

    assert_eq!(client.state(), ControllerState::Commissioner);
    assert!(stack.try_lock().is_ok());

    // The console reaches the subsystems that were just brought up
    let ctx = CommandContext {
        metrics: &metrics,
        nvs: &nvs,
        stack: &stack,
        switch_endpoint_id: 0,
        controller: Some(&client),
        #[cfg(feature = "thread-br")]
        thread_br: None,
    };

    console.dispatch(&ctx, "metrics").unwrap();
    console.dispatch(&ctx, "controller-info").unwrap();
    console.dispatch(&ctx, "pairing 55 20202021").unwrap();

    assert_eq!(
        metrics.get("matter_cluster_count"),
        Some(MetricValue::Unsigned(7))
    );
}

#[test]
fn only_stack_start_failure_is_fatal() {
    // Storage rooted at a plain file: every NVS operation fails
    let dir = temp_dir("broken");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.parent().unwrap()).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();

    let metrics = Metrics::new();
    let nvs = Nvs::new(&dir);

    // Telemetry and storage failures are absorbed
    assert_eq!(metrics.boot(&nvs), 1);
    assert!(nvs.init().is_err());

    // Console registration failures are absorbed by the caller
    let console = Console::new();
    shell::diagnostics_register_commands(&console).unwrap();
    assert_eq!(
        shell::diagnostics_register_commands(&console)
            .unwrap_err()
            .code(),
        ErrorCode::Duplicate
    );

    // The sequence is still allowed to reach the stack start
    let stack = Stack::new(&DEV_DET, dummy_rand, 0);
    assert!(stack.start(event_cb).is_ok());
}

#[test]
fn stack_start_failure_reports_an_error() {
    // Occupy a port, then start the stack on it
    let taken = UdpSocket::bind("[::]:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let stack = Stack::new(&DEV_DET, dummy_rand, port);
    let err = stack.start(event_cb).unwrap_err();

    assert_eq!(err.code(), ErrorCode::StdIoError);
    assert!(!stack.is_running());
}
