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

//! Device telemetry: a named-metric registry, the boot counter and the
//! periodic heartbeat which refreshes a handful of demo metrics.

use core::cell::RefCell;

use embassy_time::{Duration, Timer};
use log::{info, warn};

use crate::error::Error;
use crate::nvs::Nvs;
use crate::utils::rand::{rand_u32, Rand};

/// Capacity of the metric registry
pub const MAX_METRICS: usize = 24;

/// Capacity of a string metric value
pub const METRIC_STR_LEN: usize = 32;

/// The heartbeat tick period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// The metric refresh fires every this many heartbeat ticks
pub const HEARTBEAT_EVERY_TICKS: u32 = 300;

/// Basic device identity, dumped on boot and reported by the diagnostics
/// console.
#[derive(Debug, Clone)]
pub struct DeviceInfo<'a> {
    pub vid: u16,
    pub pid: u16,
    pub hw_ver: u16,
    pub sw_ver: u32,
    pub sw_ver_str: &'a str,
    pub serial_no: &'a str,
    pub device_name: &'a str,
    pub vendor_name: &'a str,
    pub product_name: &'a str,
}

/// A metric value: either an unsigned counter/gauge or a short string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricValue {
    Unsigned(u32),
    Str(heapless::String<METRIC_STR_LEN>),
}

/// A fixed-capacity registry of named metrics.
///
/// Setting a metric never fails from the caller's point of view: a full
/// registry logs and drops the new name.
pub struct Metrics {
    entries: RefCell<heapless::Vec<(&'static str, MetricValue), MAX_METRICS>>,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            entries: RefCell::new(heapless::Vec::new()),
        }
    }

    /// Upsert an unsigned metric.
    pub fn set_unsigned(&self, key: &'static str, value: u32) {
        self.set(key, MetricValue::Unsigned(value));
    }

    /// Upsert a string metric. Overlong values are truncated.
    pub fn set_str(&self, key: &'static str, value: &str) {
        let mut s = heapless::String::new();

        for c in value.chars() {
            if s.push(c).is_err() {
                warn!("Truncating metric '{key}' to {METRIC_STR_LEN} characters");
                break;
            }
        }

        self.set(key, MetricValue::Str(s));
    }

    /// Look up a metric by name.
    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.entries
            .borrow()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Visit all metrics, in insertion order.
    pub fn for_each(&self, mut f: impl FnMut(&'static str, &MetricValue)) {
        for (k, v) in self.entries.borrow().iter() {
            f(k, v);
        }
    }

    /// Bump and persist the boot counter, returning the new count.
    ///
    /// Storage failures leave telemetry functional and are only logged.
    pub fn boot(&self, nvs: &Nvs) -> u32 {
        // Telemetry boots before the storage bring-up step, so the backend
        // has to be brought to life here already
        if let Err(e) = nvs.init() {
            warn!("Failed to initialize the telemetry store: {e}");
        }

        let count = match nvs.get_u32("telemetry", "boot_count") {
            Ok(count) => count.unwrap_or(0).wrapping_add(1),
            Err(e) => {
                warn!("Failed to load boot count: {e}");
                1
            }
        };

        if let Err(e) = nvs.set_u32("telemetry", "boot_count", count) {
            warn!("Failed to persist boot count: {e}");
        }

        self.set_unsigned("boot_count", count);
        info!("Telemetry boot #{count}");

        count
    }

    fn set(&self, key: &'static str, value: MetricValue) {
        let mut entries = self.entries.borrow_mut();

        if let Some((_, v)) = entries.iter_mut().find(|(k, _)| *k == key) {
            *v = value;
        } else if entries.push((key, value)).is_err() {
            warn!("Metric registry full, dropping '{key}'");
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Log the device-info snapshot.
pub fn device_info_dump(dev: &DeviceInfo<'_>) {
    info!(
        "Device: '{}' ({} / {}), VID/PID {:04x}:{:04x}",
        dev.device_name, dev.vendor_name, dev.product_name, dev.vid, dev.pid
    );
    info!(
        "Versions: HW {}, SW {} ({}), serial '{}'",
        dev.hw_ver, dev.sw_ver, dev.sw_ver_str, dev.serial_no
    );
}

/// The periodic metric-refresh gate.
///
/// Fires on tick indices 0, 300, 600, ... and on no other index.
pub struct Heartbeat {
    counter: u32,
}

impl Heartbeat {
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Advance by one tick; `true` when the refresh branch must run.
    pub fn tick(&mut self) -> bool {
        let fire = self.counter % HEARTBEAT_EVERY_TICKS == 0;
        self.counter = self.counter.wrapping_add(1);

        fire
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the telemetry heartbeat forever.
///
/// Every [`HEARTBEAT_EVERY_TICKS`] ticks of [`TICK_PERIOD`] the demo metrics
/// are overwritten with pseudo-random values. The values are illustrative
/// and carry no device-state meaning.
pub async fn run_heartbeat(metrics: &Metrics, rand: Rand) -> Result<(), Error> {
    let mut heartbeat = Heartbeat::new();

    loop {
        if heartbeat.tick() {
            info!("Updating matter metrics...");

            metrics.set_unsigned("matter_cluster_count", rand_u32(rand) % 3);
            metrics.set_unsigned("num_subscriptions", rand_u32(rand) % 5);
            metrics.set_unsigned("sum_subscriptions", rand_u32(rand) % 5);
            metrics.set_unsigned("commissioning_attempts", rand_u32(rand) % 50);
        }

        Timer::after(TICK_PERIOD).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_fires_on_every_300th_tick_only() {
        let mut heartbeat = Heartbeat::new();

        let mut fired = Vec::new();
        for i in 0..=900u32 {
            if heartbeat.tick() {
                fired.push(i);
            }
        }

        assert_eq!(fired, vec![0, 300, 600, 900]);
    }

    #[test]
    fn metrics_upsert() {
        let metrics = Metrics::new();

        metrics.set_unsigned("commissioning_attempts", 1);
        metrics.set_unsigned("commissioning_attempts", 7);
        metrics.set_str("commissioning_status", "Commissioned");

        assert_eq!(metrics.len(), 2);
        assert_eq!(
            metrics.get("commissioning_attempts"),
            Some(MetricValue::Unsigned(7))
        );

        match metrics.get("commissioning_status") {
            Some(MetricValue::Str(s)) => assert_eq!(s.as_str(), "Commissioned"),
            other => panic!("unexpected metric value: {other:?}"),
        }

        assert!(metrics.get("missing").is_none());
    }

    #[test]
    fn overlong_string_metric_is_truncated() {
        let metrics = Metrics::new();

        metrics.set_str("matter_node_name", "x".repeat(METRIC_STR_LEN + 10).as_str());

        match metrics.get("matter_node_name") {
            Some(MetricValue::Str(s)) => assert_eq!(s.len(), METRIC_STR_LEN),
            other => panic!("unexpected metric value: {other:?}"),
        }
    }

    #[test]
    fn full_registry_drops_new_names_but_keeps_updates() {
        const KEYS: [&str; MAX_METRICS] = [
            "m00", "m01", "m02", "m03", "m04", "m05", "m06", "m07", "m08", "m09", "m10", "m11",
            "m12", "m13", "m14", "m15", "m16", "m17", "m18", "m19", "m20", "m21", "m22", "m23",
        ];

        let metrics = Metrics::new();

        for (i, key) in KEYS.iter().enumerate() {
            metrics.set_unsigned(key, i as u32);
        }
        assert_eq!(metrics.len(), MAX_METRICS);

        metrics.set_unsigned("overflow", 99);
        assert_eq!(metrics.len(), MAX_METRICS);
        assert!(metrics.get("overflow").is_none());

        metrics.set_unsigned("m00", 42);
        assert_eq!(metrics.get("m00"), Some(MetricValue::Unsigned(42)));
    }

    #[test]
    fn boot_counter_increments_across_boots() {
        let dir = std::env::temp_dir()
            .join("rs-hub-telemetry-tests")
            .join(format!("boot-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let nvs = Nvs::new(&dir);
        nvs.init().unwrap();

        let metrics = Metrics::new();
        assert_eq!(metrics.boot(&nvs), 1);
        assert_eq!(metrics.boot(&nvs), 2);
        assert_eq!(metrics.get("boot_count"), Some(MetricValue::Unsigned(2)));
    }

    #[test]
    fn boot_survives_broken_storage() {
        // A file where the storage directory should be
        let dir = std::env::temp_dir()
            .join("rs-hub-telemetry-tests")
            .join(format!("broken-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.parent().unwrap()).unwrap();
        std::fs::write(&dir, b"not a directory").unwrap();

        let nvs = Nvs::new(&dir);
        let metrics = Metrics::new();

        assert_eq!(metrics.boot(&nvs), 1);
    }
}
