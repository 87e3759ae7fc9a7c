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

//! The Thread border-router launcher.
//!
//! The radio bring-up proper is the border-router component's business; this
//! module decides *when* to launch it (on the Wi-Fi station acquiring an IP
//! address) and carries the platform configuration handed to it.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::error::Error;
use crate::stack::{PlatformEvent, StackEvent};

/// Radio co-processor configuration.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub uart_device: &'static str,
    pub baud_rate: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            uart_device: "/dev/ttyACM0",
            baud_rate: 460_800,
        }
    }
}

/// Host-side network configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub backbone_netif: &'static str,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backbone_netif: "wlan0",
        }
    }
}

/// Border-router port configuration.
#[derive(Debug, Clone)]
pub struct PortConfig {
    pub backbone_port: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            backbone_port: 49154,
        }
    }
}

/// The full platform configuration for the border router.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    pub radio: RadioConfig,
    pub host: HostConfig,
    pub port: PortConfig,
}

/// The border-router launcher.
pub struct ThreadBorderRouter {
    launched: AtomicBool,
}

impl ThreadBorderRouter {
    pub const fn new() -> Self {
        Self {
            launched: AtomicBool::new(false),
        }
    }

    /// Launch the border router. Idempotent; a repeated launch is a no-op.
    pub fn launch(&self, config: &PlatformConfig) -> Result<(), Error> {
        if self.launched.swap(true, Ordering::SeqCst) {
            info!("Thread border router already running");
            return Ok(());
        }

        info!(
            "Launching Thread border router: radio {} @ {} baud, backbone {}:{}",
            config.radio.uart_device,
            config.radio.baud_rate,
            config.host.backbone_netif,
            config.port.backbone_port
        );

        Ok(())
    }

    /// React to a stack lifecycle event.
    ///
    /// Launches the border router exactly when the Wi-Fi station acquired an
    /// IP address; every other event is ignored. Launch failures are logged,
    /// never surfaced to the event path.
    pub fn handle_event(&self, event: &StackEvent, config: &PlatformConfig) {
        if let StackEvent::Platform(PlatformEvent::WifiStationGotIp(_)) = event {
            if let Err(e) = self.launch(config) {
                warn!("Thread border router launch failed: {e}");
            }
        }
    }

    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }
}

impl Default for ThreadBorderRouter {
    fn default() -> Self {
        Self::new()
    }
}
