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

//! Runtime library for a Matter controller hub.
//!
//! Provides the subsystems a controller-hub binary brings up in sequence:
//! non-volatile storage ([`nvs`]), the protocol stack lifecycle ([`stack`]),
//! telemetry ([`telemetry`]), an optional diagnostics console ([`shell`]),
//! an optional commissioner client ([`controller`]) and an optional Thread
//! border-router launcher ([`thread_br`]).

#[cfg(feature = "controller")]
pub mod controller;
pub mod error;
pub mod nvs;
#[cfg(feature = "shell")]
pub mod shell;
pub mod stack;
pub mod telemetry;
#[cfg(feature = "thread-br")]
pub mod thread_br;
pub mod utils;

pub use stack::{Stack, MATTER_PORT};
