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

//! The controller/commissioner client role of the hub.
//!
//! All operations that mutate client state take a [`StackGuard`], because
//! they touch state also reachable from the stack's own execution context.

use core::cell::{Cell, RefCell};

use log::info;

use crate::error::{Error, ErrorCode};
use crate::stack::StackGuard;
use crate::utils::rand::Rand;

/// The commissioner root key length
pub const ROOT_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Initialized,
    Commissioner,
}

/// The controller client.
pub struct ControllerClient {
    rand: Rand,
    state: Cell<ControllerState>,
    node_id: Cell<u64>,
    fabric_id: Cell<u64>,
    port: Cell<u16>,
    root_key: RefCell<[u8; ROOT_KEY_LEN]>,
}

impl ControllerClient {
    pub const fn new(rand: Rand) -> Self {
        Self {
            rand,
            state: Cell::new(ControllerState::Uninitialized),
            node_id: Cell::new(0),
            fabric_id: Cell::new(0),
            port: Cell::new(0),
            root_key: RefCell::new([0; ROOT_KEY_LEN]),
        }
    }

    /// Initialize the client with its controller node id, fabric id and the
    /// UDP port the controller role will use.
    ///
    /// One-shot: re-initialization fails with `ErrorCode::InvalidState`.
    pub fn init(
        &self,
        _lock: &StackGuard<'_>,
        node_id: u64,
        fabric_id: u64,
        port: u16,
    ) -> Result<(), Error> {
        if self.state.get() != ControllerState::Uninitialized {
            Err(ErrorCode::InvalidState)?;
        }

        if node_id == 0 || fabric_id == 0 {
            Err(ErrorCode::InvalidArgument)?;
        }

        self.node_id.set(node_id);
        self.fabric_id.set(fabric_id);
        self.port.set(port);
        self.state.set(ControllerState::Initialized);

        info!("Controller client initialized: node id {node_id}, fabric id {fabric_id}, port {port}");

        Ok(())
    }

    /// Set up the commissioner role: generate the fabric root key material
    /// and transition the client into the `Commissioner` state.
    pub fn setup_commissioner(&self, _lock: &StackGuard<'_>) -> Result<(), Error> {
        if self.state.get() != ControllerState::Initialized {
            Err(ErrorCode::InvalidState)?;
        }

        (self.rand)(self.root_key.borrow_mut().as_mut_slice());
        self.state.set(ControllerState::Commissioner);

        info!(
            "Commissioner set up for fabric id {} as node id {}",
            self.fabric_id.get(),
            self.node_id.get()
        );

        Ok(())
    }

    pub fn state(&self) -> ControllerState {
        self.state.get()
    }

    /// The fabric root key material. All zeroes until the commissioner is
    /// set up.
    pub fn root_key(&self) -> [u8; ROOT_KEY_LEN] {
        *self.root_key.borrow()
    }

    pub fn node_id(&self) -> u64 {
        self.node_id.get()
    }

    pub fn fabric_id(&self) -> u64 {
        self.fabric_id.get()
    }

    pub fn port(&self) -> u16 {
        self.port.get()
    }
}
