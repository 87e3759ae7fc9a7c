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

/// The random number generator used throughout the hub runtime.
///
/// A plain fn pointer so that it can be stored in `const` contexts and
/// swapped for a deterministic source in tests.
pub type Rand = fn(&mut [u8]);

/// A deterministic `Rand` for tests.
pub fn dummy_rand(buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
}

/// A `Rand` backed by the OS random number generator.
pub fn sys_rand(buf: &mut [u8]) {
    use rand::{thread_rng, RngCore};

    thread_rng().fill_bytes(buf);
}

/// Draw a `u32` from the given `Rand`.
pub fn rand_u32(rand: Rand) -> u32 {
    let mut buf = [0; 4];
    rand(&mut buf);

    u32::from_le_bytes(buf)
}
