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

//! The non-volatile storage subsystem of the hub.
//!
//! A namespaced blob store where every item is persisted as its own file
//! under the storage directory, so a partially failed write can only ever
//! affect a single item.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::trace;

use crate::error::{Error, ErrorCode};

/// A simple namespaced non-volatile store.
///
/// Item `key` in namespace `ns` lives at `<dir>/<ns>.<key>`.
pub struct Nvs {
    dir: PathBuf,
}

impl Nvs {
    /// Create a store rooted at the given directory.
    ///
    /// No I/O happens until [`Nvs::init`] is called.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Initialize the store by creating its directory tree.
    pub fn init(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;

        Ok(())
    }

    /// Read the blob stored under `ns`/`key` into `buf`.
    ///
    /// Returns `Ok(None)` when the item does not exist and
    /// `ErrorCode::BufferTooSmall` when `buf` cannot hold it.
    pub fn get<'b>(&self, ns: &str, key: &str, buf: &'b mut [u8]) -> Result<Option<&'b [u8]>, Error> {
        let path = self.item_path(ns, key)?;

        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut offset = 0;

        loop {
            if offset == buf.len() {
                // The buffer is full; only OK if the file ends right here
                let mut probe = [0; 1];
                if file.read(&mut probe)? != 0 {
                    Err(ErrorCode::BufferTooSmall)?;
                }

                break;
            }

            let len = file.read(&mut buf[offset..])?;
            if len == 0 {
                break;
            }

            offset += len;
        }

        let data = &buf[..offset];

        trace!("Loaded {} bytes from {}", data.len(), path.display());

        Ok(Some(data))
    }

    /// Store `data` under `ns`/`key`, replacing any previous value.
    pub fn set(&self, ns: &str, key: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.item_path(ns, key)?;

        let mut file = fs::File::create(&path)?;
        file.write_all(data)?;

        trace!("Stored {} bytes to {}", data.len(), path.display());

        Ok(())
    }

    /// Remove the item stored under `ns`/`key`, if any.
    pub fn remove(&self, ns: &str, key: &str) -> Result<(), Error> {
        let path = self.item_path(ns, key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the item stored under `ns`/`key` as a little-endian `u32`.
    pub fn get_u32(&self, ns: &str, key: &str) -> Result<Option<u32>, Error> {
        let mut buf = [0; 4];

        match self.get(ns, key, &mut buf)? {
            Some(data) if data.len() == 4 => Ok(Some(u32::from_le_bytes(buf))),
            Some(_) => Err(ErrorCode::InvalidData.into()),
            None => Ok(None),
        }
    }

    /// Store a little-endian `u32` under `ns`/`key`.
    pub fn set_u32(&self, ns: &str, key: &str, value: u32) -> Result<(), Error> {
        self.set(ns, key, &value.to_le_bytes())
    }

    fn item_path(&self, ns: &str, key: &str) -> Result<PathBuf, Error> {
        if !Self::valid_component(ns) || !Self::valid_component(key) {
            Err(ErrorCode::InvalidArgument)?;
        }

        let mut file_name = String::with_capacity(ns.len() + key.len() + 1);
        file_name.push_str(ns);
        file_name.push('.');
        file_name.push_str(key);

        Ok(self.dir.join(file_name))
    }

    fn valid_component(s: &str) -> bool {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nvs(tag: &str) -> Nvs {
        let dir = std::env::temp_dir()
            .join("rs-hub-nvs-tests")
            .join(format!("{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let nvs = Nvs::new(&dir);
        nvs.init().unwrap();

        nvs
    }

    #[test]
    fn roundtrip() {
        let nvs = test_nvs("roundtrip");

        nvs.set("wifi", "ssid", b"test-network").unwrap();

        let mut buf = [0; 64];
        assert_eq!(
            nvs.get("wifi", "ssid", &mut buf).unwrap(),
            Some(&b"test-network"[..])
        );

        nvs.set("wifi", "ssid", b"other").unwrap();
        assert_eq!(nvs.get("wifi", "ssid", &mut buf).unwrap(), Some(&b"other"[..]));
    }

    #[test]
    fn missing_item_is_none() {
        let nvs = test_nvs("missing");

        let mut buf = [0; 16];
        assert!(nvs.get("wifi", "ssid", &mut buf).unwrap().is_none());
    }

    #[test]
    fn exact_fit_and_overflow() {
        let nvs = test_nvs("overflow");

        nvs.set("ns", "blob", &[0xa5; 8]).unwrap();

        let mut exact = [0; 8];
        assert_eq!(nvs.get("ns", "blob", &mut exact).unwrap(), Some(&[0xa5; 8][..]));

        let mut small = [0; 7];
        assert_eq!(
            nvs.get("ns", "blob", &mut small).unwrap_err().code(),
            ErrorCode::BufferTooSmall
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let nvs = test_nvs("remove");

        nvs.set("ns", "item", b"x").unwrap();
        nvs.remove("ns", "item").unwrap();
        nvs.remove("ns", "item").unwrap();

        let mut buf = [0; 4];
        assert!(nvs.get("ns", "item", &mut buf).unwrap().is_none());
    }

    #[test]
    fn u32_helpers() {
        let nvs = test_nvs("u32");

        assert!(nvs.get_u32("sys", "boot_count").unwrap().is_none());

        nvs.set_u32("sys", "boot_count", 42).unwrap();
        assert_eq!(nvs.get_u32("sys", "boot_count").unwrap(), Some(42));

        nvs.set("sys", "boot_count", b"bad").unwrap();
        assert_eq!(
            nvs.get_u32("sys", "boot_count").unwrap_err().code(),
            ErrorCode::InvalidData
        );
    }

    #[test]
    fn rejects_invalid_components() {
        let nvs = test_nvs("invalid");

        assert_eq!(
            nvs.set("", "key", b"x").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            nvs.set("ns", "../evil", b"x").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            nvs.set("a/b", "key", b"x").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
    }
}
