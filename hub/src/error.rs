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

use core::fmt;
use core::str::Utf8Error;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorCode {
    BufferTooSmall,
    Busy,
    Duplicate,
    InvalidArgument,
    InvalidData,
    InvalidState,
    NoNetworkInterface,
    NotFound,
    ResourceExhausted,
    RwLock,
    StdIoError,
    Utf8Fail,
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

pub struct Error {
    code: ErrorCode,
    #[cfg(feature = "backtrace")]
    backtrace: std::backtrace::Backtrace,
    #[cfg(feature = "backtrace")]
    inner: Option<Box<dyn std::error::Error + Send>>,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            #[cfg(feature = "backtrace")]
            backtrace: std::backtrace::Backtrace::capture(),
            #[cfg(feature = "backtrace")]
            inner: None,
        }
    }

    #[cfg(feature = "backtrace")]
    pub fn new_with_details(
        code: ErrorCode,
        detailed_err: Box<dyn std::error::Error + Send>,
    ) -> Self {
        Self {
            code,
            backtrace: std::backtrace::Backtrace::capture(),
            inner: Some(detailed_err),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    #[cfg(feature = "backtrace")]
    pub const fn backtrace(&self) -> &std::backtrace::Backtrace {
        &self.backtrace
    }

    #[cfg(feature = "backtrace")]
    pub fn details(&self) -> Option<&(dyn std::error::Error + Send)> {
        self.inner.as_ref().map(|err| err.as_ref())
    }
}

#[cfg(feature = "backtrace")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new_with_details(ErrorCode::StdIoError, Box::new(e))
    }
}

#[cfg(not(feature = "backtrace"))]
impl From<std::io::Error> for Error {
    fn from(_e: std::io::Error) -> Self {
        Self::new(ErrorCode::StdIoError)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_e: std::sync::PoisonError<T>) -> Self {
        Self::new(ErrorCode::RwLock)
    }
}

impl From<Utf8Error> for Error {
    fn from(_e: Utf8Error) -> Self {
        Self::new(ErrorCode::Utf8Fail)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(not(feature = "backtrace"))]
        {
            write!(f, "Error::{}", self)?;
        }

        #[cfg(feature = "backtrace")]
        {
            writeln!(f, "Error::{} {{", self)?;
            write!(f, "{}", self.backtrace())?;
            writeln!(f, "}}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "backtrace")]
        {
            write!(
                f,
                "{:?}: {}",
                self.code(),
                self.inner
                    .as_ref()
                    .map_or(String::new(), |err| { err.to_string() })
            )
        }
        #[cfg(not(feature = "backtrace"))]
        {
            write!(f, "{:?}", self.code())
        }
    }
}

impl std::error::Error for Error {}
