// Copyright 2022 Stephen Checkoway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The error taxonomy surfaced by the whole crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no valid sync reply after 3 attempts")]
    SyncFailed,

    #[error("unrecognized chip magic value: {0:#010X}")]
    UnknownChip(u32),

    #[error("bootloader reported error code {0:#04X}")]
    BootloaderError(u8),

    #[error("reply too short to contain a status block")]
    InsufficientStatus,

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("MD5 mismatch after flashing: expected {expected}, got {actual}")]
    Md5Mismatch { expected: String, actual: String },

    #[error("{0} is not supported on this chip family")]
    NotSupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode command: {0}")]
    FrameEncoding(#[from] binrw::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_variant_is_timeout() {
        assert!(Error::Timeout.is_timeout());
    }

    #[test]
    fn io_timed_out_is_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no data");
        assert!(Error::Io(io).is_timeout());
    }

    #[test]
    fn other_errors_are_not_timeouts() {
        assert!(!Error::SyncFailed.is_timeout());
        assert!(!Error::UnknownChip(0).is_timeout());
    }
}
