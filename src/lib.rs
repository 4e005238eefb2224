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

//! A no-stub host driver for the ESP8266/ESP32 ROM serial bootloader: SLIP
//! framing, a command/response transaction layer, chip identification, and
//! a flash-programming pipeline.
//!
//! The core ([`Session`]) is generic over the serial port, the two GPIO
//! lines (GPIO0 and RESET) and the clock it needs, so it runs unmodified on
//! a desktop OS (via the `serialport-transport` feature) or against a
//! caller-supplied `embedded-hal` binding.

mod checksum;
pub mod chip;
mod command;
pub mod error;
mod flash;
mod frame;
#[cfg(feature = "std")]
mod io_impl;
mod session;
mod slip;
pub mod transport;

pub use chip::ChipFamily;
pub use command::Command;
pub use error::{Error, Result};
pub use flash::FlashProgress;
#[cfg(feature = "std")]
pub use io_impl::{FileFirmware, StdClock};
#[cfg(feature = "serialport-transport")]
pub use io_impl::{DtrPin, RtsPin, SerialPortTransport};
pub use session::{Session, SessionConfig};
pub use transport::{Clock, Firmware, OutputPin, SerialTransport};
