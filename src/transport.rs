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

//! The seams the core is generic over: serial port, clock, and firmware
//! file, plus a re-export of `embedded_hal`'s `OutputPin` for GPIO0/RESET.
//!
//! None of these traits assume a particular OS or hardware binding; the
//! `serialport-transport` feature supplies `std`-backed implementations
//! (`src/io_impl.rs`) but a caller on an embedded host can implement them
//! directly against their own HAL.

use std::time::Duration;

/// GPIO0 and RESET are plain digital outputs.
pub use embedded_hal::digital::OutputPin;

/// A byte-oriented, non-blocking-ish serial port: reads return whatever is
/// currently available (possibly zero bytes), writes are synchronous.
pub trait SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Reads up to `buf.len()` bytes without blocking past what's already
    /// buffered by the port; returns the number of bytes actually read
    /// (which may be 0).
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn in_waiting(&mut self) -> std::io::Result<usize>;

    fn reset_input_buffer(&mut self) -> std::io::Result<()>;

    fn set_baud_rate(&mut self, baud: u32) -> std::io::Result<()>;
}

/// A monotonic clock with sub-second resolution and a sleep primitive.
pub trait Clock {
    type Instant: Copy;

    fn now(&self) -> Self::Instant;

    /// Elapsed time since `earlier`, as measured by `now()`.
    fn elapsed_since(&self, earlier: Self::Instant) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// A firmware image: a byte length plus sequential reads, mirroring
/// `std::fs::File` without requiring one.
pub trait Firmware {
    fn len(&mut self) -> std::io::Result<u64>;

    /// Reads up to `buf.len()` bytes, returning the number read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}
