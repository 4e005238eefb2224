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

//! `std`-backed implementations of the collaborator traits, so a caller on
//! a desktop OS doesn't have to write its own clock/file plumbing.

use std::time::{Duration, Instant};

use crate::transport::{Clock, Firmware};

/// A [`Clock`] backed by `std::time::Instant` and `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed_since(&self, earlier: Instant) -> Duration {
        earlier.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A [`Firmware`] backed by `std::fs::File`.
pub struct FileFirmware(std::fs::File);

impl FileFirmware {
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(FileFirmware(std::fs::File::open(path)?))
    }
}

impl Firmware for FileFirmware {
    fn len(&mut self) -> std::io::Result<u64> {
        self.0.metadata().map(|m| m.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::Read;
        self.0.read(buf)
    }
}

#[cfg(feature = "serialport-transport")]
mod serial {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::transport::{OutputPin, SerialTransport};

    const POLL_TIMEOUT: Duration = Duration::from_millis(10);

    type SharedPort = Rc<RefCell<Box<dyn serialport::SerialPort>>>;

    /// A [`SerialTransport`] backed by the `serialport` crate.
    ///
    /// Desktop USB-serial adapters expose GPIO0/RESET as the port's own
    /// DTR/RTS control lines rather than as separate pins, so `open` hands
    /// back the transport alongside two [`OutputPin`] adapters sharing the
    /// same underlying handle.
    pub struct SerialPortTransport {
        inner: SharedPort,
    }

    /// Toggles the serial port's DTR line; wired to GPIO0 by convention.
    pub struct DtrPin(SharedPort);

    /// Toggles the serial port's RTS line; wired to RESET by convention.
    pub struct RtsPin(SharedPort);

    impl SerialPortTransport {
        /// Opens `path` and returns the transport plus its two control-line
        /// pins (DTR, RTS).
        pub fn open(path: &str, baud_rate: u32) -> crate::error::Result<(Self, DtrPin, RtsPin)> {
            let port = serialport::new(path, baud_rate)
                .timeout(POLL_TIMEOUT)
                .open()?;
            let shared: SharedPort = Rc::new(RefCell::new(port));
            Ok((
                SerialPortTransport {
                    inner: shared.clone(),
                },
                DtrPin(shared.clone()),
                RtsPin(shared),
            ))
        }
    }

    impl SerialTransport for SerialPortTransport {
        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            std::io::Write::write_all(&mut *self.inner.borrow_mut(), buf)
        }

        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match std::io::Read::read(&mut *self.inner.borrow_mut(), buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e),
            }
        }

        fn in_waiting(&mut self) -> std::io::Result<usize> {
            self.inner
                .borrow_mut()
                .bytes_to_read()
                .map(|n| n as usize)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }

        fn reset_input_buffer(&mut self) -> std::io::Result<()> {
            self.inner
                .borrow_mut()
                .clear(serialport::ClearBuffer::Input)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }

        fn set_baud_rate(&mut self, baud: u32) -> std::io::Result<()> {
            self.inner
                .borrow_mut()
                .set_baud_rate(baud)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }
    }

    #[derive(Debug)]
    pub struct PinError(serialport::Error);

    impl embedded_hal::digital::Error for PinError {
        fn kind(&self) -> embedded_hal::digital::ErrorKind {
            embedded_hal::digital::ErrorKind::Other
        }
    }

    impl embedded_hal::digital::ErrorType for DtrPin {
        type Error = PinError;
    }

    impl OutputPin for DtrPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0
                .borrow_mut()
                .write_data_terminal_ready(false)
                .map_err(PinError)
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0
                .borrow_mut()
                .write_data_terminal_ready(true)
                .map_err(PinError)
        }
    }

    impl embedded_hal::digital::ErrorType for RtsPin {
        type Error = PinError;
    }

    impl OutputPin for RtsPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().write_request_to_send(false).map_err(PinError)
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().write_request_to_send(true).map_err(PinError)
        }
    }
}

#[cfg(feature = "serialport-transport")]
pub use serial::{DtrPin, RtsPin, SerialPortTransport};

#[cfg(feature = "serialport-transport")]
impl From<serialport::Error> for crate::error::Error {
    fn from(e: serialport::Error) -> Self {
        crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn clock_sleep_is_observable_as_elapsed_time() {
        let clock = StdClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.elapsed_since(start) >= Duration::from_millis(1));
    }
}
