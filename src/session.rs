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

//! `Session` ties the wire layer, chip identity, and flash pipeline into the
//! single entry point applications drive.

use std::io::Cursor;
use std::time::Duration;

use binrw::BinWrite;

use crate::checksum;
use crate::chip::{ChipFamily, Efuses, CHIP_MAGIC_REG};
use crate::command::{Command, SYNC_PACKET};
use crate::error::{Error, Result};
use crate::flash::{self, FlashProgress};
use crate::frame;
use crate::transport::{Clock, Firmware, OutputPin, SerialTransport};

const DEFAULT_BAUD: u32 = 115_200;
const RESET_LOW_DURATION: Duration = Duration::from_millis(100);
const RESET_SETTLE_DURATION: Duration = Duration::from_millis(200);
const BAUD_CHANGE_SETTLE: Duration = Duration::from_millis(50);
const SYNC_SETTLE: Duration = Duration::from_millis(100);

const SYNC_OUTER_ATTEMPTS: usize = 3;
const SYNC_INNER_ATTEMPTS: usize = 8;

fn gpio_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("GPIO error: {e:?}"),
    ))
}

/// Builder for a [`Session`]; gathers the handful of options the driver
/// needs so new ones can be added without breaking existing callers.
pub struct SessionConfig<S, G0, G1, C> {
    serial: S,
    gpio0: G0,
    reset_pin: G1,
    clock: C,
    flash_size_bytes: Option<u32>,
    initial_baud: u32,
    debug: bool,
}

impl<S, G0, G1, C> SessionConfig<S, G0, G1, C>
where
    S: SerialTransport,
    G0: OutputPin,
    G1: OutputPin,
    C: Clock,
{
    pub fn new(serial: S, gpio0: G0, reset_pin: G1, clock: C) -> Self {
        SessionConfig {
            serial,
            gpio0,
            reset_pin,
            clock,
            flash_size_bytes: None,
            initial_baud: DEFAULT_BAUD,
            debug: false,
        }
    }

    /// Required before `flash_begin` on an ESP32 target.
    pub fn flash_size_bytes(mut self, size: u32) -> Self {
        self.flash_size_bytes = Some(size);
        self
    }

    pub fn initial_baud(mut self, baud: u32) -> Self {
        self.initial_baud = baud;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> Result<Session<S, G0, G1, C>> {
        let mut serial = self.serial;
        serial.set_baud_rate(self.initial_baud)?;
        Ok(Session {
            serial,
            gpio0: self.gpio0,
            reset_pin: self.reset_pin,
            clock: self.clock,
            chip_family: None,
            efuses: None,
            flash_size_bytes: self.flash_size_bytes,
            baud_rate: self.initial_baud,
            debug: self.debug,
        })
    }
}

pub struct Session<S, G0, G1, C> {
    serial: S,
    gpio0: G0,
    reset_pin: G1,
    clock: C,
    chip_family: Option<ChipFamily>,
    efuses: Option<Efuses>,
    flash_size_bytes: Option<u32>,
    baud_rate: u32,
    debug: bool,
}

impl<S, G0, G1, C> Session<S, G0, G1, C>
where
    S: SerialTransport,
    G0: OutputPin,
    G1: OutputPin,
    C: Clock,
{
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    fn status_len(&self) -> usize {
        match self.chip_family {
            Some(ChipFamily::Esp32) => 4,
            Some(ChipFamily::Esp8266) | None => 2,
        }
    }

    fn trace_write(&self, opcode: u8, bytes: &[u8]) {
        if self.debug {
            log::trace!("write {} ({} bytes): {}", Command::name_from_code(opcode), bytes.len(), hex_dump(bytes));
        }
    }

    fn trace_read(&self, opcode: u8, reply: &frame::Reply) {
        if self.debug {
            log::trace!(
                "read {} value={:#010x} ({} data bytes): {}",
                Command::name_from_code(opcode),
                reply.value,
                reply.data.len(),
                hex_dump(&reply.data)
            );
        }
    }

    /// Sends `opcode` with `header` followed by `data`. `data` is the
    /// portion the FLASH_DATA checksum covers; every other command passes
    /// an empty slice here and a literal zero checksum, matching the ROM's
    /// own convention.
    fn send_request(&mut self, opcode: u8, header: &[u8], data: &[u8]) -> Result<()> {
        self.serial.reset_input_buffer()?;
        let checksum_byte = if data.is_empty() {
            0
        } else {
            checksum::checksum(data)
        };
        let mut payload = Vec::with_capacity(header.len() + data.len());
        payload.extend_from_slice(header);
        payload.extend_from_slice(data);
        let request = frame::build_request(opcode, checksum_byte, &payload);
        self.trace_write(opcode, &request);
        self.serial.write_all(&request)?;
        Ok(())
    }

    fn recv_reply(&mut self, opcode: u8, timeout: Duration) -> Result<frame::Reply> {
        let reply = frame::read_frame(&mut self.serial, &self.clock, opcode, timeout)?;
        self.trace_read(opcode, &reply);
        Ok(reply)
    }

    /// Sends `opcode` with `header` followed by `data`, then waits for a
    /// single matching reply.
    fn transact(
        &mut self,
        opcode: u8,
        header: &[u8],
        data: &[u8],
        timeout: Duration,
    ) -> Result<frame::Reply> {
        self.send_request(opcode, header, data)?;
        self.recv_reply(opcode, timeout)
    }

    /// Issues `cmd` (optionally followed by raw `data`), validates the
    /// trailing status block, and returns `(value, body)`.
    fn check_command(&mut self, cmd: Command, data: &[u8]) -> Result<(u32, Vec<u8>)> {
        let opcode = cmd.code();
        let timeout = cmd.timeout();
        let mut header = Cursor::new(Vec::new());
        cmd.write_le(&mut header)?;
        let reply = self.transact(opcode, &header.into_inner(), data, timeout)?;

        let status_len = self.status_len();
        if reply.data.len() < status_len {
            return Err(Error::InsufficientStatus);
        }
        let split_at = reply.data.len() - status_len;
        let (body, status) = reply.data.split_at(split_at);
        if status[0] != 0 {
            return Err(Error::BootloaderError(status[1]));
        }
        Ok((reply.value, body.to_vec()))
    }

    /// Drives GPIO0 and RESET to put the target into (or out of) the ROM
    /// bootloader, per the documented reset sequence.
    pub fn reset(&mut self, program_mode: bool) -> Result<()> {
        if program_mode {
            self.gpio0.set_low().map_err(gpio_err)?;
        } else {
            self.gpio0.set_high().map_err(gpio_err)?;
        }
        self.reset_pin.set_low().map_err(gpio_err)?;
        self.clock.sleep(RESET_LOW_DURATION);
        self.reset_pin.set_high().map_err(gpio_err)?;
        self.clock.sleep(RESET_SETTLE_DURATION);
        Ok(())
    }

    /// One outer SYNC attempt: send once, then look for any of up to eight
    /// replies whose first two payload bytes are both zero.
    fn try_sync_once(&mut self) -> Result<bool> {
        let opcode = Command::Sync.code();
        let timeout = Command::Sync.timeout();
        self.send_request(opcode, &SYNC_PACKET, &[])?;
        for _ in 0..SYNC_INNER_ATTEMPTS {
            match self.recv_reply(opcode, timeout) {
                Ok(reply) => {
                    if reply.data.len() >= 2 && reply.data[0] == 0 && reply.data[1] == 0 {
                        return Ok(true);
                    }
                }
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Issues SYNC up to three times, with a 0.1 s settle on success.
    pub fn sync(&mut self) -> Result<()> {
        for _ in 0..SYNC_OUTER_ATTEMPTS {
            if self.try_sync_once()? {
                self.clock.sleep(SYNC_SETTLE);
                return Ok(());
            }
        }
        Err(Error::SyncFailed)
    }

    fn probe_chip_type(&mut self) -> Result<ChipFamily> {
        let (value, _) = self.check_command(
            Command::ReadReg {
                addr: CHIP_MAGIC_REG,
            },
            &[],
        )?;
        ChipFamily::from_magic(value)
    }

    /// Resolves (and caches) which chip family is on the other end of the
    /// wire.
    pub fn chip_type(&mut self) -> Result<ChipFamily> {
        if let Some(family) = self.chip_family {
            return Ok(family);
        }
        let family = self.probe_chip_type()?;
        self.chip_family = Some(family);
        Ok(family)
    }

    fn read_efuses(&mut self) -> Result<Efuses> {
        if let Some(efuses) = self.efuses {
            return Ok(efuses);
        }
        let family = self.chip_type()?;
        let base = family.efuse_base();
        let mut words = [0u32; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.read_register(base + 4 * i as u32)?;
        }
        let efuses = Efuses(words);
        self.efuses = Some(efuses);
        Ok(efuses)
    }

    pub fn chip_name(&mut self) -> Result<&'static str> {
        let family = self.chip_type()?;
        let efuses = self.read_efuses()?;
        Ok(efuses.chip_name(family))
    }

    pub fn mac_addr(&mut self) -> Result<[u8; 6]> {
        let family = self.chip_type()?;
        let efuses = self.read_efuses()?;
        Ok(efuses.mac_address(family))
    }

    pub fn read_register(&mut self, addr: u32) -> Result<u32> {
        let (value, _) = self.check_command(Command::ReadReg { addr }, &[])?;
        Ok(value)
    }

    pub fn write_register(&mut self, addr: u32, value: u32) -> Result<()> {
        self.check_command(
            Command::WriteReg {
                addr,
                value,
                mask: 0xFFFF_FFFF,
                delay: 0,
            },
            &[],
        )?;
        Ok(())
    }

    /// Reconfigures both ends of the link to a new baud rate. ESP8266 does
    /// not support this and reports `NotSupported`.
    pub fn set_baud_rate(&mut self, new_rate: u32) -> Result<()> {
        if self.chip_type()? == ChipFamily::Esp8266 {
            return Err(Error::NotSupported("baud rate change"));
        }
        self.check_command(
            Command::ChangeBaudRate {
                new_rate,
                old_rate: 0,
            },
            &[],
        )?;
        self.serial.set_baud_rate(new_rate)?;
        self.baud_rate = new_rate;
        self.clock.sleep(BAUD_CHANGE_SETTLE);
        self.serial.reset_input_buffer()?;
        self.check_command(
            Command::ChangeBaudRate {
                new_rate,
                old_rate: 0,
            },
            &[],
        )?;
        Ok(())
    }

    fn spi_attach(&mut self) -> Result<()> {
        self.check_command(
            Command::SpiAttach {
                pins: 0,
                rom_only: 0,
            },
            &[],
        )?;
        Ok(())
    }

    /// Begins a flash write of `size` bytes at `offset`; returns the number
    /// of 1024-byte blocks the caller must now supply via `flash_data`.
    pub fn flash_begin(&mut self, size: u32, offset: u32) -> Result<u32> {
        let family = self.chip_type()?;
        if family == ChipFamily::Esp32 {
            self.spi_attach()?;
            let total_size = self
                .flash_size_bytes
                .ok_or(Error::NotSupported("ESP32 flash_begin without a configured flash size"))?;
            self.check_command(
                Command::SpiSetParams {
                    id: 0,
                    total_size,
                    block_size: 0x10000,
                    sector_size: flash::ERASE_SECTOR_SIZE,
                    page_size: 0x100,
                    status_mask: 0xFFFF,
                },
                &[],
            )?;
        }
        let num_blocks = flash::num_blocks(size);
        let erase_size = match family {
            ChipFamily::Esp8266 => flash::esp8266_erase_size(offset, size),
            ChipFamily::Esp32 => size,
        };
        self.check_command(
            Command::FlashBegin {
                erase_size,
                num_blocks,
                block_size: flash::WRITE_BLOCK_SIZE,
                offset,
            },
            &[],
        )?;
        Ok(num_blocks)
    }

    fn flash_data_block(&mut self, seq: u32, data: &[u8]) -> Result<()> {
        self.check_command(
            Command::FlashData {
                data_len: data.len() as u32,
                seq,
            },
            data,
        )?;
        Ok(())
    }

    pub fn flash_end(&mut self, reboot: bool) -> Result<()> {
        self.check_command(
            Command::FlashEnd {
                reboot: if reboot { 1 } else { 0 },
            },
            &[],
        )?;
        Ok(())
    }

    /// Verifies a previously-written flash region's MD5 digest (ESP32
    /// only). `offset`/`size` delimit the region; the returned string is a
    /// lowercase 32-character hex digest.
    pub fn md5(&mut self, offset: u32, size: u32) -> Result<String> {
        if self.chip_type()? != ChipFamily::Esp32 {
            return Err(Error::NotSupported("MD5 verification"));
        }
        self.spi_attach()?;
        let (_, body) = self.check_command(
            Command::SpiFlashMd5 { offset, size },
            &[],
        )?;
        if body.len() != 32 || !body.iter().all(u8::is_ascii_hexdigit) {
            return Err(Error::InsufficientStatus);
        }
        Ok(String::from_utf8_lossy(&body).to_lowercase())
    }

    /// Streams `firmware` to flash starting at `offset`, padding the final
    /// block to 1024 bytes with `0xFF`. If `expected_md5` is supplied and
    /// the target is an ESP32, verifies the digest after the last block.
    pub fn flash_file<F>(
        &mut self,
        firmware: &mut F,
        offset: u32,
        expected_md5: Option<&str>,
        mut progress: Option<&mut dyn FnMut(FlashProgress)>,
    ) -> Result<()>
    where
        F: Firmware,
    {
        let len = firmware.len()?;
        let total_blocks = self.flash_begin(len as u32, offset)?;

        let mut seq = 0u32;
        let mut buf = [0u8; flash::WRITE_BLOCK_SIZE as usize];
        loop {
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = firmware.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            if filled < buf.len() {
                buf[filled..].fill(0xFF);
            }
            self.flash_data_block(seq, &buf)?;
            if let Some(cb) = progress.as_deref_mut() {
                cb(FlashProgress {
                    block: seq + 1,
                    total_blocks,
                });
            }
            seq += 1;
            if filled < buf.len() {
                break;
            }
        }

        if let Some(expected) = expected_md5 {
            if self.chip_type()? == ChipFamily::Esp32 {
                let actual = self.md5(offset, len as u32)?;
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(Error::Md5Mismatch {
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 3);
    for chunk in bytes.chunks(16) {
        for (i, b) in chunk.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{b:02x}");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeSerial {
        written: Vec<u8>,
        to_read: std::collections::VecDeque<u8>,
        baud: u32,
    }

    impl SerialTransport for FakeSerial {
        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.to_read.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
        fn in_waiting(&mut self) -> std::io::Result<usize> {
            Ok(self.to_read.len())
        }
        fn reset_input_buffer(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn set_baud_rate(&mut self, baud: u32) -> std::io::Result<()> {
            self.baud = baud;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePin {
        high: Rc<RefCell<bool>>,
    }

    #[derive(Debug)]
    struct PinError;
    impl embedded_hal::digital::Error for PinError {
        fn kind(&self) -> embedded_hal::digital::ErrorKind {
            embedded_hal::digital::ErrorKind::Other
        }
    }
    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = PinError;
    }
    impl OutputPin for FakePin {
        fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
            *self.high.borrow_mut() = false;
            Ok(())
        }
        fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
            *self.high.borrow_mut() = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeClock {
        elapsed: RefCell<Duration>,
    }

    impl Clock for FakeClock {
        type Instant = Duration;

        fn now(&self) -> Duration {
            *self.elapsed.borrow()
        }

        fn elapsed_since(&self, earlier: Duration) -> Duration {
            self.now().saturating_sub(earlier)
        }

        fn sleep(&self, duration: Duration) {
            *self.elapsed.borrow_mut() += duration;
        }
    }

    fn queue_reply(serial: &mut FakeSerial, opcode: u8, value: u32, data: &[u8]) {
        let mut frame = vec![0xC0, 0x01, opcode];
        let len = data.len() as u16;
        frame.push((len & 0xFF) as u8);
        frame.push((len >> 8) as u8);
        frame.extend_from_slice(&value.to_le_bytes());
        frame.extend_from_slice(data);
        frame.push(0xC0);
        serial.to_read.extend(frame);
    }

    fn new_session() -> Session<FakeSerial, FakePin, FakePin, FakeClock> {
        SessionConfig::new(FakeSerial::default(), FakePin::default(), FakePin::default(), FakeClock::default())
            .build()
            .unwrap()
    }

    #[test]
    fn read_register_parses_reply_value() {
        let mut session = new_session();
        queue_reply(&mut session.serial, 0x0A, 0xAABB_CCDD, &[0, 0]);
        let value = session.read_register(0x1234).unwrap();
        assert_eq!(value, 0xAABB_CCDD);
    }

    #[test]
    fn read_register_reports_bootloader_error() {
        let mut session = new_session();
        queue_reply(&mut session.serial, 0x0A, 0, &[1, 0x05]);
        let err = session.read_register(0x1234).unwrap_err();
        assert!(matches!(err, Error::BootloaderError(0x05)));
    }

    #[test]
    fn chip_type_resolves_esp32_from_magic() {
        let mut session = new_session();
        queue_reply(&mut session.serial, 0x0A, 0x1512_2500, &[0, 0]);
        assert_eq!(session.chip_type().unwrap(), ChipFamily::Esp32);
    }

    #[test]
    fn chip_type_rejects_unknown_magic() {
        let mut session = new_session();
        queue_reply(&mut session.serial, 0x0A, 0xDEAD_BEEF, &[0, 0]);
        let err = session.chip_type().unwrap_err();
        assert!(matches!(err, Error::UnknownChip(0xDEAD_BEEF)));
    }

    #[test]
    fn set_baud_rate_rejects_esp8266() {
        let mut session = new_session();
        queue_reply(&mut session.serial, 0x0A, 0x0006_2000, &[0, 0]);
        let err = session.set_baud_rate(230_400).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[test]
    fn reset_toggles_gpio0_into_bootloader_mode() {
        let mut session = new_session();
        session.reset(true).unwrap();
        assert!(!*session.gpio0.high.borrow());
        assert!(*session.reset_pin.high.borrow());
    }
}
