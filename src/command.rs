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

//! The opcode/payload catalog the ROM bootloader understands, restricted to
//! the no-stub subset this driver speaks.

use std::time::Duration;

use binrw::binrw;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
const SYNC_TIMEOUT: Duration = Duration::from_millis(100);
const FLASH_BEGIN_TIMEOUT: Duration = Duration::from_secs(5);
const FLASH_DATA_TIMEOUT: Duration = Duration::from_secs(2);
const MD5_TIMEOUT: Duration = Duration::from_secs(2);

/// The fixed 36-byte pattern the ROM recognizes as a sync request.
pub const SYNC_PACKET: [u8; 36] = {
    let mut packet = [0x55u8; 36];
    packet[0] = 0x07;
    packet[1] = 0x07;
    packet[2] = 0x12;
    packet[3] = 0x20;
    packet
};

#[derive(Debug, Clone)]
#[binrw]
#[brw(little)]
pub enum Command {
    FlashBegin {
        erase_size: u32,
        num_blocks: u32,
        block_size: u32,
        offset: u32,
    },
    FlashData {
        data_len: u32,
        #[brw(pad_after = 8)]
        seq: u32,
    },
    FlashEnd {
        reboot: u32,
    },
    #[brw(magic = b"\x07\x07\x12 UUUUUUUUUUUUUUUUUUUUUUUUUUUUUUUU")]
    Sync,
    WriteReg {
        addr: u32,
        value: u32,
        mask: u32,
        delay: u32,
    },
    ReadReg {
        addr: u32,
    },
    SpiSetParams {
        id: u32,
        total_size: u32,
        block_size: u32,
        sector_size: u32,
        page_size: u32,
        status_mask: u32,
    },
    SpiAttach {
        pins: u32,
        rom_only: u32,
    },
    ChangeBaudRate {
        new_rate: u32,
        old_rate: u32,
    },
    SpiFlashMd5 {
        offset: u32,
        #[brw(pad_after = 8)]
        size: u32,
    },
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Command::FlashBegin { .. } => 0x02,
            Command::FlashData { .. } => 0x03,
            Command::FlashEnd { .. } => 0x04,
            Command::Sync => 0x08,
            Command::WriteReg { .. } => 0x09,
            Command::ReadReg { .. } => 0x0A,
            Command::SpiSetParams { .. } => 0x0B,
            Command::SpiAttach { .. } => 0x0D,
            Command::ChangeBaudRate { .. } => 0x0F,
            Command::SpiFlashMd5 { .. } => 0x13,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Command::Sync => SYNC_TIMEOUT,
            Command::FlashBegin { .. } => FLASH_BEGIN_TIMEOUT,
            Command::FlashData { .. } => FLASH_DATA_TIMEOUT,
            Command::SpiFlashMd5 { .. } => MD5_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Purely for tracing: names a wire opcode byte even for opcodes this
    /// driver never issues itself (e.g. MEM_* or stub-only codes seen as
    /// unsolicited/unexpected traffic).
    pub fn name_from_code(code: u8) -> &'static str {
        match code {
            0x02 => "FLASH_BEGIN",
            0x03 => "FLASH_DATA",
            0x04 => "FLASH_END",
            0x05 => "MEM_BEGIN",
            0x06 => "MEM_END",
            0x07 => "MEM_DATA",
            0x08 => "SYNC",
            0x09 => "WRITE_REG",
            0x0A => "READ_REG",
            0x0B => "SPI_SET_PARAMS",
            0x0D => "SPI_ATTACH",
            0x0F => "CHANGE_BAUDRATE",
            0x10 => "FLASH_DEFL_BEGIN",
            0x11 => "FLASH_DEFL_DATA",
            0x12 => "FLASH_DEFL_END",
            0x13 => "SPI_FLASH_MD5",
            _ => "UNKNOWN",
        }
    }
}
