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

//! Chip family identification: the probe register, efuse base addresses,
//! and the MAC address / chip name derivations that read off of them.

use crate::error::{Error, Result};

/// Register read during chip probing; its value distinguishes ESP8266 from
/// ESP32 (this driver never talks to the S2/S3/C3 family, which use a
/// different probe scheme entirely).
pub const CHIP_MAGIC_REG: u32 = 0x6000_0078;

const ESP32_MAGIC: u32 = 0x1512_2500;
const ESP8266_MAGIC: u32 = 0x0006_2000;

const ESP8266_EFUSE_BASE: u32 = 0x3FF0_0050;
const ESP32_EFUSE_BASE: u32 = 0x6001_A000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipFamily {
    Esp8266,
    Esp32,
}

impl ChipFamily {
    pub fn from_magic(magic: u32) -> Result<Self> {
        match magic {
            ESP32_MAGIC => Ok(ChipFamily::Esp32),
            ESP8266_MAGIC => Ok(ChipFamily::Esp8266),
            other => Err(Error::UnknownChip(other)),
        }
    }

    /// Base address of the four consecutive efuse words for this family.
    pub fn efuse_base(self) -> u32 {
        match self {
            ChipFamily::Esp8266 => ESP8266_EFUSE_BASE,
            ChipFamily::Esp32 => ESP32_EFUSE_BASE,
        }
    }
}

impl std::fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChipFamily::Esp8266 => "ESP8266",
            ChipFamily::Esp32 => "ESP32",
        })
    }
}

/// Four consecutive 32-bit efuse words, read from `ChipFamily::efuse_base`
/// at offsets 0, 4, 8, 12.
#[derive(Debug, Clone, Copy, Default)]
pub struct Efuses(pub [u32; 4]);

impl Efuses {
    /// Derives the six-byte MAC address for `family` from these efuse
    /// words.
    pub fn mac_address(&self, family: ChipFamily) -> [u8; 6] {
        let [e0, e1, e2, e3] = self.0;
        match family {
            ChipFamily::Esp8266 => [
                ((e3 >> 16) & 0xFF) as u8,
                ((e3 >> 8) & 0xFF) as u8,
                (e3 & 0xFF) as u8,
                ((e1 >> 8) & 0xFF) as u8,
                (e1 & 0xFF) as u8,
                ((e0 >> 24) & 0xFF) as u8,
            ],
            ChipFamily::Esp32 => [
                ((e2 >> 8) & 0xFF) as u8,
                (e2 & 0xFF) as u8,
                ((e1 >> 24) & 0xFF) as u8,
                ((e1 >> 16) & 0xFF) as u8,
                ((e1 >> 8) & 0xFF) as u8,
                (e1 & 0xFF) as u8,
            ],
        }
    }

    /// Derives the human-readable chip name, refining ESP8266 into
    /// "ESP8285" when the relevant efuse bits indicate an embedded-flash
    /// part.
    pub fn chip_name(&self, family: ChipFamily) -> &'static str {
        match family {
            ChipFamily::Esp32 => "ESP32",
            ChipFamily::Esp8266 => {
                let is_esp8285 = (self.0[0] & (1 << 4)) != 0 || (self.0[2] & (1 << 16)) != 0;
                if is_esp8285 {
                    "ESP8285"
                } else {
                    "ESP8266EX"
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_recognizes_esp32() {
        assert_eq!(ChipFamily::from_magic(0x1512_2500).unwrap(), ChipFamily::Esp32);
    }

    #[test]
    fn probe_recognizes_esp8266() {
        assert_eq!(
            ChipFamily::from_magic(0x0006_2000).unwrap(),
            ChipFamily::Esp8266
        );
    }

    #[test]
    fn probe_rejects_unknown_magic() {
        let err = ChipFamily::from_magic(0xDEAD_BEEF).unwrap_err();
        assert!(matches!(err, Error::UnknownChip(0xDEAD_BEEF)));
    }

    #[test]
    fn esp8266_mac_matches_formula() {
        let efuses = Efuses([0x12000000, 0x0000AABB, 0, 0x00CCDDEE]);
        let mac = efuses.mac_address(ChipFamily::Esp8266);
        assert_eq!(mac, [0xCC, 0xDD, 0xEE, 0xAA, 0xBB, 0x12]);
    }

    #[test]
    fn esp32_mac_matches_formula() {
        let efuses = Efuses([0, 0x11223344, 0x0000AABB, 0]);
        let mac = efuses.mac_address(ChipFamily::Esp32);
        assert_eq!(mac, [0xAA, 0xBB, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn esp8266_name_is_plain_by_default() {
        let efuses = Efuses([0, 0, 0, 0]);
        assert_eq!(efuses.chip_name(ChipFamily::Esp8266), "ESP8266EX");
    }

    #[test]
    fn esp8266_name_is_esp8285_when_efuse0_bit4_set() {
        let efuses = Efuses([1 << 4, 0, 0, 0]);
        assert_eq!(efuses.chip_name(ChipFamily::Esp8266), "ESP8285");
    }

    #[test]
    fn esp8266_name_is_esp8285_when_efuse2_bit16_set() {
        let efuses = Efuses([0, 0, 1 << 16, 0]);
        assert_eq!(efuses.chip_name(ChipFamily::Esp8266), "ESP8285");
    }

    #[test]
    fn esp32_name_ignores_efuse_bits() {
        let efuses = Efuses([0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF]);
        assert_eq!(efuses.chip_name(ChipFamily::Esp32), "ESP32");
    }
}
