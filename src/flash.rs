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

//! Flash geometry constants and the ESP8266 erase-size fixup.
//!
//! The fixup compensates for a ROM bug that erases one extra sector block
//! at region boundaries; without it, a write near the end of a flash region
//! can clobber data just past the intended range.

/// Bytes written per FLASH_DATA command.
pub const WRITE_BLOCK_SIZE: u32 = 0x400;
/// Bytes erased per flash sector.
pub const ERASE_SECTOR_SIZE: u32 = 0x1000;
/// Sectors erased per logical erase block.
pub const SECTORS_PER_BLOCK: u32 = 16;

/// Computes how many bytes FLASH_BEGIN should claim to erase, accounting
/// for the ESP8266 ROM's tendency to erase a whole extra block at region
/// boundaries.
pub fn esp8266_erase_size(offset: u32, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    let num_sectors = (size + ERASE_SECTOR_SIZE - 1) / ERASE_SECTOR_SIZE;
    let start_sector = offset / ERASE_SECTOR_SIZE;
    let head_sectors = SECTORS_PER_BLOCK - (start_sector % SECTORS_PER_BLOCK);
    let head_sectors = head_sectors.min(num_sectors);
    if num_sectors < 2 * head_sectors {
        ((num_sectors + 1) / 2) * ERASE_SECTOR_SIZE
    } else {
        (num_sectors - head_sectors) * ERASE_SECTOR_SIZE
    }
}

/// Number of FLASH_DATA blocks needed to cover `size` bytes.
pub fn num_blocks(size: u32) -> u32 {
    (size + WRITE_BLOCK_SIZE - 1) / WRITE_BLOCK_SIZE
}

/// Advisory progress reported to a caller-supplied callback during
/// `flash_file`; has no effect on protocol behavior.
#[derive(Debug, Clone, Copy)]
pub struct FlashProgress {
    pub block: u32,
    pub total_blocks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_blocks_rounds_up() {
        assert_eq!(num_blocks(0), 0);
        assert_eq!(num_blocks(1), 1);
        assert_eq!(num_blocks(WRITE_BLOCK_SIZE), 1);
        assert_eq!(num_blocks(WRITE_BLOCK_SIZE + 1), 2);
    }

    #[test]
    fn erase_size_whole_number_of_blocks_from_zero() {
        // 16 sectors from offset 0: head_sectors = 16, num_sectors = 16,
        // 16 < 2*16 so we take the "small write" branch.
        let size = SECTORS_PER_BLOCK * ERASE_SECTOR_SIZE;
        let erase = esp8266_erase_size(0, size);
        assert_eq!(erase, ((16 + 1) / 2) * ERASE_SECTOR_SIZE);
    }

    #[test]
    fn erase_size_large_write_past_head_uses_tail_branch() {
        // 64 sectors from offset 0: head_sectors = 16, num_sectors = 64,
        // 64 >= 2*16, so erase_size = (64-16)*sector_size.
        let size = 64 * ERASE_SECTOR_SIZE;
        let erase = esp8266_erase_size(0, size);
        assert_eq!(erase, (64 - 16) * ERASE_SECTOR_SIZE);
    }

    #[test]
    fn erase_size_respects_offset_within_block() {
        // Starting 3 sectors into a 16-sector block leaves 13 head sectors.
        let offset = 3 * ERASE_SECTOR_SIZE;
        let size = 20 * ERASE_SECTOR_SIZE;
        let head_sectors = 13u32;
        let num_sectors = 20u32;
        let erase = esp8266_erase_size(offset, size);
        assert_eq!(erase, (num_sectors - head_sectors) * ERASE_SECTOR_SIZE);
    }

    #[test]
    fn erase_size_zero_for_empty_write() {
        assert_eq!(esp8266_erase_size(0, 0), 0);
    }
}
