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

//! The ROM's flash-data checksum: XOR-fold starting from 0xEF.

pub const CHECKSUM_MAGIC: u8 = 0xEF;

pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(CHECKSUM_MAGIC, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_magic() {
        assert_eq!(checksum(&[]), CHECKSUM_MAGIC);
    }

    #[test]
    fn matches_spec_example() {
        // 0xEF ^ 0xDE ^ 0xAD ^ 0xBE ^ 0xEF = 0xAD
        assert_eq!(checksum(&[0xDE, 0xAD, 0xBE, 0xEF]), 0xAD);
    }

    #[test]
    fn xor_is_order_independent() {
        let forward = checksum(&[0x01, 0x02, 0x03, 0x04]);
        let backward = checksum(&[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(forward, backward);
    }
}
