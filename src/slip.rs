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

//! SLIP byte-stuffing for the ROM bootloader's framing layer.
//!
//! This is not a general RFC 1055 implementation: the ROM bootloader never
//! escapes the frame delimiters themselves (they're emitted raw by the
//! caller), and its decoder tolerates an escape byte followed by anything
//! other than `0xDC`/`0xDD` by passing the pair through literally instead of
//! raising a framing error.

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Appends the SLIP-encoded form of `data` to `out`. Does not add the
/// leading/trailing `END` delimiters; callers own framing.
pub fn encode_into(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len());
    for &b in data {
        match b {
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            END => out.extend_from_slice(&[ESC, ESC_END]),
            _ => out.push(b),
        }
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    encode_into(data, &mut out);
    out
}

/// Incremental SLIP unescaper used by the frame deframer (`crate::frame`).
///
/// One byte goes in, zero or one decoded bytes come out. Byte-at-a-time
/// rather than whole-buffer because the deframer needs to inspect the
/// decoded stream as it arrives, shifting off bad prefixes before a full
/// frame exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder {
    escaped: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self { escaped: false }
    }

    /// Feeds one raw (still SLIP-escaped) byte. Returns `Some(byte)` when a
    /// decoded byte is available, `None` while an escape sequence is still
    /// being assembled.
    pub fn push(&mut self, byte: u8) -> Option<u8> {
        if self.escaped {
            self.escaped = false;
            match byte {
                ESC_END => Some(END),
                ESC_ESC => Some(ESC),
                // Legacy tolerance: an unrecognized escape is not an error,
                // it's passed through as the literal two-byte sequence.
                // The ESC byte was already consumed, so only the second
                // byte is produced here; callers that need the leading ESC
                // back use `push_lossy` below.
                other => Some(other),
            }
        } else if byte == ESC {
            self.escaped = true;
            None
        } else {
            Some(byte)
        }
    }
}

/// Matches the reference decoder's exact legacy-escape behavior: on an
/// unrecognized escape byte, both the `ESC` byte and the literal byte are
/// appended to the output (see `adafruit_miniesptool.py::get_response`,
/// which does `reply += [0xDB, c]`). `Decoder::push` alone only yields the
/// second byte, so the frame deframer uses this wrapper to also emit the
/// `ESC` byte it swallowed.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    inner: Decoder,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw byte, appending zero, one, or two decoded bytes to
    /// `out`.
    pub fn push(&mut self, byte: u8, out: &mut Vec<u8>) {
        let was_escaped = self.inner.escaped;
        if let Some(decoded) = self.inner.push(byte) {
            if was_escaped && byte != ESC_END && byte != ESC_ESC {
                out.push(ESC);
            }
            out.push(decoded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<u8> {
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for &b in input {
            decoder.push(b, &mut out);
        }
        out
    }

    #[test]
    fn encode_passes_through_plain_bytes() {
        let data = [0x01, 0x02, 0x03];
        assert_eq!(encode(&data), data);
    }

    #[test]
    fn encode_escapes_end_and_esc() {
        let data = [0x01, END, 0x02, ESC, 0x03];
        let encoded = encode(&data);
        assert_eq!(encoded, [0x01, ESC, ESC_END, 0x02, ESC, ESC_ESC, 0x03]);
    }

    #[test]
    fn round_trip_every_byte_value() {
        let data: Vec<u8> = (0..=255u8).collect();
        let encoded = encode(&data);
        // No unescaped END or ESC may appear except as an escape prefix.
        let mut i = 0;
        while i < encoded.len() {
            if encoded[i] == ESC {
                i += 2;
                continue;
            }
            assert_ne!(encoded[i], END);
            i += 1;
        }
        assert_eq!(decode_all(&encoded), data);
    }

    #[test]
    fn decode_esc_then_esc_end_sequence() {
        assert_eq!(decode_all(&[0x01, ESC, ESC_END, 0x03]), [0x01, END, 0x03]);
    }

    #[test]
    fn decode_esc_then_esc_esc_sequence() {
        assert_eq!(decode_all(&[0x01, ESC, ESC_ESC, 0x03]), [0x01, ESC, 0x03]);
    }

    #[test]
    fn decode_unrecognized_escape_is_literal_not_an_error() {
        // ESC followed by a byte that isn't ESC_END/ESC_ESC: legacy
        // tolerance means we get both bytes back, not a framing error.
        assert_eq!(decode_all(&[ESC, 0x42]), [ESC, 0x42]);
    }
}
