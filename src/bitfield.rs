// Copyright (c) 2020 zenoxygen
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

/// A Bitfield represents the pieces a peer has: big-endian bit-addressed, byte `i/8`
/// bit `7 - (i % 8)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    /// Builds an all-zero bitfield sized for `n_pieces` (`ceil(n_pieces / 8)` bytes).
    pub fn empty(n_pieces: usize) -> Self {
        Bitfield(vec![0u8; (n_pieces + 7) / 8])
    }

    pub fn from_raw(raw: Vec<u8>) -> Self {
        Bitfield(raw)
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.0
    }

    /// Returns `false` when `index` is out of range rather than panicking.
    pub fn has(&self, index: usize) -> bool {
        let byte_index = index / 8;
        let offset = index % 8;
        match self.0.get(byte_index) {
            Some(byte) => (byte >> (7 - offset)) & 1 != 0,
            None => false,
        }
    }

    /// No-op when `index` is out of range; caller must size the bitfield correctly.
    pub fn set(&mut self, index: usize) {
        let byte_index = index / 8;
        let offset = index % 8;
        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }
}
