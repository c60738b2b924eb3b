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

//! Bencode codec: decodes the bencode grammar into an intermediate value tree, and
//! encodes a value tree back to bytes deterministically. Dictionary key order is
//! preserved on decode (a `Vec` of pairs, not a `HashMap`) so info-hash re-encoding and
//! round-trip tests are byte-exact.

use crate::error::{Error, Result};

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int(i64),
    List(Vec<Value>),
    Dict(Vec<(Vec<u8>, Value)>),
}

impl Value {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Vec<u8>, Value)]> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up a dict key, accepting either the raw key bytes or a Rust-style field
    /// name where underscores stand in for spaces (`piece_length` <-> `"piece length"`).
    pub fn dict_get(&self, field: &str) -> Option<&Value> {
        let dict = self.as_dict()?;
        let key = field_to_key(field);
        dict.iter()
            .find(|(k, _)| k.as_slice() == key.as_bytes())
            .map(|(_, v)| v)
    }
}

/// Converts a Rust field name to its bencode dictionary key: underscores become spaces.
pub fn field_to_key(field: &str) -> String {
    field.replace('_', " ")
}

/// Decodes a complete bencode byte string into a [`Value`] tree.
pub fn decode(input: &[u8]) -> Result<Value> {
    let mut dec = Decoder { buf: input, pos: 0 };
    dec.skip_whitespace();
    let value = dec.decode_value()?;
    dec.skip_whitespace();
    Ok(value)
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(Error::UnexpectedEof)
    }

    fn advance(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&b) = self.buf.get(self.pos) {
            if b == b' ' || b == b'\n' || b == b'\r' || b == b'\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn decode_value(&mut self) -> Result<Value> {
        match self.peek()? {
            b'i' => self.decode_int().map(Value::Int),
            b'l' => self.decode_list().map(Value::List),
            b'd' => self.decode_dict().map(Value::Dict),
            b'0'..=b'9' => self.decode_bytes().map(Value::Bytes),
            other => Err(Error::MalformedBencode(format!(
                "unexpected token byte {:#x}",
                other
            ))),
        }
    }

    fn decode_int(&mut self) -> Result<i64> {
        // i<signed-int>e
        debug_assert_eq!(self.advance()?, b'i');
        let start = self.pos;
        if self.peek()? == b'-' {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(Error::MalformedBencode("empty integer".into()));
        }
        if self.advance()? != b'e' {
            return Err(Error::MalformedBencode("unterminated integer".into()));
        }
        let text = std::str::from_utf8(&self.buf[start..self.pos - 1])
            .map_err(|_| Error::MalformedBencode("non-utf8 integer".into()))?;
        text.parse::<i64>().map_err(|_| Error::IntegerOverflow)
    }

    fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        // <len>:<bytes>
        let start = self.pos;
        while self.peek()? != b':' {
            if !self.peek()?.is_ascii_digit() {
                return Err(Error::MalformedBencode("invalid string length".into()));
            }
            self.pos += 1;
        }
        let len_text = std::str::from_utf8(&self.buf[start..self.pos])
            .map_err(|_| Error::MalformedBencode("non-utf8 string length".into()))?;
        let len: usize = len_text
            .parse()
            .map_err(|_| Error::MalformedBencode("invalid string length".into()))?;
        self.pos += 1; // consume ':'
        let end = self
            .pos
            .checked_add(len)
            .ok_or(Error::IntegerOverflow)?;
        if end > self.buf.len() {
            return Err(Error::UnexpectedEof);
        }
        let bytes = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn decode_list(&mut self) -> Result<Vec<Value>> {
        debug_assert_eq!(self.advance()?, b'l');
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == b'e' {
                self.pos += 1;
                return Ok(list);
            }
            list.push(self.decode_value()?);
        }
    }

    fn decode_dict(&mut self) -> Result<Vec<(Vec<u8>, Value)>> {
        debug_assert_eq!(self.advance()?, b'd');
        let mut dict = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == b'e' {
                self.pos += 1;
                return Ok(dict);
            }
            let key = self.decode_bytes()?;
            self.skip_whitespace();
            let value = self.decode_value()?;
            dict.push((key, value));
        }
    }
}

/// Encodes a [`Value`] tree back to its canonical bencode byte representation. The
/// encoder never emits whitespace between tokens, and a dict's keys are emitted in
/// the order they are stored in — callers that need a specific (e.g. declaration)
/// order must build the `Value::Dict` in that order.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::List(list) => {
            out.push(b'l');
            for item in list {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(dict) => {
            out.push(b'd');
            for (key, value) in dict {
                encode_into(&Value::Bytes(key.clone()), out);
                encode_into(value, out);
            }
            out.push(b'e');
        }
    }
}
