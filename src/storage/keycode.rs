//! Order-preserving key encoding.
//!
//! Keys are built from a leading tag byte followed by fields:
//! - `u64` is written big-endian, so numeric order equals byte order.
//! - Byte strings escape `0x00` as `0x00 0xff` and end with `0x00 0x00`,
//!   so a shorter string sorts before any longer string sharing its prefix.
//!
//! Omitting the terminator (`encode_bytes_prefix`) yields a prefix that
//! matches every key whose byte-string field starts with the given bytes.

use crate::error::{Error, Result};

pub fn encode_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    encode_bytes_prefix(out, bytes);
    out.extend_from_slice(&[0x00, 0x00]);
}

pub fn encode_bytes_prefix(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        match b {
            0x00 => out.extend_from_slice(&[0x00, 0xff]),
            b => out.push(b),
        }
    }
}

/// Cursor over an encoded key.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        let (&first, rest) = self
            .data
            .split_first()
            .ok_or_else(|| Error::Internal("unexpected end of key".into()))?;
        self.data = rest;
        Ok(first)
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        if self.data.len() < 8 {
            return Err(Error::Internal("unexpected end of key".into()));
        }
        let (head, rest) = self.data.split_at(8);
        self.data = rest;
        Ok(u64::from_be_bytes(head.try_into()?))
    }

    pub fn take_bytes(&mut self) -> Result<Vec<u8>> {
        let data = self.data;
        let mut out = Vec::new();
        let mut iter = data.iter().enumerate();
        while let Some((i, &b)) = iter.next() {
            if b != 0x00 {
                out.push(b);
                continue;
            }
            match iter.next() {
                Some((_, &0xff)) => out.push(0x00),
                Some((j, &0x00)) => {
                    self.data = &data[j + 1..];
                    return Ok(out);
                }
                _ => {
                    return Err(Error::Internal(format!(
                        "invalid byte escape at offset {}",
                        i
                    )))
                }
            }
        }
        Err(Error::Internal("unterminated byte string in key".into()))
    }

    /// Fails if any input is left over.
    pub fn finish(self) -> Result<()> {
        if !self.data.is_empty() {
            return Err(Error::Internal(format!(
                "{} trailing bytes in key",
                self.data.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_key(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_bytes(&mut out, bytes);
        out
    }

    #[test]
    fn test_bytes_order() {
        let mut inputs: Vec<&[u8]> = vec![&b"ab"[..], b"a", b"a\x00", b"a\x00b", b"b", b""];
        let mut keys: Vec<_> = inputs.iter().map(|b| bytes_key(b)).collect();
        inputs.sort();
        keys.sort();
        let decoded: Vec<Vec<u8>> = keys
            .iter()
            .map(|k| Decoder::new(k).take_bytes().unwrap())
            .collect();
        assert_eq!(decoded, inputs.iter().map(|b| b.to_vec()).collect::<Vec<_>>());
    }

    #[test]
    fn test_mixed_fields() -> Result<()> {
        let mut key = vec![3];
        encode_bytes(&mut key, b"k\x00y");
        encode_u64(&mut key, 42);

        let mut decoder = Decoder::new(&key);
        assert_eq!(decoder.take_u8()?, 3);
        assert_eq!(decoder.take_bytes()?, b"k\x00y".to_vec());
        assert_eq!(decoder.take_u64()?, 42);
        decoder.finish()
    }

    #[test]
    fn test_prefix_matches() {
        let mut prefix = Vec::new();
        encode_bytes_prefix(&mut prefix, b"ke");
        assert!(bytes_key(b"key").starts_with(&prefix));
        assert!(bytes_key(b"ke").starts_with(&prefix));
        assert!(!bytes_key(b"k").starts_with(&prefix));
    }

    #[test]
    fn test_truncated() {
        assert!(Decoder::new(&[0, 1, 2]).take_u64().is_err());
        assert!(Decoder::new(b"abc").take_bytes().is_err());
        assert!(Decoder::new(&[0x00, 0x01]).take_bytes().is_err());
        assert!(Decoder::new(&[1]).finish().is_err());
    }
}
