//! XDR (RFC 4506) encode/decode primitives shared by the RPC, NFSv3 and
//! MOUNTv3 codecs.
//!
//! Decoding works over a fully reassembled, in-memory byte slice rather than
//! an incremental `Read` stream: the connection layer collects an entire RPC
//! record before handing it to these decoders, so bounds checks here are
//! exact instead of speculative.

pub mod mount;
pub mod nfs3;
pub mod rpc;

use byteorder::{BigEndian, ByteOrder};

/// Errors produced while decoding an XDR byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before a value could be fully decoded.
    Truncated,
    /// A length-prefixed field declared more bytes than the protocol allows.
    TooLarge { field: &'static str, len: u32, max: u32 },
    /// A discriminant did not map to any known enum variant.
    BadDiscriminant { field: &'static str, value: u32 },
    /// A string was not valid UTF-8.
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read-only cursor over a decoded byte buffer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u32()? != 0)
    }

    /// Read `n` bytes plus the XDR padding to the next 4-byte boundary.
    pub fn opaque_fixed(&mut self, n: usize) -> Result<&'a [u8]> {
        let data = self.take(n)?;
        self.skip_padding(n)?;
        Ok(data)
    }

    fn skip_padding(&mut self, len: usize) -> Result<()> {
        let pad = pad_len(len);
        if pad > 0 {
            self.take(pad)?;
        }
        Ok(())
    }

    /// Read a length-prefixed opaque byte vector, rejecting lengths over `max`.
    pub fn opaque_var(&mut self, field: &'static str, max: u32) -> Result<&'a [u8]> {
        let len = self.u32()?;
        if len > max {
            return Err(Error::TooLarge { field, len, max });
        }
        self.opaque_fixed(len as usize)
    }

    /// Read a length-prefixed UTF-8 string, rejecting lengths over `max`.
    pub fn string(&mut self, field: &'static str, max: u32) -> Result<String> {
        let bytes = self.opaque_var(field, max)?;
        std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| Error::InvalidUtf8)
    }

    /// Read an `Option<T>` encoded as a 4-byte discriminant followed by the value.
    pub fn option<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        if self.bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }

    /// Read a length-prefixed vector of elements.
    pub fn vector<T>(
        &mut self,
        field: &'static str,
        max: u32,
        mut read: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let len = self.u32()?;
        if len > max {
            return Err(Error::TooLarge { field, len, max });
        }
        let mut out = Vec::with_capacity(len as usize);
        for _ in 0..len {
            out.push(read(self)?);
        }
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

/// Growable byte buffer used by all encoders.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn u32(&mut self, v: u32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn i32(&mut self, v: i32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_i32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn u64(&mut self, v: u64) {
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn i64(&mut self, v: i64) {
        let mut tmp = [0u8; 8];
        BigEndian::write_i64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn bool(&mut self, v: bool) {
        self.u32(if v { 1 } else { 0 });
    }

    pub fn opaque(&mut self, data: &[u8]) {
        self.u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self.pad(data.len());
    }

    pub fn opaque_fixed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.pad(data.len());
    }

    pub fn string(&mut self, s: &str) {
        self.opaque(s.as_bytes());
    }

    pub fn option<T>(&mut self, value: &Option<T>, mut write: impl FnMut(&mut Self, &T)) {
        match value {
            Some(v) => {
                self.bool(true);
                write(self, v);
            }
            None => self.bool(false),
        }
    }

    pub fn vector<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) {
        self.u32(items.len() as u32);
        for item in items {
            write(self, item);
        }
    }

    fn pad(&mut self, len: usize) {
        for _ in 0..pad_len(len) {
            self.buf.push(0);
        }
    }
}

fn pad_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let mut enc = Encoder::new();
        enc.u32(42);
        enc.i64(-7);
        enc.bool(true);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u32().unwrap(), 42);
        assert_eq!(dec.i64().unwrap(), -7);
        assert!(dec.bool().unwrap());
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn pads_opaque_to_four_bytes() {
        let mut enc = Encoder::new();
        enc.opaque(b"abc");
        let bytes = enc.into_bytes();
        // 4 (len) + 3 (data) + 1 (pad) = 8
        assert_eq!(bytes.len(), 8);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.opaque_var("x", 16).unwrap(), b"abc");
    }

    #[test]
    fn rejects_oversized_opaque() {
        let mut enc = Encoder::new();
        enc.opaque(&vec![0u8; 10]);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.opaque_var("x", 4), Err(Error::TooLarge { field: "x", len: 10, max: 4 }));
    }

    #[test]
    fn truncated_buffer_errors() {
        let mut dec = Decoder::new(&[0, 0, 0]);
        assert_eq!(dec.u32(), Err(Error::Truncated));
    }
}
