//! Packet framing primitives
//!
//! The wire codec proper (encryption, per-opcode body layouts) lives with
//! the handlers; this module only knows that every packet starts with a
//! little-endian u16 opcode and gives handlers bounds-checked readers over
//! the rest.

use bytes::{BufMut, Bytes, BytesMut};

/// Error types for inbound frame parsing
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("read out of bounds: pos={pos}, wanted={wanted}, len={len}")]
    ReadOutOfBounds {
        pos: usize,
        wanted: usize,
        len: usize,
    },

    #[error("invalid packet header: {0}")]
    InvalidHeader(String),
}

/// Protocol opcodes owned by the session core itself. Game opcodes are
/// registered by their own modules.
pub mod opcode {
    /// server -> client keepalive probe
    pub const PING: u16 = 0x0011;
    /// client -> server keepalive answer
    pub const PONG: u16 = 0x0018;
}

/// An outbound packet: opcode already encoded into the byte payload.
#[derive(Debug, Clone)]
pub struct Packet(Bytes);

impl Packet {
    pub fn opcode(&self) -> Option<u16> {
        if self.0.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.0[0], self.0[1]]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Builder for outbound packets.
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn new(opcode: u16) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u16_le(opcode);
        Self { buf }
    }

    pub fn write_u8(mut self, val: u8) -> Self {
        self.buf.put_u8(val);
        self
    }

    pub fn write_u16(mut self, val: u16) -> Self {
        self.buf.put_u16_le(val);
        self
    }

    pub fn write_u32(mut self, val: u32) -> Self {
        self.buf.put_u32_le(val);
        self
    }

    /// Length-prefixed string (u16 length, raw bytes).
    pub fn write_string(mut self, val: &str) -> Self {
        self.buf.put_u16_le(val.len() as u16);
        self.buf.put_slice(val.as_bytes());
        self
    }

    pub fn build(self) -> Packet {
        Packet(self.buf.freeze())
    }
}

/// The keepalive probe sent by the liveness monitor.
pub fn ping() -> Packet {
    PacketBuilder::new(opcode::PING).build()
}

/// An inbound packet with bounds-checked cursor reads.
///
/// All multi-byte fields are little-endian.
pub struct InPacket {
    data: Bytes,
    pos: usize,
}

impl InPacket {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// The leading opcode. Valid only as the first read.
    pub fn read_opcode(&mut self) -> Result<u16, FrameError> {
        if self.data.len() < 2 {
            return Err(FrameError::InvalidHeader(format!(
                "packet of {} bytes has no opcode",
                self.data.len()
            )));
        }
        self.read_u16()
    }

    fn take(&mut self, wanted: usize) -> Result<&[u8], FrameError> {
        if self.pos + wanted > self.data.len() {
            return Err(FrameError::ReadOutOfBounds {
                pos: self.pos,
                wanted,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + wanted];
        self.pos += wanted;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FrameError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, FrameError> {
        Ok(self.read_u32()? as i32)
    }

    /// Length-prefixed string (u16 length, raw bytes). Invalid UTF-8 is
    /// replaced rather than rejected; name validation happens upstream.
    pub fn read_string(&mut self) -> Result<String, FrameError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The full frame, for logging context.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
