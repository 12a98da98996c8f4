//! ARQ Packet Structures and Serialization
//!
//! Every packet carries a 96-bit (12-byte) header followed by optional payload
//! data. Data packets and acknowledgements share the same shape and are
//! distinguished by bit 31 of the first header word; acknowledgements carry
//! the acknowledged sequence number in the sequence field and no payload.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |A|T|                  Sequence Number (30 bits)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Timestamp (64 bits, microseconds)           |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! ```
//!
//! `A` marks an acknowledgement, `T` marks a valid timestamp field.

use crate::sequence::{SeqNumber, MAX_SEQ_NUMBER};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Size of the packet header in bytes (sequence word + 64-bit timestamp)
pub const HEADER_SIZE: usize = 12;

/// Maximum payload size (MTU 1500 - IP/UDP headers - ARQ header)
pub const MAX_PAYLOAD_SIZE: usize = 1460; // 1500 - 28 (IP+UDP) - 12 (ARQ header)

/// Acknowledgement flag (bit 31 of the sequence word)
const ACK_FLAG: u32 = 0x8000_0000;

/// Timestamp-present flag (bit 30 of the sequence word)
const TIMESTAMP_FLAG: u32 = 0x4000_0000;

/// Mask for sequence number value (bits 0-29)
const SEQ_MASK: u32 = MAX_SEQ_NUMBER;

/// Packet type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Ack,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Data => write!(f, "Data"),
            PacketType::Ack => write!(f, "Ack"),
        }
    }
}

/// Common packet header (96 bits = 12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Word 0: flags and sequence number
    pub seq_word: u32,
    /// Timestamp in microseconds, meaningful only when the timestamp flag is set
    pub timestamp: u64,
}

impl PacketHeader {
    /// Create a new header
    pub fn new(packet_type: PacketType, seq: SeqNumber, timestamp: Option<u64>) -> Self {
        let mut seq_word = seq.as_raw() & SEQ_MASK;
        if packet_type == PacketType::Ack {
            seq_word |= ACK_FLAG;
        }
        if timestamp.is_some() {
            seq_word |= TIMESTAMP_FLAG;
        }

        PacketHeader {
            seq_word,
            timestamp: timestamp.unwrap_or(0),
        }
    }

    /// Check if this is an acknowledgement
    #[inline]
    pub fn is_ack(&self) -> bool {
        (self.seq_word & ACK_FLAG) != 0
    }

    /// Check if this is a data packet
    #[inline]
    pub fn is_data(&self) -> bool {
        !self.is_ack()
    }

    /// Get the packet type
    pub fn packet_type(&self) -> PacketType {
        if self.is_ack() {
            PacketType::Ack
        } else {
            PacketType::Data
        }
    }

    /// Get the sequence number (data) or acknowledged sequence number (ACK)
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber::new_unchecked(self.seq_word & SEQ_MASK)
    }

    /// Get the timestamp, if one was set
    pub fn timestamp(&self) -> Option<u64> {
        if (self.seq_word & TIMESTAMP_FLAG) != 0 {
            Some(self.timestamp)
        } else {
            None
        }
    }

    /// Parse header from bytes (network byte order)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::InsufficientData {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        Ok(PacketHeader {
            seq_word: buf.get_u32(),
            timestamp: buf.get_u64(),
        })
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u32(self.seq_word);
        buf.put_u64(self.timestamp);
    }
}

/// Data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Packet header
    pub header: PacketHeader,
    /// Payload data
    pub payload: Bytes,
}

impl DataPacket {
    /// Create a new data packet
    pub fn new(seq: SeqNumber, timestamp: Option<u64>, payload: Bytes) -> Self {
        DataPacket {
            header: PacketHeader::new(PacketType::Data, seq, timestamp),
            payload,
        }
    }

    /// Get the sequence number
    pub fn seq_number(&self) -> SeqNumber {
        self.header.seq_number()
    }

    /// Get the send timestamp
    pub fn timestamp(&self) -> Option<u64> {
        self.header.timestamp()
    }

    /// Total size of the packet (header + payload)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.to_bytes(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a data packet from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;

        if !header.is_data() {
            return Err(PacketError::WrongPacketType {
                expected: PacketType::Data,
                actual: PacketType::Ack,
            });
        }

        let payload_len = bytes.len() - HEADER_SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(DataPacket {
            header,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }
}

/// Acknowledgement packet
///
/// The sequence field carries the acknowledged value: the last in-order
/// sequence for cumulative acknowledgements, or the received sequence itself
/// for selective ones. The timestamp echoes the acknowledged data packet's
/// timestamp so the sender can sample the round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    /// Packet header
    pub header: PacketHeader,
}

impl AckPacket {
    /// Create a new acknowledgement
    pub fn new(ack_seq: SeqNumber, echo_timestamp: Option<u64>) -> Self {
        AckPacket {
            header: PacketHeader::new(PacketType::Ack, ack_seq, echo_timestamp),
        }
    }

    /// Get the acknowledged sequence number
    pub fn ack_seq(&self) -> SeqNumber {
        self.header.seq_number()
    }

    /// Get the echoed timestamp
    pub fn echo_timestamp(&self) -> Option<u64> {
        self.header.timestamp()
    }

    /// Total size of the packet
    pub fn size(&self) -> usize {
        HEADER_SIZE
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        self.header.to_bytes(&mut buf);
        buf
    }

    /// Parse an acknowledgement from bytes
    ///
    /// Trailing padding after the header is accepted and ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;

        if !header.is_ack() {
            return Err(PacketError::WrongPacketType {
                expected: PacketType::Ack,
                actual: PacketType::Data,
            });
        }

        Ok(AckPacket { header })
    }
}

/// Unified packet type (either data or acknowledgement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
}

impl Packet {
    /// Check if this is a data packet
    pub fn is_data(&self) -> bool {
        matches!(self, Packet::Data(_))
    }

    /// Check if this is an acknowledgement
    pub fn is_ack(&self) -> bool {
        matches!(self, Packet::Ack(_))
    }

    /// Get the packet type
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Data(_) => PacketType::Data,
            Packet::Ack(_) => PacketType::Ack,
        }
    }

    /// Get the packet header
    pub fn header(&self) -> &PacketHeader {
        match self {
            Packet::Data(p) => &p.header,
            Packet::Ack(p) => &p.header,
        }
    }

    /// Sequence field: data sequence or acknowledged sequence
    pub fn seq_number(&self) -> SeqNumber {
        self.header().seq_number()
    }

    /// Get the timestamp
    pub fn timestamp(&self) -> Option<u64> {
        self.header().timestamp()
    }

    /// Total size of the packet
    pub fn size(&self) -> usize {
        match self {
            Packet::Data(p) => p.size(),
            Packet::Ack(p) => p.size(),
        }
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        match self {
            Packet::Data(p) => p.to_bytes(),
            Packet::Ack(p) => p.to_bytes(),
        }
    }

    /// Parse a packet from bytes (automatically determines type)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;

        if header.is_data() {
            Ok(Packet::Data(DataPacket::from_bytes(bytes)?))
        } else {
            Ok(Packet::Ack(AckPacket::from_bytes(bytes)?))
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(packet)
    }
}

impl From<AckPacket> for Packet {
    fn from(packet: AckPacket) -> Self {
        Packet::Ack(packet)
    }
}

/// Packet parsing and validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Wrong packet type: expected {expected}, got {actual}")]
    WrongPacketType {
        expected: PacketType,
        actual: PacketType,
    },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
