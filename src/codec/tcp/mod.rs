// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP/UDP (MBAP framing)

use super::*;
use byteorder::{BigEndian, ByteOrder};

pub mod client;
pub use self::client::*;

pub type TransactionId = u16;
pub type UnitId = u8;

// [MODBUS MESSAGING ON TCP/IP IMPLEMENTATION GUIDE V1.0b](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 5
// "MBAP header ... 7 bytes", the PDU is limited to 253 bytes.
pub const MAX_FRAME_LEN: usize = 260;

/// Length of the MBAP header (transaction id, protocol id, length, unit id).
pub const HEADER_LEN: usize = 7;

/// Index of the first payload byte of a read response
/// (MBAP header, function code and byte count).
pub const PAYLOAD_OFFSET: usize = HEADER_LEN + 2;

/// Bytes in front of the data counted by the length field.
const LENGTH_FIELD_END: usize = 6;

/// The protocol identifier of Modbus.
const PROTOCOL_ID: u16 = 0;

/// MBAP header fields that identify a request.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

impl Header {
    /// Write the header for a PDU of `pdu_len` bytes.
    ///
    /// Returns the length of the complete frame.
    pub fn encode(&self, buf: &mut [u8], pdu_len: usize) -> Result<usize> {
        let len = HEADER_LEN + pdu_len;
        if buf.len() < len {
            return Err(Error::BufferSize);
        }
        let length = u16::try_from(1 + pdu_len).map_err(|_| Error::BufferSize)?;
        BigEndian::write_u16(&mut buf[0..], self.transaction_id);
        BigEndian::write_u16(&mut buf[2..], PROTOCOL_ID);
        BigEndian::write_u16(&mut buf[4..], length);
        buf[6] = self.unit_id;
        Ok(len)
    }
}

/// Check transaction ID and protocol ID of a response.
///
/// The caller guarantees that `adu` holds at least [`HEADER_LEN`] bytes.
pub(crate) fn validate_mbap(adu: &[u8], transaction_id: TransactionId) -> Result<()> {
    let actual = BigEndian::read_u16(&adu[0..2]);
    if actual != transaction_id {
        return Err(Error::TransactionId(transaction_id, actual));
    }
    let protocol_id = BigEndian::read_u16(&adu[2..4]);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::ProtocolNotModbus(protocol_id));
    }
    Ok(())
}

/// Check the length field against the actual frame length.
pub(crate) fn validate_length_field(adu: &[u8]) -> Result<()> {
    let expected = LENGTH_FIELD_END + usize::from(BigEndian::read_u16(&adu[4..6]));
    if expected != adu.len() {
        return Err(Error::LengthMismatch(expected, adu.len()));
    }
    Ok(())
}

/// Extract the total ADU length out of a partly received response buffer.
///
/// Returns `None` as long as the length field has not been received.
pub fn response_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    if adu_buf.len() < LENGTH_FIELD_END {
        return Ok(None);
    }
    let protocol_id = BigEndian::read_u16(&adu_buf[2..4]);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::ProtocolNotModbus(protocol_id));
    }
    let length = usize::from(BigEndian::read_u16(&adu_buf[4..6]));
    Ok(Some(LENGTH_FIELD_END + length))
}

/// The MBAP codec.
///
/// It owns the transaction counter: every request built draws the next ID
/// and responses are validated against the most recently issued one. The
/// counter starts at `0`, so the first request carries ID `1`; after
/// `0xFFFF` it wraps around to `0x0000`. A request that fails to encode
/// does not use up an ID.
///
/// Building a request requires `&mut self`. Sharing a codec between
/// concurrent requests therefore needs external serialization, one
/// outstanding request at a time.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TcpCodec {
    transaction_id: TransactionId,
}

impl TcpCodec {
    /// Create a codec with the counter at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_transaction_id(0)
    }

    /// Create a codec whose counter is seeded with `transaction_id`.
    #[must_use]
    pub const fn with_transaction_id(transaction_id: TransactionId) -> Self {
        Self { transaction_id }
    }

    /// The most recently issued transaction ID.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Advance the counter and return the new transaction ID.
    pub fn next_transaction_id(&mut self) -> TransactionId {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    /// Header of the next request; the counter is only advanced once the
    /// request has been encoded.
    const fn upcoming_header(&self, unit_id: UnitId) -> Header {
        Header {
            transaction_id: self.transaction_id.wrapping_add(1),
            unit_id,
        }
    }

    fn current_header(&self, unit_id: UnitId) -> Header {
        Header {
            transaction_id: self.transaction_id,
            unit_id,
        }
    }
}

impl Codec for TcpCodec {
    const PAYLOAD_OFFSET: usize = PAYLOAD_OFFSET;
    const MAX_FRAME_LEN: usize = MAX_FRAME_LEN;
    const WRITE_RESPONSE_LEN: usize = WRITE_RESPONSE_LEN;

    fn build_read_request(
        &mut self,
        buf: &mut [u8],
        unit_id: UnitId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    ) -> Result<usize> {
        let hdr = self.upcoming_header(unit_id);
        let len = encode_read_request(buf, hdr, function, address, quantity)?;
        self.transaction_id = hdr.transaction_id;
        Ok(len)
    }

    fn build_write_request(
        &mut self,
        buf: &mut [u8],
        unit_id: UnitId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<usize> {
        let hdr = self.upcoming_header(unit_id);
        let len = encode_write_request(buf, hdr, function, data)?;
        self.transaction_id = hdr.transaction_id;
        Ok(len)
    }

    fn validate_read_response(
        &self,
        rsp: &[u8],
        unit_id: UnitId,
        function: FunctionCode,
    ) -> Result<()> {
        validate_read_response(rsp, self.current_header(unit_id), function)
    }

    fn validate_write_response(
        &self,
        rsp: &[u8],
        unit_id: UnitId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<()> {
        validate_write_response(rsp, self.current_header(unit_id), function, data)
    }

    fn response_len(&self, buf: &[u8]) -> Result<Option<usize>> {
        response_len(buf)
    }
}
