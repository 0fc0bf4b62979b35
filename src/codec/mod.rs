// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{error::*, frame::*, util};

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

type Result<T> = core::result::Result<T, Error>;

/// Request building and response validation for one framing variant.
///
/// Implemented by [`rtu::RtuCodec`] and [`tcp::TcpCodec`]. All operations work
/// on caller supplied buffers and never retain them.
pub trait Codec {
    /// Index of the first payload byte of a read response.
    const PAYLOAD_OFFSET: usize;

    /// Upper bound of a request or response frame.
    const MAX_FRAME_LEN: usize;

    /// Length of a regular (non-exception) write response.
    const WRITE_RESPONSE_LEN: usize;

    /// Encode a read request into `buf` and return the frame length.
    fn build_read_request(
        &mut self,
        buf: &mut [u8],
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    ) -> Result<usize>;

    /// Encode a write request carrying the pre-encoded payload `data`
    /// into `buf` and return the frame length.
    fn build_write_request(
        &mut self,
        buf: &mut [u8],
        slave: SlaveId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<usize>;

    /// Check a complete read response.
    fn validate_read_response(
        &self,
        rsp: &[u8],
        slave: SlaveId,
        function: FunctionCode,
    ) -> Result<()>;

    /// Check a complete write response against the submitted payload.
    fn validate_write_response(
        &self,
        rsp: &[u8],
        slave: SlaveId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<()>;

    /// Total length of the response frame at the start of `buf`, or
    /// `None` if more bytes are required to tell.
    fn response_len(&self, buf: &[u8]) -> Result<Option<usize>>;

    /// Decode `coils.len()` bits from a validated read response.
    fn read_bool_values(&self, rsp: &[u8], coils: &mut [Coil]) -> Result<()> {
        util::read_bool_values(rsp, Self::PAYLOAD_OFFSET, coils)
    }

    /// Decode `words.len()` registers from a validated read response.
    fn read_u16_values(&self, rsp: &[u8], words: &mut [Word]) -> Result<()> {
        util::read_u16_values(rsp, Self::PAYLOAD_OFFSET, words)
    }
}

/// Check slave address and function code of the PDU located at `offset`.
///
/// The caller guarantees that `adu` holds at least `offset + 3` bytes.
pub(crate) fn validate_header(
    adu: &[u8],
    offset: usize,
    slave: SlaveId,
    function: FunctionCode,
) -> Result<()> {
    let actual_slave = adu[offset];
    if actual_slave != slave {
        return Err(Error::SlaveMismatch(slave, actual_slave));
    }
    let fn_code = adu[offset + 1];
    if fn_code == function.exception_value() {
        return Err(Error::Exception(ExceptionResponse {
            function,
            exception: Exception::from(adu[offset + 2]),
        }));
    }
    if fn_code != function.value() {
        return Err(Error::FnCodeMismatch(function.value(), fn_code));
    }
    Ok(())
}

/// Check the byte count field of a read response against the frame length.
///
/// `trailer` is the number of bytes following the payload (the CRC for RTU).
pub(crate) fn validate_byte_count(adu: &[u8], offset: usize, trailer: usize) -> Result<()> {
    let byte_count = usize::from(adu[offset + 2]);
    let expected = offset + 3 + byte_count + trailer;
    if expected != adu.len() {
        return Err(Error::LengthMismatch(expected, adu.len()));
    }
    Ok(())
}

/// Compare the echoed address and value (or quantity) of a write response
/// with the first four bytes of the submitted payload.
pub(crate) fn validate_echo(adu: &[u8], offset: usize, data: &[u8]) -> Result<()> {
    let expected = four_bytes(data.get(..4))?;
    let actual = four_bytes(adu.get(offset + 2..offset + 6))?;
    if expected != actual {
        return Err(Error::DataMismatch(expected, actual));
    }
    Ok(())
}

fn four_bytes(bytes: Option<&[u8]>) -> Result<[u8; 4]> {
    bytes
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .ok_or(Error::BufferSize)
}
