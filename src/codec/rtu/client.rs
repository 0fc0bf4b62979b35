// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU client (master) specific functions.
use super::*;
use byteorder::{BigEndian, ByteOrder};

/// Smallest valid response: `[slave][fn][byte count | exception code][crc][crc]`.
const MIN_RESPONSE_LEN: usize = 5;

/// Length of a write response (address and value or quantity echoed).
pub const WRITE_RESPONSE_LEN: usize = 8;

/// Encode an RTU read request.
///
/// Layout: `[slave][fn][addr hi][addr lo][qty hi][qty lo][crc lo][crc hi]`.
/// The quantity is not range checked here.
pub fn encode_read_request(
    buf: &mut [u8],
    slave: SlaveId,
    function: FunctionCode,
    address: Address,
    quantity: Quantity,
) -> Result<usize> {
    if buf.len() < 6 + CRC_LEN {
        return Err(Error::BufferSize);
    }
    buf[0] = slave;
    buf[1] = function.value();
    BigEndian::write_u16(&mut buf[2..], address);
    BigEndian::write_u16(&mut buf[4..], quantity);
    append_crc16(buf, 6)
}

/// Encode an RTU write request with a payload produced by
/// [`crate::write_bool_values`] or [`crate::write_u16_values`].
pub fn encode_write_request(
    buf: &mut [u8],
    slave: SlaveId,
    function: FunctionCode,
    data: &[u8],
) -> Result<usize> {
    let len = 2 + data.len();
    if buf.len() < len + CRC_LEN {
        return Err(Error::BufferSize);
    }
    buf[0] = slave;
    buf[1] = function.value();
    buf[2..len].copy_from_slice(data);
    append_crc16(buf, len)
}

/// Validate an RTU read response.
pub fn validate_read_response(rsp: &[u8], slave: SlaveId, function: FunctionCode) -> Result<()> {
    let res = check_read_response(rsp, slave, function);
    #[cfg(feature = "log")]
    if let Err(err) = &res {
        log::debug!("Rejected RTU read response {rsp:02X?}: {err}");
    }
    res
}

/// Validate an RTU write response.
///
/// `data` is the payload that was submitted with the request; for an
/// echo response its leading address and value (or quantity) must match.
pub fn validate_write_response(
    rsp: &[u8],
    slave: SlaveId,
    function: FunctionCode,
    data: &[u8],
) -> Result<()> {
    let res = check_write_response(rsp, slave, function, data);
    #[cfg(feature = "log")]
    if let Err(err) = &res {
        log::debug!("Rejected RTU write response {rsp:02X?}: {err}");
    }
    res
}

fn check_read_response(rsp: &[u8], slave: SlaveId, function: FunctionCode) -> Result<()> {
    if rsp.len() < MIN_RESPONSE_LEN {
        return Err(Error::InsufficientLength(rsp.len()));
    }
    validate_header(rsp, 0, slave, function)?;
    validate_byte_count(rsp, 0, CRC_LEN)?;
    check_crc16(rsp)
}

fn check_write_response(
    rsp: &[u8],
    slave: SlaveId,
    function: FunctionCode,
    data: &[u8],
) -> Result<()> {
    if rsp.len() < MIN_RESPONSE_LEN {
        return Err(Error::InsufficientLength(rsp.len()));
    }
    validate_header(rsp, 0, slave, function)?;
    if rsp.len() == WRITE_RESPONSE_LEN {
        validate_echo(rsp, 0, data)?;
    }
    check_crc16(rsp)
}

/// Decode `coils.len()` coils or discrete inputs from a validated response.
pub fn read_bool_values(rsp: &[u8], coils: &mut [Coil]) -> Result<()> {
    util::read_bool_values(rsp, PAYLOAD_OFFSET, coils)
}

/// Decode `words.len()` registers from a validated response.
pub fn read_u16_values(rsp: &[u8], words: &mut [Word]) -> Result<()> {
    util::read_u16_values(rsp, PAYLOAD_OFFSET, words)
}
