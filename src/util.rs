// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers
//!
//! Payload packing for write requests and value unpacking for read
//! responses. Both codecs share these; they only differ in the offset
//! where the payload starts inside the frame.

use byteorder::{BigEndian, ByteOrder};

use crate::{error::Error, frame::*};

/// Turn a bool into a u16 coil value
#[must_use]
pub const fn bool_to_u16_coil(state: bool) -> u16 {
    if state { 0xFF00 } else { 0x0000 }
}

/// Calculate the number of bytes required for a given number of coils.
#[must_use]
pub const fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

///  Pack coils into a byte array.
///
///  It returns the number of bytes used to pack the coils.
pub fn pack_coils(coils: &[Coil], bytes: &mut [u8]) -> Result<usize, Error> {
    let packed_size = packed_coils_len(coils.len());
    if bytes.len() < packed_size {
        return Err(Error::BufferSize);
    }
    bytes[..packed_size].fill(0);
    coils.iter().enumerate().for_each(|(i, b)| {
        let v = if *b { 0b1 } else { 0b0 };
        bytes[i / 8] |= v << (i % 8);
    });
    Ok(packed_size)
}

///  Unpack coils from a byte array.
///
///  Bit `i` is taken from byte `i / 8`, LSB first.
pub fn unpack_coils(bytes: &[u8], coils: &mut [Coil]) -> Result<(), Error> {
    if bytes.len() < packed_coils_len(coils.len()) {
        return Err(Error::BufferSize);
    }
    coils.iter_mut().enumerate().for_each(|(i, coil)| {
        *coil = (bytes[i / 8] >> (i % 8)) & 0b1 > 0;
    });
    Ok(())
}

/// Unpack big-endian words from a byte array.
pub fn unpack_words(bytes: &[u8], words: &mut [Word]) -> Result<(), Error> {
    if bytes.len() < words.len() * 2 {
        return Err(Error::BufferSize);
    }
    BigEndian::read_u16_into(&bytes[..words.len() * 2], words);
    Ok(())
}

/// Encode the payload of a coil write request.
///
/// A single value produces `[addr][0xFF00 | 0x0000]` (write single coil),
/// more values produce `[addr][quantity][byte count][packed bits]`
/// (write multiple coils). Returns the payload length.
pub fn write_bool_values(address: Address, values: &[Coil], buf: &mut [u8]) -> Result<usize, Error> {
    match values {
        [] => Err(Error::Quantity(0, FunctionCode::WriteMultipleCoils.max_quantity())),
        [value] => {
            if buf.len() < 4 {
                return Err(Error::BufferSize);
            }
            BigEndian::write_u16(&mut buf[0..], address);
            BigEndian::write_u16(&mut buf[2..], bool_to_u16_coil(*value));
            Ok(4)
        }
        values => {
            let quantity = multi_value_quantity(values.len())?;
            let byte_count = packed_coils_len(values.len());
            if buf.len() < 5 + byte_count {
                return Err(Error::BufferSize);
            }
            BigEndian::write_u16(&mut buf[0..], address);
            BigEndian::write_u16(&mut buf[2..], quantity);
            buf[4] = byte_count as u8;
            pack_coils(values, &mut buf[5..])?;
            Ok(5 + byte_count)
        }
    }
}

/// Encode the payload of a register write request.
///
/// A single value produces `[addr][value]` (write single register),
/// more values produce `[addr][quantity][byte count][words]`
/// (write multiple registers). Returns the payload length.
pub fn write_u16_values(address: Address, values: &[Word], buf: &mut [u8]) -> Result<usize, Error> {
    match values {
        [] => Err(Error::Quantity(0, FunctionCode::WriteMultipleRegisters.max_quantity())),
        [value] => {
            if buf.len() < 4 {
                return Err(Error::BufferSize);
            }
            BigEndian::write_u16(&mut buf[0..], address);
            BigEndian::write_u16(&mut buf[2..], *value);
            Ok(4)
        }
        values => {
            let quantity = multi_value_quantity(values.len())?;
            let byte_count = values.len() * 2;
            if byte_count > usize::from(u8::MAX) || buf.len() < 5 + byte_count {
                return Err(Error::BufferSize);
            }
            BigEndian::write_u16(&mut buf[0..], address);
            BigEndian::write_u16(&mut buf[2..], quantity);
            buf[4] = byte_count as u8;
            BigEndian::write_u16_into(values, &mut buf[5..5 + byte_count]);
            Ok(5 + byte_count)
        }
    }
}

fn multi_value_quantity(len: usize) -> Result<Quantity, Error> {
    // The byte count field is a single byte.
    if packed_coils_len(len) > usize::from(u8::MAX) {
        return Err(Error::BufferSize);
    }
    Quantity::try_from(len).map_err(|_| Error::BufferSize)
}

/// Decode `coils.len()` bits from a validated read response whose
/// payload starts at `offset`.
pub fn read_bool_values(rsp: &[u8], offset: usize, coils: &mut [Coil]) -> Result<(), Error> {
    let payload = rsp.get(offset..).ok_or(Error::BufferSize)?;
    unpack_coils(payload, coils)
}

/// Decode `words.len()` registers from a validated read response whose
/// payload starts at `offset`.
pub fn read_u16_values(rsp: &[u8], offset: usize, words: &mut [Word]) -> Result<(), Error> {
    let payload = rsp.get(offset..).ok_or(Error::BufferSize)?;
    unpack_words(payload, words)
}
