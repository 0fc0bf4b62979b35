// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::frame::ExceptionResponse;

/// modbus-master Error
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid buffer size
    BufferSize,
    /// Unsupported function code
    FnCode(u8),
    /// Response is shorter than the smallest valid frame
    InsufficientLength(usize),
    /// Length Mismatch
    LengthMismatch(usize, usize),
    /// Protocol not Modbus
    ProtocolNotModbus(u16),
    /// Slave (unit) address mismatch
    SlaveMismatch(u8, u8),
    /// Function code mismatch
    FnCodeMismatch(u8, u8),
    /// The device answered with an exception response
    Exception(ExceptionResponse),
    /// Invalid CRC
    Crc(u16, u16),
    /// Transaction ID mismatch
    TransactionId(u16, u16),
    /// Echoed write data differs from the submitted data
    DataMismatch([u8; 4], [u8; 4]),
    /// Quantity out of range
    Quantity(u16, u16),
}

/// Coarse classification of an [`Error`].
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Frame too short or length fields inconsistent with the frame.
    Framing,
    /// The slave (unit) address of the response differs from the request.
    AddressMismatch,
    /// The function code of the response differs from the request.
    FunctionCodeMismatch,
    /// The device reported an exception.
    ProtocolException,
    /// CRC (RTU) or transaction ID (MBAP) mismatch.
    Integrity,
    /// Echoed write data does not match.
    DataMismatch,
    /// The caller passed arguments the codec cannot work with.
    InvalidArgument,
}

impl Error {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            InsufficientLength(_) | LengthMismatch(_, _) | ProtocolNotModbus(_) => {
                ErrorKind::Framing
            }
            SlaveMismatch(_, _) => ErrorKind::AddressMismatch,
            FnCodeMismatch(_, _) => ErrorKind::FunctionCodeMismatch,
            Exception(_) => ErrorKind::ProtocolException,
            Crc(_, _) | TransactionId(_, _) => ErrorKind::Integrity,
            DataMismatch(_, _) => ErrorKind::DataMismatch,
            BufferSize | FnCode(_) | Quantity(_, _) => ErrorKind::InvalidArgument,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            BufferSize => write!(f, "Invalid buffer size"),
            FnCode(fn_code) => write!(f, "Unsupported function code: 0x{fn_code:0>2X}"),
            InsufficientLength(len) => write!(f, "Response length is insufficient: {len}"),
            LengthMismatch(expected, actual) => write!(
                f,
                "Length Mismatch: expected = {expected}, actual = {actual}"
            ),
            ProtocolNotModbus(protocol_id) => {
                write!(f, "Protocol not Modbus(0), received {protocol_id} instead")
            }
            SlaveMismatch(expected, actual) => write!(
                f,
                "Slave address mismatch: expected = 0x{expected:0>2X}, actual = 0x{actual:0>2X}"
            ),
            FnCodeMismatch(expected, actual) => write!(
                f,
                "Function code mismatch: expected = 0x{expected:0>2X}, actual = 0x{actual:0>2X}"
            ),
            Exception(rsp) => write!(
                f,
                "Modbus exception response to function 0x{:0>2X}: {}",
                rsp.function.value(),
                rsp.exception
            ),
            Crc(expected, actual) => write!(
                f,
                "Invalid CRC: expected = 0x{expected:0>4X}, actual = 0x{actual:0>4X}"
            ),
            TransactionId(expected, actual) => write!(
                f,
                "Transaction ID mismatch: expected = {expected}, actual = {actual}"
            ),
            DataMismatch(expected, actual) => write!(
                f,
                "Returned data does not match: expected = {expected:02X?}, actual = {actual:02X?}"
            ),
            Quantity(quantity, max) => write!(
                f,
                "Invalid quantity: {quantity} (must be between 1 and {max})"
            ),
        }
    }
}

impl core::error::Error for Error {}
