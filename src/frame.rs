// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::error::Error;

/// Slave ID (RTU) or unit ID (MBAP).
pub type SlaveId = u8;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// A Modbus function code supported by this master.
///
/// It is represented by an unsigned 8 bit integer.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,
}

impl FunctionCode {
    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
        }
    }

    /// The function code a device answers with when it rejects the request.
    #[must_use]
    pub const fn exception_value(self) -> u8 {
        self.value() | 0x80
    }

    /// Largest number of points a single request may carry.
    ///
    /// Single writes always transfer exactly one point.
    #[must_use]
    pub const fn max_quantity(self) -> Quantity {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => 2000,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => 125,
            Self::WriteMultipleCoils => 1968,
            Self::WriteMultipleRegisters => 123,
            Self::WriteSingleCoil | Self::WriteSingleRegister => 1,
        }
    }

    /// Check that `quantity` lies within `1..=max_quantity()`.
    pub const fn check_quantity(self, quantity: Quantity) -> Result<(), Error> {
        let max = self.max_quantity();
        if quantity == 0 || quantity > max {
            return Err(Error::Quantity(quantity, max));
        }
        Ok(())
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        let code = match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            code => return Err(Error::FnCode(code)),
        };
        Ok(code)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.value())
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Unknown(u8),
}

impl Exception {
    /// The raw exception code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::SlaveDeviceFailure => 0x04,
            Self::Unknown(code) => code,
        }
    }

    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::SlaveDeviceFailure => "Slave device failure",
            Self::Unknown(_) => "Unknown error code",
        }
    }
}

impl From<u8> for Exception {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::SlaveDeviceFailure,
            code => Self::Unknown(code),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "{}: 0x{code:0>2X}", self.get_name()),
            _ => write!(f, "{}", self.get_name()),
        }
    }
}

#[cfg(all(feature = "defmt", target_os = "none"))]
impl defmt::Format for Exception {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} ({=u8})", self.get_name(), self.code())
    }
}

/// A server (slave) exception response.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

impl From<ExceptionResponse> for [u8; 2] {
    fn from(ex: ExceptionResponse) -> [u8; 2] {
        [ex.function.exception_value(), ex.exception.code()]
    }
}
