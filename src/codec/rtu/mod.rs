// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use super::*;
use byteorder::{ByteOrder, LittleEndian};

pub mod client;
pub use self::client::*;

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// Number of trailing CRC bytes.
pub const CRC_LEN: usize = 2;

/// Index of the first payload byte of a read response (`[slave][fn][byte count]`).
pub const PAYLOAD_OFFSET: usize = 3;

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// Polynomial `0xA001` (reflected `0x8005`), seed `0xFFFF`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC of `buf[..len]` behind the data, low byte first.
///
/// Returns the length of the resulting frame.
pub fn append_crc16(buf: &mut [u8], len: usize) -> Result<usize> {
    if buf.len() < len + CRC_LEN {
        return Err(Error::BufferSize);
    }
    let crc = crc16(&buf[..len]);
    LittleEndian::write_u16(&mut buf[len..], crc);
    Ok(len + CRC_LEN)
}

/// Verify the trailing CRC of a complete frame.
///
/// Frames shorter than the CRC itself are invalid.
#[must_use]
pub fn validate_crc16(frame: &[u8]) -> bool {
    check_crc16(frame).is_ok()
}

pub(crate) fn check_crc16(frame: &[u8]) -> Result<()> {
    if frame.len() < CRC_LEN {
        return Err(Error::InsufficientLength(frame.len()));
    }
    let (data, crc_buf) = frame.split_at(frame.len() - CRC_LEN);
    let expected_crc = crc16(data);
    let actual_crc = LittleEndian::read_u16(crc_buf);
    if expected_crc != actual_crc {
        return Err(Error::Crc(expected_crc, actual_crc));
    }
    Ok(())
}

/// Extract the total ADU length (including CRC) out of a partly received
/// response buffer.
///
/// Returns `None` as long as the length cannot be determined yet.
pub fn response_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    if adu_buf.len() < 2 {
        return Ok(None);
    }
    let fn_code = adu_buf[1];
    let pdu_len = match fn_code {
        0x01..=0x04 => {
            if adu_buf.len() > 2 {
                Some(2 + adu_buf[2] as usize)
            } else {
                // incomplete frame
                None
            }
        }
        0x05 | 0x06 | 0x0F | 0x10 => Some(5),
        code if code & 0x80 != 0 => {
            FunctionCode::try_from(code & 0x7F).map_err(|_| Error::FnCode(code))?;
            Some(2)
        }
        _ => return Err(Error::FnCode(fn_code)),
    };
    Ok(pdu_len.map(|len| 1 + len + CRC_LEN))
}

/// The stateless RTU codec.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RtuCodec;

impl Codec for RtuCodec {
    const PAYLOAD_OFFSET: usize = PAYLOAD_OFFSET;
    const MAX_FRAME_LEN: usize = MAX_FRAME_LEN;
    const WRITE_RESPONSE_LEN: usize = WRITE_RESPONSE_LEN;

    fn build_read_request(
        &mut self,
        buf: &mut [u8],
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    ) -> Result<usize> {
        encode_read_request(buf, slave, function, address, quantity)
    }

    fn build_write_request(
        &mut self,
        buf: &mut [u8],
        slave: SlaveId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<usize> {
        encode_write_request(buf, slave, function, data)
    }

    fn validate_read_response(
        &self,
        rsp: &[u8],
        slave: SlaveId,
        function: FunctionCode,
    ) -> Result<()> {
        validate_read_response(rsp, slave, function)
    }

    fn validate_write_response(
        &self,
        rsp: &[u8],
        slave: SlaveId,
        function: FunctionCode,
        data: &[u8],
    ) -> Result<()> {
        validate_write_response(rsp, slave, function, data)
    }

    fn response_len(&self, buf: &[u8]) -> Result<Option<usize>> {
        response_len(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_crc16() {
        let msg = &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16(msg), 0x63B6);

        let msg = &[0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(crc16(msg), 0xF9FB);

        let msg = &[0x01, 0x01, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16(msg), 0x0DBC);

        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn append_crc_low_byte_first() {
        let buf = &mut [0x01, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00];
        assert_eq!(append_crc16(buf, 6).unwrap(), 8);
        assert_eq!(buf, &[0x01, 0x01, 0x00, 0x00, 0x00, 0x0A, 0xBC, 0x0D]);

        let buf = &mut [0x01, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00];
        assert_eq!(append_crc16(buf, 6).err().unwrap(), Error::BufferSize);
    }

    #[test]
    fn validate_crc() {
        assert!(validate_crc16(&[0x01, 0x01, 0x01, 0x1F, 0x10, 0x40]));
        assert!(!validate_crc16(&[0x01, 0x01, 0x01, 0x1F, 0x10, 0x44]));
        assert!(!validate_crc16(&[0x01, 0x01, 0x01, 0x1F, 0x40, 0x10]));
        assert!(!validate_crc16(&[]));
        assert!(!validate_crc16(&[0xFF]));
        // CRC of the empty sequence
        assert!(validate_crc16(&[0xFF, 0xFF]));

        assert_eq!(
            check_crc16(&[0x01, 0x01, 0x01, 0x1F, 0x10, 0x44]),
            Err(Error::Crc(0x4010, 0x4410))
        );
    }

    #[test]
    fn crc_round_trip() {
        let samples: &[&[u8]] = &[
            &[0x00],
            &[0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD],
            &[0xFF; 31],
            &[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02],
        ];
        for sample in samples {
            let mut buf = [0; 64];
            buf[..sample.len()].copy_from_slice(sample);
            let len = append_crc16(&mut buf, sample.len()).unwrap();
            assert!(validate_crc16(&buf[..len]));
        }
    }

    #[test]
    fn test_get_response_len() {
        let buf = &mut [0x66, 0x01, 99];
        assert_eq!(response_len(buf).unwrap(), Some(104));

        assert_eq!(response_len(&[]).unwrap(), None);
        assert_eq!(response_len(&[0x66]).unwrap(), None);
        assert_eq!(response_len(&[0x66, 0x03]).unwrap(), None);

        let buf = &mut [0x66, 0x00, 99, 0x00];
        assert_eq!(response_len(buf).err().unwrap(), Error::FnCode(0));

        buf[1] = 0x17;
        assert_eq!(response_len(buf).err().unwrap(), Error::FnCode(0x17));

        buf[1] = 0x97;
        assert_eq!(response_len(buf).err().unwrap(), Error::FnCode(0x97));

        for fn_code in [0x01, 0x02, 0x03, 0x04] {
            buf[1] = fn_code;
            assert_eq!(response_len(buf).unwrap(), Some(104));
        }

        for fn_code in [0x05, 0x06, 0x0F, 0x10] {
            buf[1] = fn_code;
            assert_eq!(response_len(buf).unwrap(), Some(8));
        }

        for fn_code in [0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x8F, 0x90] {
            buf[1] = fn_code;
            assert_eq!(response_len(buf).unwrap(), Some(5));
        }
    }

    #[test]
    fn codec_decodes_at_rtu_offset() {
        let codec = RtuCodec;
        let rsp = &[0x01, 0x04, 0x02, 0x00, 0x07, 0xF8, 0xF2];
        assert!(codec
            .validate_read_response(rsp, 0x01, FunctionCode::ReadInputRegisters)
            .is_ok());
        let words = &mut [0; 1];
        codec.read_u16_values(rsp, words).unwrap();
        assert_eq!(words, &[0x0007]);

        let rsp = &[0x01, 0x02, 0x01, 0x05, 0x61, 0x8B];
        let coils = &mut [false; 3];
        codec.read_bool_values(rsp, coils).unwrap();
        assert_eq!(coils, &[true, false, true]);
    }
}
