// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP client (master) specific functions.
use super::*;
use byteorder::{BigEndian, ByteOrder};

/// Smallest valid response: MBAP header, function code and one more byte.
const MIN_RESPONSE_LEN: usize = HEADER_LEN + 2;

/// Length of a write response (address and value or quantity echoed).
pub const WRITE_RESPONSE_LEN: usize = HEADER_LEN + 5;

/// Encode an MBAP read request.
pub fn encode_read_request(
    buf: &mut [u8],
    hdr: Header,
    function: FunctionCode,
    address: Address,
    quantity: Quantity,
) -> Result<usize> {
    let len = hdr.encode(buf, 5)?;
    buf[7] = function.value();
    BigEndian::write_u16(&mut buf[8..], address);
    BigEndian::write_u16(&mut buf[10..], quantity);
    Ok(len)
}

/// Encode an MBAP write request with a pre-encoded payload.
pub fn encode_write_request(
    buf: &mut [u8],
    hdr: Header,
    function: FunctionCode,
    data: &[u8],
) -> Result<usize> {
    let len = hdr.encode(buf, 1 + data.len())?;
    buf[7] = function.value();
    buf[8..len].copy_from_slice(data);
    Ok(len)
}

/// Validate an MBAP read response against the request header.
pub fn validate_read_response(rsp: &[u8], hdr: Header, function: FunctionCode) -> Result<()> {
    let res = check_read_response(rsp, hdr, function);
    #[cfg(feature = "log")]
    if let Err(err) = &res {
        log::debug!("Rejected MBAP read response {rsp:02X?}: {err}");
    }
    res
}

/// Validate an MBAP write response against the request header and the
/// submitted payload.
pub fn validate_write_response(
    rsp: &[u8],
    hdr: Header,
    function: FunctionCode,
    data: &[u8],
) -> Result<()> {
    let res = check_write_response(rsp, hdr, function, data);
    #[cfg(feature = "log")]
    if let Err(err) = &res {
        log::debug!("Rejected MBAP write response {rsp:02X?}: {err}");
    }
    res
}

fn check_read_response(rsp: &[u8], hdr: Header, function: FunctionCode) -> Result<()> {
    if rsp.len() < MIN_RESPONSE_LEN {
        return Err(Error::InsufficientLength(rsp.len()));
    }
    validate_mbap(rsp, hdr.transaction_id)?;
    validate_header(rsp, HEADER_LEN - 1, hdr.unit_id, function)?;
    validate_byte_count(rsp, HEADER_LEN - 1, 0)?;
    validate_length_field(rsp)
}

fn check_write_response(
    rsp: &[u8],
    hdr: Header,
    function: FunctionCode,
    data: &[u8],
) -> Result<()> {
    if rsp.len() < MIN_RESPONSE_LEN {
        return Err(Error::InsufficientLength(rsp.len()));
    }
    validate_mbap(rsp, hdr.transaction_id)?;
    validate_header(rsp, HEADER_LEN - 1, hdr.unit_id, function)?;
    if rsp.len() == WRITE_RESPONSE_LEN {
        validate_echo(rsp, HEADER_LEN - 1, data)?;
    }
    validate_length_field(rsp)
}

/// Decode `coils.len()` coils or discrete inputs from a validated response.
pub fn read_bool_values(rsp: &[u8], coils: &mut [Coil]) -> Result<()> {
    util::read_bool_values(rsp, PAYLOAD_OFFSET, coils)
}

/// Decode `words.len()` registers from a validated response.
pub fn read_u16_values(rsp: &[u8], words: &mut [Word]) -> Result<()> {
    util::read_u16_values(rsp, PAYLOAD_OFFSET, words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_bool_values;

    const HDR: Header = Header {
        transaction_id: 0x0001,
        unit_id: 0x01,
    };

    #[test]
    fn encode_read_holding_registers_request() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let sz = encode_read_request(&mut buf, HDR, FunctionCode::ReadHoldingRegisters, 0, 10)
            .expect("Error encoding request");
        assert_eq!(
            &buf[..sz],
            &[
                0x00, // transaction id
                0x01, // transaction id
                0x00, // protocol id
                0x00, // protocol id
                0x00, // length high byte
                0x06, // length low byte
                0x01, // unit id
                0x03, // function code
                0x00, // addr
                0x00, // addr
                0x00, // quantity
                0x0A, // quantity
            ]
        );
    }

    #[test]
    fn encode_write_single_register_request() {
        let mut buf = [0u8; 255];
        let hdr = Header {
            transaction_id: 0x1234,
            unit_id: 0x12,
        };
        let sz = encode_write_request(
            &mut buf,
            hdr,
            FunctionCode::WriteSingleRegister,
            &[0x22, 0x22, 0xAB, 0xCD],
        )
        .expect("Error encoding request");

        let req = &buf[..sz];
        assert_eq!(
            req,
            &[
                0x12, // transaction id
                0x34, // transaction id
                0x00, // protocol id
                0x00, // protocol id
                0x00, // length high byte
                0x06, // length low byte
                0x12, // unit id
                0x06, // function code
                0x22, // addr
                0x22, // addr
                0xAB, // value
                0xCD, // value
            ]
        );
    }

    #[test]
    fn encode_write_multiple_coils_request() {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let data = &mut [0; 8];
        let len = write_bool_values(0x0013, &[true, false, true], data).unwrap();
        let sz = encode_write_request(&mut buf, HDR, FunctionCode::WriteMultipleCoils, &data[..len])
            .unwrap();
        assert_eq!(
            &buf[..sz],
            &[
                0x00, 0x01, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x08, // length
                0x01, // unit id
                0x0F, // function code
                0x00, 0x13, // addr
                0x00, 0x03, // quantity
                0x01, // byte count
                0b101, // coils
            ]
        );
    }

    #[test]
    fn encode_into_small_buffer() {
        let mut buf = [0u8; 11];
        assert_eq!(
            encode_read_request(&mut buf, HDR, FunctionCode::ReadCoils, 0, 1)
                .err()
                .unwrap(),
            Error::BufferSize
        );
        assert_eq!(
            encode_write_request(&mut buf, HDR, FunctionCode::WriteSingleCoil, &[0, 0, 0xFF, 0])
                .err()
                .unwrap(),
            Error::BufferSize
        );
    }

    mod read_response {
        use super::*;

        #[test]
        fn accept_read_holding_registers_response() {
            let rsp = &[
                0x00, 0x01, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x07, // length
                0x01, // unit id
                0x03, // function code
                0x04, // byte count
                0x89, 0x02, 0x42, 0xC7, // registers
            ];
            assert!(validate_read_response(rsp, HDR, FunctionCode::ReadHoldingRegisters).is_ok());
            let words = &mut [0; 2];
            read_u16_values(rsp, words).unwrap();
            assert_eq!(words, &[0x8902, 0x42C7]);
        }

        #[test]
        fn accept_read_coils_response() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x01, 0x02, 0xFD, 0x02,
            ];
            assert!(validate_read_response(rsp, HDR, FunctionCode::ReadCoils).is_ok());
            let coils = &mut [false; 10];
            read_bool_values(rsp, coils).unwrap();
            assert_eq!(
                coils,
                &[true, false, true, true, true, true, true, true, false, true]
            );
        }

        #[test]
        fn reject_short_responses() {
            assert_eq!(
                validate_read_response(&[], HDR, FunctionCode::ReadCoils),
                Err(Error::InsufficientLength(0))
            );
            assert_eq!(
                validate_read_response(&[0x01, 0x01, 0x01, 0x1F], HDR, FunctionCode::ReadCoils),
                Err(Error::InsufficientLength(4))
            );
        }

        #[test]
        fn reject_transaction_id_mismatch() {
            let rsp = &[
                0x00, 0x02, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x1F,
            ];
            let err = validate_read_response(rsp, HDR, FunctionCode::ReadCoils)
                .err()
                .unwrap();
            assert_eq!(err, Error::TransactionId(0x0001, 0x0002));
            assert_eq!(err.kind(), ErrorKind::Integrity);

            let rsp = &[
                0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x1F,
            ];
            assert_eq!(
                validate_read_response(rsp, HDR, FunctionCode::ReadCoils),
                Err(Error::TransactionId(0x0001, 0x0100))
            );
        }

        #[test]
        fn reject_foreign_protocol() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x01, 0x00, 0x04, 0x01, 0x01, 0x01, 0x1F,
            ];
            assert_eq!(
                validate_read_response(rsp, HDR, FunctionCode::ReadCoils),
                Err(Error::ProtocolNotModbus(1))
            );
        }

        #[test]
        fn reject_unit_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x02, 0x01, 0x01, 0x1F,
            ];
            assert_eq!(
                validate_read_response(rsp, HDR, FunctionCode::ReadCoils),
                Err(Error::SlaveMismatch(0x01, 0x02))
            );
        }

        #[test]
        fn reject_exception_response() {
            for (code, exception) in [
                (0x01, Exception::IllegalFunction),
                (0x02, Exception::IllegalDataAddress),
                (0x03, Exception::IllegalDataValue),
                (0x04, Exception::SlaveDeviceFailure),
                (0x05, Exception::Unknown(0x05)),
            ] {
                let rsp = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x81, code];
                assert_eq!(
                    validate_read_response(rsp, HDR, FunctionCode::ReadCoils),
                    Err(Error::Exception(ExceptionResponse {
                        function: FunctionCode::ReadCoils,
                        exception,
                    }))
                );
            }
        }

        #[test]
        fn reject_function_code_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x1F,
            ];
            assert_eq!(
                validate_read_response(rsp, HDR, FunctionCode::ReadDiscreteInputs),
                Err(Error::FnCodeMismatch(0x02, 0x01))
            );
        }

        #[test]
        fn reject_byte_count_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x05, 0x1F, 0x10, 0x40,
            ];
            let err = validate_read_response(rsp, HDR, FunctionCode::ReadCoils)
                .err()
                .unwrap();
            assert_eq!(err, Error::LengthMismatch(14, 12));
            assert_eq!(err.kind(), ErrorKind::Framing);
        }

        #[test]
        fn reject_length_field_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x01, 0x1F,
            ];
            assert_eq!(
                validate_read_response(rsp, HDR, FunctionCode::ReadCoils),
                Err(Error::LengthMismatch(12, 10))
            );
        }
    }

    mod write_response {
        use super::*;

        const COIL_ON: &[u8] = &[0x00, 0x00, 0xFF, 0x00];

        #[test]
        fn accept_single_coil_echo() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00,
            ];
            assert!(validate_write_response(rsp, HDR, FunctionCode::WriteSingleCoil, COIL_ON).is_ok());
        }

        #[test]
        fn reject_transaction_id_mismatch() {
            let rsp = &[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00,
            ];
            assert_eq!(
                validate_write_response(rsp, HDR, FunctionCode::WriteSingleCoil, COIL_ON),
                Err(Error::TransactionId(0x0001, 0x0000))
            );
        }

        #[test]
        fn reject_function_code_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00,
            ];
            assert_eq!(
                validate_write_response(rsp, HDR, FunctionCode::WriteSingleRegister, COIL_ON),
                Err(Error::FnCodeMismatch(0x06, 0x05))
            );
        }

        #[test]
        fn reject_echo_mismatch() {
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x01, 0x00, 0xFF, 0x00,
            ];
            assert_eq!(
                validate_write_response(rsp, HDR, FunctionCode::WriteSingleCoil, COIL_ON),
                Err(Error::DataMismatch(
                    [0x00, 0x00, 0xFF, 0x00],
                    [0x01, 0x00, 0xFF, 0x00]
                ))
            );

            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00,
            ];
            assert!(matches!(
                validate_write_response(
                    rsp,
                    HDR,
                    FunctionCode::WriteSingleCoil,
                    &[0x00, 0x00, 0xFF, 0x01]
                ),
                Err(Error::DataMismatch(_, _))
            ));
        }

        #[test]
        fn reject_exception_response() {
            let rsp = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x90, 0x02];
            assert_eq!(
                validate_write_response(rsp, HDR, FunctionCode::WriteMultipleRegisters, &[]),
                Err(Error::Exception(ExceptionResponse {
                    function: FunctionCode::WriteMultipleRegisters,
                    exception: Exception::IllegalDataAddress,
                }))
            );
        }

        #[test]
        fn accept_multiple_registers_response() {
            let data = &[0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02];
            let rsp = &[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x01, 0x00, 0x02,
            ];
            assert!(
                validate_write_response(rsp, HDR, FunctionCode::WriteMultipleRegisters, data).is_ok()
            );
        }
    }
}
