// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking Modbus client (master).
//!
//! A [`Client`] couples a [`Codec`] with a [`Transport`] and runs one
//! request/response cycle at a time: build, send, receive, validate and
//! decode all happen while an internal lock is held. Concurrent callers
//! sharing a client are therefore served strictly one after the other,
//! which also keeps the MBAP transaction IDs of request and response in
//! step.
//!
//! ```no_run
//! use modbus_master::client::{self, ClientOptions};
//! use std::time::Duration;
//!
//! let opts = ClientOptions {
//!     read_timeout: Some(Duration::from_secs(1)),
//!     ..Default::default()
//! };
//! let client = client::tcp("192.168.0.222:502", &opts)?;
//! let registers = client.read_holding_registers(0x01, 0x0000, 10)?;
//! client.write_single_coil(0x01, 0x0007, true)?;
//! # Ok::<(), modbus_master::client::ClientError>(())
//! ```

use std::{
    fmt, io,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
    vec,
    vec::Vec,
};

use crate::{codec::Codec, error::*, frame::*, util};

mod transport;

pub use self::transport::*;

#[cfg(feature = "rtu")]
use crate::codec::rtu::RtuCodec;
#[cfg(feature = "tcp")]
use crate::codec::tcp::TcpCodec;

type Result<T> = core::result::Result<T, ClientError>;

/// Large enough for RTU and MBAP frames.
const BUF_LEN: usize = 260;

/// Largest write payload: address, quantity, byte count and 246 data bytes.
const MAX_WRITE_PAYLOAD_LEN: usize = 5 + 246;

/// Runtime options applied by the connect helpers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// `None` blocks until a response arrives.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

/// Error returned by the [`Client`].
#[derive(Debug)]
pub enum ClientError {
    /// The transport failed (includes timeouts).
    Io(io::Error),
    /// The request could not be built or the response was rejected.
    Modbus(Error),
}

impl ClientError {
    /// The codec error classification, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Io(_) => None,
            Self::Modbus(err) => Some(err.kind()),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Modbus(err) => write!(f, "Modbus error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Modbus(err) => Some(err),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        Self::Modbus(err)
    }
}

/// Responses to earlier requests that are skipped within one exchange.
const MAX_STALE_RESPONSES: usize = 3;

struct Inner<C, T> {
    codec: C,
    transport: T,
    buf: [u8; BUF_LEN],
    /// Pending input is dropped before the next request.
    resync: bool,
}

impl<C: Codec, T: Transport> Inner<C, T> {
    /// Run a read cycle and return the length of the validated response.
    fn read(
        &mut self,
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
        byte_count: usize,
    ) -> Result<usize> {
        let req_len = self.codec.build_read_request(
            &mut self.buf[..C::MAX_FRAME_LEN],
            slave,
            function,
            address,
            quantity,
        )?;
        self.exchange(req_len, |codec, rsp| {
            codec.validate_read_response(rsp, slave, function)?;
            check_byte_count(rsp, C::PAYLOAD_OFFSET, byte_count)
        })
    }

    fn write(&mut self, slave: SlaveId, function: FunctionCode, data: &[u8]) -> Result<()> {
        let req_len = self.codec.build_write_request(
            &mut self.buf[..C::MAX_FRAME_LEN],
            slave,
            function,
            data,
        )?;
        self.exchange(req_len, |codec, rsp| {
            codec.validate_write_response(rsp, slave, function, data)?;
            if rsp.len() != C::WRITE_RESPONSE_LEN {
                return Err(Error::LengthMismatch(C::WRITE_RESPONSE_LEN, rsp.len()));
            }
            Ok(())
        })
        .map(drop)
    }

    /// Send the request in `buf[..req_len]` and receive its response.
    fn exchange<V>(&mut self, req_len: usize, validate: V) -> Result<usize>
    where
        V: Fn(&C, &[u8]) -> core::result::Result<(), Error>,
    {
        if self.resync {
            self.transport.discard_pending()?;
            self.resync = false;
        }
        let res = self.transact(req_len, validate);
        if let Err(err) = &res {
            #[cfg(feature = "log")]
            log::warn!("Modbus exchange failed: {err}");
            self.resync = needs_resync(err);
        }
        res
    }

    fn transact<V>(&mut self, req_len: usize, validate: V) -> Result<usize>
    where
        V: Fn(&C, &[u8]) -> core::result::Result<(), Error>,
    {
        let Self {
            codec,
            transport,
            buf,
            ..
        } = self;
        let buf = &mut buf[..C::MAX_FRAME_LEN];
        #[cfg(feature = "log")]
        log::trace!("Sending {:02X?}", &buf[..req_len]);
        transport.send(&buf[..req_len])?;
        let mut stale = 0;
        loop {
            let rsp_len = transport.receive(buf, |b| codec.response_len(b))?;
            let rsp = &buf[..rsp_len];
            #[cfg(feature = "log")]
            log::trace!("Received {rsp:02X?}");
            match validate(&*codec, rsp) {
                Ok(()) => return Ok(rsp_len),
                Err(Error::TransactionId(expected, actual))
                    if stale < MAX_STALE_RESPONSES && is_older(actual, expected) =>
                {
                    #[cfg(feature = "log")]
                    log::debug!("Skipping stale response with transaction ID {actual}");
                    stale += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// `true` if transaction ID `actual` was issued before `expected`.
const fn is_older(actual: u16, expected: u16) -> bool {
    let age = expected.wrapping_sub(actual);
    age != 0 && age < 0x8000
}

/// Everything but a well-formed rejection by the device may leave
/// unread input behind.
fn needs_resync(err: &ClientError) -> bool {
    match err {
        ClientError::Io(_) => true,
        ClientError::Modbus(err) => !matches!(
            err.kind(),
            ErrorKind::ProtocolException | ErrorKind::DataMismatch
        ),
    }
}

/// The byte count of a read response must match the requested quantity.
fn check_byte_count(
    rsp: &[u8],
    payload_offset: usize,
    expected: usize,
) -> core::result::Result<(), Error> {
    let actual = usize::from(rsp[payload_offset - 1]);
    if actual != expected {
        return Err(Error::LengthMismatch(expected, actual));
    }
    Ok(())
}

fn quantity_of(len: usize) -> Quantity {
    Quantity::try_from(len).unwrap_or(Quantity::MAX)
}

/// A Modbus master on top of a codec and a transport.
pub struct Client<C, T> {
    inner: Mutex<Inner<C, T>>,
}

impl<C, T> fmt::Debug for Client<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

#[cfg(feature = "rtu")]
impl<T: Transport> Client<RtuCodec, T> {
    /// An RTU client, e.g. `Client::rtu(StreamTransport::new(serial_port))`.
    pub const fn rtu(transport: T) -> Self {
        Self::new(RtuCodec, transport)
    }
}

#[cfg(feature = "tcp")]
impl<T: Transport> Client<TcpCodec, T> {
    /// An MBAP client whose first request carries transaction ID `1`.
    pub const fn tcp(transport: T) -> Self {
        Self::new(TcpCodec::new(), transport)
    }
}

impl<C, T> Client<C, T> {
    pub const fn new(codec: C, transport: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                codec,
                transport,
                buf: [0; BUF_LEN],
                resync: false,
            }),
        }
    }

    /// Take back codec and transport.
    pub fn into_parts(self) -> (C, T) {
        let Inner {
            codec, transport, ..
        } = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (codec, transport)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Codec, T: Transport> Client<C, T> {
    /// Read `quantity` coils (0x01).
    pub fn read_coils(
        &self,
        slave: SlaveId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Coil>> {
        self.read_bits(slave, FunctionCode::ReadCoils, address, quantity)
    }

    /// Read `quantity` discrete inputs (0x02).
    pub fn read_discrete_inputs(
        &self,
        slave: SlaveId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Coil>> {
        self.read_bits(slave, FunctionCode::ReadDiscreteInputs, address, quantity)
    }

    /// Read `quantity` holding registers (0x03).
    pub fn read_holding_registers(
        &self,
        slave: SlaveId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Word>> {
        self.read_words(slave, FunctionCode::ReadHoldingRegisters, address, quantity)
    }

    /// Read `quantity` input registers (0x04).
    pub fn read_input_registers(
        &self,
        slave: SlaveId,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Word>> {
        self.read_words(slave, FunctionCode::ReadInputRegisters, address, quantity)
    }

    /// Write a single coil (0x05).
    pub fn write_single_coil(&self, slave: SlaveId, address: Address, coil: Coil) -> Result<()> {
        self.write_bits(slave, FunctionCode::WriteSingleCoil, address, &[coil])
    }

    /// Write a single holding register (0x06).
    pub fn write_single_register(
        &self,
        slave: SlaveId,
        address: Address,
        word: Word,
    ) -> Result<()> {
        self.write_words(slave, FunctionCode::WriteSingleRegister, address, &[word])
    }

    /// Write multiple coils (0x0F).
    ///
    /// A single coil is sent as a single coil write (0x05).
    pub fn write_multiple_coils(
        &self,
        slave: SlaveId,
        address: Address,
        coils: &[Coil],
    ) -> Result<()> {
        let function = match coils {
            [_] => FunctionCode::WriteSingleCoil,
            _ => FunctionCode::WriteMultipleCoils,
        };
        self.write_bits(slave, function, address, coils)
    }

    /// Write multiple holding registers (0x10).
    ///
    /// A single register is sent as a single register write (0x06).
    pub fn write_multiple_registers(
        &self,
        slave: SlaveId,
        address: Address,
        words: &[Word],
    ) -> Result<()> {
        let function = match words {
            [_] => FunctionCode::WriteSingleRegister,
            _ => FunctionCode::WriteMultipleRegisters,
        };
        self.write_words(slave, function, address, words)
    }

    fn read_bits(
        &self,
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Coil>> {
        function.check_quantity(quantity)?;
        let byte_count = util::packed_coils_len(quantity.into());
        let mut guard = self.lock();
        let inner = &mut *guard;
        let rsp_len = inner.read(slave, function, address, quantity, byte_count)?;
        let mut coils = vec![false; quantity.into()];
        inner
            .codec
            .read_bool_values(&inner.buf[..rsp_len], &mut coils)?;
        Ok(coils)
    }

    fn read_words(
        &self,
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        quantity: Quantity,
    ) -> Result<Vec<Word>> {
        function.check_quantity(quantity)?;
        let byte_count = usize::from(quantity) * 2;
        let mut guard = self.lock();
        let inner = &mut *guard;
        let rsp_len = inner.read(slave, function, address, quantity, byte_count)?;
        let mut words = vec![0; quantity.into()];
        inner
            .codec
            .read_u16_values(&inner.buf[..rsp_len], &mut words)?;
        Ok(words)
    }

    fn write_bits(
        &self,
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        coils: &[Coil],
    ) -> Result<()> {
        function.check_quantity(quantity_of(coils.len()))?;
        let mut data = [0; MAX_WRITE_PAYLOAD_LEN];
        let len = util::write_bool_values(address, coils, &mut data)?;
        self.lock().write(slave, function, &data[..len])
    }

    fn write_words(
        &self,
        slave: SlaveId,
        function: FunctionCode,
        address: Address,
        words: &[Word],
    ) -> Result<()> {
        function.check_quantity(quantity_of(words.len()))?;
        let mut data = [0; MAX_WRITE_PAYLOAD_LEN];
        let len = util::write_u16_values(address, words, &mut data)?;
        self.lock().write(slave, function, &data[..len])
    }
}

#[cfg(any(feature = "tcp", feature = "rtu"))]
mod connect {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};

    use super::*;

    pub(super) fn tcp_stream(
        addr: impl ToSocketAddrs,
        opts: &ClientOptions,
    ) -> io::Result<StreamTransport<TcpStream>> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(opts.read_timeout)?;
        stream.set_write_timeout(opts.write_timeout)?;
        stream.set_nodelay(true)?;
        Ok(StreamTransport::with_drain(stream, discard_tcp_input))
    }

    pub(super) fn udp_socket(
        addr: impl ToSocketAddrs,
        opts: &ClientOptions,
    ) -> io::Result<DatagramTransport> {
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no socket address given")
        })?;
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(opts.read_timeout)?;
        socket.set_write_timeout(opts.write_timeout)?;
        Ok(DatagramTransport::new(socket))
    }
}

/// Connect to a Modbus TCP device.
#[cfg(feature = "tcp")]
pub fn tcp(
    addr: impl std::net::ToSocketAddrs,
    opts: &ClientOptions,
) -> io::Result<Client<TcpCodec, StreamTransport<std::net::TcpStream>>> {
    connect::tcp_stream(addr, opts).map(Client::tcp)
}

/// Connect to a Modbus UDP device.
#[cfg(feature = "tcp")]
pub fn udp(
    addr: impl std::net::ToSocketAddrs,
    opts: &ClientOptions,
) -> io::Result<Client<TcpCodec, DatagramTransport>> {
    connect::udp_socket(addr, opts).map(Client::tcp)
}

/// Connect to a gateway that forwards RTU frames over TCP.
#[cfg(feature = "rtu")]
pub fn rtu_over_tcp(
    addr: impl std::net::ToSocketAddrs,
    opts: &ClientOptions,
) -> io::Result<Client<RtuCodec, StreamTransport<std::net::TcpStream>>> {
    connect::tcp_stream(addr, opts).map(Client::rtu)
}

/// Connect to a gateway that forwards RTU frames over UDP.
#[cfg(feature = "rtu")]
pub fn rtu_over_udp(
    addr: impl std::net::ToSocketAddrs,
    opts: &ClientOptions,
) -> io::Result<Client<RtuCodec, DatagramTransport>> {
    connect::udp_socket(addr, opts).map(Client::rtu)
}
