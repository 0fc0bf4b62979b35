// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte transports that carry opaque frames.

use std::{
    io::{self, Read, Write},
    net::{TcpStream, UdpSocket},
};

use super::ClientError;
use crate::error::Error;

/// Sends a request frame and receives exactly one response frame.
pub trait Transport {
    /// Send a complete frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Receive one frame into `buf` and return its length.
    ///
    /// `frame_len` predicts the total frame length from the bytes received
    /// so far, see [`crate::Codec::response_len`].
    fn receive<F>(&mut self, buf: &mut [u8], frame_len: F) -> Result<usize, ClientError>
    where
        F: Fn(&[u8]) -> Result<Option<usize>, Error>;

    /// Drop input that is already pending, e.g. the remainder of a
    /// response that arrived after a timeout.
    ///
    /// The client calls this before the next request once an exchange
    /// failed. The default does nothing.
    fn discard_pending(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Drops pending input of a stream without blocking.
pub type DrainFn<S> = fn(&mut S) -> io::Result<()>;

/// A transport on top of a byte stream, e.g. a serial port or a TCP stream.
///
/// Frames are delimited by the length prediction of the codec. Pending
/// input is only discarded if a drain function has been supplied, e.g.
/// [`discard_tcp_input`] or a wrapper around the input buffer flush of a
/// serial port.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    drain: Option<DrainFn<S>>,
}

impl<S> StreamTransport<S> {
    pub const fn new(stream: S) -> Self {
        Self {
            stream,
            drain: None,
        }
    }

    pub const fn with_drain(stream: S, drain: DrainFn<S>) -> Self {
        Self {
            stream,
            drain: Some(drain),
        }
    }

    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    fn receive<F>(&mut self, buf: &mut [u8], frame_len: F) -> Result<usize, ClientError>
    where
        F: Fn(&[u8]) -> Result<Option<usize>, Error>,
    {
        let mut len = 0;
        loop {
            if let Some(total) = frame_len(&buf[..len])? {
                if total > buf.len() {
                    return Err(Error::BufferSize.into());
                }
                if total < len {
                    return Err(Error::LengthMismatch(total, len).into());
                }
                self.stream.read_exact(&mut buf[len..total])?;
                return Ok(total);
            }
            if len == buf.len() {
                return Err(Error::BufferSize.into());
            }
            self.stream.read_exact(&mut buf[len..=len])?;
            len += 1;
        }
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        match self.drain {
            Some(drain) => drain(&mut self.stream),
            None => Ok(()),
        }
    }
}

/// Read and drop everything a non-blocking `recv` hands out.
fn drain_nonblocking(mut recv: impl FnMut(&mut [u8]) -> io::Result<usize>) -> io::Result<()> {
    let mut scratch = [0; 256];
    loop {
        match recv(&mut scratch) {
            // closed by the peer
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}

/// Discard the bytes already received on a TCP stream.
pub fn discard_tcp_input(stream: &mut TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    let res = drain_nonblocking(|buf| stream.read(buf));
    stream.set_nonblocking(false)?;
    res
}

/// A transport on top of a connected UDP socket: one datagram per frame.
#[derive(Debug)]
pub struct DatagramTransport {
    socket: UdpSocket,
}

impl DatagramTransport {
    /// The socket must already be connected to the device.
    pub const fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub const fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Transport for DatagramTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(frame)?;
        if sent != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "datagram was truncated",
            ));
        }
        Ok(())
    }

    fn receive<F>(&mut self, buf: &mut [u8], _frame_len: F) -> Result<usize, ClientError>
    where
        F: Fn(&[u8]) -> Result<Option<usize>, Error>,
    {
        Ok(self.socket.recv(buf)?)
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        self.socket.set_nonblocking(true)?;
        let res = drain_nonblocking(|buf| self.socket.recv(buf));
        self.socket.set_nonblocking(false)?;
        res
    }
}
