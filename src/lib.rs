// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]
#![no_std]

#[cfg(feature = "std")]
extern crate std;

mod codec;
mod error;
mod frame;
mod util;

#[cfg(feature = "std")]
pub mod client;

pub use codec::Codec;
#[cfg(feature = "rtu")]
pub use codec::rtu;
#[cfg(feature = "tcp")]
pub use codec::tcp;
pub use error::*;
pub use frame::*;
pub use util::{
    bool_to_u16_coil, pack_coils, packed_coils_len, unpack_coils, unpack_words, write_bool_values,
    write_u16_values,
};
