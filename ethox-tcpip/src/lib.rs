//! A socket registry and TCP transmission engine for resource-constrained network stacks.
//!
//! ## Table of contents
//!
//! This is also a recommended reading order but feel free to skip ahead, each chapter tries to be
//! somewhat self-contained.
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//!    1. [Tcp header](wire/tcp/index.html)
//!    1. [Checksums](wire/ip/checksum/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Collaborators](layer/ip/index.html)
//!    1. [The socket registry](layer/socket/index.html)
//!    1. [The tcp transmission engine](layer/tcp/index.html)
//! 4. Internals
//!    1. [The managed module](managed/index.html)
//!    1. [Configuration](config/index.html)
//!
//! ## Design and relevant core concepts
//!
//! The crate owns the sockets of a small embedded stack and the send half of its TCP. Everything
//! below and beside it is reached through traits: the IP layer that actually puts bytes on the
//! wire, the address manager that knows whether an interface is online, and the memory pool that
//! holds buffered but unacknowledged data. None of them is implemented here except for a simple
//! block pool in [`managed`], which the tests and small deployments can use directly.
//!
//! Nothing grows after setup. The socket tables are sized once from the [`Config`] and slots are
//! recycled through free lists linked by index. Transmit data never leaves the memory pool until
//! the IP layer asks for it: segments are rendered by callbacks at the moment a frame is prepared,
//! which also makes retransmission bufferless from the point of view of this crate.
//!
//! Back pressure is silent. An interface that is offline, a peer window that is closed or a lower
//! layer without free frames all lead to a *try again later*, resolved by the periodic
//! [`main_function`] of the registry rather than by an error.
//!
//! [`managed`]: managed/index.html
//! [`Config`]: config/struct.Config.html
//! [`main_function`]: layer/socket/struct.Registry.html#method.main_function
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

extern crate alloc;

#[macro_use] mod macros;
pub mod config;
pub mod layer;
pub mod managed;
pub mod wire;

pub use config::{Config, TcpConfig};
