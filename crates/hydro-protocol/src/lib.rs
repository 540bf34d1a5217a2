//! Hydroponics Rig Serial Protocol
//!
//! This crate provides types and utilities for talking to the hydroponics rig
//! microcontroller over its serial line. The controller speaks a small,
//! line-based ASCII protocol: the host sends commands, the controller answers
//! with telemetry frames.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → controller): ASCII text terminated with `\n`
//! - **Frames** (controller → host): ASCII text terminated with `\n`
//!   (a trailing `\r` is tolerated), selected by prefix
//!
//! # Frame Types
//!
//! The controller firmware has gone through several revisions and the host
//! accepts every frame shape it has ever emitted:
//!
//! - `PING_OK` - liveness acknowledgment
//! - `RELAYS:<7 flags>` - relay snapshot
//! - `SENSORS:<6 values>` - sensor snapshot
//! - `STATE:<13 or 17 values>` - legacy combined snapshot
//!
//! Anything else decodes to [`Frame::Unknown`] and is ignored by callers.
//!
//! # Example
//!
//! ```rust,ignore
//! use hydro_protocol::{Command, DeviceCode, Frame, LineCodec};
//!
//! // Build a command
//! let cmd = Command::SetDevice { code: DeviceCode::new("LT")?, on: true };
//! assert_eq!(cmd.encode(), b"LT:ON\n");
//!
//! // Decode incoming bytes
//! let mut codec = LineCodec::new();
//! codec.push(b"RELAYS:1,0,1,0,0,0,0\r\n")?;
//! for line in codec.lines() {
//!     let frame = Frame::parse(&line)?;
//! }
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod frames;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frames::*;
