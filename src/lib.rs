//! Host-side channel layer for CAN, CAN FD and CAN XL interface drivers.
//!
//! Sits between application code and a vendor driver that exposes one raw
//! call surface. This crate decides the buffer shape of every parameter and
//! message record, keeps track of which handles are open for which frame
//! generation, and turns driver status bitmasks into typed results.
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use libcanbasic::bitrate::Baudrate;
//! use libcanbasic::message::CanMessage;
//! use libcanbasic::mock::FakeDriver;
//! use libcanbasic::{CanBasic, Handle};
//!
//! let can = CanBasic::new(FakeDriver::with_default_channels().with_loopback());
//! can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
//! let msg = CanMessage::standard(0x123, &[0xDE, 0xAD]).unwrap();
//! can.write(Handle::PCIBUS1, &msg).unwrap();
//! let (received, _timestamp) = can.read(Handle::PCIBUS1).unwrap();
//! assert_eq!(received.data(), &[0xDE, 0xAD]);
//! # }
//! ```

pub mod basic; // Handle-addressed front end
pub mod bitrate; // BTR0BTR1 codes, FD and XL descriptors
pub mod discovery; // Channel information, lookup queries
pub mod driver; // Driver call surface
pub mod filter; // Acceptance filter ranges
pub mod lifecycle; // Handle table
pub mod message; // Classic, FD and XL codecs
pub mod parameter; // Typed value registry
pub mod status; // Status bitmask

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Common types and traits
pub mod error;
pub mod types;

// Re-exports for convenience
pub use basic::CanBasic;
pub use driver::{Call, Driver};
pub use error::{CanError, Result};
pub use message::{CanMessage, FdMessage, Generation, Message, XlMessage};
pub use parameter::{ParameterId, ParameterValue};
pub use status::Status;
pub use types::Handle;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
