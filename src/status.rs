//! Status and error codes returned by every driver call.
//!
//! A [`Status`] is a bitmask of independent conditions, not an enumeration:
//! a single result can carry a bus condition and a queue condition at the
//! same time. Zero is the only success value. Everything else must be tested
//! with [`Status::contains`] / [`Status::intersects`] against the named bits
//! or the composite masks [`Status::ANYBUSERR`] and [`Status::ILLHANDLE`].

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Driver status bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        /// Transmit buffer in CAN controller is full
        const XMTFULL = 0x0000_0001;
        /// CAN controller was read too late
        const OVERRUN = 0x0000_0002;
        /// An error counter reached the 'light' limit
        const BUSLIGHT = 0x0000_0004;
        /// An error counter reached the 'heavy' limit
        const BUSHEAVY = 0x0000_0008;
        /// An error counter reached the 'warning' limit
        const BUSWARNING = Self::BUSHEAVY.bits();
        /// The CAN controller is error passive
        const BUSPASSIVE = 0x0004_0000;
        /// The CAN controller is in bus-off state
        const BUSOFF = 0x0000_0010;
        /// Mask for all bus errors
        const ANYBUSERR = Self::BUSWARNING.bits()
            | Self::BUSLIGHT.bits()
            | Self::BUSHEAVY.bits()
            | Self::BUSOFF.bits()
            | Self::BUSPASSIVE.bits();
        /// Receive queue is empty
        const QRCVEMPTY = 0x0000_0020;
        /// Receive queue was read too late
        const QOVERRUN = 0x0000_0040;
        /// Transmit queue is full
        const QXMTFULL = 0x0000_0080;
        /// Test of the controller hardware registers failed (no hardware found)
        const REGTEST = 0x0000_0100;
        /// Driver not loaded
        const NODRIVER = 0x0000_0200;
        /// Hardware already in use by a net
        const HWINUSE = 0x0000_0400;
        /// A client is already connected to the net
        const NETINUSE = 0x0000_0800;
        /// Hardware handle is invalid
        const ILLHW = 0x0000_1400;
        /// Net handle is invalid
        const ILLNET = 0x0000_1800;
        /// Client handle is invalid
        const ILLCLIENT = 0x0000_1C00;
        /// Mask for all handle errors
        const ILLHANDLE = Self::ILLHW.bits() | Self::ILLNET.bits() | Self::ILLCLIENT.bits();
        /// Resource (FIFO, client, timeout) cannot be created
        const RESOURCE = 0x0000_2000;
        /// Invalid parameter
        const ILLPARAMTYPE = 0x0000_4000;
        /// Invalid parameter value
        const ILLPARAMVAL = 0x0000_8000;
        /// Unknown error
        const UNKNOWN = 0x0001_0000;
        /// Invalid data, function, or action
        const ILLDATA = 0x0002_0000;
        /// Driver object state is wrong for the attempted operation
        const ILLMODE = 0x0008_0000;
        /// Operation succeeded but irregularities were registered
        const CAUTION = 0x0200_0000;
        /// Channel is not initialized
        const INITIALIZE = 0x0400_0000;
        /// Invalid operation
        const ILLOPERATION = 0x0800_0000;
    }
}

/// Taxonomy group a status bit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    TransportLevel,
    BusCondition,
    HandleValidity,
    ResourceConflict,
    ParameterValidity,
    OperationalState,
    Advisory,
    Driver,
}

/// Primary language identifier for driver-side error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Language {
    #[default]
    Neutral = 0x00,
    German = 0x07,
    English = 0x09,
    Spanish = 0x0A,
    French = 0x0C,
    Italian = 0x10,
}

impl Language {
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Single-bit conditions with their neutral description, in reporting order.
///
/// The handle errors are multi-bit values that overlap `HWINUSE`/`NETINUSE`,
/// so they are listed first and matched as whole values.
const DESCRIPTIONS: &[(Status, &str)] = &[
    (Status::ILLCLIENT, "client handle is invalid"),
    (Status::ILLNET, "net handle is invalid"),
    (Status::ILLHW, "hardware handle is invalid"),
    (Status::XMTFULL, "transmit buffer in CAN controller is full"),
    (Status::OVERRUN, "CAN controller was read too late"),
    (Status::BUSLIGHT, "bus error: an error counter reached the 'light' limit"),
    (Status::BUSHEAVY, "bus error: an error counter reached the 'heavy' limit"),
    (Status::BUSPASSIVE, "bus error: the CAN controller is error passive"),
    (Status::BUSOFF, "bus error: the CAN controller is in bus-off state"),
    (Status::QRCVEMPTY, "receive queue is empty"),
    (Status::QOVERRUN, "receive queue was read too late"),
    (Status::QXMTFULL, "transmit queue is full"),
    (Status::REGTEST, "no hardware found"),
    (Status::NODRIVER, "driver not loaded"),
    (Status::HWINUSE, "hardware already in use by a net"),
    (Status::NETINUSE, "a client is already connected to the net"),
    (Status::RESOURCE, "resource cannot be created"),
    (Status::ILLPARAMTYPE, "invalid parameter"),
    (Status::ILLPARAMVAL, "invalid parameter value"),
    (Status::UNKNOWN, "unknown error"),
    (Status::ILLDATA, "invalid data, function, or action"),
    (Status::ILLMODE, "driver object state is wrong for the attempted operation"),
    (Status::CAUTION, "operation succeeded with irregularities"),
    (Status::INITIALIZE, "channel is not initialized"),
    (Status::ILLOPERATION, "invalid operation"),
];

impl Status {
    /// Success. The only status that is tested by equality.
    pub const OK: Status = Status::empty();

    pub fn is_ok(self) -> bool {
        self.is_empty()
    }

    /// Success, possibly with the advisory `CAUTION` bit set.
    pub fn is_success(self) -> bool {
        self.difference(Status::CAUTION).is_empty()
    }

    pub fn is_bus_error(self) -> bool {
        self.intersects(Status::ANYBUSERR)
    }

    /// True for any of the illegal hardware/net/client handle values.
    ///
    /// Those values share bits with `HWINUSE` and `NETINUSE`, so the test
    /// looks for the `0x1000` bit that only the handle errors carry.
    pub fn is_illegal_handle(self) -> bool {
        self.intersects(Status::ILLHANDLE.difference(Status::HWINUSE | Status::NETINUSE))
    }

    /// Every taxonomy group this status touches.
    pub fn classes(self) -> Vec<StatusClass> {
        let mut classes: Vec<StatusClass> = Vec::new();
        let mut push = |class: StatusClass| {
            if !classes.contains(&class) {
                classes.push(class);
            }
        };
        let transport = Status::XMTFULL
            | Status::OVERRUN
            | Status::QRCVEMPTY
            | Status::QOVERRUN
            | Status::QXMTFULL;
        if self.intersects(transport) {
            push(StatusClass::TransportLevel);
        }
        if self.is_bus_error() {
            push(StatusClass::BusCondition);
        }
        if self.is_illegal_handle() {
            push(StatusClass::HandleValidity);
        } else if self.intersects(Status::HWINUSE | Status::NETINUSE) {
            push(StatusClass::ResourceConflict);
        }
        if self.contains(Status::RESOURCE) {
            push(StatusClass::ResourceConflict);
        }
        if self.intersects(Status::ILLPARAMTYPE | Status::ILLPARAMVAL) {
            push(StatusClass::ParameterValidity);
        }
        let operational =
            Status::INITIALIZE | Status::ILLOPERATION | Status::ILLDATA | Status::ILLMODE;
        if self.intersects(operational) {
            push(StatusClass::OperationalState);
        }
        if self.contains(Status::CAUTION) {
            push(StatusClass::Advisory);
        }
        if self.intersects(Status::REGTEST | Status::NODRIVER | Status::UNKNOWN) {
            push(StatusClass::Driver);
        }
        classes
    }

    /// Neutral description of every condition in this status, host side.
    pub fn description(self) -> String {
        if self.is_ok() {
            return "no error".to_string();
        }
        let mut remaining = self;
        let mut parts = Vec::new();
        for (flag, text) in DESCRIPTIONS {
            if remaining.contains(*flag) {
                parts.push(*text);
                remaining.remove(*flag);
            }
        }
        if !remaining.is_empty() {
            parts.push("undefined error");
        }
        parts.join("; ")
    }
}

impl From<u32> for Status {
    fn from(bits: u32) -> Self {
        Status::from_bits_retain(bits)
    }
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        status.bits()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", self.bits(), self.description())
    }
}
