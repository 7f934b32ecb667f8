use crate::message::Generation;
use crate::parameter::ParameterId;
use crate::status::Status;
use crate::types::Handle;

/// Errors reported by the host-side layer.
///
/// `Status` carries whatever the driver returned. Every other variant is
/// raised before the driver is called; [`CanError::status`] maps each of
/// them onto the status bit the driver would have used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanError {
    /// The driver returned a non-success status.
    #[error("driver status {0}")]
    Status(Status),

    #[error("handle {0} does not belong to any transport family")]
    UnknownHandle(Handle),

    #[error("handle {0} is not initialized")]
    NotInitialized(Handle),

    #[error("handle {handle} is already initialized for {generation:?}")]
    AlreadyInitialized { handle: Handle, generation: Generation },

    #[error("handle {handle} is initialized for {actual:?}, not {expected:?}")]
    GenerationMismatch {
        handle: Handle,
        expected: Generation,
        actual: Generation,
    },

    #[error("CAN ID {id:#x} exceeds the {max:#x} limit")]
    IdOutOfRange { id: u32, max: u32 },

    #[error("message type {bits:#x} is not valid for {generation:?} frames")]
    MessageType { bits: u16, generation: Generation },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLong { len: usize, max: usize },

    #[error("CAN XL frames carry 1..=2048 data bytes")]
    EmptyXlPayload,

    #[error("payload length {0} has no CAN FD data length code")]
    InvalidFdLength(usize),

    #[error("data length code {dlc} exceeds {max}")]
    DlcOutOfRange { dlc: u16, max: u16 },

    #[error("filter range {from:#x}..={to:#x} is invalid")]
    InvalidFilterRange { from: u32, to: u32 },

    #[error("bit rate: {0}")]
    Bitrate(String),

    #[error("lookup query: {0}")]
    Lookup(String),

    #[error("parameter {0:?} cannot be read")]
    NotReadable(ParameterId),

    #[error("parameter {0:?} cannot be written")]
    NotWritable(ParameterId),

    #[error("value does not match the wire shape of {0:?}")]
    ValueShape(ParameterId),

    #[error("text of {len} bytes does not fit a {max} byte buffer")]
    TextTooLong { len: usize, max: usize },

    #[error("buffer of {got} bytes is shorter than the {need} byte record")]
    BufferTooShort { need: usize, got: usize },

    #[error("driver reported {0} attached channels")]
    ChannelCount(u32),
}

impl CanError {
    /// Status equivalent of this error.
    pub fn status(&self) -> Status {
        match self {
            CanError::Status(status) => *status,
            CanError::UnknownHandle(_) => Status::ILLHW,
            CanError::NotInitialized(_) => Status::INITIALIZE,
            CanError::AlreadyInitialized { .. } => Status::ILLOPERATION,
            CanError::GenerationMismatch { .. } => Status::ILLDATA,
            CanError::IdOutOfRange { .. }
            | CanError::MessageType { .. }
            | CanError::PayloadTooLong { .. }
            | CanError::InvalidFdLength(_)
            | CanError::EmptyXlPayload
            | CanError::DlcOutOfRange { .. }
            | CanError::InvalidFilterRange { .. }
            | CanError::Bitrate(_)
            | CanError::Lookup(_)
            | CanError::ValueShape(_)
            | CanError::TextTooLong { .. } => Status::ILLPARAMVAL,
            CanError::NotReadable(_) | CanError::NotWritable(_) => Status::ILLPARAMTYPE,
            CanError::BufferTooShort { .. } | CanError::ChannelCount(_) => Status::ILLDATA,
        }
    }

    /// Receive queue empty: poll again later.
    pub fn is_queue_empty(&self) -> bool {
        self.status().contains(Status::QRCVEMPTY)
    }

    /// Transmit queue full: the message was not accepted, retry later.
    pub fn is_transmit_full(&self) -> bool {
        self.status().intersects(Status::QXMTFULL | Status::XMTFULL)
    }

    /// Steady-state signals that a control loop is expected to handle.
    pub fn is_recoverable(&self) -> bool {
        self.is_queue_empty() || self.is_transmit_full()
    }
}

impl From<Status> for CanError {
    fn from(status: Status) -> Self {
        CanError::Status(status)
    }
}

pub type Result<T> = std::result::Result<T, CanError>;

/// Converts a driver status into a result, keeping `CAUTION` as success.
pub(crate) fn check(status: Status) -> Result<Status> {
    if status.is_success() {
        Ok(status)
    } else {
        Err(CanError::Status(status))
    }
}
