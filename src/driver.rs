//! Driver call surface.
//!
//! Every entry point of the vendor driver collapses into one synchronous
//! call: an opcode with its scalar arguments, the target handle, and a raw
//! buffer that carries all structured data in both directions.

use crate::filter::FilterMode;
use crate::parameter::ParameterId;
use crate::status::{Language, Status};
use crate::types::Handle;
use std::fmt;

/// Driver entry point and its scalar arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// In: BTR0BTR1 code, 2 bytes little-endian
    Initialize,
    /// In: NUL-terminated bit rate descriptor
    InitializeFd,
    /// In: NUL-terminated bit rate descriptor
    InitializeXl,
    Uninitialize,
    Reset,
    GetStatus,
    /// Out: classic message record followed by its timestamp
    Read,
    /// Out: FD message record followed by its timestamp
    ReadFd,
    /// Out: XL message record followed by its timestamp
    ReadXl,
    /// In: classic message record
    Write,
    /// In: FD message record
    WriteFd,
    /// In: XL message record
    WriteXl,
    FilterMessages {
        from: u32,
        to: u32,
        mode: FilterMode,
    },
    /// Out: the parameter's wire shape
    GetValue(ParameterId),
    /// In: the parameter's wire shape
    SetValue(ParameterId),
    /// Out: NUL-terminated text
    GetErrorText { error: Status, language: Language },
    /// In: NUL-terminated query. Out: handle, `u16` little-endian at offset 0
    LookUpChannel,
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::Initialize => "Initialize",
            Call::InitializeFd => "InitializeFD",
            Call::InitializeXl => "InitializeXL",
            Call::Uninitialize => "Uninitialize",
            Call::Reset => "Reset",
            Call::GetStatus => "GetStatus",
            Call::Read => "Read",
            Call::ReadFd => "ReadFD",
            Call::ReadXl => "ReadXL",
            Call::Write => "Write",
            Call::WriteFd => "WriteFD",
            Call::WriteXl => "WriteXL",
            Call::FilterMessages { .. } => "FilterMessages",
            Call::GetValue(_) => "GetValue",
            Call::SetValue(_) => "SetValue",
            Call::GetErrorText { .. } => "GetErrorText",
            Call::LookUpChannel => "LookUpChannel",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::FilterMessages { from, to, mode } => {
                write!(f, "FilterMessages({from:#x}..={to:#x}, {mode:?})")
            }
            Call::GetValue(id) => write!(f, "GetValue({id:?})"),
            Call::SetValue(id) => write!(f, "SetValue({id:?})"),
            Call::GetErrorText { error, language } => {
                write!(f, "GetErrorText({:#x}, {language:?})", error.bits())
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Vendor driver boundary.
///
/// Implementations must be callable from several threads at once; the
/// host layer never issues two calls on the same handle concurrently
/// unless its own caller does.
pub trait Driver: Send + Sync {
    /// Executes `call` on `handle`, reading from and writing to `buffer`.
    fn invoke(&self, call: Call, handle: Handle, buffer: &mut [u8]) -> Status;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn invoke(&self, call: Call, handle: Handle, buffer: &mut [u8]) -> Status {
        (**self).invoke(call, handle, buffer)
    }
}

impl<D: Driver + ?Sized> Driver for std::sync::Arc<D> {
    fn invoke(&self, call: Call, handle: Handle, buffer: &mut [u8]) -> Status {
        (**self).invoke(call, handle, buffer)
    }
}

/// Invokes the driver and traces the exchange.
pub(crate) fn invoke<D: Driver + ?Sized>(
    driver: &D,
    call: Call,
    handle: Handle,
    buffer: &mut [u8],
) -> Status {
    let status = driver.invoke(call, handle, buffer);
    tracing::trace!(
        call = %call,
        handle = %handle,
        len = buffer.len(),
        status = format_args!("{:#x}", status.bits()),
        "driver call"
    );
    if status.contains(Status::CAUTION) {
        tracing::warn!(call = %call, handle = %handle, "driver reported irregularities");
    }
    status
}
