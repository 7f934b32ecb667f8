//! Channel lifecycle: which handles are open, and for which generation.
//!
//! Transitions (initialize, uninitialize) hold the table lock for the whole
//! driver call. Everything else only locks to look a handle up.

use crate::error::{check, CanError, Result};
use crate::filter::AcceptanceFilter;
use crate::message::Generation;
use crate::status::Status;
use crate::types::Handle;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fails for handles outside every transport family, [`Handle::NONE`] included.
pub fn ensure_known(handle: Handle) -> Result<()> {
    match handle.family() {
        Some(_) => Ok(()),
        None => Err(CanError::UnknownHandle(handle)),
    }
}

/// Host-side state of an initialized channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub generation: Generation,
    pub filter: AcceptanceFilter,
}

impl ChannelState {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            filter: AcceptanceFilter::default(),
        }
    }
}

/// Table of initialized handles
#[derive(Debug, Default)]
pub struct HandleTable {
    channels: Mutex<HashMap<Handle, ChannelState>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are only written after a successful driver call, so the map
    // is consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, HashMap<Handle, ChannelState>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens `handle` for `generation` through `open`.
    ///
    /// `open` runs under the table lock and only when the handle is known
    /// and not already initialized.
    pub fn initialize<F>(&self, handle: Handle, generation: Generation, open: F) -> Result<Status>
    where
        F: FnOnce() -> Status,
    {
        ensure_known(handle)?;
        let mut channels = self.lock();
        if let Some(state) = channels.get(&handle) {
            return Err(CanError::AlreadyInitialized {
                handle,
                generation: state.generation,
            });
        }
        let status = check(open())?;
        channels.insert(handle, ChannelState::new(generation));
        tracing::debug!(handle = %handle, ?generation, "channel initialized");
        Ok(status)
    }

    /// Closes `handle` through `close`; [`Handle::NONE`] closes every channel.
    ///
    /// Closing a handle that is not open succeeds without calling `close`.
    pub fn uninitialize<F>(&self, handle: Handle, close: F) -> Result<Status>
    where
        F: FnOnce() -> Status,
    {
        let mut channels = self.lock();
        if handle.is_none() {
            tracing::warn!(open = channels.len(), "uninitializing all channels");
            let status = check(close())?;
            channels.clear();
            return Ok(status);
        }
        ensure_known(handle)?;
        if !channels.contains_key(&handle) {
            return Ok(Status::OK);
        }
        let status = check(close())?;
        channels.remove(&handle);
        tracing::debug!(handle = %handle, "channel uninitialized");
        Ok(status)
    }

    /// Generation `handle` was initialized for.
    pub fn generation(&self, handle: Handle) -> Result<Generation> {
        ensure_known(handle)?;
        self.lock()
            .get(&handle)
            .map(|state| state.generation)
            .ok_or(CanError::NotInitialized(handle))
    }

    /// Fails unless `handle` is initialized for `expected`.
    pub fn expect(&self, handle: Handle, expected: Generation) -> Result<()> {
        let actual = self.generation(handle)?;
        if actual != expected {
            return Err(CanError::GenerationMismatch {
                handle,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Runs `f` on the filter mirror of an initialized handle.
    pub fn with_filter<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut AcceptanceFilter) -> R,
    ) -> Result<R> {
        self.lock()
            .get_mut(&handle)
            .map(|state| f(&mut state.filter))
            .ok_or(CanError::NotInitialized(handle))
    }

    pub fn is_initialized(&self, handle: Handle) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Initialized handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.lock().keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_initialize_and_generation() {
        let table = HandleTable::new();
        assert_eq!(
            table.generation(Handle::USBBUS1),
            Err(CanError::NotInitialized(Handle::USBBUS1))
        );
        table
            .initialize(Handle::USBBUS1, Generation::Fd, || Status::OK)
            .unwrap();
        assert_eq!(table.generation(Handle::USBBUS1), Ok(Generation::Fd));
        assert!(table.expect(Handle::USBBUS1, Generation::Fd).is_ok());
        assert_eq!(
            table.expect(Handle::USBBUS1, Generation::Classic),
            Err(CanError::GenerationMismatch {
                handle: Handle::USBBUS1,
                expected: Generation::Classic,
                actual: Generation::Fd,
            })
        );
    }

    #[test]
    fn test_unknown_handle_skips_driver() {
        let table = HandleTable::new();
        let called = Cell::new(false);
        let result = table.initialize(Handle(0x99), Generation::Classic, || {
            called.set(true);
            Status::OK
        });
        assert_eq!(result, Err(CanError::UnknownHandle(Handle(0x99))));
        assert_eq!(result.unwrap_err().status(), Status::ILLHW);
        assert!(!called.get());

        assert!(table
            .initialize(Handle::NONE, Generation::Classic, || Status::OK)
            .is_err());
    }

    #[test]
    fn test_driver_failure_leaves_handle_closed() {
        let table = HandleTable::new();
        let result = table.initialize(Handle::PCIBUS1, Generation::Classic, || Status::HWINUSE);
        assert_eq!(result, Err(CanError::Status(Status::HWINUSE)));
        assert!(!table.is_initialized(Handle::PCIBUS1));
    }

    #[test]
    fn test_reinitialize_is_rejected() {
        let table = HandleTable::new();
        table
            .initialize(Handle::USBBUS1, Generation::Classic, || Status::OK)
            .unwrap();
        let result = table.initialize(Handle::USBBUS1, Generation::Fd, || Status::OK);
        assert_eq!(result.unwrap_err().status(), Status::ILLOPERATION);
        assert_eq!(table.generation(Handle::USBBUS1), Ok(Generation::Classic));
    }

    #[test]
    fn test_uninitialize_broadcast() {
        let table = HandleTable::new();
        for handle in [Handle::USBBUS1, Handle::USBBUS2, Handle::LANBUS1] {
            table
                .initialize(handle, Generation::Classic, || Status::OK)
                .unwrap();
        }
        assert_eq!(table.len(), 3);
        table.uninitialize(Handle::NONE, || Status::OK).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_uninitialize_closed_handle() {
        let table = HandleTable::new();
        let called = Cell::new(false);
        let status = table
            .uninitialize(Handle::USBBUS3, || {
                called.set(true);
                Status::OK
            })
            .unwrap();
        assert_eq!(status, Status::OK);
        assert!(!called.get());
    }

    #[test]
    fn test_handles_sorted() {
        let table = HandleTable::new();
        for handle in [Handle::LANBUS1, Handle::PCIBUS2, Handle::USBBUS1] {
            table
                .initialize(handle, Generation::Xl, || Status::OK)
                .unwrap();
        }
        assert_eq!(
            table.handles(),
            vec![Handle::PCIBUS2, Handle::USBBUS1, Handle::LANBUS1]
        );
    }
}
