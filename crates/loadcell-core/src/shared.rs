//! Exclusive access to one device from several execution contexts.
//!
//! The HX711 protocol is "read 24 bits, then send the mode pulses" with no
//! other traffic on the two lines in between. Hosts that reach the device
//! from more than one task or thread wrap it here and do each complete
//! read-and-select sequence inside a single [`SharedDevice::transaction`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};

/// A device behind a blocking mutex.
///
/// With the default [`CriticalSectionRawMutex`] every transaction runs with
/// interrupts disabled. An averaging transaction waits for DOUT on each
/// read, up to the ready timeout per read, so on a single-core target it
/// can hold interrupts off for seconds. Hosts that only share the device
/// between tasks of one executor should pick
/// [`embassy_sync::blocking_mutex::raw::NoopRawMutex`] instead.
pub struct SharedDevice<T, M: RawMutex = CriticalSectionRawMutex> {
    inner: Mutex<M, RefCell<T>>,
}

impl<T, M: RawMutex> SharedDevice<T, M> {
    pub const fn new(device: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(device)),
        }
    }

    /// Run `f` with exclusive access to the device.
    ///
    /// # Panics
    /// When called again from inside `f`.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}
