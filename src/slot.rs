use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::listener::Writeback;

/// Sentinel for an unresolved field offset or virtual-table index.
pub const UNRESOLVED_OFFSET: i32 = -1;
/// Sentinel for an unresolved global address.
pub const UNRESOLVED_ADDRESS: usize = 0;

/// A value type that can live in a [`Slot`].
pub trait SlotValue: Copy + PartialEq + fmt::Debug + 'static {
    const UNRESOLVED: Self;
    const TYPE_NAME: &'static str;

    /// Converts a resolved raw value. `None` when it does not fit or collides
    /// with the sentinel.
    fn from_raw(raw: i64) -> Option<Self>;
}

impl SlotValue for i32 {
    const UNRESOLVED: Self = UNRESOLVED_OFFSET;
    const TYPE_NAME: &'static str = "i32";

    fn from_raw(raw: i64) -> Option<Self> {
        i32::try_from(raw).ok().filter(|v| *v >= 0)
    }
}

impl SlotValue for usize {
    const UNRESOLVED: Self = UNRESOLVED_ADDRESS;
    const TYPE_NAME: &'static str = "usize";

    fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw).ok().filter(|v| *v != 0)
    }
}

/// Consumer-owned storage for one resolved offset or address.
///
/// Cloning yields another handle to the same cell; the registry only ever
/// touches it through a [`Writeback`] built by [`Slot::writeback`].
pub struct Slot<T: SlotValue> {
    value: Rc<Cell<T>>,
}

pub type OffsetSlot = Slot<i32>;
pub type AddressSlot = Slot<usize>;

impl<T: SlotValue> Slot<T> {
    pub fn new() -> Self {
        Self {
            value: Rc::new(Cell::new(T::UNRESOLVED)),
        }
    }

    /// The resolved value, or `None` while the slot holds the sentinel.
    pub fn get(&self) -> Option<T> {
        let value = self.value.get();
        (value != T::UNRESOLVED).then_some(value)
    }

    /// The stored value including the sentinel.
    pub fn raw(&self) -> T {
        self.value.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.get().is_some()
    }

    pub fn reset(&self) {
        self.value.set(T::UNRESOLVED);
    }

    /// Stores `raw`, leaving the sentinel in place if it is not representable.
    pub fn store(&self, raw: i64) -> Result<(), Error> {
        match T::from_raw(raw) {
            Some(value) => {
                self.value.set(value);
                Ok(())
            }
            None => {
                self.reset();
                Err(Error::ValueOutOfRange {
                    value: raw,
                    target: T::TYPE_NAME,
                })
            }
        }
    }

    pub fn writeback(&self) -> Writeback {
        let slot = self.clone();
        Box::new(move |resolved| match resolved {
            Some(raw) => slot.store(raw),
            None => {
                slot.reset();
                Ok(())
            }
        })
    }
}

impl<T: SlotValue> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SlotValue> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: SlotValue> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "Slot({:?})", value),
            None => f.write_str("Slot(unresolved)"),
        }
    }
}
