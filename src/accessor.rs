//! The only place foreign memory is touched.
//!
//! Every operation panics when handed an unresolved slot or a null base:
//! reading through a sentinel would land in unrelated memory of the host.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;

use crate::slot::{AddressSlot, OffsetSlot};

#[track_caller]
fn resolved_offset(slot: &OffsetSlot, operation: &str) -> usize {
    match slot.get() {
        Some(offset) => offset as usize,
        None => panic!("{} on an unresolved offset slot", operation),
    }
}

#[track_caller]
fn non_null(base: *const c_void, operation: &str) {
    assert!(!base.is_null(), "{} on a null base pointer", operation);
}

/// Address of the field at `slot` inside the object at `base`.
///
/// # Safety
/// `base` must point to a live object whose layout matches the resolved offset.
#[track_caller]
pub unsafe fn field_ptr<T>(base: *const c_void, slot: &OffsetSlot) -> *mut T {
    let offset = resolved_offset(slot, "field access");
    non_null(base, "field access");
    base.cast::<u8>().add(offset).cast::<T>().cast_mut()
}

/// # Safety
/// See [`field_ptr`]; the field must hold a valid `T`.
#[track_caller]
pub unsafe fn read_field<T: Copy>(base: *const c_void, slot: &OffsetSlot) -> T {
    field_ptr::<T>(base, slot).read_unaligned()
}

/// # Safety
/// See [`field_ptr`]; `base` must be writable.
#[track_caller]
pub unsafe fn write_field<T>(base: *mut c_void, slot: &OffsetSlot, value: T) {
    field_ptr::<T>(base, slot).write_unaligned(value)
}

/// In-place accessor for a field.
///
/// # Safety
/// See [`field_ptr`]; additionally the field must be aligned for `T` and not
/// aliased for `'a`.
#[track_caller]
pub unsafe fn field_mut<'a, T>(base: *mut c_void, slot: &OffsetSlot) -> &'a mut T {
    &mut *field_ptr::<T>(base, slot)
}

/// Entry `slot` of the virtual table whose address is the first word at `base`.
///
/// `F` must be a function pointer type.
///
/// # Safety
/// `base` must point to an object with a virtual table holding at least
/// `slot + 1` entries of signature `F`.
#[track_caller]
pub unsafe fn virtual_fn<F: Copy>(base: *const c_void, slot: &OffsetSlot) -> F {
    assert_eq!(
        mem::size_of::<F>(),
        mem::size_of::<usize>(),
        "virtual_fn target must be a function pointer"
    );
    let index = resolved_offset(slot, "virtual call");
    non_null(base, "virtual call");
    let table = *base.cast::<*const usize>();
    let entry = *table.add(index);
    mem::transmute_copy::<usize, F>(&entry)
}

/// Address held by a resolved global slot.
#[track_caller]
pub fn global_ptr<T>(slot: &AddressSlot) -> *mut T {
    match slot.get() {
        Some(address) => address as *mut T,
        None => panic!("global access on an unresolved address slot"),
    }
}

/// Calls virtual method `slot` on `base` with `base` as the receiver.
///
/// ```ignore
/// let eye: Vector = invoke_virtual!(pawn, &slot, extern "C" fn(*mut c_void) -> Vector);
/// let ok: bool = invoke_virtual!(entity, &slot, extern "C" fn(*mut c_void, i32) -> bool, 5);
/// ```
#[macro_export]
macro_rules! invoke_virtual {
    ($base:expr, $slot:expr, $ty:ty $(, $arg:expr)* $(,)?) => {{
        let base: *mut ::std::ffi::c_void = $base;
        let function: $ty = $crate::accessor::virtual_fn::<$ty>(base, $slot);
        function(base $(, $arg)*)
    }};
}

/// A typed field of a foreign class, backed by an [`OffsetSlot`].
pub struct Field<T> {
    slot: OffsetSlot,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    pub fn new() -> Self {
        Self {
            slot: OffsetSlot::new(),
            _marker: PhantomData,
        }
    }

    pub fn slot(&self) -> &OffsetSlot {
        &self.slot
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_resolved()
    }

    pub fn offset(&self) -> Option<i32> {
        self.slot.get()
    }

    /// # Safety
    /// See [`read_field`].
    #[track_caller]
    pub unsafe fn get(&self, base: *const c_void) -> T
    where
        T: Copy,
    {
        read_field(base, &self.slot)
    }

    /// # Safety
    /// See [`write_field`].
    #[track_caller]
    pub unsafe fn set(&self, base: *mut c_void, value: T) {
        write_field(base, &self.slot, value)
    }

    /// # Safety
    /// See [`field_mut`].
    #[track_caller]
    pub unsafe fn get_mut<'a>(&self, base: *mut c_void) -> &'a mut T {
        field_mut(base, &self.slot)
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::new()
    }
}
