//! Animal API seen by the host

use menagerie_abi::{AnimalHeader, CapabilityTable};
use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Capability set every animal offers, regardless of which plugin built it.
///
/// Host code dispatches through `&dyn Animal`; only [`AnimalRef`] knows
/// about the C table behind it.
pub trait Animal {
    /// Display name given at construction
    fn name(&self) -> Cow<'_, str>;

    /// Greeting of the animal's type
    fn greet(&self) -> Cow<'_, str>;

    /// What the animal likes to eat
    fn menu(&self) -> Cow<'_, str>;
}

/// `"<name> pozdravlja: <greet>"`
#[must_use]
pub fn greeting_line(animal: &dyn Animal) -> String {
    format!("{} pozdravlja: {}", animal.name(), animal.greet())
}

/// `"<name> voli <menu>"`
#[must_use]
pub fn menu_line(animal: &dyn Animal) -> String {
    format!("{} voli {}", animal.name(), animal.menu())
}

/// Borrowed view of a plugin-constructed instance.
///
/// Dispatches through the [`CapabilityTable`] the instance's header points
/// to. The lifetime covers the instance storage, the constructor argument
/// and the library that owns the table.
#[derive(Clone, Copy)]
pub struct AnimalRef<'a> {
    header: NonNull<AnimalHeader>,
    _instance: PhantomData<&'a AnimalHeader>,
}

impl<'a> AnimalRef<'a> {
    /// Wrap a raw instance.
    ///
    /// # Safety
    /// `header` must point to a live instance whose first field is a valid
    /// table pointer, and the instance, its name and its table must stay
    /// valid for `'a`.
    #[must_use]
    pub unsafe fn from_raw(header: NonNull<AnimalHeader>) -> Self {
        Self {
            header,
            _instance: PhantomData,
        }
    }

    fn table(&self) -> &'a CapabilityTable {
        // Safety: `from_raw` guarantees a live header with a valid table.
        unsafe { &*self.header.as_ref().table }
    }

    /// Slot 0 of the table
    #[must_use]
    pub fn name_cstr(&self) -> &'a CStr {
        let name = self.table().name;
        // Safety: the instance is live and was built for this table.
        borrowed_cstr(unsafe { name(self.header.as_ptr()) })
    }

    /// Slot 1 of the table
    #[must_use]
    pub fn greet_cstr(&self) -> &'a CStr {
        borrowed_cstr((self.table().greet)())
    }

    /// Slot 2 of the table
    #[must_use]
    pub fn menu_cstr(&self) -> &'a CStr {
        borrowed_cstr((self.table().menu)())
    }

    /// Table this instance dispatches through
    #[must_use]
    pub fn table_ptr(&self) -> *const CapabilityTable {
        self.table()
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const AnimalHeader {
        self.header.as_ptr()
    }
}

impl Animal for AnimalRef<'_> {
    fn name(&self) -> Cow<'_, str> {
        self.name_cstr().to_string_lossy()
    }

    fn greet(&self) -> Cow<'_, str> {
        self.greet_cstr().to_string_lossy()
    }

    fn menu(&self) -> Cow<'_, str> {
        self.menu_cstr().to_string_lossy()
    }
}

impl fmt::Debug for AnimalRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimalRef")
            .field("header", &self.header)
            .field("table", &self.table_ptr())
            .finish()
    }
}

/// Plugins hand out NUL-terminated strings they own for at least as long as
/// the instance; a null pointer reads as the empty string.
fn borrowed_cstr<'a>(ptr: *const c_char) -> &'a CStr {
    if ptr.is_null() {
        c""
    } else {
        // Safety: plugin strings are NUL-terminated and outlive the instance.
        unsafe { CStr::from_ptr(ptr) }
    }
}
