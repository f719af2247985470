//! Parrot plugin for the menagerie host.
//!
//! Build with `cargo build -p menagerie-parrot` to get `libparrot.so`
//! (`parrot.dll` / `libparrot.dylib`), loadable as module `parrot`.

use menagerie_abi::{AnimalHeader, CapabilityTable, EntryPoints, InstanceLayout, VisitFn};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

const GREETING: &CStr = c"Sto mu gromova!";
const MENU: &CStr = c"brazilske orahe.";

/// Instance layout. The header must stay the first field.
#[repr(C)]
pub struct Parrot {
    header: AnimalHeader,
    name: *const c_char,
}

impl Parrot {
    fn new(name: *const c_char) -> Self {
        Self {
            header: AnimalHeader::new(&PARROT_TABLE),
            name,
        }
    }
}

pub static PARROT_TABLE: CapabilityTable = CapabilityTable {
    name: parrot_name,
    greet: parrot_greet,
    menu: parrot_menu,
};

unsafe extern "C" fn parrot_name(this: *const AnimalHeader) -> *const c_char {
    if this.is_null() {
        return ptr::null();
    }
    // Safety: this table is only reachable from a Parrot header.
    unsafe { (*this.cast::<Parrot>()).name }
}

extern "C" fn parrot_greet() -> *const c_char {
    GREETING.as_ptr()
}

extern "C" fn parrot_menu() -> *const c_char {
    MENU.as_ptr()
}

/// Heap construction
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create(name: *const c_char) -> *mut AnimalHeader {
    if name.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(Parrot::new(name))).cast()
}

/// Release a parrot returned by [`create`]
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn destroy(instance: *mut AnimalHeader) {
    if !instance.is_null() {
        // Safety: the caller hands back a pointer produced by `create`.
        drop(unsafe { Box::from_raw(instance.cast::<Parrot>()) });
    }
}

/// Stack-scoped construction: the parrot only lives for the duration of `visit`
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create_on_stog(name: *const c_char, visit: VisitFn, ctx: *mut c_void) {
    if name.is_null() {
        return;
    }
    let parrot = Parrot::new(name);
    // Safety: `parrot` outlives the call; the visitor must not keep the pointer.
    unsafe { visit(ptr::addr_of!(parrot).cast(), ctx) };
}

/// In-place construction into a buffer owned by the caller
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create_on_predefined_mem(buffer: *mut AnimalHeader, name: *const c_char) {
    if buffer.is_null() || name.is_null() {
        return;
    }
    // Safety: the caller guarantees the buffer matches `instance_layout`.
    unsafe { buffer.cast::<Parrot>().write(Parrot::new(name)) };
}

#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub extern "C" fn instance_layout() -> InstanceLayout {
    InstanceLayout::of::<Parrot>()
}

/// Entry points for hosts that link this plugin statically.
pub const ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(create),
    destroy: Some(destroy),
    create_on_stog: Some(create_on_stog),
    create_on_predefined_mem: Some(create_on_predefined_mem),
    instance_layout: Some(instance_layout),
};
