//! Tiger plugin for the menagerie host.
//!
//! Build with `cargo build -p menagerie-tiger` to get `libtiger.so`
//! (`tiger.dll` / `libtiger.dylib`), loadable as module `tiger`.

use menagerie_abi::{AnimalHeader, CapabilityTable, EntryPoints, InstanceLayout, VisitFn};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

const GREETING: &CStr = c"Mijau!";
const MENU: &CStr = c"mlako mlijeko.";

/// Instance layout. The header must stay the first field.
#[repr(C)]
pub struct Tiger {
    header: AnimalHeader,
    name: *const c_char,
}

impl Tiger {
    fn new(name: *const c_char) -> Self {
        Self {
            header: AnimalHeader::new(&TIGER_TABLE),
            name,
        }
    }
}

pub static TIGER_TABLE: CapabilityTable = CapabilityTable {
    name: tiger_name,
    greet: tiger_greet,
    menu: tiger_menu,
};

unsafe extern "C" fn tiger_name(this: *const AnimalHeader) -> *const c_char {
    if this.is_null() {
        return ptr::null();
    }
    // Safety: this table is only reachable from a Tiger header.
    unsafe { (*this.cast::<Tiger>()).name }
}

extern "C" fn tiger_greet() -> *const c_char {
    GREETING.as_ptr()
}

extern "C" fn tiger_menu() -> *const c_char {
    MENU.as_ptr()
}

/// Heap construction
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create(name: *const c_char) -> *mut AnimalHeader {
    if name.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(Tiger::new(name))).cast()
}

/// Release a tiger returned by [`create`]
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn destroy(instance: *mut AnimalHeader) {
    if !instance.is_null() {
        // Safety: the caller hands back a pointer produced by `create`.
        drop(unsafe { Box::from_raw(instance.cast::<Tiger>()) });
    }
}

/// Stack-scoped construction: the tiger only lives for the duration of `visit`
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create_on_stog(name: *const c_char, visit: VisitFn, ctx: *mut c_void) {
    if name.is_null() {
        return;
    }
    let tiger = Tiger::new(name);
    // Safety: `tiger` outlives the call; the visitor must not keep the pointer.
    unsafe { visit(ptr::addr_of!(tiger).cast(), ctx) };
}

/// In-place construction into a buffer owned by the caller
#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub unsafe extern "C" fn create_on_predefined_mem(buffer: *mut AnimalHeader, name: *const c_char) {
    if buffer.is_null() || name.is_null() {
        return;
    }
    // Safety: the caller guarantees the buffer matches `instance_layout`.
    unsafe { buffer.cast::<Tiger>().write(Tiger::new(name)) };
}

#[cfg_attr(not(feature = "embedded"), no_mangle)]
pub extern "C" fn instance_layout() -> InstanceLayout {
    InstanceLayout::of::<Tiger>()
}

/// Entry points for hosts that link this plugin statically.
pub const ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(create),
    destroy: Some(destroy),
    create_on_stog: Some(create_on_stog),
    create_on_predefined_mem: Some(create_on_predefined_mem),
    instance_layout: Some(instance_layout),
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    unsafe fn name_of(instance: *const AnimalHeader) -> String {
        let table = unsafe { &*(*instance).table };
        let name = unsafe { (table.name)(instance) };
        unsafe { CStr::from_ptr(name) }.to_str().unwrap().to_string()
    }

    #[test]
    fn test_create_and_destroy() {
        let name = c"Modrobradi";
        unsafe {
            let tiger = create(name.as_ptr());
            assert!(!tiger.is_null());
            assert_eq!(name_of(tiger), "Modrobradi");
            assert!(ptr::eq((*tiger).table, &TIGER_TABLE));
            destroy(tiger);
        }
    }

    #[test]
    fn test_create_rejects_null_name() {
        assert!(unsafe { create(ptr::null()) }.is_null());
    }

    #[test]
    fn test_greet_and_menu() {
        let greet = unsafe { CStr::from_ptr((TIGER_TABLE.greet)()) };
        let menu = unsafe { CStr::from_ptr((TIGER_TABLE.menu)()) };
        assert_eq!(greet, c"Mijau!");
        assert_eq!(menu, c"mlako mlijeko.");
    }

    #[test]
    fn test_create_on_stog_visits_once() {
        unsafe extern "C" fn record(instance: *const AnimalHeader, ctx: *mut c_void) {
            let seen = unsafe { &mut *ctx.cast::<Vec<String>>() };
            seen.push(unsafe { name_of(instance) });
        }

        let mut seen: Vec<String> = Vec::new();
        unsafe {
            create_on_stog(
                c"Sir Kan".as_ptr(),
                record,
                ptr::addr_of_mut!(seen).cast(),
            );
        }
        assert_eq!(seen, vec!["Sir Kan".to_string()]);
    }

    #[test]
    fn test_create_on_predefined_mem() {
        let mut buffer = MaybeUninit::<Tiger>::uninit();
        let header = buffer.as_mut_ptr().cast::<AnimalHeader>();
        unsafe {
            create_on_predefined_mem(header, c"Tigrica".as_ptr());
            assert_eq!(name_of(header), "Tigrica");
        }
    }

    #[test]
    fn test_instance_layout_matches_type() {
        let layout = instance_layout();
        assert_eq!(layout.size, std::mem::size_of::<Tiger>());
        assert_eq!(layout.align, std::mem::align_of::<Tiger>());
    }

    #[test]
    fn test_entry_points_complete() {
        assert!(ENTRY_POINTS.create.is_some());
        assert!(ENTRY_POINTS.destroy.is_some());
        assert!(ENTRY_POINTS.create_on_stog.is_some());
        assert!(ENTRY_POINTS.create_on_predefined_mem.is_some());
        assert!(ENTRY_POINTS.instance_layout.is_some());
    }
}
