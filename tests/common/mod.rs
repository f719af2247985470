//! Test fixtures: the real plugins linked statically, plus hand-built
//! modules that break the contract in specific ways.

#![allow(dead_code)]

use menagerie::abi::{AnimalHeader, CapabilityTable, EntryPoints, InstanceLayout, VisitFn};
use menagerie::plugins::{Factory, StaticRegistry};
use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Registry holding the tiger and parrot plugins
pub fn zoo() -> StaticRegistry {
    StaticRegistry::new()
        .with("tiger", tiger::ENTRY_POINTS)
        .with("parrot", parrot::ENTRY_POINTS)
}

/// Zoo plus every fixture module below
pub fn fixture_registry() -> StaticRegistry {
    zoo()
        .with("mixed_up", MIXED_UP_ENTRY_POINTS)
        .with("heap_only", HEAP_ONLY_ENTRY_POINTS)
        .with("whale", WHALE_ENTRY_POINTS)
        .with("stubborn", STUBBORN_ENTRY_POINTS)
        .with("counted", COUNTED_ENTRY_POINTS)
        .with("c_style", C_STYLE_ENTRY_POINTS)
}

pub fn zoo_factory() -> Factory {
    Factory::new(zoo())
}

pub fn fixture_factory() -> Factory {
    Factory::new(fixture_registry())
}

#[repr(C)]
struct Fixture {
    header: AnimalHeader,
    name: *const c_char,
}

unsafe extern "C" fn fixture_name(this: *const AnimalHeader) -> *const c_char {
    unsafe { (*this.cast::<Fixture>()).name }
}

extern "C" fn fixture_greet() -> *const c_char {
    c"Hello!".as_ptr()
}

extern "C" fn fixture_menu() -> *const c_char {
    c"kibble.".as_ptr()
}

// Greet and menu in each other's slots
static MIXED_UP_TABLE: CapabilityTable = CapabilityTable {
    name: fixture_name,
    greet: fixture_menu,
    menu: fixture_greet,
};

unsafe extern "C" fn mixed_up_create(name: *const c_char) -> *mut AnimalHeader {
    Box::into_raw(Box::new(Fixture {
        header: AnimalHeader::new(&MIXED_UP_TABLE),
        name,
    }))
    .cast()
}

unsafe extern "C" fn fixture_destroy(instance: *mut AnimalHeader) {
    drop(unsafe { Box::from_raw(instance.cast::<Fixture>()) });
}

pub const MIXED_UP_ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(mixed_up_create),
    destroy: Some(fixture_destroy),
    ..EntryPoints::EMPTY
};

/// Tiger without the stack-scoped and caller-supplied entry points
pub const HEAP_ONLY_ENTRY_POINTS: EntryPoints = EntryPoints {
    create: tiger::ENTRY_POINTS.create,
    destroy: tiger::ENTRY_POINTS.destroy,
    ..EntryPoints::EMPTY
};

extern "C" fn whale_layout() -> InstanceLayout {
    InstanceLayout {
        size: 4096,
        align: 8,
    }
}

unsafe extern "C" fn untouched_in_place(_buffer: *mut AnimalHeader, _name: *const c_char) {}

/// Claims an instance far larger than any slot
pub const WHALE_ENTRY_POINTS: EntryPoints = EntryPoints {
    create_on_predefined_mem: Some(untouched_in_place),
    instance_layout: Some(whale_layout),
    ..EntryPoints::EMPTY
};

unsafe extern "C" fn null_create(_name: *const c_char) -> *mut AnimalHeader {
    ptr::null_mut()
}

unsafe extern "C" fn silent_on_stog(_name: *const c_char, _visit: VisitFn, _ctx: *mut c_void) {}

extern "C" fn fixture_layout() -> InstanceLayout {
    InstanceLayout::of::<Fixture>()
}

/// Exports every entry point but never produces an instance
pub const STUBBORN_ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(null_create),
    destroy: Some(fixture_destroy),
    create_on_stog: Some(silent_on_stog),
    create_on_predefined_mem: Some(untouched_in_place),
    instance_layout: Some(fixture_layout),
};

pub static COUNTED_RELEASES: AtomicUsize = AtomicUsize::new(0);

static COUNTED_TABLE: CapabilityTable = CapabilityTable {
    name: fixture_name,
    greet: fixture_greet,
    menu: fixture_menu,
};

unsafe extern "C" fn counted_create(name: *const c_char) -> *mut AnimalHeader {
    Box::into_raw(Box::new(Fixture {
        header: AnimalHeader::new(&COUNTED_TABLE),
        name,
    }))
    .cast()
}

unsafe extern "C" fn counted_destroy(instance: *mut AnimalHeader) {
    COUNTED_RELEASES.fetch_add(1, Ordering::SeqCst);
    unsafe { fixture_destroy(instance) };
}

/// Heap module counting its releases in [`COUNTED_RELEASES`]
pub const COUNTED_ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(counted_create),
    destroy: Some(counted_destroy),
    ..EntryPoints::EMPTY
};

static C_STYLE_TABLE: CapabilityTable = CapabilityTable {
    name: fixture_name,
    greet: fixture_greet,
    menu: fixture_menu,
};

fn c_style_instance(name: *const c_char) -> Fixture {
    Fixture {
        header: AnimalHeader::new(&C_STYLE_TABLE),
        name,
    }
}

unsafe extern "C" fn c_style_create(name: *const c_char) -> *mut AnimalHeader {
    let instance = unsafe { libc::malloc(std::mem::size_of::<Fixture>()) }.cast::<Fixture>();
    if instance.is_null() {
        return ptr::null_mut();
    }
    unsafe { instance.write(c_style_instance(name)) };
    instance.cast()
}

unsafe extern "C" fn c_style_on_stog(name: *const c_char, visit: VisitFn, ctx: *mut c_void) {
    let instance = c_style_instance(name);
    unsafe { visit(ptr::addr_of!(instance).cast(), ctx) };
}

unsafe extern "C" fn c_style_in_place(buffer: *mut AnimalHeader, name: *const c_char) {
    unsafe { buffer.cast::<Fixture>().write(c_style_instance(name)) };
}

/// Only the three constructors, allocating with `malloc` like a plugin
/// written in C: no `destroy`, no `instance_layout`
pub const C_STYLE_ENTRY_POINTS: EntryPoints = EntryPoints {
    create: Some(c_style_create),
    create_on_stog: Some(c_style_on_stog),
    create_on_predefined_mem: Some(c_style_in_place),
    ..EntryPoints::EMPTY
};
