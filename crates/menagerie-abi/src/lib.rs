//! menagerie-abi - the binary contract between the menagerie host and its plugins
//!
//! A plugin is a shared library exporting a handful of `extern "C"` entry
//! points. Every instance it constructs starts with an [`AnimalHeader`]
//! pointing at the plugin's [`CapabilityTable`], so the host can dispatch
//! through the table without knowing the concrete type behind it.
//!
//! # Table order
//!
//! The host finds each operation by its *position* in the table, never by
//! name. A plugin that swaps two slots still loads, and the host will call
//! the wrong operation without any error.
//!
//! # Exported symbols
//!
//! | Symbol | Signature | Needed by |
//! |---|---|---|
//! | `create` | [`CreateFn`] | heap strategy |
//! | `destroy` | [`DestroyFn`] | heap strategy |
//! | `create_on_stog` | [`CreateOnStackFn`] | stack-scoped strategy |
//! | `create_on_predefined_mem` | [`CreateInPlaceFn`] | caller-supplied strategy |
//! | `instance_layout` | [`LayoutFn`] | caller-supplied layout check |

use std::ffi::{c_char, c_void};
use std::fmt;

/// Reads the display name out of an instance.
pub type NameFn = unsafe extern "C" fn(this: *const AnimalHeader) -> *const c_char;

/// Returns the greeting of a plugin type. Needs no instance state.
pub type GreetFn = extern "C" fn() -> *const c_char;

/// Returns the favourite food of a plugin type. Needs no instance state.
pub type MenuFn = extern "C" fn() -> *const c_char;

/// Fixed-order dispatch table shared by every instance of one plugin type.
///
/// Plugins keep exactly one of these in a `static`; it is never written
/// after the library is loaded.
#[repr(C)]
#[derive(Debug)]
pub struct CapabilityTable {
    pub name: NameFn,
    pub greet: GreetFn,
    pub menu: MenuFn,
}

/// First field of every plugin instance.
#[repr(C)]
#[derive(Debug)]
pub struct AnimalHeader {
    pub table: *const CapabilityTable,
}

impl AnimalHeader {
    /// Header with no table. Hosts write this into a buffer before asking a
    /// plugin to initialize it, then treat a table that is still null as a
    /// failed construction.
    pub const UNINIT: Self = Self {
        table: std::ptr::null(),
    };

    #[must_use]
    pub const fn new(table: &'static CapabilityTable) -> Self {
        Self { table }
    }
}

/// Size and alignment of a plugin's instance type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceLayout {
    pub size: usize,
    pub align: usize,
}

impl InstanceLayout {
    #[must_use]
    pub const fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }

    /// Whether a buffer with this layout can hold an instance with `required`.
    #[must_use]
    pub const fn can_hold(&self, required: &InstanceLayout) -> bool {
        required.align.is_power_of_two()
            && required.size <= self.size
            && required.align <= self.align
    }
}

impl fmt::Display for InstanceLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes aligned to {}", self.size, self.align)
    }
}

/// Heap construction. The returned instance belongs to the caller, who
/// hands it back to the same plugin's [`DestroyFn`] exactly once.
///
/// The plugin keeps `name` as a borrowed pointer; it must outlive the
/// instance.
pub type CreateFn = unsafe extern "C" fn(name: *const c_char) -> *mut AnimalHeader;

/// Releases an instance returned by [`CreateFn`].
pub type DestroyFn = unsafe extern "C" fn(instance: *mut AnimalHeader);

/// Called by a plugin with an instance living in the plugin's own stack
/// frame. The pointer is dead as soon as the callback returns.
pub type VisitFn = unsafe extern "C" fn(instance: *const AnimalHeader, ctx: *mut c_void);

/// Stack-scoped construction: builds the instance in the plugin's frame
/// and hands it to `visit` before returning. The instance never escapes.
pub type CreateOnStackFn =
    unsafe extern "C" fn(name: *const c_char, visit: VisitFn, ctx: *mut c_void);

/// Initializes a caller-owned buffer in place.
///
/// The buffer must be at least as large and as aligned as the plugin's
/// [`InstanceLayout`]. Nothing on the plugin side can check this.
pub type CreateInPlaceFn = unsafe extern "C" fn(buffer: *mut AnimalHeader, name: *const c_char);

/// Reports the plugin's instance layout.
pub type LayoutFn = extern "C" fn() -> InstanceLayout;

/// Exported symbol names.
pub mod symbols {
    pub const CREATE: &str = "create";
    pub const DESTROY: &str = "destroy";
    pub const CREATE_ON_STOG: &str = "create_on_stog";
    pub const CREATE_ON_PREDEFINED_MEM: &str = "create_on_predefined_mem";
    pub const INSTANCE_LAYOUT: &str = "instance_layout";
}

/// Entry points of one plugin module. Any of them may be missing; the host
/// only requires the ones its chosen strategy uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPoints {
    pub create: Option<CreateFn>,
    pub destroy: Option<DestroyFn>,
    pub create_on_stog: Option<CreateOnStackFn>,
    pub create_on_predefined_mem: Option<CreateInPlaceFn>,
    pub instance_layout: Option<LayoutFn>,
}

impl EntryPoints {
    pub const EMPTY: Self = Self {
        create: None,
        destroy: None,
        create_on_stog: None,
        create_on_predefined_mem: None,
        instance_layout: None,
    };
}
