//! Allocation strategies and the storage they hand out.
//!
//! | Strategy | Allocates | Releases |
//! |---|---|---|
//! | [`Heap`](AllocationStrategy::Heap) | plugin `create` | [`Instance`] drop, through the plugin's `destroy` or `free` |
//! | [`StackScoped`](AllocationStrategy::StackScoped) | plugin, in its own frame | the plugin, when `create_on_stog` returns |
//! | [`CallerSupplied`](AllocationStrategy::CallerSupplied) | caller ([`AnimalSlot`]) | caller, when the slot is cleared or dropped |

use clap::ValueEnum;
use menagerie_abi::{AnimalHeader, DestroyFn, InstanceLayout};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::CStr;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::debug;

use super::api::{Animal, AnimalRef};
use super::loader::PluginModule;

/// Who allocates an instance and who releases it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    /// Plugin allocates, caller releases
    #[default]
    Heap,
    /// Plugin builds the instance in its own stack frame; usable only inside
    /// the constructor call
    #[value(alias = "stack")]
    StackScoped,
    /// Caller provides the buffer, plugin initializes it in place
    #[value(alias = "caller")]
    CallerSupplied,
}

impl AllocationStrategy {
    pub const ALL: [Self; 3] = [Self::Heap, Self::StackScoped, Self::CallerSupplied];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heap => "heap",
            Self::StackScoped => "stack-scoped",
            Self::CallerSupplied => "caller-supplied",
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes available in an [`AnimalSlot`]
pub const SLOT_CAPACITY: usize = 64;

/// Alignment of an [`AnimalSlot`]
pub const SLOT_ALIGN: usize = 16;

#[repr(C, align(16))]
struct SlotStorage([MaybeUninit<u8>; SLOT_CAPACITY]);

/// Caller-owned buffer a plugin initializes in place.
///
/// The bytes live in their own heap allocation, so an occupied slot can be
/// moved without moving the instance. Plugin instances are plain data with
/// no destructor of their own; clearing the slot only drops the reference
/// to the module.
pub struct AnimalSlot<'a> {
    storage: Box<SlotStorage>,
    occupant: Option<Arc<PluginModule>>,
    _arg: PhantomData<&'a CStr>,
}

impl<'a> AnimalSlot<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Box::new(SlotStorage([MaybeUninit::uninit(); SLOT_CAPACITY])),
            occupant: None,
            _arg: PhantomData,
        }
    }

    /// Size and alignment every slot offers
    #[must_use]
    pub const fn capacity() -> InstanceLayout {
        InstanceLayout {
            size: SLOT_CAPACITY,
            align: SLOT_ALIGN,
        }
    }

    /// Whether an instance with `required` layout fits
    #[must_use]
    pub fn fits(required: &InstanceLayout) -> bool {
        Self::capacity().can_hold(required)
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    /// Module of the current occupant
    #[must_use]
    pub fn module(&self) -> Option<&PluginModule> {
        self.occupant.as_deref()
    }

    /// The instance in the slot, if any
    #[must_use]
    pub fn animal(&self) -> Option<AnimalRef<'_>> {
        if self.is_occupied() {
            // Safety: an occupied slot holds an initialized instance and
            // keeps its module loaded.
            Some(unsafe { AnimalRef::from_raw(self.header()) })
        } else {
            None
        }
    }

    /// Release the occupant
    pub fn clear(&mut self) {
        if let Some(module) = self.occupant.take() {
            debug!("Released caller-supplied {} instance", module.name());
        }
    }

    /// Start of the buffer, with the header reset to "no table"
    pub(crate) fn prepare(&mut self) -> *mut AnimalHeader {
        self.clear();
        let header = self.storage.0.as_mut_ptr().cast::<AnimalHeader>();
        // Safety: the buffer is larger and more aligned than a header.
        unsafe { header.write(AnimalHeader::UNINIT) };
        header
    }

    /// Whether the plugin wrote a table into the header after `prepare`
    pub(crate) fn was_initialized(&self) -> bool {
        // Safety: `prepare` always leaves an initialized header behind.
        unsafe { !(*self.header().as_ptr()).table.is_null() }
    }

    pub(crate) fn occupy(&mut self, module: Arc<PluginModule>) {
        self.occupant = Some(module);
    }

    pub(crate) fn header(&self) -> NonNull<AnimalHeader> {
        NonNull::from(&*self.storage).cast()
    }
}

impl Default for AnimalSlot<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AnimalSlot<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for AnimalSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimalSlot")
            .field("occupant", &self.module().map(PluginModule::name))
            .finish()
    }
}

/// An instance returned by the factory, released exactly once on drop
pub struct Instance<'a> {
    storage: Storage<'a>,
    module: Arc<PluginModule>,
}

enum Storage<'a> {
    Heap {
        header: NonNull<AnimalHeader>,
        release: HeapRelease,
        _arg: PhantomData<&'a CStr>,
    },
    CallerSupplied(AnimalSlot<'a>),
}

/// How a heap instance goes back to its allocator
#[derive(Debug, Clone, Copy)]
pub(crate) enum HeapRelease {
    /// The module's own `destroy` export
    Destroy(DestroyFn),
    /// The C allocator, for modules that allocate with `malloc` and export
    /// no `destroy`
    Free,
}

impl<'a> Instance<'a> {
    /// Take ownership of a heap instance.
    ///
    /// # Safety
    /// `header` must come from the `create` entry point of `module`, and
    /// `release` must match the allocator that entry point used.
    pub(crate) unsafe fn heap(
        header: NonNull<AnimalHeader>,
        release: HeapRelease,
        module: Arc<PluginModule>,
    ) -> Self {
        Self {
            storage: Storage::Heap {
                header,
                release,
                _arg: PhantomData,
            },
            module,
        }
    }

    /// Wrap an occupied slot
    pub(crate) fn caller_supplied(slot: AnimalSlot<'a>, module: Arc<PluginModule>) -> Self {
        debug_assert!(slot.is_occupied());
        Self {
            storage: Storage::CallerSupplied(slot),
            module,
        }
    }

    #[must_use]
    pub fn animal(&self) -> AnimalRef<'_> {
        let header = match &self.storage {
            Storage::Heap { header, .. } => *header,
            Storage::CallerSupplied(slot) => slot.header(),
        };
        // Safety: the instance stays initialized until `self` drops, and
        // `self.module` keeps the plugin loaded.
        unsafe { AnimalRef::from_raw(header) }
    }

    #[must_use]
    pub fn strategy(&self) -> AllocationStrategy {
        match self.storage {
            Storage::Heap { .. } => AllocationStrategy::Heap,
            Storage::CallerSupplied(_) => AllocationStrategy::CallerSupplied,
        }
    }

    #[must_use]
    pub fn module(&self) -> &PluginModule {
        &self.module
    }

    /// Release now instead of at the end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        if let Storage::Heap {
            header, release, ..
        } = &self.storage
        {
            // Safety: heap instances are released here and nowhere else.
            match release {
                HeapRelease::Destroy(destroy) => unsafe { (*destroy)(header.as_ptr()) },
                HeapRelease::Free => unsafe { libc::free(header.as_ptr().cast()) },
            }
            debug!("Released heap {} instance", self.module.name());
        }
    }
}

impl Animal for Instance<'_> {
    fn name(&self) -> Cow<'_, str> {
        self.animal().name_cstr().to_string_lossy()
    }

    fn greet(&self) -> Cow<'_, str> {
        self.animal().greet_cstr().to_string_lossy()
    }

    fn menu(&self) -> Cow<'_, str> {
        self.animal().menu_cstr().to_string_lossy()
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("module", &self.module.name())
            .field("strategy", &self.strategy())
            .finish()
    }
}
