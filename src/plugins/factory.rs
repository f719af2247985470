use menagerie_abi::{symbols, AnimalHeader, CreateInPlaceFn};
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use super::api::AnimalRef;
use super::error::FactoryError;
use super::loader::{ModuleSource, PluginModule};
use super::strategy::{AllocationStrategy, AnimalSlot, HeapRelease, Instance};

/// Resolves plugin modules by name and constructs their instances.
///
/// Every call resolves its module through the [`ModuleSource`]. With the
/// cache enabled, resolved modules stay loaded and are shared by later
/// calls; instances are never shared either way.
pub struct Factory {
    source: Box<dyn ModuleSource>,
    cache: Option<HashMap<String, Arc<PluginModule>>>,
}

impl Factory {
    #[must_use]
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: None,
        }
    }

    /// Keep resolved modules loaded between calls
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(HashMap::new);
        self
    }

    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Names of the modules held by the cache, sorted
    #[must_use]
    pub fn cached_modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .cache
            .iter()
            .flat_map(|cache| cache.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop cached modules. Libraries stay loaded while instances use them.
    pub fn clear_cache(&mut self) {
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
    }

    /// Resolve a module by name
    ///
    /// # Errors
    /// Returns [`FactoryError::ModuleNotFound`] if the name does not resolve
    pub fn resolve(&mut self, module_name: &str) -> Result<Arc<PluginModule>, FactoryError> {
        if let Some(module) = self.cache.as_ref().and_then(|cache| cache.get(module_name)) {
            debug!("Using cached plugin module {}", module_name);
            return Ok(Arc::clone(module));
        }

        let module = Arc::new(self.source.open(module_name)?);
        info!("Loaded plugin module {}", module_name);

        if let Some(cache) = &mut self.cache {
            cache.insert(module_name.to_string(), Arc::clone(&module));
        }
        Ok(module)
    }

    /// Construct an instance of `module_name` with `arg` as its name.
    ///
    /// The instance borrows `arg` and is released when dropped. Under
    /// [`AllocationStrategy::CallerSupplied`] the factory allocates an
    /// [`AnimalSlot`] on the caller's behalf and hands it over inside the
    /// instance. [`AllocationStrategy::StackScoped`] instances cannot be
    /// returned at all; use [`with_stack_scoped`](Self::with_stack_scoped).
    ///
    /// # Errors
    /// - [`FactoryError::ModuleNotFound`] if the module does not resolve
    /// - [`FactoryError::SymbolNotFound`] if an entry point of the strategy is missing
    /// - [`FactoryError::LayoutMismatch`] if the instance does not fit a slot
    /// - [`FactoryError::ConstructionFailed`] if the plugin produced nothing
    /// - [`FactoryError::ScopedStrategy`] for the stack-scoped strategy
    pub fn load_and_construct<'a>(
        &mut self,
        module_name: &str,
        arg: &'a CStr,
        strategy: AllocationStrategy,
    ) -> Result<Instance<'a>, FactoryError> {
        let module = self.resolve(module_name)?;
        let entry_points = *module.entry_points();

        match strategy {
            AllocationStrategy::Heap => {
                let create = module.require(entry_points.create, symbols::CREATE)?;
                let release = match entry_points.destroy {
                    Some(destroy) => HeapRelease::Destroy(destroy),
                    None => {
                        warn!(
                            "Plugin module {} exports no `{}`; its instances go back to the C allocator",
                            module_name,
                            symbols::DESTROY
                        );
                        HeapRelease::Free
                    }
                };

                // Safety: `arg` is NUL-terminated and outlives the instance.
                let raw = unsafe { create(arg.as_ptr()) };
                let header = NonNull::new(raw).ok_or_else(|| FactoryError::ConstructionFailed {
                    module: module_name.to_string(),
                })?;

                debug!("Constructed heap {} instance", module_name);
                // Safety: `header` came from this module's `create`, and a
                // module without `destroy` allocates with `malloc`.
                Ok(unsafe { Instance::heap(header, release, module) })
            }
            AllocationStrategy::StackScoped => {
                module.require(entry_points.create_on_stog, symbols::CREATE_ON_STOG)?;
                Err(FactoryError::ScopedStrategy {
                    module: module_name.to_string(),
                })
            }
            AllocationStrategy::CallerSupplied => {
                let mut slot = AnimalSlot::new();
                Self::fill_slot(Arc::clone(&module), arg, &mut slot)?;
                Ok(Instance::caller_supplied(slot, module))
            }
        }
    }

    /// Initialize a caller-owned slot in place.
    ///
    /// A layout reported through `instance_layout` is checked before the
    /// plugin runs. A module without `instance_layout` is trusted to fit
    /// the slot, as with
    /// [`load_and_construct_into_unchecked`](Self::load_and_construct_into_unchecked).
    /// Resolution and layout failures leave the slot as it was; once the
    /// plugin runs, the previous occupant is released.
    ///
    /// # Errors
    /// - [`FactoryError::ModuleNotFound`] if the module does not resolve
    /// - [`FactoryError::SymbolNotFound`] for a missing `create_on_predefined_mem`
    /// - [`FactoryError::LayoutMismatch`] if the instance does not fit
    /// - [`FactoryError::ConstructionFailed`] if the plugin left the slot untouched
    pub fn load_and_construct_into<'a>(
        &mut self,
        module_name: &str,
        arg: &'a CStr,
        slot: &mut AnimalSlot<'a>,
    ) -> Result<(), FactoryError> {
        let module = self.resolve(module_name)?;
        Self::fill_slot(module, arg, slot)
    }

    /// Initialize an arbitrary buffer in place, without any layout check.
    ///
    /// Returns the module, which must be kept alive while the instance is
    /// used. The instance needs no release beyond freeing the buffer.
    ///
    /// # Errors
    /// [`FactoryError::ModuleNotFound`] or [`FactoryError::SymbolNotFound`]
    ///
    /// # Safety
    /// `buffer` must be valid for writes of the module's instance layout
    /// and aligned for it. Using a buffer sized for a different plugin type
    /// is undefined behavior, and nothing here can detect it. `arg` must
    /// outlive every use of the instance.
    pub unsafe fn load_and_construct_into_unchecked(
        &mut self,
        module_name: &str,
        arg: &CStr,
        buffer: NonNull<AnimalHeader>,
    ) -> Result<Arc<PluginModule>, FactoryError> {
        let module = self.resolve(module_name)?;
        let construct = module.require(
            module.entry_points().create_on_predefined_mem,
            symbols::CREATE_ON_PREDEFINED_MEM,
        )?;
        // Safety: forwarded from the caller.
        unsafe { construct_in_place(construct, arg, buffer.as_ptr()) };
        Ok(module)
    }

    fn fill_slot<'a>(
        module: Arc<PluginModule>,
        arg: &'a CStr,
        slot: &mut AnimalSlot<'a>,
    ) -> Result<(), FactoryError> {
        let construct = module.require(
            module.entry_points().create_on_predefined_mem,
            symbols::CREATE_ON_PREDEFINED_MEM,
        )?;

        match module.entry_points().instance_layout {
            Some(layout) => {
                let required = layout();
                if !AnimalSlot::fits(&required) {
                    return Err(FactoryError::LayoutMismatch {
                        module: module.name().to_string(),
                        required,
                        available: AnimalSlot::capacity(),
                    });
                }
            }
            None => warn!(
                "Plugin module {} exports no `{}`; assuming its instances fit {}",
                module.name(),
                symbols::INSTANCE_LAYOUT,
                AnimalSlot::capacity()
            ),
        }

        let buffer = slot.prepare();
        // Safety: the instance fits the slot, by the reported layout or by
        // the contract of modules that report none.
        unsafe { construct_in_place(construct, arg, buffer) };

        if !slot.was_initialized() {
            return Err(FactoryError::ConstructionFailed {
                module: module.name().to_string(),
            });
        }

        debug!("Constructed caller-supplied {} instance", module.name());
        slot.occupy(module);
        Ok(())
    }

    /// Construct a stack-scoped instance and run `visitor` on it.
    ///
    /// The instance lives in the plugin's `create_on_stog` frame and is
    /// gone when that call returns, so the reference handed to `visitor`
    /// cannot leave it:
    ///
    /// ```compile_fail
    /// use menagerie::plugins::{Factory, StaticRegistry};
    ///
    /// let mut factory = Factory::new(StaticRegistry::new());
    /// let escaped = factory
    ///     .with_stack_scoped("tiger", c"Modrobradi", |animal| animal)
    ///     .unwrap();
    /// ```
    ///
    /// A panic inside `visitor` is caught before it reaches the plugin and
    /// resumed once the plugin has returned.
    ///
    /// # Errors
    /// - [`FactoryError::ModuleNotFound`] if the module does not resolve
    /// - [`FactoryError::SymbolNotFound`] if `create_on_stog` is missing
    /// - [`FactoryError::ConstructionFailed`] if the plugin never called back
    pub fn with_stack_scoped<F, R>(
        &mut self,
        module_name: &str,
        arg: &CStr,
        visitor: F,
    ) -> Result<R, FactoryError>
    where
        F: FnOnce(AnimalRef<'_>) -> R,
    {
        let module = self.resolve(module_name)?;
        let create = module.require(module.entry_points().create_on_stog, symbols::CREATE_ON_STOG)?;

        let mut scoped = ScopedVisit {
            visitor: Some(visitor),
            outcome: None,
        };
        // Safety: the trampoline is instantiated for the exact type behind
        // `ctx`, and `scoped` outlives the call.
        unsafe {
            create(
                arg.as_ptr(),
                visit_trampoline::<F, R>,
                ptr::addr_of_mut!(scoped).cast(),
            );
        }

        match scoped.outcome {
            Some(Ok(value)) => {
                debug!("Visited stack-scoped {} instance", module_name);
                Ok(value)
            }
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => Err(FactoryError::ConstructionFailed {
                module: module_name.to_string(),
            }),
        }
    }

    /// Construct an instance under any strategy, run `visitor` on it and
    /// release it
    ///
    /// # Errors
    /// Same as [`load_and_construct`](Self::load_and_construct) and
    /// [`with_stack_scoped`](Self::with_stack_scoped)
    pub fn visit<F, R>(
        &mut self,
        module_name: &str,
        arg: &CStr,
        strategy: AllocationStrategy,
        visitor: F,
    ) -> Result<R, FactoryError>
    where
        F: FnOnce(AnimalRef<'_>) -> R,
    {
        match strategy {
            AllocationStrategy::StackScoped => self.with_stack_scoped(module_name, arg, visitor),
            AllocationStrategy::Heap | AllocationStrategy::CallerSupplied => {
                let instance = self.load_and_construct(module_name, arg, strategy)?;
                let value = visitor(instance.animal());
                instance.release();
                Ok(value)
            }
        }
    }
}

/// The one place a plugin writes into memory it did not allocate.
///
/// # Safety
/// `buffer` must be valid and aligned for the module's instance layout.
unsafe fn construct_in_place(construct: CreateInPlaceFn, arg: &CStr, buffer: *mut AnimalHeader) {
    unsafe { construct(buffer, arg.as_ptr()) };
}

struct ScopedVisit<F, R> {
    visitor: Option<F>,
    outcome: Option<thread::Result<R>>,
}

unsafe extern "C" fn visit_trampoline<F, R>(instance: *const AnimalHeader, ctx: *mut c_void)
where
    F: FnOnce(AnimalRef<'_>) -> R,
{
    // Safety: `ctx` is the `ScopedVisit<F, R>` set up by `with_stack_scoped`.
    let scoped = unsafe { &mut *ctx.cast::<ScopedVisit<F, R>>() };
    let Some(header) = NonNull::new(instance.cast_mut()) else {
        return;
    };
    let Some(visitor) = scoped.visitor.take() else {
        return;
    };

    // Safety: the instance lives until this callback returns.
    let animal = unsafe { AnimalRef::from_raw(header) };
    scoped.outcome = Some(panic::catch_unwind(AssertUnwindSafe(|| visitor(animal))));
}
