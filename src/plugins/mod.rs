// Plugin system: animal plugins loaded from shared libraries
// - menagerie_abi carries the C table every plugin exports
// - loader/registry resolve module names (libloading or static registration)
// - factory constructs instances under one of three allocation strategies
pub mod api;
pub mod error;
pub mod factory;
pub mod loader;
pub mod registry;
pub mod strategy;

pub use api::{greeting_line, menu_line, Animal, AnimalRef};
pub use error::FactoryError;
pub use factory::Factory;
pub use loader::{discover_modules, DynamicLoader, ModuleSource, PluginModule};
pub use registry::StaticRegistry;
pub use strategy::{AllocationStrategy, AnimalSlot, Instance};
