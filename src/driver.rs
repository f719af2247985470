//! Host driver
//!
//! Constructs every requested plugin, records what it has to say and
//! releases it again. A plugin that fails to load is reported and skipped;
//! it never stops the rest of the batch.

use serde::Serialize;
use std::borrow::Cow;
use std::ffi::{CString, NulError};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::plugins::loader::module_name_from_path;
use crate::plugins::{
    greeting_line, menu_line, AllocationStrategy, Animal, AnimalSlot, Factory, FactoryError,
};

/// One plugin to construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    pub module: String,
    pub constructor_arg: CString,
}

impl PluginRequest {
    /// # Errors
    /// Returns an error if `constructor_arg` contains a NUL byte
    pub fn new(module: impl Into<String>, constructor_arg: &str) -> Result<Self, NulError> {
        Ok(Self {
            module: module.into(),
            constructor_arg: CString::new(constructor_arg)?,
        })
    }
}

/// What an animal said while it was alive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimalRecord {
    pub name: String,
    pub greeting: String,
    pub menu: String,
}

impl AnimalRecord {
    #[must_use]
    pub fn capture(animal: &dyn Animal) -> Self {
        Self {
            name: animal.name().into_owned(),
            greeting: animal.greet().into_owned(),
            menu: animal.menu().into_owned(),
        }
    }
}

impl Animal for AnimalRecord {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn greet(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.greeting)
    }

    fn menu(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.menu)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Constructed(AnimalRecord),
    Failed { error: String, resolution: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginReport {
    pub module: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl PluginReport {
    /// Output lines for this plugin
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        match &self.outcome {
            Outcome::Constructed(record) => vec![greeting_line(record), menu_line(record)],
            Outcome::Failed { error, .. } => vec![format!(
                "Creation of plug-in object {} failed: {}",
                self.module, error
            )],
        }
    }
}

/// Result of one batch, in request order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub strategy: AllocationStrategy,
    pub entries: Vec<PluginReport>,
}

impl BatchReport {
    #[must_use]
    pub fn new(strategy: AllocationStrategy) -> Self {
        Self {
            strategy,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, Outcome::Constructed(_)))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    /// All output lines, in request order
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().flat_map(PluginReport::lines).collect()
    }

    fn record(&mut self, module: &str, result: Result<AnimalRecord, FactoryError>) {
        let outcome = match result {
            Ok(record) => {
                info!("Plugin {} constructed as {}", module, record.name);
                Outcome::Constructed(record)
            }
            Err(e) => {
                warn!("Creation of plug-in object {} failed: {}", module, e);
                Outcome::Failed {
                    resolution: e.is_resolution_error(),
                    error: e.to_string(),
                }
            }
        };
        self.entries.push(PluginReport {
            module: module.to_string(),
            outcome,
        });
    }
}

/// Construct every request under `strategy`.
///
/// With [`AllocationStrategy::CallerSupplied`] one slot per request is
/// allocated up front and all of them are released together once the batch
/// is done. The other strategies release each instance before moving on.
pub fn run_batch(
    factory: &mut Factory,
    requests: &[PluginRequest],
    strategy: AllocationStrategy,
) -> BatchReport {
    let mut report = BatchReport::new(strategy);

    if strategy == AllocationStrategy::CallerSupplied {
        let mut slots: Vec<AnimalSlot<'_>> = requests.iter().map(|_| AnimalSlot::new()).collect();
        for (request, slot) in requests.iter().zip(slots.iter_mut()) {
            let result = factory
                .load_and_construct_into(&request.module, &request.constructor_arg, slot)
                .and_then(|()| {
                    slot.animal()
                        .map(|animal| AnimalRecord::capture(&animal))
                        .ok_or_else(|| FactoryError::ConstructionFailed {
                            module: request.module.clone(),
                        })
                });
            report.record(&request.module, result);
        }
        drop(slots);
    } else {
        for request in requests {
            let result = factory.visit(
                &request.module,
                &request.constructor_arg,
                strategy,
                |animal| AnimalRecord::capture(&animal),
            );
            report.record(&request.module, result);
        }
    }

    report
}

/// Construct every discovered module, naming the pets `Ljubimac <n>` where
/// `n` counts the pets constructed so far.
///
/// Modules are opened by path and reported by module name (`libtiger.so`
/// is reported as `tiger`).
pub fn run_discovered(
    factory: &mut Factory,
    modules: &[PathBuf],
    strategy: AllocationStrategy,
) -> BatchReport {
    let mut report = BatchReport::new(strategy);

    for path in modules {
        let location = path.to_string_lossy();
        let module = module_name_from_path(path).unwrap_or_else(|| location.to_string());
        let pet_name = pet_name(report.succeeded());
        let result = factory.visit(&location, &pet_name, strategy, |animal| {
            AnimalRecord::capture(&animal)
        });
        report.record(&module, result);
    }

    report
}

fn pet_name(index: usize) -> CString {
    CString::new(format!("Ljubimac {index}")).unwrap_or_default()
}
