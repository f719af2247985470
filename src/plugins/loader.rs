use libloading::Library;
use menagerie_abi::{symbols, EntryPoints};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::FactoryError;

/// Resolves a module name to a loaded plugin module
pub trait ModuleSource {
    /// Open `name`, failing with [`FactoryError::ModuleNotFound`] when it
    /// does not resolve
    fn open(&self, name: &str) -> Result<PluginModule, FactoryError>;
}

/// A live binding to a plugin: its entry points and, for dynamically
/// loaded modules, the library they live in.
///
/// The library is unloaded when the last handle drops, so instances keep an
/// `Arc<PluginModule>` for as long as they exist.
pub struct PluginModule {
    name: String,
    entry_points: EntryPoints,
    origin: ModuleOrigin,
}

enum ModuleOrigin {
    Static,
    Library { path: PathBuf, _library: Library },
}

impl PluginModule {
    /// Module whose entry points are linked into this binary
    #[must_use]
    pub fn from_static(name: impl Into<String>, entry_points: EntryPoints) -> Self {
        Self {
            name: name.into(),
            entry_points,
            origin: ModuleOrigin::Static,
        }
    }

    /// Resolve the exported entry points of an already opened library.
    /// Missing symbols are recorded as absent, not reported.
    ///
    /// # Safety
    /// Every exported symbol that matches a known name must have the
    /// signature documented in `menagerie_abi`.
    pub unsafe fn from_library(name: impl Into<String>, path: PathBuf, library: Library) -> Self {
        let entry_points = unsafe {
            EntryPoints {
                create: optional_symbol(&library, symbols::CREATE),
                destroy: optional_symbol(&library, symbols::DESTROY),
                create_on_stog: optional_symbol(&library, symbols::CREATE_ON_STOG),
                create_on_predefined_mem: optional_symbol(
                    &library,
                    symbols::CREATE_ON_PREDEFINED_MEM,
                ),
                instance_layout: optional_symbol(&library, symbols::INSTANCE_LAYOUT),
            }
        };

        Self {
            name: name.into(),
            entry_points,
            origin: ModuleOrigin::Library {
                path,
                _library: library,
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    /// File the module was loaded from, `None` for static modules
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            ModuleOrigin::Static => None,
            ModuleOrigin::Library { path, .. } => Some(path),
        }
    }

    /// Unwrap an entry point, reporting it as missing otherwise
    pub fn require<T>(&self, entry: Option<T>, symbol: &'static str) -> Result<T, FactoryError> {
        entry.ok_or_else(|| FactoryError::SymbolNotFound {
            module: self.name.clone(),
            symbol,
        })
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("path", &self.path())
            .field("entry_points", &self.entry_points)
            .finish()
    }
}

unsafe fn optional_symbol<T: Copy>(library: &Library, symbol: &str) -> Option<T> {
    match unsafe { library.get::<T>(symbol.as_bytes()) } {
        Ok(found) => Some(*found),
        Err(e) => {
            debug!("Symbol `{}` not exported: {}", symbol, e);
            None
        }
    }
}

/// Loads plugin modules from shared libraries with `libloading`.
///
/// A name that looks like a path (contains a separator or has an extension)
/// is opened as given. Any other name is turned into the platform library
/// file name (`libtiger.so`, `libtiger.dylib`, `tiger.dll`), looked up in
/// each search path in order, and finally handed to the system loader.
#[derive(Debug, Clone, Default)]
pub struct DynamicLoader {
    search_paths: Vec<PathBuf>,
}

impl DynamicLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a search path for plugins
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Files tried for `name`, in order
    #[must_use]
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        if is_path_like(name) {
            return vec![PathBuf::from(name)];
        }

        let file_name = library_file_name(name);
        let mut candidates: Vec<PathBuf> = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .collect();
        candidates.push(PathBuf::from(file_name));
        candidates
    }
}

impl ModuleSource for DynamicLoader {
    fn open(&self, name: &str) -> Result<PluginModule, FactoryError> {
        let path_like = is_path_like(name);
        let mut last_error = String::from("no candidate files");

        for candidate in self.candidates(name) {
            // Search-path candidates that don't exist are skipped; the bare
            // file name goes to the system loader's own search.
            let searched = !path_like && candidate.parent().is_some_and(|p| !p.as_os_str().is_empty());
            if searched && !candidate.exists() {
                continue;
            }

            debug!("Opening plugin module {} from {}", name, candidate.display());
            // Safety: loading runs the library's initializers; plugins are
            // trusted code by contract.
            match unsafe { Library::new(&candidate) } {
                Ok(library) => {
                    // Safety: exported names follow the menagerie ABI.
                    let module = unsafe { PluginModule::from_library(name, candidate, library) };
                    return Ok(module);
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", candidate.display(), e);
                    last_error = e.to_string();
                }
            }
        }

        Err(FactoryError::ModuleNotFound {
            module: name.to_string(),
            reason: last_error,
        })
    }
}

fn is_path_like(name: &str) -> bool {
    let path = Path::new(name);
    path.components().count() > 1 || path.extension().is_some()
}

/// Platform file name for module `name`
#[must_use]
pub fn library_file_name(name: &str) -> OsString {
    libloading::library_filename(name)
}

/// Module name for a library file: `libtiger.so` gives `tiger`
#[must_use]
pub fn module_name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem
        .strip_prefix(std::env::consts::DLL_PREFIX)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(stem);
    Some(name.to_string())
}

/// Shared libraries directly inside `dir`, sorted by file name
///
/// # Errors
/// Returns an error if the directory cannot be read
pub fn discover_modules(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut modules: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
        })
        .collect();
    modules.sort();
    debug!("Discovered {} plugin modules in {}", modules.len(), dir.display());
    Ok(modules)
}
