//! Mapping from backend names to backend prototypes
//!
//! A [`Registry`] is an explicit object: configurations that need different
//! backends (or tests that install fixtures) each build their own instead of
//! mutating shared state. [`Registry::global`] provides a lazily-seeded
//! default for the common case, and [`Registry::scope`] selects which registry
//! serde deserialization binds against on the current thread.
//!
//! # Example
//!
//! ```
//! use secret_ref::{backends::RawBackend, Registry, Secret};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Config {
//!     token: Secret,
//! }
//!
//! // Route `env:` to the identity backend for this load only
//! let registry = Registry::with_builtins();
//! registry.register("env", RawBackend);
//!
//! let config: Config = registry.scope(|| serde_json::from_str(r#"{"token":"env:fixture"}"#)).unwrap();
//! assert_eq!(config.token.get(), "fixture");
//! ```

use crate::backend::Backend;
use crate::backends::{
    CipherBackend, DynEnvBackend, EnvBackend, EtcdBackend, FileBackend, RawBackend, CIPHER,
    DYNENV, ENV, ETCD, FILE, RAW,
};
use crate::config::EtcdConfig;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

thread_local! {
    static SCOPED: RefCell<Vec<Registry>> = const { RefCell::new(Vec::new()) };
}

/// Name to backend-prototype mapping
///
/// Cloning a `Registry` yields another handle to the same mapping; use
/// [`Registry::fork`] for an independent copy. Lookups take a read lock,
/// registrations a write lock, so late registration is safe while other
/// threads resolve.
#[derive(Clone, Default)]
pub struct Registry {
    backends: Arc<RwLock<HashMap<String, Box<dyn Backend>>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.names())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the built-in backends
    ///
    /// `raw`, `env`, `dynenv` and `file` are always present. `scr` uses the
    /// key from the `SCR_PASS` environment variable (or the built-in default
    /// key when unset) and is skipped with a warning when that key is
    /// invalid. `etcd2` points at [`DEFAULT_ETCD_URL`](crate::DEFAULT_ETCD_URL).
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(RAW, RawBackend);
        registry.register(ENV, EnvBackend::new());
        registry.register(DYNENV, DynEnvBackend);
        registry.register(FILE, FileBackend);

        match CipherBackend::from_env() {
            Ok(cipher) => registry.register(CIPHER, cipher),
            Err(e) => warn!(error = %e, "skipping scr backend: invalid {}", crate::CIPHER_KEY_ENV),
        }

        registry.register(ETCD, EtcdBackend::new(EtcdConfig::default()));
        registry
    }

    /// The process-wide default registry, seeded with the built-ins on
    /// first use
    pub fn global() -> Registry {
        GLOBAL.get_or_init(Registry::with_builtins).clone()
    }

    /// The registry deserialization binds against on this thread
    ///
    /// This is the innermost active [`Registry::scope`], or
    /// [`Registry::global`] outside of any scope.
    pub fn current() -> Registry {
        SCOPED
            .with(|scoped| scoped.borrow().last().cloned())
            .unwrap_or_else(Registry::global)
    }

    /// Run `f` with this registry as the current one for the calling thread
    ///
    /// Scopes nest; the previous registry is restored when `f` returns or
    /// unwinds.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore;

        impl Drop for Restore {
            fn drop(&mut self) {
                let _ = SCOPED.with(|scoped| scoped.borrow_mut().pop());
            }
        }

        SCOPED.with(|scoped| scoped.borrow_mut().push(self.clone()));
        let _restore = Restore;
        f()
    }

    /// Register `backend` under `name`, replacing any previous entry
    pub fn register(&self, name: impl Into<String>, backend: impl Backend + 'static) {
        let name = name.into();
        let previous = self.backends.write().insert(name.clone(), Box::new(backend));
        if previous.is_some() {
            debug!(backend = %name, "replaced registered backend");
        } else {
            trace!(backend = %name, "registered backend");
        }
    }

    /// Get a fresh instance of the backend registered under `name`
    ///
    /// The prototype itself is never handed out.
    pub fn lookup(&self, name: &str) -> Option<Box<dyn Backend>> {
        self.backends.read().get(name).map(|proto| proto.clone_box())
    }

    /// Whether a backend is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.backends.read().contains_key(name)
    }

    /// Registered backend names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Independent copy of this registry
    ///
    /// Registrations on the copy do not affect the original and vice versa.
    pub fn fork(&self) -> Registry {
        let backends = self
            .backends
            .read()
            .iter()
            .map(|(name, proto)| (name.clone(), proto.clone_box()))
            .collect();
        Registry {
            backends: Arc::new(RwLock::new(backends)),
        }
    }
}
