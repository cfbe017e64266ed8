//! Native Script Host
//!
//! Precompiled handlers registered per script path stand in for script
//! text. A script without a handler runs as an empty body.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::ScriptError;
use crate::path;
use crate::resolve::LocalRequire;
use crate::script::{ScriptHost, ScriptJob};

/// Shared exports object
pub type Exports = Rc<RefCell<Value>>;

type ModuleHandler = Rc<dyn Fn(&NativeModule, &LocalRequire<NativeHost>) -> Result<(), ScriptError>>;
type GlobalHandler = Rc<dyn Fn(&ScriptJob) -> Result<(), ScriptError>>;

/// Module record of the native host
#[derive(Debug)]
pub struct NativeModule {
    exports: RefCell<Exports>,
}

impl NativeModule {
    fn new() -> Self {
        Self {
            exports: RefCell::new(Rc::new(RefCell::new(Value::Object(Map::new())))),
        }
    }

    /// Current exports object.
    pub fn exports(&self) -> Exports {
        self.exports.borrow().clone()
    }

    /// Set one named export on the exports object.
    pub fn export(&self, name: &str, value: Value) {
        let exports = self.exports();
        let mut exports = exports.borrow_mut();
        if !exports.is_object() {
            *exports = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut *exports {
            map.insert(name.to_string(), value);
        }
    }

    /// Replace the exports object (`module.exports = value`).
    pub fn set_exports(&self, value: Value) {
        *self.exports.borrow_mut() = Rc::new(RefCell::new(value));
    }
}

/// Script host backed by registered Rust handlers
#[derive(Default)]
pub struct NativeHost {
    modules: RefCell<HashMap<String, ModuleHandler>>,
    globals: RefCell<HashMap<String, GlobalHandler>>,
    runs: RefCell<Vec<String>>,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body of a module script.
    pub fn module<F>(self, script: &str, handler: F) -> Self
    where
        F: Fn(&NativeModule, &LocalRequire<NativeHost>) -> Result<(), ScriptError> + 'static,
    {
        self.register_module(script, handler);
        self
    }

    /// Register the body of a global script.
    pub fn global<F>(self, script: &str, handler: F) -> Self
    where
        F: Fn(&ScriptJob) -> Result<(), ScriptError> + 'static,
    {
        self.register_global(script, handler);
        self
    }

    pub fn register_module<F>(&self, script: &str, handler: F)
    where
        F: Fn(&NativeModule, &LocalRequire<NativeHost>) -> Result<(), ScriptError> + 'static,
    {
        self.modules
            .borrow_mut()
            .insert(path::canonical(script), Rc::new(handler));
    }

    pub fn register_global<F>(&self, script: &str, handler: F)
    where
        F: Fn(&ScriptJob) -> Result<(), ScriptError> + 'static,
    {
        self.globals
            .borrow_mut()
            .insert(path::canonical(script), Rc::new(handler));
    }

    /// Paths of every script run so far, in order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.borrow().clone()
    }

    /// How many times a script ran.
    pub fn run_count(&self, script: &str) -> usize {
        let key = path::canonical(script);
        self.runs
            .borrow()
            .iter()
            .filter(|run| path::canonical(run) == key)
            .count()
    }
}

impl ScriptHost for NativeHost {
    type Module = NativeModule;
    type Exports = Exports;

    fn create_module(&self) -> Result<NativeModule, ScriptError> {
        Ok(NativeModule::new())
    }

    fn exports(&self, module: &NativeModule) -> Result<Exports, ScriptError> {
        Ok(module.exports())
    }

    fn run_global(&self, job: &ScriptJob) -> Result<(), ScriptError> {
        self.runs.borrow_mut().push(job.path().to_string());

        let handler = self.globals.borrow().get(job.resource().key()).cloned();
        match handler {
            Some(handler) => handler(job),
            None => {
                tracing::debug!("No native handler for {}", job.path());
                Ok(())
            }
        }
    }

    fn run_module(
        &self,
        job: &ScriptJob,
        module: &NativeModule,
        require: LocalRequire<Self>,
    ) -> Result<(), ScriptError> {
        self.runs.borrow_mut().push(job.path().to_string());

        let handler = self.modules.borrow().get(job.resource().key()).cloned();
        match handler {
            Some(handler) => handler(module, &require),
            None => {
                tracing::debug!("No native handler for {}", job.path());
                Ok(())
            }
        }
    }
}
