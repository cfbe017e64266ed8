//! Script Hosts
//!
//! Executing script text is delegated to a [`ScriptHost`]. The core owns
//! the module cache and its ordering (the module record is cached before
//! the body runs, so circular requires observe partial exports); hosts
//! only build module records and run code.
//!
//! Hosts that can be re-entered from inside a running script use
//! [`LocalRequire::call`]. Hosts that cannot drive the same protocol
//! step by step with [`LocalRequire::step`] and [`ScriptJob`].

use std::any::Any;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::process::Content;
use crate::resolve::LocalRequire;
use crate::tree::Resource;

/// Pluggable script execution
pub trait ScriptHost: Sized + 'static {
    /// Module record (`{ exports }`) as the host represents it.
    type Module: 'static;
    /// Value returned to callers of `require`.
    type Exports: Clone;

    /// Fresh module record with empty exports.
    fn create_module(&self) -> Result<Self::Module, ScriptError>;

    /// Current exports of a module record.
    fn exports(&self, module: &Self::Module) -> Result<Self::Exports, ScriptError>;

    /// Run a script in the ambient scope.
    fn run_global(&self, job: &ScriptJob) -> Result<(), ScriptError>;

    /// Run a script body with `module`, `module.exports` and `require`.
    fn run_module(
        &self,
        job: &ScriptJob,
        module: &Self::Module,
        require: LocalRequire<Self>,
    ) -> Result<(), ScriptError>;
}

/// Module cache slot of a script resource
#[derive(Debug, Clone, Default)]
pub enum ModuleState {
    #[default]
    NotStarted,
    /// Body running; the record may be incomplete.
    InProgress(Rc<dyn Any>),
    Complete(Rc<dyn Any>),
    /// Global script that already ran. Global scripts have no exports.
    Executed,
}

impl ModuleState {
    /// Cached module record, if started and of type `M`.
    pub fn module<M: 'static>(&self) -> Option<Rc<M>> {
        match self {
            ModuleState::InProgress(module) | ModuleState::Complete(module) => {
                module.clone().downcast::<M>().ok()
            }
            ModuleState::NotStarted | ModuleState::Executed => None,
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self, ModuleState::NotStarted)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ModuleState::Complete(_) | ModuleState::Executed)
    }
}

/// A script ready to run for the first time
#[derive(Debug, Clone)]
pub struct ScriptJob {
    resource: Rc<Resource>,
    source: String,
    url: String,
}

impl ScriptJob {
    pub(crate) fn new(resource: Rc<Resource>, url: String) -> Self {
        let body = resource.content();
        let body = body.as_text().unwrap_or_default();
        let source = format!("{}\r\n//# sourceURL={}", body, url);

        Self {
            resource,
            source,
            url,
        }
    }

    pub fn resource(&self) -> &Rc<Resource> {
        &self.resource
    }

    pub fn path(&self) -> &str {
        self.resource.path()
    }

    /// Full source text, ending with a `sourceURL` locator comment.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Public path the source was served from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_global(&self) -> bool {
        self.resource.is_global()
    }

    /// Cache the module record. Must precede running the body.
    pub fn begin<M: 'static>(&self, module: Rc<M>) {
        self.resource
            .set_module_state(ModuleState::InProgress(module as Rc<dyn Any>));
    }

    /// Mark the cached module record complete.
    pub fn finish(&self) {
        if let ModuleState::InProgress(module) = self.resource.module_state() {
            self.resource.set_module_state(ModuleState::Complete(module));
        }
    }

    /// Record that a global script ran. Must precede running it.
    pub fn mark_executed(&self) {
        self.resource.set_module_state(ModuleState::Executed);
    }
}

/// Outcome of locating and loading a reference
#[derive(Debug, Clone)]
pub enum Step<M> {
    /// Non-script content.
    Content(Content),
    /// Already executed (or executing) module.
    Module(Rc<M>),
    /// Global script that already ran.
    Executed,
    /// Script that has never run.
    Run(ScriptJob),
}

/// Result of `require`
#[derive(Debug, Clone)]
pub enum Resolved<E> {
    /// Processed non-script content.
    Content(Content),
    /// Exports of a module script.
    Exports(E),
    /// A global script ran; it has no exports.
    Executed,
}

impl<E> Resolved<E> {
    pub fn content(&self) -> Option<&Content> {
        match self {
            Resolved::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.content().and_then(Content::as_text)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        self.content().and_then(Content::as_json)
    }

    pub fn exports(&self) -> Option<&E> {
        match self {
            Resolved::Exports(exports) => Some(exports),
            _ => None,
        }
    }

    pub fn into_exports(self) -> Option<E> {
        match self {
            Resolved::Exports(exports) => Some(exports),
            _ => None,
        }
    }
}
