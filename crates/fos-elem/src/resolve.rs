//! Module Resolver
//!
//! CommonJS-style resolution of references against the mirrored tree,
//! followed by load-on-demand and memoized script execution.

use std::fmt;
use std::rc::Rc;

use crate::elem::Elem;
use crate::error::{ElemError, ScriptError};
use crate::path;
use crate::process::Content;
use crate::script::{ModuleState, Resolved, ScriptHost, ScriptJob, Step};
use crate::tree::{Node, Resource};

/// Extension looked for when none is given.
pub const DEFAULT_EXT: &str = "js";

impl<H: ScriptHost> Elem<H> {
    /// Find the resource a reference points to.
    ///
    /// Candidates, in order: the normalized path, the path plus `.ext`,
    /// `path/<last>.ext`, `path/index.ext`, and finally the manifest's
    /// module remap for the reference as written.
    pub fn locate(&self, reference: &str, ext: &str, base: &str) -> Option<Rc<Resource>> {
        let tree = self.tree();
        let relpath = path::resolve(base, reference).to_lowercase();
        let ext = ext.to_lowercase();
        let last = path::last_segment(&relpath).to_string();

        let candidates = [
            relpath.clone(),
            format!("{}.{}", relpath, ext),
            child_of(&relpath, &format!("{}.{}", last, ext)),
            child_of(&relpath, &format!("index.{}", ext)),
        ];

        candidates
            .iter()
            .find_map(|key| tree.resource_by_key(key))
            .or_else(|| {
                tree.module_target(reference)
                    .and_then(|key| tree.resource_by_key(key))
            })
    }

    /// Resolve a reference to content or exports.
    ///
    /// `ext` defaults to `js` and `base` to `/`. A reference that matches
    /// nothing yields `Ok(None)`. Scripts run at most once; later calls
    /// return the cached exports, whatever the base.
    pub fn require(
        &self,
        reference: &str,
        ext: Option<&str>,
        base: Option<&str>,
    ) -> Result<Option<Resolved<H::Exports>>, ElemError> {
        match self.step(reference, ext, base)? {
            Some(step) => self.complete_step(step).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Elem::require`], first waiting for the target to load.
    pub async fn require_async(
        &self,
        reference: &str,
        ext: Option<&str>,
        base: Option<&str>,
    ) -> Result<Option<Resolved<H::Exports>>, ElemError> {
        let target = self.locate(
            reference,
            ext.unwrap_or(DEFAULT_EXT),
            base.unwrap_or("/"),
        );

        if let Some(res) = target.filter(|res| !res.is_loaded()) {
            self.loaded(&Node::Res(res)).await;
        }

        self.require(reference, ext, base)
    }

    /// Locate and load a reference without running anything.
    pub fn step(
        &self,
        reference: &str,
        ext: Option<&str>,
        base: Option<&str>,
    ) -> Result<Option<Step<H::Module>>, ElemError> {
        let ext = ext.unwrap_or(DEFAULT_EXT);
        let base = base.unwrap_or("/");

        let Some(res) = self.locate(reference, ext, base) else {
            tracing::trace!("Nothing matches {} ({}) from {}", reference, ext, base);
            return Ok(None);
        };

        self.ensure_loaded(&res)?;

        if !res.is_script() {
            return match res.content() {
                Content::Malformed(message) => Err(ElemError::Parse {
                    path: res.path().to_string(),
                    message: message.to_string(),
                }),
                content => Ok(Some(Step::Content(content))),
            };
        }

        let step = match res.module_state() {
            ModuleState::NotStarted => Step::Run(ScriptJob::new(
                res.clone(),
                self.config().public_path(res.path()),
            )),
            ModuleState::Executed => Step::Executed,
            state => match state.module::<H::Module>() {
                Some(module) => Step::Module(module),
                None => {
                    return Err(ScriptError::Host(format!(
                        "{} was executed by a different host",
                        res.path()
                    ))
                    .into());
                }
            },
        };

        Ok(Some(step))
    }

    /// Finish a step through the host.
    pub fn complete_step(&self, step: Step<H::Module>) -> Result<Resolved<H::Exports>, ElemError> {
        match step {
            Step::Content(content) => Ok(Resolved::Content(content)),
            Step::Module(module) => Ok(Resolved::Exports(self.host().exports(&module)?)),
            Step::Executed => Ok(Resolved::Executed),
            Step::Run(job) => self.execute(job),
        }
    }

    fn execute(&self, job: ScriptJob) -> Result<Resolved<H::Exports>, ElemError> {
        let host = self.host();

        if job.is_global() {
            tracing::debug!("Running global script {}", job.path());
            job.mark_executed();
            host.run_global(&job)?;
            return Ok(Resolved::Executed);
        }

        tracing::debug!("Running module {}", job.path());
        let module = Rc::new(host.create_module()?);
        job.begin(module.clone());
        host.run_module(&job, &module, LocalRequire::new(self.clone(), job.resource().clone()))?;
        job.finish();

        Ok(Resolved::Exports(host.exports(&module)?))
    }

    /// Load a resource in place if it is not loaded yet.
    fn ensure_loaded(&self, res: &Rc<Resource>) -> Result<(), ElemError> {
        if res.is_loaded() {
            return Ok(());
        }

        self.load(&Node::Res(res.clone()), || {});

        if res.is_loaded() {
            Ok(())
        } else {
            Err(ElemError::Pending {
                path: res.path().to_string(),
            })
        }
    }
}

fn child_of(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir, file)
    }
}

/// `require` as seen by a running script: relative to that script, and
/// a miss is an error.
pub struct LocalRequire<H: ScriptHost> {
    elem: Elem<H>,
    from: Rc<Resource>,
}

impl<H: ScriptHost> LocalRequire<H> {
    pub fn new(elem: Elem<H>, from: Rc<Resource>) -> Self {
        Self { elem, from }
    }

    pub fn elem(&self) -> &Elem<H> {
        &self.elem
    }

    /// The requesting resource.
    pub fn from(&self) -> &Rc<Resource> {
        &self.from
    }

    /// Require `reference` relative to the requesting script.
    pub fn call(&self, reference: &str, ext: Option<&str>) -> Result<Resolved<H::Exports>, ElemError> {
        let step = self.step(reference, ext)?;
        self.elem.complete_step(step)
    }

    /// Locate and load `reference` without running it.
    pub fn step(&self, reference: &str, ext: Option<&str>) -> Result<Step<H::Module>, ElemError> {
        self.elem
            .step(reference, ext, Some(self.from.path()))?
            .ok_or_else(|| ElemError::RequireFailed {
                reference: reference.to_string(),
                from: self.from.path().to_string(),
            })
    }
}

impl<H: ScriptHost> Clone for LocalRequire<H> {
    fn clone(&self) -> Self {
        Self {
            elem: self.elem.clone(),
            from: self.from.clone(),
        }
    }
}

impl<H: ScriptHost> fmt::Debug for LocalRequire<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRequire")
            .field("from", &self.from.path())
            .finish()
    }
}
