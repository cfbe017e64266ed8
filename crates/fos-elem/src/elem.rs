//! Loader Context
//!
//! [`Elem`] is the handle every operation goes through: it owns the
//! mirrored tree, the transport, the script host and the single-threaded
//! executor that runs in-flight fetches. [`Bootstrap`] creates it once.

use smol::LocalExecutor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::config::{ElemConfig, Manifest};
use crate::error::ElemError;
use crate::process::{NullStyles, StyleSink};
use crate::script::ScriptHost;
use crate::transport::{FetchRequest, Transport};
use crate::tree::{Directory, Node, Resource, Tree};

/// Manifest file fetched when none is configured.
pub const INDEX_FILE: &str = "index.json";

struct Inner<H: ScriptHost> {
    config: ElemConfig,
    tree: Tree,
    transport: Box<dyn Transport>,
    host: H,
    styles: Box<dyn StyleSink>,
    executor: LocalExecutor<'static>,
}

/// Handle to a started loader
pub struct Elem<H: ScriptHost> {
    inner: Rc<Inner<H>>,
}

impl<H: ScriptHost> Clone for Elem<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle for callbacks stored in the tree or the executor
pub(crate) struct WeakElem<H: ScriptHost> {
    inner: Weak<Inner<H>>,
}

impl<H: ScriptHost> WeakElem<H> {
    pub(crate) fn upgrade(&self) -> Option<Elem<H>> {
        self.inner.upgrade().map(|inner| Elem { inner })
    }
}

impl<H: ScriptHost> fmt::Debug for Elem<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elem")
            .field("config", &self.inner.config)
            .field("tree", &self.inner.tree)
            .finish()
    }
}

impl<H: ScriptHost> Elem<H> {
    fn launch(config: ElemConfig, manifest: &Manifest, parts: Parts<H>) -> Self {
        let tree = Tree::from_manifest(manifest);

        let elem = Self {
            inner: Rc::new(Inner {
                config,
                tree,
                transport: parts.transport,
                host: parts.host,
                styles: parts.styles,
                executor: LocalExecutor::new(),
            }),
        };

        tracing::info!(
            "Started in {:?} mode at {}{}",
            elem.inner.config.mode,
            elem.inner.config.domain,
            elem.inner.config.base_path
        );

        let root = Node::Dir(elem.root().clone());
        elem.load(&root, || tracing::debug!("Root loaded"));

        elem
    }

    pub(crate) fn downgrade(&self) -> WeakElem<H> {
        WeakElem {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &ElemConfig {
        &self.inner.config
    }

    pub fn tree(&self) -> &Tree {
        &self.inner.tree
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        &*self.inner.transport
    }

    pub(crate) fn styles(&self) -> &dyn StyleSink {
        &*self.inner.styles
    }

    pub(crate) fn executor(&self) -> &LocalExecutor<'static> {
        &self.inner.executor
    }

    pub fn root(&self) -> &Rc<Directory> {
        self.inner.tree.root()
    }

    /// Resource by path, case-insensitively.
    pub fn resource(&self, path: &str) -> Option<Rc<Resource>> {
        self.inner.tree.resource(path)
    }

    /// Directory registered for a tag.
    pub fn tag(&self, name: &str) -> Option<Rc<Directory>> {
        self.inner.tree.tag(name)
    }

    /// Upper-cased tag name to owning directory.
    pub fn tags(&self) -> HashMap<String, Rc<Directory>> {
        self.inner.tree.tags()
    }

    /// Register files discovered after start.
    pub fn extend<I, S>(&self, files: I) -> Vec<Rc<Resource>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        files
            .into_iter()
            .filter_map(|file| self.inner.tree.insert(file.as_ref()))
            .collect()
    }

    /// Run `future` to completion, driving in-flight fetches meanwhile.
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.inner.executor.run(future))
    }

    /// Poll in-flight fetches until none can make progress.
    pub fn run_until_stalled(&self) {
        while self.inner.executor.try_tick() {}
    }

    /// Load `node` and wait for it.
    pub fn load_blocking(&self, node: &Node) {
        let loaded = self.loaded(node);
        self.block_on(loaded);
    }
}

struct Parts<H> {
    host: H,
    transport: Box<dyn Transport>,
    styles: Box<dyn StyleSink>,
}

/// One-shot entry point
///
/// A bootstrap starts exactly one loader; starting it again is an error.
pub struct Bootstrap<H: ScriptHost> {
    parts: RefCell<Option<Parts<H>>>,
}

impl<H: ScriptHost> Bootstrap<H> {
    pub fn new(host: H, transport: impl Transport) -> Self {
        Self {
            parts: RefCell::new(Some(Parts {
                host,
                transport: Box::new(transport),
                styles: Box::new(NullStyles),
            })),
        }
    }

    /// Send stylesheets to `sink` instead of discarding them.
    pub fn styles(self, sink: impl StyleSink + 'static) -> Self {
        if let Some(parts) = self.parts.borrow_mut().as_mut() {
            parts.styles = Box::new(sink);
        }
        self
    }

    fn take(&self) -> Result<Parts<H>, ElemError> {
        self.parts.borrow_mut().take().ok_or(ElemError::AlreadyStarted)
    }

    /// Start the loader and begin loading the root directory.
    ///
    /// Without a configured manifest, `index.json` is fetched first, on the
    /// caller's stack when the transport allows it.
    pub fn start(&self, config: ElemConfig) -> Result<Elem<H>, ElemError> {
        let parts = self.take()?;

        let manifest = match &config.manifest {
            Some(manifest) => manifest.clone(),
            None => {
                let request = FetchRequest::new(INDEX_FILE, config.url_for(INDEX_FILE));
                let index = match parts.transport.fetch_now(&request) {
                    Some(result) => result,
                    None => smol::block_on(parts.transport.fetch(&request)),
                };
                parse_index(index)?
            }
        };

        Ok(Elem::launch(config, &manifest, parts))
    }

    /// Like [`Bootstrap::start`], fetching `index.json` asynchronously.
    pub async fn start_remote(&self, config: ElemConfig) -> Result<Elem<H>, ElemError> {
        let parts = self.take()?;

        let manifest = match &config.manifest {
            Some(manifest) => manifest.clone(),
            None => {
                let request = FetchRequest::new(INDEX_FILE, config.url_for(INDEX_FILE));
                parse_index(parts.transport.fetch(&request).await)?
            }
        };

        Ok(Elem::launch(config, &manifest, parts))
    }
}

fn parse_index(index: Result<String, crate::error::TransportError>) -> Result<Manifest, ElemError> {
    match index {
        Ok(json) => Ok(Manifest::from_json(&json)?),
        Err(err) => {
            tracing::error!("Elem build index not found. Did you build it? ({})", err);
            Err(ElemError::Index(err))
        }
    }
}
