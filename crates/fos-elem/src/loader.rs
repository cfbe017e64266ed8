//! Loader
//!
//! Per-node load state machine (`Unloaded → Loading → Loaded`) with
//! single-flight coalescing: every `load` call against a node that is not
//! yet loaded queues an observer, and only the first one starts work.
//! Directories complete through a counting join over the resources they
//! decide to wait on.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::config::{Mode, StyleMode};
use crate::elem::Elem;
use crate::error::TransportError;
use crate::process;
use crate::script::ScriptHost;
use crate::transport::FetchRequest;
use crate::tree::{Directory, GLOBAL_DIR, Node, Resource};

/// Completion callback
pub type Observer = Box<dyn FnOnce()>;

/// Directories whose subtrees load right after `window/`.
const PRIORITY_DIRS: [&str; 2] = ["components", "lib"];

/// Load state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

/// State plus pending observers
pub struct LoadCell {
    state: Cell<LoadState>,
    observers: RefCell<Vec<Observer>>,
}

impl LoadCell {
    pub fn new() -> Self {
        Self {
            state: Cell::new(LoadState::Unloaded),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    /// Queue an observer for completion.
    pub fn observe(&self, observer: Observer) {
        self.observers.borrow_mut().push(observer);
    }

    /// Move to `Loading`. Returns `false` if work was already started.
    pub fn begin(&self) -> bool {
        match self.state.get() {
            LoadState::Unloaded => {
                self.state.set(LoadState::Loading);
                true
            }
            LoadState::Loading | LoadState::Loaded => false,
        }
    }

    /// Move to `Loaded` and fire observers in registration order, once.
    pub fn complete(&self) {
        if self.state.get() == LoadState::Loaded {
            return;
        }

        self.state.set(LoadState::Loaded);
        let observers = std::mem::take(&mut *self.observers.borrow_mut());
        for observer in observers {
            observer();
        }
    }

    /// Number of queued observers.
    pub fn pending(&self) -> usize {
        self.observers.borrow().len()
    }
}

impl Default for LoadCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCell")
            .field("state", &self.state.get())
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}

impl<H: ScriptHost> Elem<H> {
    /// Load a node and call `on_done` once it is loaded.
    ///
    /// Already loaded nodes call back immediately, on the caller's stack.
    pub fn load<F: FnOnce() + 'static>(&self, node: &Node, on_done: F) {
        match node {
            Node::Dir(dir) => self.load_directory(dir, Box::new(on_done)),
            Node::Res(res) => self.load_resource(res, Box::new(on_done)),
        }
    }

    /// Future resolving when `node` has loaded.
    ///
    /// Drive it with [`Elem::block_on`]. A transport call that never
    /// returns keeps this pending forever.
    pub fn loaded(&self, node: &Node) -> impl Future<Output = ()> + 'static {
        let (tx, rx) = smol::channel::bounded(1);
        self.load(node, move || {
            let _ = tx.try_send(());
        });

        async move {
            let _ = rx.recv().await;
        }
    }

    /// Load every node, then call `done`. An empty set completes at once.
    pub fn join<F: FnOnce() + 'static>(&self, nodes: Vec<Node>, done: F) {
        if nodes.is_empty() {
            done();
            return;
        }

        let remaining = Rc::new(Cell::new(nodes.len()));
        let done = Rc::new(RefCell::new(Some(done)));

        for node in nodes {
            let remaining = remaining.clone();
            let done = done.clone();
            self.load(&node, move || {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let done = done.borrow_mut().take();
                    if let Some(done) = done {
                        done();
                    }
                }
            });
        }
    }

    fn load_resource(&self, res: &Rc<Resource>, on_done: Observer) {
        if res.is_loaded() {
            on_done();
            return;
        }

        res.load.observe(on_done);
        if !res.load.begin() {
            return;
        }

        tracing::trace!("Loading {}", res.path());

        // Linked stylesheets are referenced by URL, never fetched.
        if res.extension() == "css" && self.config().styles == StyleMode::Linked {
            self.finish(res, Ok(String::new()));
            return;
        }

        if let Some(container) = self.tree().package_of(res).map(str::to_string) {
            if self.tree().package_loops(res.key()) {
                tracing::error!("{} is packaged in a cycle through {}", res.path(), container);
                self.finish(res, Err(TransportError::NotFound(container)));
                return;
            }
            self.load_packaged(res, &container);
            return;
        }

        let request = FetchRequest::new(res.path(), self.config().url_for(res.path()));

        if self.config().mode == Mode::Lazy {
            if let Some(result) = self.transport().fetch_now(&request) {
                self.finish(res, result);
                return;
            }
        }

        let fetch = self.transport().fetch(&request);
        let elem = self.downgrade();
        let res = res.clone();
        self.executor()
            .spawn(async move {
                let result = fetch.await;
                if let Some(elem) = elem.upgrade() {
                    elem.finish(&res, result);
                }
            })
            .detach();
    }

    fn load_packaged(&self, res: &Rc<Resource>, container: &str) {
        let Some(package) = self.tree().resource_by_key(container) else {
            self.finish(res, Err(TransportError::NotFound(container.to_string())));
            return;
        };

        tracing::trace!("{} is packaged in {}", res.path(), package.path());

        let elem = self.downgrade();
        let member = res.clone();
        let source = package.clone();
        self.load_resource(
            &package,
            Box::new(move || {
                if let Some(elem) = elem.upgrade() {
                    let data = process::unpack(&source, &member);
                    elem.finish(&member, data);
                }
            }),
        );
    }

    fn finish(&self, res: &Rc<Resource>, result: Result<String, TransportError>) {
        let raw = match result {
            Ok(data) => Some(data),
            Err(err) => {
                tracing::error!("Problem loading {}: {}", res.path(), err);
                None
            }
        };

        let content = process::finalize(res, raw, self.config(), self.styles());
        res.set_content(content);
        res.load.complete();
    }

    fn load_directory(&self, dir: &Rc<Directory>, on_done: Observer) {
        if dir.is_loaded() {
            on_done();
            return;
        }

        dir.load.observe(on_done);
        if !dir.load.begin() {
            return;
        }

        tracing::debug!("Loading directory {}", dir.path());

        let mut wait: Vec<Rc<Resource>> = Vec::new();

        if self.config().mode == Mode::Eager {
            if let Some(window) = dir.subdirectory(GLOBAL_DIR) {
                wait.extend(window.children(true));

                let elem = self.downgrade();
                let scripts = window.clone();
                self.load_directory(
                    &window,
                    Box::new(move || {
                        if let Some(elem) = elem.upgrade() {
                            elem.run_globals(&scripts);
                        }
                    }),
                );
            }

            for name in PRIORITY_DIRS {
                if let Some(sub) = dir.subdirectory(name) {
                    wait.extend(sub.children(true));
                }
            }

            wait.extend(dir.children(true));

            let mut seen = Vec::with_capacity(wait.len());
            wait.retain(|res| {
                if seen.iter().any(|r| Rc::ptr_eq(r, res)) {
                    false
                } else {
                    seen.push(res.clone());
                    true
                }
            });
        }

        *dir.wait.borrow_mut() = wait.clone();

        let finished = dir.clone();
        self.join(wait.into_iter().map(Node::Res).collect(), move || {
            tracing::debug!("Directory {} loaded", finished.path());
            finished.load.complete();
        });
    }

    /// Run the scripts of a `window/` directory in the global scope,
    /// shortest names first, then recurse into sub-directories.
    fn run_globals(&self, dir: &Rc<Directory>) {
        let mut entries = dir.entries();
        entries.sort_by_key(|(name, _)| name.len());

        for (_, node) in &entries {
            if let Node::Res(res) = node {
                if !res.is_script() {
                    continue;
                }
                if let Err(err) = self.require(res.path(), Some("js"), None) {
                    tracing::error!("Global script {} failed: {}", res.path(), err);
                }
            }
        }

        for (_, node) in &entries {
            if let Node::Dir(sub) = node {
                self.run_globals(sub);
            }
        }
    }
}
