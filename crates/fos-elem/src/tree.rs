//! Resource Tree
//!
//! In-memory mirror of the server-side build directory. Directories are
//! custom element definitions named by their tag; resources are single
//! fetchable files. The tree is append-only: nodes are never removed.

use indexmap::IndexMap;
use indexmap::map::Entry;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::Manifest;
use crate::dom::{self, ElementTree};
use crate::loader::{LoadCell, LoadState};
use crate::path;
use crate::process::Content;
use crate::script::ModuleState;

/// Directory segments starting with this marker merge into their parent.
pub const MERGE_MARKER: char = '_';

/// Resources below a directory with this tag run in the global scope.
pub const GLOBAL_DIR: &str = "window";

/// Tree node
#[derive(Debug, Clone)]
pub enum Node {
    Dir(Rc<Directory>),
    Res(Rc<Resource>),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Dir(dir) => dir.path(),
            Node::Res(res) => res.path(),
        }
    }

    pub fn tag_name(&self) -> &str {
        match self {
            Node::Dir(dir) => dir.tag_name(),
            Node::Res(res) => res.tag_name(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Node::Dir(dir) => dir.is_loaded(),
            Node::Res(res) => res.is_loaded(),
        }
    }

    pub fn as_directory(&self) -> Option<&Rc<Directory>> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::Res(_) => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Rc<Resource>> {
        match self {
            Node::Res(res) => Some(res),
            Node::Dir(_) => None,
        }
    }

    pub(crate) fn load_cell(&self) -> &LoadCell {
        match self {
            Node::Dir(dir) => &dir.load,
            Node::Res(res) => &res.load,
        }
    }
}

impl From<Rc<Directory>> for Node {
    fn from(dir: Rc<Directory>) -> Self {
        Node::Dir(dir)
    }
}

impl From<Rc<Resource>> for Node {
    fn from(res: Rc<Resource>) -> Self {
        Node::Res(res)
    }
}

/// A mirrored server-side directory
pub struct Directory {
    path: String,
    tag_name: String,
    parent: Option<Weak<Directory>>,
    children: RefCell<IndexMap<String, Node>>,
    avail_tags: RefCell<Vec<String>>,
    /// Resources this directory committed to waiting on.
    pub(crate) wait: RefCell<Vec<Rc<Resource>>>,
    pub(crate) load: LoadCell,
}

impl Directory {
    fn new(path: String, tag_name: String, parent: Option<Weak<Directory>>) -> Self {
        Self {
            path,
            tag_name,
            parent,
            children: RefCell::new(IndexMap::new()),
            avail_tags: RefCell::new(Vec::new()),
            wait: RefCell::new(Vec::new()),
            load: LoadCell::new(),
        }
    }

    /// Directory path, `/`-rooted with a trailing slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Tag this directory defines; empty for the root.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn parent(&self) -> Option<Rc<Directory>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Child node by tag or file name.
    pub fn child(&self, name: &str) -> Option<Node> {
        self.children.borrow().get(&name.to_lowercase()).cloned()
    }

    /// Child directory by tag.
    pub fn subdirectory(&self, tag: &str) -> Option<Rc<Directory>> {
        self.child(tag).and_then(|node| node.as_directory().cloned())
    }

    /// Children in manifest order.
    pub fn entries(&self) -> Vec<(String, Node)> {
        self.children
            .borrow()
            .iter()
            .map(|(name, node)| (name.clone(), node.clone()))
            .collect()
    }

    /// Resources belonging to this directory.
    ///
    /// Non-recursive: resources directly inside plus those of a
    /// sub-directory carrying this directory's own tag. Recursive: every
    /// resource in the subtree.
    pub fn children(&self, recursive: bool) -> Vec<Rc<Resource>> {
        let mut files = Vec::new();

        for (name, node) in self.children.borrow().iter() {
            match node {
                Node::Res(res) => files.push(res.clone()),
                Node::Dir(dir) if recursive || *name == self.tag_name => {
                    files.extend(dir.children(recursive));
                }
                Node::Dir(_) => {}
            }
        }

        files
    }

    /// Tags of the immediate child directories.
    pub fn avail_tags(&self) -> Vec<String> {
        self.avail_tags.borrow().clone()
    }

    /// Own tags followed by the parent's, without duplicates.
    pub fn combined_tags(&self) -> Vec<String> {
        let mut tags = self.avail_tags();

        if let Some(parent) = self.parent() {
            for tag in parent.avail_tags.borrow().iter() {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        tags
    }

    /// CSS selector matching every element this directory can enhance.
    pub fn selector(&self) -> String {
        self.combined_tags().join(",")
    }

    /// Elements under `root` this directory can enhance, in document order.
    pub fn find_matches<T: ElementTree>(&self, dom: &T, root: &T::Element) -> Vec<T::Element> {
        dom::find_matches(dom, root, &self.combined_tags())
    }

    pub fn state(&self) -> LoadState {
        self.load.state()
    }

    /// Whether this directory has finished loading.
    ///
    /// While loading, the directory completes here once its committed wait
    /// set and its current children are all loaded, even if the join has not
    /// been notified yet (an earlier observer of the last awaited resource
    /// may be asking). It never completes while anything it committed to
    /// is still loading, so loaded children alone are not enough.
    pub fn is_loaded(&self) -> bool {
        match self.load.state() {
            LoadState::Loaded => true,
            LoadState::Unloaded => false,
            LoadState::Loading => {
                let ready = self.wait.borrow().iter().all(|res| res.is_loaded())
                    && self.children(false).iter().all(|res| res.is_loaded());
                if ready {
                    self.load.complete();
                }
                ready
            }
        }
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("tag_name", &self.tag_name)
            .field("children", &self.children.borrow().keys().collect::<Vec<_>>())
            .field("state", &self.load.state())
            .finish()
    }
}

/// A single fetchable file
pub struct Resource {
    path: String,
    manifest_path: String,
    key: String,
    tag_name: String,
    extension: String,
    parent: Weak<Directory>,
    global: bool,
    pub(crate) load: LoadCell,
    content: RefCell<Content>,
    module: RefCell<ModuleState>,
}

impl Resource {
    /// File path, `/`-rooted, as listed in the manifest.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path exactly as written in the manifest.
    pub fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    /// Case-insensitive lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// File name, lower-cased.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Lower-cased extension; empty when the file has none.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn parent(&self) -> Option<Rc<Directory>> {
        self.parent.upgrade()
    }

    /// Whether this file lives below a `window/` directory.
    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_script(&self) -> bool {
        self.extension == "js"
    }

    pub fn state(&self) -> LoadState {
        self.load.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.load.state() == LoadState::Loaded
    }

    /// Processed content; `Empty` until loaded.
    pub fn content(&self) -> Content {
        self.content.borrow().clone()
    }

    pub(crate) fn set_content(&self, content: Content) {
        *self.content.borrow_mut() = content;
    }

    pub fn module_state(&self) -> ModuleState {
        self.module.borrow().clone()
    }

    pub(crate) fn set_module_state(&self, state: ModuleState) {
        *self.module.borrow_mut() = state;
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("global", &self.global)
            .field("state", &self.load.state())
            .finish()
    }
}

/// The mirrored build
pub struct Tree {
    root: Rc<Directory>,
    files: RefCell<HashMap<String, Rc<Resource>>>,
    /// Marker-free keys of files below `_` segments.
    aliases: RefCell<HashMap<String, Rc<Resource>>>,
    tags: RefCell<HashMap<String, Rc<Directory>>>,
    modules: HashMap<String, String>,
    packages: HashMap<String, String>,
}

impl Tree {
    /// Empty tree.
    pub fn new() -> Self {
        Self {
            root: Rc::new(Directory::new("/".to_string(), String::new(), None)),
            files: RefCell::new(HashMap::new()),
            aliases: RefCell::new(HashMap::new()),
            tags: RefCell::new(HashMap::new()),
            modules: HashMap::new(),
            packages: HashMap::new(),
        }
    }

    /// Build the tree for a manifest.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut tree = Self::new();

        tree.modules = manifest
            .modules
            .iter()
            .map(|(name, target)| (name.to_lowercase(), path::canonical(target)))
            .collect();
        tree.packages = manifest
            .packages
            .iter()
            .map(|(file, container)| (path::canonical(file), path::canonical(container)))
            .collect();

        for file in &manifest.files {
            if tree.insert(file).is_none() {
                tracing::debug!("Skipping manifest entry {:?}", file);
            }
        }

        tracing::info!(
            "Mirrored {} files, {} tags",
            tree.files.borrow().len(),
            tree.tags.borrow().len()
        );

        tree
    }

    pub fn root(&self) -> &Rc<Directory> {
        &self.root
    }

    /// Add a file, creating directories along the way.
    ///
    /// Empty segments and segments containing whitespace are skipped; a
    /// rejected final segment yields `None`. Directory segments starting
    /// with [`MERGE_MARKER`] attach their content to the current parent.
    pub fn insert(&self, file: &str) -> Option<Rc<Resource>> {
        let key = path::canonical(file);
        if let Some(existing) = self.files.borrow().get(&key) {
            return Some(existing.clone());
        }

        let segments: Vec<&str> = file.split('/').collect();
        let last = segments.iter().rposition(|s| !s.is_empty())?;
        let mut parent = self.root.clone();

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                continue;
            }

            if i == last {
                let resource = self.attach(&parent, file, key, segment);
                return Some(resource);
            }

            if segment.starts_with(MERGE_MARKER) {
                continue;
            }

            parent = self.enter(&parent, segment);
        }

        None
    }

    fn enter(&self, parent: &Rc<Directory>, segment: &str) -> Rc<Directory> {
        let tag = segment.to_lowercase();

        if let Some(dir) = parent.subdirectory(&tag) {
            return dir;
        }

        let dir = Rc::new(Directory::new(
            format!("{}{}/", parent.path, segment),
            tag.clone(),
            Some(Rc::downgrade(parent)),
        ));

        let previous = parent
            .children
            .borrow_mut()
            .insert(tag.clone(), Node::Dir(dir.clone()));
        if let Some(Node::Res(res)) = previous {
            tracing::warn!("Directory {} shadows file {}", dir.path, res.path);
        }

        {
            let mut tags = parent.avail_tags.borrow_mut();
            if !tags.contains(&tag) {
                tags.push(tag.clone());
            }
        }

        self.tags
            .borrow_mut()
            .entry(tag.to_uppercase())
            .or_insert_with(|| dir.clone());

        dir
    }

    fn attach(&self, parent: &Rc<Directory>, file: &str, key: String, segment: &str) -> Rc<Resource> {
        let global = {
            let mut dir = Some(parent.clone());
            let mut found = false;
            while let Some(current) = dir {
                if current.tag_name == GLOBAL_DIR {
                    found = true;
                    break;
                }
                dir = current.parent();
            }
            found
        };

        let resource = Rc::new(Resource {
            path: format!("/{}", file.trim_start_matches('/')),
            manifest_path: file.to_string(),
            key: key.clone(),
            tag_name: segment.to_lowercase(),
            extension: path::extension(segment).unwrap_or_default(),
            parent: Rc::downgrade(parent),
            global,
            load: LoadCell::new(),
            content: RefCell::new(Content::Empty),
            module: RefCell::new(ModuleState::NotStarted),
        });

        match parent.children.borrow_mut().entry(resource.tag_name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Node::Res(resource.clone()));
            }
            Entry::Occupied(slot) => {
                tracing::warn!(
                    "File {} folds onto {} in {}; only the first is loaded with the directory",
                    resource.path,
                    slot.get().path(),
                    parent.path
                );
            }
        }

        // Files below `_` segments are also addressable from their directory.
        let alias = path::canonical(&format!("{}{}", parent.path, segment));
        if alias != key {
            self.aliases
                .borrow_mut()
                .entry(alias)
                .or_insert_with(|| resource.clone());
        }

        self.files.borrow_mut().insert(key, resource.clone());

        resource
    }

    /// Resource by path, case-insensitively.
    pub fn resource(&self, file: &str) -> Option<Rc<Resource>> {
        self.resource_by_key(&path::canonical(file))
    }

    /// Resource by canonical key, falling back to marker-free aliases.
    pub(crate) fn resource_by_key(&self, key: &str) -> Option<Rc<Resource>> {
        let file = self.files.borrow().get(key).cloned();
        file.or_else(|| self.aliases.borrow().get(key).cloned())
    }

    /// Directory by path, e.g. `/widgets/button/`.
    pub fn directory(&self, dir: &str) -> Option<Rc<Directory>> {
        let mut current = self.root.clone();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if segment.starts_with(MERGE_MARKER) {
                continue;
            }
            current = current.subdirectory(segment)?;
        }
        Some(current)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }

    /// Upper-cased tag name to the first directory that declared it.
    pub fn tags(&self) -> HashMap<String, Rc<Directory>> {
        self.tags.borrow().clone()
    }

    /// Directory registered for a tag, case-insensitively.
    pub fn tag(&self, name: &str) -> Option<Rc<Directory>> {
        self.tags.borrow().get(&name.to_uppercase()).cloned()
    }

    /// Directories defining `tag` as seen from `dir`: the child named `tag`
    /// of `dir` and of each ancestor, root-most first.
    pub fn definitions(&self, dir: &Rc<Directory>, tag: &str) -> Vec<Rc<Directory>> {
        let mut chain = Vec::new();
        let mut current = Some(dir.clone());

        while let Some(node) = current {
            if let Some(def) = node.subdirectory(tag) {
                chain.push(def);
            }
            current = node.parent();
        }

        chain.reverse();
        chain
    }

    /// Remapped target key for a module name.
    pub(crate) fn module_target(&self, name: &str) -> Option<&str> {
        self.modules.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Container key for a packaged file.
    pub(crate) fn package_of(&self, resource: &Resource) -> Option<&str> {
        self.packages.get(resource.key()).map(String::as_str)
    }

    /// Whether following containers from `key` leads back to a file
    /// already visited.
    pub(crate) fn package_loops(&self, key: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = key;

        while let Some(container) = self.packages.get(current) {
            if !seen.insert(current) {
                return true;
            }
            current = container;
        }

        false
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("files", &self.files.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[&str]) -> Tree {
        Tree::from_manifest(&Manifest::with_files(files.iter().copied()))
    }

    #[test]
    fn test_every_file_is_addressable() {
        let files = [
            "widgets/button/button.js",
            "widgets/button/button.html",
            "/lib/Util.JS",
            "window/jquery.js",
        ];
        let tree = tree(&files);

        assert_eq!(tree.len(), 4);
        for file in files {
            let res = tree.resource(file).unwrap();
            assert!(Rc::ptr_eq(&res, &tree.resource(&file.to_uppercase()).unwrap()));
        }
        assert_eq!(tree.resource("/lib/util.js").unwrap().path(), "/lib/Util.JS");
    }

    #[test]
    fn test_duplicate_entry_yields_one_resource() {
        let tree = tree(&["a/a.js", "A/A.js"]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_directories_and_tags() {
        let tree = tree(&["widgets/button/button.js", "widgets/card/card.html"]);

        let widgets = tree.directory("/widgets/").unwrap();
        assert_eq!(widgets.path(), "/widgets/");
        assert_eq!(widgets.avail_tags(), vec!["button", "card"]);
        assert_eq!(tree.root().avail_tags(), vec!["widgets"]);

        let button = tree.tag("button").unwrap();
        assert_eq!(button.path(), "/widgets/button/");
        assert!(tree.tags().contains_key("CARD"));
    }

    #[test]
    fn test_combined_tags() {
        let tree = tree(&["page/header/header.js", "page/page.js", "footer/footer.js"]);
        let page = tree.directory("page").unwrap();

        assert_eq!(page.combined_tags(), vec!["header", "page", "footer"]);
        assert_eq!(page.selector(), "header,page,footer");
    }

    #[test]
    fn test_merge_marker_segments() {
        let tree = tree(&["widgets/_shared/util.js", "widgets/_shared/deep/deep.js"]);
        let widgets = tree.directory("widgets").unwrap();

        assert!(widgets.subdirectory("_shared").is_none());
        assert!(!widgets.avail_tags().iter().any(|t| t.starts_with('_')));
        assert!(widgets.child("util.js").is_some());
        assert!(widgets.subdirectory("deep").is_some());

        let util = tree.resource("widgets/_shared/util.js").unwrap();
        assert_eq!(util.parent().unwrap().path(), "/widgets/");
    }

    #[test]
    fn test_merge_marker_files_addressable_from_directory() {
        let tree = tree(&["widgets/_shared/button/button.html", "widgets/_shared/util.js"]);

        let html = tree.resource("widgets/_shared/button/button.html").unwrap();
        assert!(Rc::ptr_eq(&html, &tree.resource("/widgets/button/button.html").unwrap()));
        assert!(Rc::ptr_eq(
            &tree.resource("widgets/_shared/util.js").unwrap(),
            &tree.resource("widgets/util.js").unwrap()
        ));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_folded_files_keep_first_entry() {
        let tree = tree(&["a/_x/b.js", "a/b.js", "a/_y/b.js"]);
        let a = tree.directory("a").unwrap();

        let child = a.child("b.js").unwrap();
        assert_eq!(child.path(), "/a/_x/b.js");
        assert_eq!(a.children(false).len(), 1);

        // The real file wins its own key over the alias.
        assert_eq!(tree.resource("a/b.js").unwrap().path(), "/a/b.js");
        assert_eq!(tree.resource("a/_y/b.js").unwrap().path(), "/a/_y/b.js");
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_package_loops() {
        let manifest = Manifest::with_files(["a.json", "b.json", "c.json", "d.json"])
            .package("a.json", "a.json")
            .package("b.json", "c.json")
            .package("c.json", "b.json")
            .package("d.json", "bundle.json");
        let tree = Tree::from_manifest(&manifest);

        assert!(tree.package_loops("a.json"));
        assert!(tree.package_loops("b.json"));
        assert!(tree.package_loops("c.json"));
        assert!(!tree.package_loops("d.json"));
        assert!(!tree.package_loops("bundle.json"));
    }

    #[test]
    fn test_whitespace_segments_are_skipped() {
        let tree = tree(&["a/b c/d.js", "a/bad file.js", "a/ /e.js"]);

        assert!(tree.resource("a/bad file.js").is_none());
        let d = tree.resource("a/b c/d.js").unwrap();
        assert_eq!(d.parent().unwrap().path(), "/a/");
        assert!(tree.resource("a/ /e.js").is_some());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_global_flag() {
        let tree = tree(&["window/jquery.js", "app/window/poly/poly.js", "app/app.js"]);

        assert!(tree.resource("window/jquery.js").unwrap().is_global());
        assert!(tree.resource("app/window/poly/poly.js").unwrap().is_global());
        assert!(!tree.resource("app/app.js").unwrap().is_global());
    }

    #[test]
    fn test_children_includes_self_named_directory() {
        let tree = tree(&[
            "button/button.css",
            "button/button/button.js",
            "button/icon/icon.js",
        ]);
        let button = tree.directory("button").unwrap();

        let shallow: Vec<_> = button.children(false).iter().map(|r| r.path().to_string()).collect();
        assert_eq!(shallow, vec!["/button/button.css", "/button/button/button.js"]);

        assert_eq!(button.children(true).len(), 3);
    }

    #[test]
    fn test_definitions_chain() {
        let tree = tree(&["button/button.js", "page/button/button.js", "page/page.js"]);
        let page = tree.directory("page").unwrap();

        let chain = tree.definitions(&page, "button");
        let paths: Vec<_> = chain.iter().map(|d| d.path().to_string()).collect();
        assert_eq!(paths, vec!["/button/", "/page/button/"]);
    }
}
