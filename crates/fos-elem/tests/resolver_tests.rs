//! Resolver tests for fos-elem
//!
//! Candidate order, module remapping, memoized execution, circular
//! requires and the errors a running script can see.

use fos_elem::*;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn files(list: &[&str]) -> Rc<MemoryTransport> {
    let transport = MemoryTransport::new().synchronous();
    for file in list {
        transport.insert(file, "");
    }
    Rc::new(transport)
}

fn start(manifest: Manifest, transport: Rc<MemoryTransport>, host: NativeHost) -> Elem<NativeHost> {
    Bootstrap::new(host, transport)
        .start(ElemConfig::new(Mode::Lazy).manifest(manifest))
        .unwrap()
}

fn located(elem: &Elem<NativeHost>, reference: &str, ext: &str, base: &str) -> Option<String> {
    elem.locate(reference, ext, base).map(|res| res.path().to_string())
}

fn host_error(err: ElemError) -> ScriptError {
    ScriptError::Host(err.to_string())
}

// ============================================================================
// CANDIDATE ORDER
// ============================================================================

#[test]
fn test_locate_adds_extension() {
    let list = ["a/sibling.js"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(
        located(&elem, "../sibling", "js", "/a/b/file.js"),
        Some("/a/sibling.js".to_string())
    );
}

#[test]
fn test_locate_directory_style() {
    let list = ["a/sibling/sibling.js"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(
        located(&elem, "../sibling", "js", "/a/b/file.js"),
        Some("/a/sibling/sibling.js".to_string())
    );
}

#[test]
fn test_locate_prefers_file_over_directory() {
    let list = ["a/sibling.js", "a/sibling/sibling.js", "a/sibling/index.js"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(
        located(&elem, "./sibling", "js", "/a/file.js"),
        Some("/a/sibling.js".to_string())
    );
}

#[test]
fn test_locate_index_file() {
    let list = ["lib/index.js", "lib/util.js"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(located(&elem, "lib", "js", "/"), Some("/lib/index.js".to_string()));
    assert_eq!(located(&elem, "./lib/util", "js", "/x.js"), Some("/lib/util.js".to_string()));
}

#[test]
fn test_locate_verbatim_and_case_insensitive() {
    let list = ["Widgets/Button/button.html"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(
        located(&elem, "/WIDGETS/button/BUTTON.HTML", "js", "/"),
        Some("/Widgets/Button/button.html".to_string())
    );
    assert_eq!(
        located(&elem, "/widgets/button", "HTML", "/"),
        Some("/Widgets/Button/button.html".to_string())
    );
}

#[test]
fn test_locate_rooted_reference_ignores_base() {
    let list = ["a/x.js", "b/c/a/x.js"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(located(&elem, "/a/x", "js", "/b/c/y.js"), Some("/a/x.js".to_string()));
    assert_eq!(located(&elem, "a/x", "js", "/b/c/y.js"), Some("/b/c/a/x.js".to_string()));
}

#[test]
fn test_locate_module_remap() {
    let list = ["window/jquery.min.js"];
    let manifest = Manifest::with_files(list).module("jQuery", "/window/jquery.min.js");
    let elem = start(manifest, files(&list), NativeHost::new());

    assert_eq!(
        located(&elem, "jquery", "js", "/app/app.js"),
        Some("/window/jquery.min.js".to_string())
    );
    assert_eq!(located(&elem, "lodash", "js", "/app/app.js"), None);
}

#[test]
fn test_require_nothing_matches() {
    let elem = start(Manifest::default(), files(&[]), NativeHost::new());
    assert!(elem.require("/nowhere", None, None).unwrap().is_none());
}

// ============================================================================
// CONTENT
// ============================================================================

#[test]
fn test_require_html_component() {
    let transport = Rc::new(
        MemoryTransport::new()
            .synchronous()
            .with_file("widgets/button/button.html", r#"<img src="./icon.png">"#)
            .with_file("widgets/button/button.js", ""),
    );
    let manifest = Manifest::with_files(["widgets/button/button.js", "widgets/button/button.html"]);
    let elem = start(manifest, transport, NativeHost::new());

    let button = elem.tag("button").unwrap();
    assert_eq!(button.path(), "/widgets/button/");

    let html = elem.require(button.path(), Some("html"), None).unwrap().unwrap();
    assert_eq!(
        html.as_text(),
        Some("<!-- /widgets/button/button.html -->\n<img src=\"/widgets/button/icon.png\">")
    );
}

#[test]
fn test_require_json() {
    let transport = Rc::new(
        MemoryTransport::new()
            .synchronous()
            .with_file("data/good.json", r#"{"items": [1, 2]}"#)
            .with_file("data/bad.json", "{oops"),
    );
    let elem = start(
        Manifest::with_files(["data/good.json", "data/bad.json"]),
        transport,
        NativeHost::new(),
    );

    let good = elem.require("/data/good", Some("json"), None).unwrap().unwrap();
    assert_eq!(good.as_json(), Some(&json!({"items": [1, 2]})));

    let bad = elem.require("/data/bad", Some("json"), None);
    assert!(matches!(bad, Err(ElemError::Parse { ref path, .. }) if path == "/data/bad.json"));
}

#[test]
fn test_require_pending_in_eager_mode() {
    let transport = Rc::new(MemoryTransport::new().with_file("a/a.js", ""));
    let elem = Bootstrap::new(NativeHost::new(), transport)
        .start(ElemConfig::new(Mode::Eager).manifest(Manifest::with_files(["a/a.js"])))
        .unwrap();

    let early = elem.require("/a/a", None, None);
    assert!(matches!(early, Err(ElemError::Pending { .. })));

    let later = elem.block_on(elem.require_async("/a/a", None, None)).unwrap().unwrap();
    assert!(later.exports().is_some());
}

// ============================================================================
// EXECUTION
// ============================================================================

#[test]
fn test_module_runs_once_and_shares_exports() {
    let list = ["widgets/button/button.js", "widgets/button/button.html"];
    let host = NativeHost::new().module("widgets/button/button.js", |module, _| {
        module.export("label", json!("ok"));
        Ok(())
    });
    let elem = start(Manifest::with_files(list), files(&list), host);

    let first = elem
        .require("/widgets/button/button", None, None)
        .unwrap()
        .unwrap()
        .into_exports()
        .unwrap();
    let second = elem
        .require("./button", Some("js"), Some("/widgets/button/button.html"))
        .unwrap()
        .unwrap()
        .into_exports()
        .unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(elem.host().run_count("widgets/button/button.js"), 1);

    first.borrow_mut()["clicked"] = json!(true);
    assert_eq!(second.borrow()["clicked"], json!(true));
}

#[test]
fn test_module_replaces_exports() {
    let list = ["a/a.js"];
    let host = NativeHost::new().module("a/a.js", |module, _| {
        module.set_exports(json!([1, 2, 3]));
        Ok(())
    });
    let elem = start(Manifest::with_files(list), files(&list), host);

    let exports = elem.require("/a/a", None, None).unwrap().unwrap().into_exports().unwrap();
    assert_eq!(*exports.borrow(), json!([1, 2, 3]));
}

#[test]
fn test_nested_require_is_relative_to_script() {
    let list = ["app/app.js", "app/util/util.js", "shared/config.json"];
    let transport = files(&list);
    transport.insert("shared/config.json", r#"{"debug": true}"#);

    let seen = Rc::new(RefCell::new(None));
    let record = seen.clone();
    let host = NativeHost::new()
        .module("app/util/util.js", |module, _| {
            module.export("util", json!(1));
            Ok(())
        })
        .module("app/app.js", move |module, require| {
            let util = require.call("./util", None).map_err(host_error)?;
            let util = util.into_exports().unwrap_or_default();
            module.export("util", util.borrow()["util"].clone());

            let config = require.call("../shared/config", Some("json")).map_err(host_error)?;
            *record.borrow_mut() = config.as_json().cloned();
            Ok(())
        });
    let elem = start(Manifest::with_files(list), transport, host);

    let app = elem.require("/app/app", None, None).unwrap().unwrap().into_exports().unwrap();
    assert_eq!(app.borrow()["util"], json!(1));
    assert_eq!(*seen.borrow(), Some(json!({"debug": true})));
    assert_eq!(
        elem.host().runs(),
        vec!["/app/app.js", "/app/util/util.js"]
    );
}

#[test]
fn test_circular_require_sees_partial_exports() {
    let list = ["c/a.js", "c/b.js"];
    let host = NativeHost::new()
        .module("c/a.js", |module, require| {
            module.export("early", json!(true));
            require.call("./b", None).map_err(host_error)?;
            module.export("done", json!(true));
            Ok(())
        })
        .module("c/b.js", |module, require| {
            let a = require.call("./a", None).map_err(host_error)?;
            let a = a.into_exports().unwrap_or_default();
            module.export("a_early", a.borrow()["early"].clone());
            module.export("a_done", json!(a.borrow().get("done").is_some()));
            module.export("a", json!("held"));
            Ok(())
        });
    let elem = start(Manifest::with_files(list), files(&list), host);

    let a = elem.require("/c/a", None, None).unwrap().unwrap().into_exports().unwrap();
    let b = elem.require("/c/b", None, None).unwrap().unwrap().into_exports().unwrap();

    assert_eq!(a.borrow()["done"], json!(true));
    assert_eq!(b.borrow()["a_early"], json!(true));
    assert_eq!(b.borrow()["a_done"], json!(false));
    assert_eq!(elem.host().run_count("c/a.js"), 1);
    assert_eq!(elem.host().run_count("c/b.js"), 1);
}

#[test]
fn test_failed_require_inside_module() {
    let list = ["a/a.js"];
    let failure = Rc::new(RefCell::new(None));
    let record = failure.clone();
    let host = NativeHost::new().module("a/a.js", move |_, require| {
        match require.call("./missing", None) {
            Err(ElemError::RequireFailed { reference, from }) => {
                *record.borrow_mut() = Some((reference, from));
                Err(ScriptError::Thrown {
                    path: "/a/a.js".to_string(),
                    message: "cannot continue".to_string(),
                })
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    });
    let elem = start(Manifest::with_files(list), files(&list), host);

    let result = elem.require("/a/a", None, None);
    assert!(matches!(result, Err(ElemError::Script(ScriptError::Thrown { .. }))));
    assert_eq!(
        *failure.borrow(),
        Some(("./missing".to_string(), "/a/a.js".to_string()))
    );

    // The partially run module stays cached.
    let again = elem.require("/a/a", None, None).unwrap().unwrap();
    assert!(again.exports().is_some());
    assert_eq!(elem.host().run_count("a/a.js"), 1);
    assert!(elem.resource("a/a.js").unwrap().module_state().is_started());
    assert!(!elem.resource("a/a.js").unwrap().module_state().is_complete());
}

#[test]
fn test_global_script_from_module() {
    let list = ["window/polyfill.js", "app/app.js"];
    let outcome = Rc::new(RefCell::new(None));
    let record = outcome.clone();
    let host = NativeHost::new().module("app/app.js", move |_, require| {
        let resolved = require.call("/window/polyfill", None).map_err(host_error)?;
        *record.borrow_mut() = Some(matches!(resolved, Resolved::Executed));
        Ok(())
    });
    let elem = start(Manifest::with_files(list), files(&list), host);

    elem.require("/app/app", None, None).unwrap();
    elem.require("/window/polyfill", None, None).unwrap();

    assert_eq!(*outcome.borrow(), Some(true));
    assert_eq!(elem.host().run_count("window/polyfill.js"), 1);
}

#[test]
fn test_script_job_source_url() {
    let transport = Rc::new(
        MemoryTransport::new()
            .synchronous()
            .with_file("g/window/g.js", "var x = 1;"),
    );
    let seen = Rc::new(RefCell::new(String::new()));
    let record = seen.clone();
    let host = NativeHost::new().global("g/window/g.js", move |job| {
        *record.borrow_mut() = job.source().to_string();
        Ok(())
    });
    let elem = Bootstrap::new(host, transport)
        .start(
            ElemConfig::new(Mode::Lazy)
                .base_path("/build/")
                .manifest(Manifest::with_files(["g/window/g.js"])),
        )
        .unwrap();

    assert!(matches!(
        elem.require("/g/window/g", None, None).unwrap(),
        Some(Resolved::Executed)
    ));
    assert_eq!(
        *seen.borrow(),
        "\n// /g/window/g.js\n\nvar x = 1;\r\n//# sourceURL=/build/g/window/g.js"
    );
}

// ============================================================================
// TAGS
// ============================================================================

#[test]
fn test_tag_registry_first_declaration_wins() {
    let list = ["pages/card/card.html", "widgets/card/card.html"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(elem.tag("CARD").unwrap().path(), "/pages/card/");
    assert!(elem.tags().contains_key("WIDGETS"));
}

#[test]
fn test_merge_marker_folds_into_parent() {
    let list = ["widgets/_shared/button/button.html"];
    let elem = start(Manifest::with_files(list), files(&list), NativeHost::new());

    assert_eq!(elem.tag("button").unwrap().path(), "/widgets/button/");
    assert!(elem.tag("_shared").is_none());
    assert!(elem.locate("/widgets/_shared/button", "html", "/").is_some());
}

#[test]
fn test_merge_marker_files_resolve_from_tag_directory() {
    let transport = Rc::new(
        MemoryTransport::new()
            .synchronous()
            .with_file("widgets/_shared/button/button.html", "<button></button>")
            .with_file("widgets/_shared/util.js", ""),
    );
    let host = NativeHost::new().module("widgets/_shared/util.js", |module, _| {
        module.export("shared", json!(true));
        Ok(())
    });
    let elem = start(
        Manifest::with_files(["widgets/_shared/button/button.html", "widgets/_shared/util.js"]),
        transport,
        host,
    );

    let button = elem.tag("button").unwrap();
    assert_eq!(button.path(), "/widgets/button/");

    let html = elem.require(button.path(), Some("html"), None).unwrap().unwrap();
    assert_eq!(
        html.as_text(),
        Some("<!-- /widgets/_shared/button/button.html -->\n<button></button>")
    );

    let util = elem.require("/widgets/util", None, None).unwrap().unwrap();
    assert_eq!(*util.into_exports().unwrap().borrow(), json!({"shared": true}));

    let same = elem.require("./util", None, Some("/widgets/_shared/x.js")).unwrap().unwrap();
    assert!(same.exports().is_some());
    assert_eq!(elem.host().run_count("widgets/_shared/util.js"), 1);
}
