//! QuickJS Script Host
//!
//! Runs loaded scripts in a QuickJS context. Module scripts are wrapped
//! in a `function (module, exports, require)` with `this` bound to
//! `exports`; global scripts are evaluated as they are.
//!
//! A QuickJS context cannot be entered twice, so nested `require` calls
//! made by a running module are served inside the context that is
//! already active instead of going back through [`ScriptHost`].

use rquickjs::function::{Opt, This};
use rquickjs::{Context, Ctx, Exception, Function, Object, Persistent, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fos_elem::{Content, Elem, LocalRequire, ScriptError, ScriptHost, ScriptJob, Step};

use crate::console;

/// Heap limit for the script runtime.
const MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Exports of a module, kept alive outside the context
pub type JsExports = Persistent<Value<'static>>;

/// The `module` object handed to a module script
pub struct QuickJsModule {
    object: Persistent<Object<'static>>,
}

/// Loader state visible to running scripts.
#[derive(Default)]
struct Scope {
    active: Cell<bool>,
    elem: RefCell<Option<Elem<QuickJsHost>>>,
}

struct Entered<'a> {
    scope: &'a Scope,
}

impl Scope {
    fn enter(&self, path: &str, elem: Option<Elem<QuickJsHost>>) -> Result<Entered<'_>, ScriptError> {
        if self.active.replace(true) {
            return Err(ScriptError::Reentrant {
                path: path.to_string(),
            });
        }

        *self.elem.borrow_mut() = elem;
        Ok(Entered { scope: self })
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        // The loader holds this host, so the handle must not outlive the call.
        self.scope.elem.borrow_mut().take();
        self.scope.active.set(false);
    }
}

/// Script host backed by QuickJS
pub struct QuickJsHost {
    context: Context,
    runtime: Runtime,
    scope: Rc<Scope>,
}

impl QuickJsHost {
    /// Create a runtime with the console installed.
    pub fn new() -> Result<Self, ScriptError> {
        let runtime = Runtime::new().map_err(host_error)?;
        runtime.set_memory_limit(MEMORY_LIMIT);

        let context = Context::full(&runtime).map_err(host_error)?;
        context.with(|ctx| console::install(&ctx)).map_err(host_error)?;

        tracing::debug!("QuickJS host ready");

        Ok(Self {
            context,
            runtime,
            scope: Rc::new(Scope::default()),
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Evaluate `code` in the global scope and return the result as JSON.
    pub fn eval_json(&self, code: &str) -> Result<serde_json::Value, ScriptError> {
        self.run("<eval>", None, |ctx| {
            let value: Value = ctx.eval(code)?;
            to_json(ctx, value)
        })
    }

    /// Exports as JSON.
    pub fn to_json(&self, exports: &JsExports) -> Result<serde_json::Value, ScriptError> {
        self.run("<exports>", None, |ctx| {
            let value = exports.clone().restore(ctx)?;
            to_json(ctx, value)
        })
    }

    /// Whether two exports are the same JavaScript value.
    pub fn same_value(&self, a: &JsExports, b: &JsExports) -> Result<bool, ScriptError> {
        self.run("<exports>", None, |ctx| {
            Ok(a.clone().restore(ctx)? == b.clone().restore(ctx)?)
        })
    }

    fn run<T>(
        &self,
        path: &str,
        elem: Option<Elem<Self>>,
        f: impl for<'js> FnOnce(&Ctx<'js>) -> rquickjs::Result<T>,
    ) -> Result<T, ScriptError> {
        let _entered = self.scope.enter(path, elem)?;
        self.context
            .with(|ctx| f(&ctx).map_err(|err| thrown(&ctx, path, err)))
    }
}

impl ScriptHost for QuickJsHost {
    type Module = QuickJsModule;
    type Exports = JsExports;

    fn create_module(&self) -> Result<QuickJsModule, ScriptError> {
        self.run("<module>", None, |ctx| {
            Ok(QuickJsModule {
                object: Persistent::save(ctx, new_module(ctx)?),
            })
        })
    }

    fn exports(&self, module: &QuickJsModule) -> Result<JsExports, ScriptError> {
        self.run("<exports>", None, |ctx| {
            let exports: Value = module.object.clone().restore(ctx)?.get("exports")?;
            Ok(Persistent::save(ctx, exports))
        })
    }

    fn run_global(&self, job: &ScriptJob) -> Result<(), ScriptError> {
        self.run(job.path(), None, |ctx| ctx.eval::<(), _>(job.source()))
    }

    fn run_module(
        &self,
        job: &ScriptJob,
        module: &QuickJsModule,
        require: LocalRequire<Self>,
    ) -> Result<(), ScriptError> {
        let scope = self.scope.clone();
        self.run(job.path(), Some(require.elem().clone()), |ctx| {
            let object = module.object.clone().restore(ctx)?;
            let require = require_function(ctx, scope, job.path().to_string())?;
            run_body(ctx, job, &object, require)
        })
    }
}

fn host_error(err: rquickjs::Error) -> ScriptError {
    ScriptError::Host(err.to_string())
}

/// Turn an engine error into a script error, taking the pending exception.
fn thrown(ctx: &Ctx<'_>, path: &str, err: rquickjs::Error) -> ScriptError {
    let message = if err.is_exception() {
        let caught = ctx.catch();
        match caught.as_exception() {
            Some(exception) => exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string()),
            None => console::describe(ctx, &caught),
        }
    } else {
        err.to_string()
    };

    ScriptError::Thrown {
        path: path.to_string(),
        message,
    }
}

fn new_module<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let module = Object::new(ctx.clone())?;
    module.set("exports", Object::new(ctx.clone())?)?;
    Ok(module)
}

fn run_body<'js>(
    ctx: &Ctx<'js>,
    job: &ScriptJob,
    module: &Object<'js>,
    require: Function<'js>,
) -> rquickjs::Result<()> {
    let exports: Value<'js> = module.get("exports")?;
    let wrapper: Function<'js> = ctx.eval(format!(
        "(function (module, exports, require) {{\n{}\n}})",
        job.source()
    ))?;

    wrapper.call((This(exports.clone()), module.clone(), exports, require))
}

/// `require` for the module at `from`.
fn require_function<'js>(ctx: &Ctx<'js>, scope: Rc<Scope>, from: String) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, reference: String, ext: Opt<String>| -> rquickjs::Result<Value<'js>> {
            require_in(&ctx, &scope, &from, &reference, ext.0.as_deref())
        },
    )?
    .with_name("require")
}

fn require_in<'js>(
    ctx: &Ctx<'js>,
    scope: &Rc<Scope>,
    from: &str,
    reference: &str,
    ext: Option<&str>,
) -> rquickjs::Result<Value<'js>> {
    let elem = scope.elem.borrow().clone();
    let Some(elem) = elem else {
        return Err(Exception::throw_message(ctx, "require called outside a running module"));
    };
    let Some(from) = elem.resource(from) else {
        return Err(Exception::throw_message(ctx, &format!("unknown script {}", from)));
    };

    let step = LocalRequire::new(elem, from)
        .step(reference, ext)
        .map_err(|err| Exception::throw_message(ctx, &err.to_string()))?;

    match step {
        Step::Content(content) => content_value(ctx, &content),
        Step::Executed => Ok(Value::new_undefined(ctx.clone())),
        Step::Module(module) => module.object.clone().restore(ctx)?.get("exports"),
        Step::Run(job) => run_nested(ctx, scope, job),
    }
}

fn run_nested<'js>(ctx: &Ctx<'js>, scope: &Rc<Scope>, job: ScriptJob) -> rquickjs::Result<Value<'js>> {
    if job.is_global() {
        tracing::debug!("Running global script {}", job.path());
        job.mark_executed();
        ctx.eval::<(), _>(job.source())?;
        return Ok(Value::new_undefined(ctx.clone()));
    }

    tracing::debug!("Running module {}", job.path());
    let module = new_module(ctx)?;
    job.begin(Rc::new(QuickJsModule {
        object: Persistent::save(ctx, module.clone()),
    }));

    let require = require_function(ctx, scope.clone(), job.path().to_string())?;
    run_body(ctx, &job, &module, require)?;
    job.finish();

    module.get("exports")
}

fn content_value<'js>(ctx: &Ctx<'js>, content: &Content) -> rquickjs::Result<Value<'js>> {
    match content {
        Content::Text(text) => Ok(rquickjs::String::from_str(ctx.clone(), text)?.into_value()),
        Content::Json(value) => ctx.json_parse(value.to_string()),
        Content::Empty | Content::Malformed(_) => Ok(Value::new_undefined(ctx.clone())),
    }
}

fn to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<serde_json::Value> {
    let Some(text) = ctx.json_stringify(value)? else {
        return Ok(serde_json::Value::Null);
    };

    serde_json::from_str(&text.to_string()?)
        .map_err(|err| Exception::throw_message(ctx, &err.to_string()))
}
