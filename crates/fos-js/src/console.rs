//! Console API
//!
//! `console.log` and friends for loaded scripts, forwarded to `tracing`.

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

#[derive(Debug, Clone, Copy)]
enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

const METHODS: [(&str, Level); 5] = [
    ("log", Level::Info),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("debug", Level::Debug),
];

/// Install `console` into the global object.
pub fn install<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;

    for (name, level) in METHODS {
        let method = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            emit(level, &ctx, &args.0);
        })?;
        console.set(name, method)?;
    }

    ctx.globals().set("console", console)
}

fn emit<'js>(level: Level, ctx: &Ctx<'js>, values: &[Value<'js>]) {
    let line = values
        .iter()
        .map(|value| describe(ctx, value))
        .collect::<Vec<_>>()
        .join(" ");

    match level {
        Level::Error => tracing::error!("[JS] {}", line),
        Level::Warn => tracing::warn!("[JS] {}", line),
        Level::Info => tracing::info!("[JS] {}", line),
        Level::Debug => tracing::debug!("[JS] {}", line),
    }
}

/// Human-readable rendering of a value.
pub(crate) fn describe<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if let Some(s) = value.as_string() {
        return s.to_string().unwrap_or_default();
    }
    if value.is_function() {
        return "[Function]".to_string();
    }
    if let Some(exception) = value.as_exception() {
        return exception.message().unwrap_or_else(|| "[Error]".to_string());
    }

    match ctx.json_stringify(value.clone()) {
        Ok(Some(json)) => json.to_string().unwrap_or_default(),
        _ => format!("[{}]", value.type_name()),
    }
}
