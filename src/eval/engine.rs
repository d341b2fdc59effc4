use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::mpsc;

use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::{js_string, Context as JsContext, JsError, JsResult, JsString, JsValue, NativeFunction, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::context::{Context as TaskContext, ContextValue, HostFn};

use super::EvalError;

/// One captured `console` invocation from inside the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub args: Vec<Value>,
}

/// What one sandboxed execution produced: a serialized value or a shaped
/// error, plus whatever the code printed.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub ok: Option<Value>,
    #[serde(default)]
    pub err: Option<ShapedError>,
    #[serde(default)]
    pub console: Vec<ConsoleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ShapedError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

struct Request {
    source: String,
    reply: oneshot::Sender<Result<Envelope, EvalError>>,
}

/// A per-request ECMAScript engine. Boa contexts are not `Send`, so the
/// context lives on a dedicated thread and requests are funneled through
/// a channel; submission order is execution order, which is what gives
/// `vars` its sequential-consistency guarantee.
pub(crate) struct Engine {
    tx: mpsc::Sender<Request>,
}

thread_local! {
    // The engine thread is exclusive to one request, so this registry is
    // per-request state even though it looks process-wide.
    static HOST_FNS: RefCell<HashMap<String, HostFn>> = RefCell::new(HashMap::new());
}

impl Engine {
    /// Spawn the engine thread and run the bootstrap: `vars`, the frozen
    /// `context` object, the console shim and the serializer. Fails if
    /// the bootstrap source does not evaluate.
    pub(crate) fn start(context: &TaskContext) -> Result<Self, EvalError> {
        let bootstrap = build_bootstrap(context);
        let host_fns = context
            .iter()
            .filter_map(|(name, value)| match value {
                ContextValue::Function { call, .. } => Some((name.clone(), call.clone())),
                _ => None,
            })
            .collect::<HashMap<_, _>>();

        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), EvalError>>();

        std::thread::Builder::new()
            .name("klendathu-eval".into())
            .spawn(move || engine_main(bootstrap, host_fns, ready_tx, rx))
            .map_err(|e| EvalError::Engine(format!("failed to spawn engine thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(EvalError::Engine("engine thread died during bootstrap".into())),
        }
    }

    /// Evaluate a function-expression string as `(<code>)()`, await it,
    /// and bring the serialized outcome back.
    pub(crate) async fn eval_expression(&self, code: &str) -> Result<Envelope, EvalError> {
        let source = wrap_expression(code);
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { source, reply })
            .map_err(|_| EvalError::Engine("engine thread stopped".into()))?;
        rx.await
            .map_err(|_| EvalError::Engine("engine thread dropped the request".into()))?
    }
}

/// The outcome envelope travels between JS and Rust as a JSON string, so
/// the only engine API the hot path needs is "evaluate and read back one
/// string".
fn wrap_expression(code: &str) -> String {
    format!(
        r#"(async () => {{
  try {{
    const __value = await ({code})();
    return JSON.stringify({{ ok: __serialize(__value), console: __drainConsole() }});
  }} catch (__e) {{
    return JSON.stringify({{ err: __shapeError(__e), console: __drainConsole() }});
  }}
}})()"#
    )
}

fn engine_main(
    bootstrap: String,
    host_fns: HashMap<String, HostFn>,
    ready: mpsc::Sender<Result<(), EvalError>>,
    rx: mpsc::Receiver<Request>,
) {
    HOST_FNS.with(|cell| *cell.borrow_mut() = host_fns);

    let mut ctx = JsContext::default();

    let registered = ctx.register_global_callable(
        js_string!("__hostCall"),
        2,
        NativeFunction::from_fn_ptr(host_call),
    );
    if let Err(error) = registered {
        let _ = ready.send(Err(EvalError::Engine(format!(
            "failed to install host dispatch: {error}"
        ))));
        return;
    }

    if let Err(error) = ctx.eval(Source::from_bytes(&bootstrap)) {
        let _ = ready.send(Err(EvalError::Engine(format!("bootstrap failed: {error}"))));
        return;
    }
    if ready.send(Ok(())).is_err() {
        return;
    }

    // Sender dropped = evaluator dropped; the thread winds down with it.
    while let Ok(request) = rx.recv() {
        let outcome = run_source(&mut ctx, &request.source);
        let _ = request.reply.send(outcome);
    }
}

fn run_source(ctx: &mut JsContext, source: &str) -> Result<Envelope, EvalError> {
    let value = ctx
        .eval(Source::from_bytes(source))
        .map_err(|error| shape_js_error(error, ctx))?;

    let Some(object) = value.as_object() else {
        return Err(EvalError::Engine(
            "wrapped expression did not produce a promise".into(),
        ));
    };
    let promise = JsPromise::from_object(object.clone())
        .map_err(|error| EvalError::Engine(error.to_string()))?;

    // Host functions are synchronous, so the microtask queue settles the
    // promise in a bounded number of rounds. A promise still pending
    // after the queue drains is waiting on something the sandbox does
    // not have (timers), and will never settle.
    let mut state = promise.state();
    for _ in 0..1024 {
        if !matches!(state, PromiseState::Pending) {
            break;
        }
        let _ = ctx.run_jobs();
        state = promise.state();
    }

    match state {
        PromiseState::Fulfilled(value) => {
            let Some(text) = value.as_string() else {
                return Err(EvalError::Engine(
                    "outcome envelope was not a string".into(),
                ));
            };
            serde_json::from_str(&text.to_std_string_escaped())
                .map_err(|error| EvalError::Engine(format!("bad outcome envelope: {error}")))
        }
        PromiseState::Rejected(error) => {
            // The wrapper catches everything, so a rejection here means
            // the envelope itself failed to build.
            Err(shape_thrown(&error, ctx).unwrap_or_else(|| EvalError::Runtime {
                name: "Error".into(),
                message: error.display().to_string(),
                stack: None,
            }))
        }
        PromiseState::Pending => Err(EvalError::DidNotSettle),
    }
}

/// Synchronous bridge from sandbox function calls back to the host.
/// Arguments and results cross as JSON strings.
fn host_call(_this: &JsValue, args: &[JsValue], _ctx: &mut JsContext) -> JsResult<JsValue> {
    use boa_engine::JsNativeError;

    let name = args
        .first()
        .and_then(JsValue::as_string)
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| JsNativeError::typ().with_message("host call needs a function name"))?;
    let raw_args = args
        .get(1)
        .and_then(JsValue::as_string)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|| "[]".to_string());
    let call_args: Vec<Value> = serde_json::from_str(&raw_args)
        .map_err(|e| JsNativeError::typ().with_message(format!("bad host call arguments: {e}")))?;

    let host_fn = HOST_FNS
        .with(|cell| cell.borrow().get(&name).cloned())
        .ok_or_else(|| {
            JsNativeError::typ().with_message(format!("unknown host function: {name}"))
        })?;

    match host_fn(call_args) {
        Ok(value) => Ok(JsValue::from(JsString::from(value.to_string()))),
        Err(message) => Err(JsNativeError::error().with_message(message).into()),
    }
}

fn shape_js_error(error: JsError, ctx: &mut JsContext) -> EvalError {
    let value = error.to_opaque(ctx);
    shape_thrown(&value, ctx).unwrap_or_else(|| EvalError::Runtime {
        name: "Error".into(),
        message: error.to_string(),
        stack: None,
    })
}

fn shape_thrown(value: &JsValue, ctx: &mut JsContext) -> Option<EvalError> {
    let object = value.as_object()?;
    let message = object
        .get(js_string!("message"), ctx)
        .ok()?
        .as_string()
        .map(|s| s.to_std_string_escaped())?;
    let name = object
        .get(js_string!("name"), ctx)
        .ok()
        .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
        .unwrap_or_else(|| "Error".to_string());
    let stack = object
        .get(js_string!("stack"), ctx)
        .ok()
        .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()));
    Some(EvalError::Runtime {
        name,
        message,
        stack,
    })
}

/// Build the bootstrap source: serializer first, then the console shim,
/// then `vars` and the frozen `context`.
fn build_bootstrap(context: &TaskContext) -> String {
    let mut plain = serde_json::Map::new();
    for (name, value) in context {
        if let ContextValue::Json(json) = value {
            plain.insert(name.clone(), json.clone());
        }
    }

    let mut source = String::from(PRELUDE);

    source.push_str(&format!(
        "const __ctx = {};\n",
        Value::Object(plain)
    ));

    for (name, value) in context {
        let quoted = Value::String(name.clone()).to_string();
        match value {
            ContextValue::Json(_) => {}
            ContextValue::Function { .. } => {
                source.push_str(&format!(
                    "__ctx[{quoted}] = (...args) => JSON.parse(__hostCall({quoted}, JSON.stringify(__serialize(args))));\n"
                ));
            }
            ContextValue::Error {
                name: error_name,
                message,
                stack,
            } => {
                let error_name = Value::String(error_name.clone());
                let message = Value::String(message.clone());
                source.push_str(&format!(
                    "__ctx[{quoted}] = (() => {{ const e = new Error({message}); e.name = {error_name};"
                ));
                if let Some(stack) = stack {
                    source.push_str(&format!(" e.stack = {};", Value::String(stack.clone())));
                }
                source.push_str(" return e; })();\n");
            }
        }
    }

    source.push_str("globalThis.context = Object.freeze(__ctx);\n");
    source.push_str("globalThis.vars = {};\n");
    source
}

/// Serializer, error shaping and console shim. The serializer mirrors
/// what leaves the sandbox everywhere: error-shaped values become
/// `{__error, name, message, stack}`, arrays and plain objects are
/// recursed by own enumerable keys, functions become a sentinel string,
/// revisited objects become `{__cycle: true}` and the depth bound guards
/// against degenerate nesting.
const PRELUDE: &str = r#"
globalThis.__serialize = (value) => {
  const seen = new Set();
  const walk = (v, depth) => {
    if (v === undefined || v === null) return null;
    const t = typeof v;
    if (t === "function") return "[function]";
    if (t === "number") return Number.isFinite(v) ? v : null;
    if (t === "bigint") return Number(v);
    if (t !== "object") return v;
    if (v instanceof Error || (typeof v.message === "string" && typeof v.stack === "string")) {
      return {
        __error: true,
        name: String(v.name || "Error"),
        message: String(v.message),
        stack: String(v.stack),
      };
    }
    if (seen.has(v)) return { __cycle: true };
    if (depth >= 64) return { __cycle: true };
    seen.add(v);
    let out;
    if (Array.isArray(v)) {
      out = v.map((item) => walk(item, depth + 1));
    } else {
      out = {};
      for (const key of Object.keys(v)) {
        out[key] = walk(v[key], depth + 1);
      }
    }
    seen.delete(v);
    return out;
  };
  return walk(value, 0);
};

globalThis.__shapeError = (e) => {
  if (e instanceof Error || (e && typeof e === "object" && typeof e.message === "string")) {
    return {
      name: String(e.name || "Error"),
      message: String(e.message),
      stack: typeof e.stack === "string" ? e.stack : null,
    };
  }
  return { name: "Error", message: String(e), stack: null };
};

globalThis.__console = [];
globalThis.__drainConsole = () => globalThis.__console.splice(0, globalThis.__console.length);
{
  const push = (level) => (...args) => {
    globalThis.__console.push({ level, args: args.map(__serialize) });
  };
  globalThis.console = Object.freeze({
    log: push("log"),
    error: push("error"),
    warn: push("warn"),
    info: push("info"),
    debug: push("debug"),
    trace: push("trace"),
  });
}
"#;
