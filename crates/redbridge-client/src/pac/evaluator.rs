//! Thread-confined PAC script evaluator.
//!
//! The embedded ECMAScript context is not `Send`, so the compiled script
//! lives on its own thread and queries are exchanged over channels. The
//! thread exits when the owning [`PacEvaluator`] is dropped and the request
//! channel closes.

use std::thread;

use boa_engine::{
    Context, JsResult, JsString, JsValue, NativeFunction, Source, js_string,
};
use log::trace;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use super::PacError;

struct EvalRequest {
    url: String,
    host: String,
    reply: oneshot::Sender<Result<String, PacError>>,
}

/// Handle to a compiled PAC script.
///
/// Cheap to query from any number of concurrent tasks; evaluations are
/// serialized on the evaluator thread.
pub(super) struct PacEvaluator {
    requests: mpsc::UnboundedSender<EvalRequest>,
}

impl PacEvaluator {
    /// Compiles `script` on a dedicated thread.
    ///
    /// Resolves once the script has been evaluated and `FindProxyForURL` is
    /// known to be callable; a script that fails either check reports a
    /// [`PacError::Script`] and the thread exits immediately.
    pub(super) async fn spawn(script: String) -> Result<Self, PacError> {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<EvalRequest>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), PacError>>();

        thread::Builder::new()
            .name("pac-evaluator".to_owned())
            .spawn(move || {
                let mut context = match compile(&script) {
                    Ok(context) => {
                        let _ = ready_tx.send(Ok(()));
                        context
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Some(request) = request_rx.blocking_recv() {
                    let result = find_proxy(&mut context, &request.url, &request.host);
                    let _ = request.reply.send(result);
                }
            })
            .map_err(PacError::EvaluatorSpawn)?;

        ready_rx.await.map_err(|_| PacError::EvaluatorGone)??;
        Ok(Self {
            requests: request_tx,
        })
    }

    /// Calls `FindProxyForURL(url, host)` and returns its result as a string.
    pub(super) async fn find_proxy(&self, url: &str, host: &str) -> Result<String, PacError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(EvalRequest {
                url: url.to_owned(),
                host: host.to_owned(),
                reply: reply_tx,
            })
            .map_err(|_| PacError::EvaluatorGone)?;
        reply_rx.await.map_err(|_| PacError::EvaluatorGone)?
    }
}

/// Builds a context holding the PAC primitives and the evaluated script.
fn compile(script: &str) -> Result<Context, PacError> {
    let mut context = Context::default();

    register_pac_primitives(&mut context).map_err(script_error)?;
    context
        .eval(Source::from_bytes(script.as_bytes()))
        .map_err(script_error)?;

    // Fail at compile time when the script never defines the entry point.
    let global = context.global_object();
    let entry = global
        .get(js_string!("FindProxyForURL"), &mut context)
        .map_err(script_error)?;
    if entry.as_callable().is_none() {
        return Err(PacError::Script(
            "FindProxyForURL is not a function".to_owned(),
        ));
    }

    Ok(context)
}

fn find_proxy(context: &mut Context, url: &str, host: &str) -> Result<String, PacError> {
    trace!("evaluating FindProxyForURL({url}, {host})");

    let global = context.global_object();
    let entry = global
        .get(js_string!("FindProxyForURL"), context)
        .map_err(script_error)?;
    let callable = entry
        .as_callable()
        .ok_or_else(|| PacError::Script("FindProxyForURL is not a function".to_owned()))?;

    let args = [
        JsValue::from(JsString::from(url)),
        JsValue::from(JsString::from(host)),
    ];
    let result = callable
        .call(&JsValue::undefined(), &args, context)
        .map_err(script_error)?;
    let result = result.to_string(context).map_err(script_error)?;

    Ok(result.to_std_string_escaped())
}

fn script_error(err: impl std::fmt::Display) -> PacError {
    PacError::Script(err.to_string())
}

fn string_arg(args: &[JsValue], index: usize) -> String {
    args.get(index)
        .and_then(JsValue::as_string)
        .and_then(|value| value.to_std_string().ok())
        .unwrap_or_default()
}

/// Registers the standard PAC helper functions.
///
/// Bodies follow the simplified semantics of the bridge: no DNS lookups, no
/// clock dependence. `weekdayRange`, `dateRange`, and `timeRange` always
/// match; `isInNet` never does.
fn register_pac_primitives(context: &mut Context) -> JsResult<()> {
    context.register_global_callable(
        js_string!("isPlainHostName"),
        1,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let host = string_arg(args, 0);
            Ok((!host.contains('.')).into())
        }),
    )?;

    context.register_global_callable(
        js_string!("dnsDomainIs"),
        2,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let host = string_arg(args, 0);
            let domain = string_arg(args, 1);
            Ok((host.len() >= domain.len() && host.ends_with(&domain)).into())
        }),
    )?;

    context.register_global_callable(
        js_string!("localHostOrDomainIs"),
        2,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let host = string_arg(args, 0);
            let hostdom = string_arg(args, 1);
            let matched = host == hostdom
                || (hostdom.starts_with(&host) && hostdom[host.len()..].starts_with('.'));
            Ok(matched.into())
        }),
    )?;

    context.register_global_callable(
        js_string!("isResolvable"),
        1,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(true.into())),
    )?;

    context.register_global_callable(
        js_string!("isInNet"),
        3,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(false.into())),
    )?;

    context.register_global_callable(
        js_string!("dnsResolve"),
        1,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let host = string_arg(args, 0);
            Ok(JsValue::from(JsString::from(host)))
        }),
    )?;

    context.register_global_callable(
        js_string!("myIpAddress"),
        0,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| {
            Ok(JsValue::from(js_string!("127.0.0.1")))
        }),
    )?;

    context.register_global_callable(
        js_string!("dnsDomainLevels"),
        1,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let host = string_arg(args, 0);
            let levels = host.matches('.').count() as i32;
            Ok(JsValue::from(levels))
        }),
    )?;

    context.register_global_callable(
        js_string!("shExpMatch"),
        2,
        NativeFunction::from_fn_ptr(|_this, args, _ctx| {
            let value = string_arg(args, 0);
            let glob = string_arg(args, 1);
            let pattern = glob
                .replace('.', "\\.")
                .replace('*', ".*")
                .replace('?', ".");
            let matched = Regex::new(&format!("^{pattern}$"))
                .map(|re| re.is_match(&value))
                .unwrap_or(false);
            Ok(matched.into())
        }),
    )?;

    context.register_global_callable(
        js_string!("weekdayRange"),
        3,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(true.into())),
    )?;

    context.register_global_callable(
        js_string!("dateRange"),
        8,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(true.into())),
    )?;

    context.register_global_callable(
        js_string!("timeRange"),
        6,
        NativeFunction::from_fn_ptr(|_this, _args, _ctx| Ok(true.into())),
    )?;

    Ok(())
}
