use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::HandlerError;

/// Outcome of a handler invocation.
pub type HandlerResult = Result<Value, HandlerError>;

/// Callback for an incoming request or notification.
///
/// Handlers run on the dispatch thread. A handler that blocks stalls all
/// incoming traffic; in particular it must not wait on a request issued on
/// the same session.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, params: Option<Value>) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(Option<Value>) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, params: Option<Value>) -> HandlerResult {
        self(params)
    }
}

/// Exact, case-sensitive method name to handler mapping.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    /// Insert or replace the handler for `method`.
    pub(crate) fn register(&self, method: String, handler: Arc<dyn Handler>) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(method, handler)
            .is_some()
    }

    pub(crate) fn unregister(&self, method: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(method)
            .is_some()
    }

    /// Look up a handler. The lock is released before the handler runs.
    pub(crate) fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(method)
            .cloned()
    }
}

/// Run a handler, turning a panic into an `INTERNAL_ERROR`.
pub(crate) fn invoke(handler: &dyn Handler, params: Option<Value>) -> HandlerResult {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(params))) {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::internal(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic in handler: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic in handler: {s}")
    } else {
        "panic in handler".to_string()
    }
}
