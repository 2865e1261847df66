//! Handler chain for reported driver errors

use std::sync::{Arc, PoisonError, RwLock};

use ash::{prelude::VkResult, vk};

use super::{classify, ErrorKind, GfxError, GfxResult, Severity};

/// Plain function invoked first for every reported error
pub type ErrorCallback = fn(ErrorKind);

/// Pluggable error handler invoked after the [`ErrorCallback`]
pub trait ErrorHandler: Send + Sync {
    /// Called once per reported, non-success error
    fn handle_error(&self, kind: ErrorKind);
}

/// Default callback: log the error and terminate the process on
/// [`Severity::Fatal`]
pub fn default_handler(kind: ErrorKind) {
    let severity = kind.severity();
    match severity {
        Severity::None => {}
        Severity::Info => log::info!("-- {severity} | GPU error: {kind}"),
        Severity::Warning => log::warn!("-- {severity} | GPU error: {kind}"),
        Severity::Fatal => {
            log::error!("-- {severity} | GPU error: {kind}");
            std::process::exit(-1);
        }
    }
}

/// Error dispatch shared by every object of one [`crate::GfxContext`]
///
/// Replacing the callback or the handler affects every caller that reports
/// through this domain from then on. Install handlers before spawning workers.
pub struct ErrorDomain {
    callback: RwLock<Option<ErrorCallback>>,
    handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
}

impl ErrorDomain {
    /// Domain with the given callback and no handler object
    pub fn with_callback(callback: ErrorCallback) -> Self {
        Self {
            callback: RwLock::new(Some(callback)),
            handler: RwLock::new(None),
        }
    }

    /// Domain that only dispatches to `handler`
    pub fn with_handler(handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            callback: RwLock::new(None),
            handler: RwLock::new(Some(handler)),
        }
    }

    /// Replace the callback
    pub fn set_callback(&self, callback: ErrorCallback) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Remove the callback, including the default one
    pub fn clear_callback(&self) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Replace the handler object
    pub fn set_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Remove the handler object
    pub fn clear_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Dispatch `kind` to the callback, then to the handler object
    ///
    /// Success is never dispatched.
    pub fn report(&self, kind: ErrorKind) {
        if kind.is_success() {
            return;
        }

        let callback = *self.callback.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = callback {
            callback(kind);
        }

        let handler = self.handler.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(handler) = handler {
            handler.handle_error(kind);
        }
    }

    /// Classify and report a raw driver result
    pub fn report_result(&self, result: vk::Result) -> ErrorKind {
        let kind = classify(result);
        self.report(kind);
        kind
    }

    /// Report a failed driver call and convert it into a [`GfxError`]
    pub fn check<T>(&self, result: VkResult<T>) -> GfxResult<T> {
        result.map_err(|result| GfxError::Driver {
            kind: self.report_result(result),
            result,
        })
    }

    /// Report `kind` and build the matching driver error
    pub fn fail(&self, kind: ErrorKind, result: vk::Result) -> GfxError {
        self.report(kind);
        GfxError::Driver { kind, result }
    }
}

impl Default for ErrorDomain {
    fn default() -> Self {
        Self::with_callback(default_handler)
    }
}

impl std::fmt::Debug for ErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_callback = self.callback.read().unwrap_or_else(PoisonError::into_inner).is_some();
        let has_handler = self.handler.read().unwrap_or_else(PoisonError::into_inner).is_some();
        f.debug_struct("ErrorDomain")
            .field("callback", &has_callback)
            .field("handler", &has_handler)
            .finish()
    }
}

/// Handler that remembers every reported kind
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingHandler {
    kinds: std::sync::Mutex<Vec<ErrorKind>>,
}

#[cfg(test)]
impl RecordingHandler {
    pub(crate) fn kinds(&self) -> Vec<ErrorKind> {
        self.kinds.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ErrorHandler for RecordingHandler {
    fn handle_error(&self, kind: ErrorKind) {
        self.kinds.lock().unwrap().push(kind);
    }
}
