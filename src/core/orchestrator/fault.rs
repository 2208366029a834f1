//! Fault isolation around a component.
//!
//! A failure inside the wrapped component, returned or panicked, is recorded
//! and replaced by a caller-provided fallback. Once faulted, the boundary
//! keeps returning fallbacks until [`FaultBoundary::reset`] is called.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;
use parking_lot::Mutex;

/// Health of a [`FaultBoundary`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FaultState {
    #[default]
    Healthy,
    Faulted {
        operation: String,
        message: String,
    },
}

impl FaultState {
    pub fn is_faulted(&self) -> bool {
        matches!(self, FaultState::Faulted { .. })
    }
}

impl fmt::Display for FaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultState::Healthy => write!(f, "healthy"),
            FaultState::Faulted { operation, message } => {
                write!(f, "faulted in {operation}: {message}")
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Wraps a component so its failures never propagate to the caller.
pub struct FaultBoundary<T> {
    inner: T,
    state: Mutex<FaultState>,
}

impl<T> FaultBoundary<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: Mutex::new(FaultState::Healthy),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn state(&self) -> FaultState {
        self.state.lock().clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.lock().is_faulted()
    }

    /// Clear the fault so the next operation runs again.
    pub fn reset(&self) {
        *self.state.lock() = FaultState::Healthy;
    }

    fn record(&self, operation: &str, message: String) {
        tracing::error!("{} failed, showing fallback: {}", operation, message);
        *self.state.lock() = FaultState::Faulted {
            operation: operation.to_string(),
            message,
        };
    }

    /// Run a fallible operation. Errors and panics yield `fallback`.
    pub fn run<R, E>(&self, operation: &str, fallback: R, f: impl FnOnce(&T) -> Result<R, E>) -> R
    where
        E: fmt::Display,
    {
        if self.is_faulted() {
            return fallback;
        }
        match catch_unwind(AssertUnwindSafe(|| f(&self.inner))) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                self.record(operation, e.to_string());
                fallback
            }
            Err(payload) => {
                self.record(operation, panic_message(payload.as_ref()));
                fallback
            }
        }
    }

    /// Run an infallible operation that might still panic.
    pub fn guard<R>(&self, operation: &str, fallback: R, f: impl FnOnce(&T) -> R) -> R {
        self.run(operation, fallback, |inner| {
            Ok::<R, std::convert::Infallible>(f(inner))
        })
    }

    /// Async variant of [`FaultBoundary::run`].
    pub async fn run_async<'a, R, E, F, Fut>(&'a self, operation: &str, fallback: R, f: F) -> R
    where
        E: fmt::Display,
        F: FnOnce(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>> + 'a,
    {
        if self.is_faulted() {
            return fallback;
        }
        let future = match catch_unwind(AssertUnwindSafe(|| f(&self.inner))) {
            Ok(future) => future,
            Err(payload) => {
                self.record(operation, panic_message(payload.as_ref()));
                return fallback;
            }
        };
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                self.record(operation, e.to_string());
                fallback
            }
            Err(payload) => {
                self.record(operation, panic_message(payload.as_ref()));
                fallback
            }
        }
    }
}
