//! Injectable trace and metric hooks.
//!
//! Logging goes through `tracing`; hosts pick where it ends up by
//! installing a subscriber. The hooks here are for structured callbacks a
//! host wants to receive directly: timing of timer callbacks and per-tick
//! counters. They are process-wide and meant to be set once at startup.

use crate::error::ErrorKind;

use std::sync::{Arc, PoisonError, RwLock};

/// Receives `(phase, name, duration_ms, status)`.
pub type TraceHook = dyn Fn(&str, &str, u64, Result<(), ErrorKind>) + Send + Sync;

/// Receives `(key, value)`.
pub type MetricHook = dyn Fn(&str, f64) + Send + Sync;

static TRACE: RwLock<Option<Arc<TraceHook>>> = RwLock::new(None);
static METRIC: RwLock<Option<Arc<MetricHook>>> = RwLock::new(None);

/// Installs the trace hook, replacing any previous one.
pub fn set_trace_hook<F>(hook: F)
where
    F: Fn(&str, &str, u64, Result<(), ErrorKind>) + Send + Sync + 'static,
{
    *TRACE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
}

/// Installs the metric hook, replacing any previous one.
pub fn set_metric_hook<F>(hook: F)
where
    F: Fn(&str, f64) + Send + Sync + 'static,
{
    *METRIC.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
}

/// Removes both hooks.
pub fn clear_hooks() {
    *TRACE.write().unwrap_or_else(PoisonError::into_inner) = None;
    *METRIC.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// The lock is released before the hook runs, so a hook may replace hooks.
pub(crate) fn trace(phase: &str, name: &str, duration_ms: u64, status: Result<(), ErrorKind>) {
    let hook = TRACE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    if let Some(hook) = hook {
        hook(phase, name, duration_ms, status);
    }
}

pub(crate) fn metric(key: &str, value: f64) {
    let hook = METRIC
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    if let Some(hook) = hook {
        hook(key, value);
    }
}
