// Event dispatch for tick notifications

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::error::DispatchError;

type ListenerFn = dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync;

/// A subscriber callback.
///
/// Listeners compare by identity: two clones of the same listener are equal, two listeners built
/// from identical closures are not.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Listener that ignores its arguments and cannot fail
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(move |_| {
            callback();
            Ok(())
        })
    }

    pub fn call(&self, args: &[Value]) -> anyhow::Result<()> {
        (self.0)(args)
    }

    pub fn same_as(&self, other: &Listener) -> bool {
        // Compare data pointers only; vtable pointers are not unique per type.
        std::ptr::eq(Arc::as_ptr(&self.0) as *const (), Arc::as_ptr(&other.0) as *const ())
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Name-keyed listener lists
#[derive(Debug, Default)]
pub struct EventDispatcher {
    listeners: HashMap<String, Vec<Listener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; the same listener may be subscribed more than once
    pub fn subscribe(&mut self, event: &str, listener: Listener) {
        self.listeners.entry(event.to_string()).or_default().push(listener);
    }

    /// Remove the first subscription of `listener` under `event`
    pub fn unsubscribe(&mut self, event: &str, listener: &Listener) -> bool {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return false;
        };

        let removed = match listeners.iter().position(|l| l.same_as(listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        };

        if listeners.is_empty() {
            self.listeners.remove(event);
        }

        removed
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Snapshot of the listeners for `event`, in subscription order
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    /// Invoke every listener of `event` in subscription order.
    ///
    /// Stops at the first failing listener and returns its error. Returns the number of listeners
    /// invoked otherwise.
    pub fn emit(&self, event: &str, args: &[Value]) -> Result<usize, DispatchError> {
        match self.listeners.get(event) {
            Some(listeners) => Self::invoke(event, listeners, args),
            None => Ok(0),
        }
    }

    /// Invoke a listener snapshot taken with [`EventDispatcher::listeners`]
    pub fn invoke(
        event: &str,
        listeners: &[Listener],
        args: &[Value],
    ) -> Result<usize, DispatchError> {
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.call(args))) {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    return Err(DispatchError::ListenerFailed { event: event.to_string(), source })
                }
                Err(payload) => {
                    return Err(DispatchError::Panicked {
                        event: event.to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                }
            }
        }

        Ok(listeners.len())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
