//! Call-chain scoped datasource pinning
//!
//! Each call chain runs inside [`RoutingContext::scope`], which gives it its
//! own task-local stack of pinned names. [`RoutingContext::pin`] pushes a name
//! and returns a guard; dropping the guard pops it, so early returns, errors
//! and unwinding all restore the previous pin.

use std::cell::RefCell;
use std::future::Future;

use super::RouteError;

tokio::task_local! {
    static PINNED: RefCell<PinStack>;
}

#[derive(Debug, Default)]
struct PinStack {
    names: Vec<String>,
    /// Bumped by `clear`; guards from an older generation no longer pop
    generation: u64,
}

/// Task-local routing override
pub struct RoutingContext;

impl RoutingContext {
    /// Run `f` as a fresh call chain with an empty pin stack
    pub async fn scope<F: Future>(f: F) -> F::Output {
        PINNED.scope(RefCell::new(PinStack::default()), f).await
    }

    /// Whether the current task runs inside a routing scope
    pub fn in_scope() -> bool {
        PINNED.try_with(|_| ()).is_ok()
    }

    /// Pin `name` for the current call chain until the guard is dropped
    pub fn pin(name: impl Into<String>) -> Result<PinGuard, RouteError> {
        let name = name.into();
        PINNED
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                let depth = stack.names.len();
                stack.names.push(name.clone());
                (depth, stack.generation)
            })
            .map(|(depth, generation)| PinGuard {
                depth,
                generation,
                name,
            })
            .map_err(|_| RouteError::NoRoutingScope)
    }

    /// Run `f` with `name` pinned
    pub async fn pinned<F: Future>(name: impl Into<String>, f: F) -> Result<F::Output, RouteError> {
        let _guard = Self::pin(name)?;
        Ok(f.await)
    }

    /// Innermost pinned name, if any
    pub fn current() -> Option<String> {
        PINNED
            .try_with(|stack| stack.borrow().names.last().cloned())
            .ok()
            .flatten()
    }

    /// Number of active pins
    pub fn depth() -> usize {
        PINNED.try_with(|stack| stack.borrow().names.len()).unwrap_or(0)
    }

    /// Drop every pin of the current call chain.
    ///
    /// Guards created before the call become no-ops.
    pub fn clear() {
        let _ = PINNED.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.names.clear();
            stack.generation = stack.generation.wrapping_add(1);
        });
    }
}

/// Pops its pin when dropped
#[derive(Debug)]
#[must_use = "the pin is released as soon as the guard is dropped"]
pub struct PinGuard {
    /// Stack length before the push
    depth: usize,
    generation: u64,
    name: String,
}

impl PinGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let _ = PINNED.try_with(|stack| {
            if let Ok(mut stack) = stack.try_borrow_mut() {
                if stack.generation == self.generation {
                    stack.names.truncate(self.depth);
                }
            }
        });
    }
}
