//! Provider capability surface and dispatch.
//!
//! Modules:
//! - `registry`: Thread-safe provider registry implementing [`Dispatcher`]
//!
//! A provider is a named integration exposing an [`ActionSet`]: action name to asynchronous
//! handler. Handlers receive the parameter bag by value and return the bag the next chain node
//! should see, or an [`ActionError`](crate::ActionError).

mod registry;

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use confluo_types::{ActionKind, Params};

use crate::error::ActionResult;

pub use registry::{ActionDescription, ProviderDescription, ProviderRegistry};

/// One invocable capability of a provider.
///
/// Trigger actions return [`ActionError::NotTriggered`](crate::ActionError::NotTriggered) while
/// the awaited condition has not occurred. Operations perform a side effect and return the
/// updated bag.
#[async_trait]
pub trait Action: Send + Sync {
    async fn invoke(&self, params: Params) -> ActionResult;
}

/// Adapter turning an async closure into an [`Action`].
pub struct ActionFn<F> {
    handler: F,
}

/// Wraps `handler` so it can be registered in an [`ActionSet`].
pub fn action_fn<F, Fut>(handler: F) -> ActionFn<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    ActionFn { handler }
}

#[async_trait]
impl<F, Fut> Action for ActionFn<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    async fn invoke(&self, params: Params) -> ActionResult {
        (self.handler)(params).await
    }
}

#[derive(Clone)]
pub(crate) struct RegisteredAction {
    pub(crate) kind: ActionKind,
    pub(crate) handler: Arc<dyn Action>,
}

/// Mapping from action name to handler for one provider.
#[derive(Clone, Default)]
pub struct ActionSet {
    actions: BTreeMap<String, RegisteredAction>,
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSet")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a polling trigger under `name`.
    pub fn trigger(self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.insert(name, ActionKind::Trigger, Arc::new(action))
    }

    /// Registers an operation under `name`.
    pub fn operation(self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.insert(name, ActionKind::Operation, Arc::new(action))
    }

    /// Registers an already shared handler. A later registration under the same name replaces the earlier one.
    pub fn insert(mut self, name: impl Into<String>, kind: ActionKind, handler: Arc<dyn Action>) -> Self {
        self.actions.insert(name.into(), RegisteredAction { kind, handler });
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.actions.get(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &RegisteredAction)> {
        self.actions.iter()
    }
}

/// Dispatch seam used by the chain executor.
///
/// [`ProviderRegistry`] is the production implementation; tests substitute scripted dispatchers.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Invokes `action` of `provider` exactly once with a copy of `params`.
    async fn execute(&self, provider: &str, action: &str, params: &Params) -> ActionResult;
}
