use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Instant,
};

use async_trait::async_trait;
use confluo_types::{ActionKind, Params};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Action, ActionSet, Dispatcher};
use crate::error::{ActionError, ActionResult};

/// Catalog entry describing one registered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescription {
    pub name: String,
    pub kind: ActionKind,
}

/// Catalog entry describing one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescription {
    pub name: String,
    pub actions: Vec<ActionDescription>,
}

/// Process-wide mapping from provider name to its [`ActionSet`].
///
/// Registration normally happens once at startup, but the registry tolerates concurrent
/// subscribe and execute calls: handlers are cloned out of the lock before they are awaited, so
/// no lock is held across an external call. Re-subscribing a provider name replaces its whole
/// action set (last writer wins).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, ActionSet>>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ProviderRegistry").field("providers", &names).finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `actions` under `provider`, replacing any previous set with that name.
    pub fn subscribe(&self, provider: impl Into<String>, actions: ActionSet) {
        let provider = provider.into();
        let action_count = actions.len();
        let replaced = self.write().insert(provider.clone(), actions).is_some();
        if replaced {
            warn!(provider = %provider, action_count, "provider re-subscribed; previous actions replaced");
        } else {
            info!(provider = %provider, action_count, "provider subscribed");
        }
    }

    /// Removes `provider` and returns its action set, if it was registered.
    pub fn unsubscribe(&self, provider: &str) -> Option<ActionSet> {
        let removed = self.write().remove(provider);
        if removed.is_some() {
            info!(provider = %provider, "provider unsubscribed");
        }
        removed
    }

    pub fn contains(&self, provider: &str, action: &str) -> bool {
        self.read().get(provider).is_some_and(|set| set.get(action).is_some())
    }

    /// Looks up the handler for `provider`/`action` without invoking it.
    pub fn resolve(&self, provider: &str, action: &str) -> Result<Arc<dyn Action>, ActionError> {
        let providers = self.read();
        let set = providers
            .get(provider)
            .ok_or_else(|| ActionError::provider_not_found(provider))?;
        let entry = set
            .get(action)
            .ok_or_else(|| ActionError::action_not_found(provider, action))?;
        Ok(Arc::clone(&entry.handler))
    }

    /// Invokes `action` of `provider` exactly once with a copy of `params`.
    ///
    /// The handler's result is returned verbatim, including
    /// [`ActionError::NotTriggered`]. Nothing is retried here.
    pub async fn execute(&self, provider: &str, action: &str, params: &Params) -> ActionResult {
        let handler = match self.resolve(provider, action) {
            Ok(handler) => handler,
            Err(error) => {
                warn!(provider = %provider, action = %action, error = %error, "action lookup failed");
                return Err(error);
            }
        };

        debug!(provider = %provider, action = %action, param_count = params.len(), "action invoked");
        let started_at = Instant::now();
        let result = handler.invoke(params.clone()).await;
        let elapsed_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(output) => debug!(
                provider = %provider,
                action = %action,
                elapsed_ms,
                output_count = output.len(),
                "action returned"
            ),
            Err(ActionError::NotTriggered) => debug!(provider = %provider, action = %action, elapsed_ms, "action not triggered"),
            Err(error) => debug!(provider = %provider, action = %action, elapsed_ms, error = %error, "action failed"),
        }
        result
    }

    /// Lists every provider with its actions, sorted by name.
    pub fn describe(&self) -> Vec<ProviderDescription> {
        let providers = self.read();
        let mut descriptions: Vec<ProviderDescription> = providers
            .iter()
            .map(|(name, set)| ProviderDescription {
                name: name.clone(),
                actions: set
                    .iter()
                    .map(|(action, entry)| ActionDescription {
                        name: action.clone(),
                        kind: entry.kind,
                    })
                    .collect(),
            })
            .collect();
        descriptions.sort_by(|left, right| left.name.cmp(&right.name));
        descriptions
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ActionSet>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ActionSet>> {
        self.providers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Dispatcher for ProviderRegistry {
    async fn execute(&self, provider: &str, action: &str, params: &Params) -> ActionResult {
        ProviderRegistry::execute(self, provider, action, params).await
    }
}
