//! Handler dispatch and the staged execution context
//!
//! Handlers are registered once per endpoint, keyed by selector. They see the
//! endpoint's application storage through an `ExecutionContext` that stages
//! every write; the executor applies the staged writes only when the handler
//! succeeds, so a failed handler leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use xrelay_core::{ActionId, Address, EndpointId, NextAction, Selector};

/// Failure reported by a handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Staged writes: `None` marks a deletion
pub(crate) type StagedWrites = BTreeMap<String, Option<Vec<u8>>>;

/// View of one execution handed to a handler
pub struct ExecutionContext<'a> {
    action_id: ActionId,
    initiator: Address,
    source: EndpointId,
    committed: &'a BTreeMap<String, Vec<u8>>,
    staged: StagedWrites,
    next: Option<NextAction>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        action_id: ActionId,
        initiator: Address,
        source: EndpointId,
        committed: &'a BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            action_id,
            initiator,
            source,
            committed,
            staged: BTreeMap::new(),
            next: None,
        }
    }

    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    pub fn initiator(&self) -> Address {
        self.initiator
    }

    /// Endpoint the action was relayed from
    pub fn source(&self) -> EndpointId {
        self.source
    }

    /// Read a storage value, seeing this execution's own writes
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        match self.staged.get(key) {
            Some(Some(value)) => Some(value.as_slice()),
            Some(None) => None,
            None => self.committed.get(key).map(Vec::as_slice),
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.staged.insert(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.staged.insert(key.into(), None);
    }

    /// Request a follow-on action once this one succeeds; the last request wins
    pub fn chain(&mut self, selector: Selector, payload: impl Into<Vec<u8>>) {
        self.next = Some(NextAction {
            selector,
            payload: payload.into(),
        });
    }

    pub(crate) fn into_effects(self) -> (StagedWrites, Option<NextAction>) {
        // A zero selector is the "no follow-on" marker
        let next = self.next.filter(|n| !n.selector.is_zero());
        (self.staged, next)
    }
}

/// Interprets `(selector, payload)` for one registered selector
pub trait ActionHandler: Send + Sync {
    fn handle(&self, ctx: &mut ExecutionContext<'_>, payload: &[u8]) -> Result<(), HandlerError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&mut ExecutionContext<'_>, &[u8]) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, ctx: &mut ExecutionContext<'_>, payload: &[u8]) -> Result<(), HandlerError> {
        self(ctx, payload)
    }
}

/// Static mapping from selector to handler, fixed at endpoint construction
///
/// Doubles as the capability allow-list: only selectors present here can be
/// bridged or executed.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<Selector, Arc<dyn ActionHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, selector: Selector, handler: impl ActionHandler + 'static) -> Self {
        self.handlers.insert(selector, Arc::new(handler));
        self
    }

    /// Register a closure; its signature is inferred from the handler shape
    pub fn with_fn<F>(self, selector: Selector, handler: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.with(selector, handler)
    }

    pub fn get(&self, selector: &Selector) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(selector).cloned()
    }

    pub fn contains(&self, selector: &Selector) -> bool {
        self.handlers.contains_key(selector)
    }

    pub fn selectors(&self) -> Vec<Selector> {
        let mut selectors: Vec<Selector> = self.handlers.keys().copied().collect();
        selectors.sort();
        selectors
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("selectors", &self.selectors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(committed: &BTreeMap<String, Vec<u8>>) -> ExecutionContext<'_> {
        ExecutionContext::new(
            ActionId([1; 32]),
            Address([2; 20]),
            EndpointId::new(1, Address([3; 20])),
            committed,
        )
    }

    #[test]
    fn test_reads_see_staged_writes() {
        let mut committed = BTreeMap::new();
        committed.insert("a".to_string(), vec![1]);
        committed.insert("b".to_string(), vec![2]);
        let mut ctx = context(&committed);

        ctx.put("a", vec![10]);
        ctx.remove("b");

        assert_eq!(ctx.get("a"), Some(&[10u8][..]));
        assert_eq!(ctx.get("b"), None);
        assert_eq!(ctx.get("missing"), None);
        // committed storage is untouched until the executor applies effects
        assert_eq!(committed.get("a"), Some(&vec![1]));
    }

    #[test]
    fn test_zero_selector_means_no_chain() {
        let committed = BTreeMap::new();
        let mut ctx = context(&committed);
        ctx.chain(Selector::zero(), vec![1]);
        let (_, next) = ctx.into_effects();
        assert!(next.is_none());
    }

    #[test]
    fn test_closures_are_handlers() {
        let selector = Selector::from_signature("noop()");
        let set = HandlerSet::new().with_fn(selector, |ctx, payload| {
            ctx.put("seen", payload.to_vec());
            Ok(())
        });

        assert!(set.contains(&selector));
        assert!(!set.contains(&Selector::from_signature("other()")));

        let committed = BTreeMap::new();
        let mut ctx = context(&committed);
        set.get(&selector).unwrap().handle(&mut ctx, b"hi").unwrap();
        assert_eq!(ctx.get("seen"), Some(&b"hi"[..]));
    }
}
