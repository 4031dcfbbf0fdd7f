//! Voices: recall ids and their recycling contexts.
//!
//! A [`RecallId`] names one playback instance. It is paired with exactly one
//! [`RecyclingContext`], which binds the recyclings the voice plays through.
//! Contexts form a tree: a voice crossing into an upstream audio gets a
//! nested context whose parent is the voice's toplevel context.

use std::sync::{Arc, Weak};

use tw_ir::SoundScope;

use crate::error::{GraphError, GraphResult};
use crate::object::{next_id, ObjectMutex};
use crate::recycling::Recycling;

#[derive(Default)]
struct ContextState {
    parent: Weak<RecyclingContext>,
    children: Vec<Arc<RecyclingContext>>,
    recyclings: Vec<Arc<Recycling>>,
    recall_id: Weak<RecallId>,
}

pub struct RecyclingContext {
    id: u64,
    scope: SoundScope,
    state: ObjectMutex<ContextState>,
}

impl RecyclingContext {
    pub fn new(scope: SoundScope, recyclings: Vec<Arc<Recycling>>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            scope,
            state: ObjectMutex::new(ContextState {
                recyclings,
                ..ContextState::default()
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    pub fn recyclings(&self) -> Vec<Arc<Recycling>> {
        self.state.with(|s| s.recyclings.clone())
    }

    pub fn contains(&self, recycling: &Recycling) -> bool {
        self.state
            .with(|s| s.recyclings.iter().any(|r| r.id() == recycling.id()))
    }

    pub fn parent(&self) -> Option<Arc<RecyclingContext>> {
        self.state.with(|s| s.parent.upgrade())
    }

    pub fn children(&self) -> Vec<Arc<RecyclingContext>> {
        self.state.with(|s| s.children.clone())
    }

    pub fn is_toplevel(&self) -> bool {
        self.parent().is_none()
    }

    pub fn recall_id(&self) -> Option<Arc<RecallId>> {
        self.state.with(|s| s.recall_id.upgrade())
    }

    /// Attach `child` below this context. Fails without changes if that
    /// would make the tree cyclic.
    pub fn add_child(self: &Arc<Self>, child: &Arc<RecyclingContext>) -> GraphResult<()> {
        let mut node = Some(self.clone());
        while let Some(current) = node {
            if current.id == child.id {
                return Err(GraphError::ContextCycle);
            }
            node = current.parent();
        }

        if let Some(old) = child.parent() {
            old.state
                .with_mut(|s| s.children.retain(|c| c.id != child.id));
        }
        child
            .state
            .with_mut(|s| s.parent = Arc::downgrade(self));
        self.state.with_mut(|s| {
            if !s.children.iter().any(|c| c.id == child.id) {
                s.children.push(child.clone());
            }
        });
        Ok(())
    }

    /// Destroy the subtree: children first, then this context.
    pub fn teardown(&self) {
        let children = self.state.with_mut(|s| std::mem::take(&mut s.children));
        for child in children {
            child.teardown();
        }
        self.state.with_mut(|s| {
            s.recyclings.clear();
            s.parent = Weak::new();
        });
    }

    /// Contexts in this subtree, this one first.
    pub fn subtree(self: &Arc<Self>) -> Vec<Arc<RecyclingContext>> {
        let mut out = vec![self.clone()];
        let mut i = 0;
        while i < out.len() {
            let children = out[i].children();
            out.extend(children);
            i += 1;
        }
        out
    }
}

impl std::fmt::Debug for RecyclingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecyclingContext")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("recyclings", &self.recyclings().len())
            .finish()
    }
}

#[derive(Default)]
struct RecallIdState {
    /// Templates were duplicated and resolved for this voice.
    initialized: bool,
    /// No further ticks; teardown pending or done.
    finished: bool,
    /// Nested voices in upstream audios.
    children: Vec<Arc<RecallId>>,
}

/// Identity of one voice.
pub struct RecallId {
    id: u64,
    context: Arc<RecyclingContext>,
    state: ObjectMutex<RecallIdState>,
}

impl RecallId {
    /// Create a voice for `context` and bind the context back to it.
    pub fn new(context: Arc<RecyclingContext>) -> Arc<Self> {
        let recall_id = Arc::new(Self {
            id: next_id(),
            context,
            state: ObjectMutex::default(),
        });
        recall_id
            .context
            .state
            .with_mut(|s| s.recall_id = Arc::downgrade(&recall_id));
        recall_id
    }

    /// Create a nested voice whose context is a child of this voice's context.
    pub fn nested(self: &Arc<Self>, recyclings: Vec<Arc<Recycling>>) -> GraphResult<Arc<RecallId>> {
        let context = RecyclingContext::new(self.scope(), recyclings);
        self.context.add_child(&context)?;
        let child = RecallId::new(context);
        self.state.with_mut(|s| s.children.push(child.clone()));
        Ok(child)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> SoundScope {
        self.context.scope()
    }

    pub fn context(&self) -> &Arc<RecyclingContext> {
        &self.context
    }

    pub fn is_initialized(&self) -> bool {
        self.state.with(|s| s.initialized)
    }

    pub(crate) fn set_initialized(&self) {
        self.state.with_mut(|s| s.initialized = true);
    }

    pub fn is_finished(&self) -> bool {
        self.state.with(|s| s.finished)
    }

    pub(crate) fn set_finished(&self) {
        self.state.with_mut(|s| s.finished = true);
    }

    pub fn children(&self) -> Vec<Arc<RecallId>> {
        self.state.with(|s| s.children.clone())
    }

    /// This voice and every nested voice.
    pub fn subtree(self: &Arc<Self>) -> Vec<Arc<RecallId>> {
        let mut out = vec![self.clone()];
        let mut i = 0;
        while i < out.len() {
            let children = out[i].children();
            out.extend(children);
            i += 1;
        }
        out
    }

    /// Whether `other` is this voice or nested in it.
    pub fn covers(self: &Arc<Self>, other: u64) -> bool {
        self.subtree().iter().any(|r| r.id == other)
    }

    /// Drop nested voices and tear down the context tree.
    pub(crate) fn teardown(&self) {
        let children = self.state.with_mut(|s| std::mem::take(&mut s.children));
        for child in children {
            child.teardown();
        }
        self.context.teardown();
    }
}

impl PartialEq for RecallId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for RecallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallId")
            .field("id", &self.id)
            .field("scope", &self.scope())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_ir::Presets;

    #[test]
    fn recall_id_binds_its_context() {
        let ctx = RecyclingContext::new(SoundScope::Playback, vec![Recycling::new(&Presets::default())]);
        let rid = RecallId::new(ctx.clone());
        assert_eq!(ctx.recall_id().unwrap().id(), rid.id());
        assert!(ctx.is_toplevel());
    }

    #[test]
    fn context_cycles_are_rejected() {
        let a = RecyclingContext::new(SoundScope::Playback, Vec::new());
        let b = RecyclingContext::new(SoundScope::Playback, Vec::new());
        let c = RecyclingContext::new(SoundScope::Playback, Vec::new());
        a.add_child(&b).unwrap();
        b.add_child(&c).unwrap();

        assert_eq!(c.add_child(&a), Err(GraphError::ContextCycle));
        assert_eq!(a.add_child(&a), Err(GraphError::ContextCycle));
        // Unchanged
        assert!(a.parent().is_none());
        assert_eq!(b.children().len(), 1);
    }

    #[test]
    fn teardown_releases_children_first() {
        let presets = Presets::default();
        let top = RecallId::new(RecyclingContext::new(SoundScope::Playback, vec![Recycling::new(&presets)]));
        let nested = top.nested(vec![Recycling::new(&presets)]).unwrap();
        assert!(top.covers(nested.id()));
        assert_eq!(top.context().subtree().len(), 2);

        top.teardown();
        assert!(nested.context().recyclings().is_empty());
        assert!(nested.context().parent().is_none());
        assert!(top.context().children().is_empty());
        assert!(top.context().recyclings().is_empty());
    }
}
