//! Prototype-inherited child scopes.
//!
//! Implemented as a parent-pointer chain of frames: reads walk up to the
//! nearest frame that binds the name; writes always land in the current
//! (leaf) frame's own map, never in an ancestor — except that a `varSet`
//! targeting a name that is `const` anywhere up the chain is rejected
//! before the write happens.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::value::Value;

struct FrameData {
    parent: Option<ScopeRef>,
    vars: IndexMap<String, Value>,
    consts: std::collections::HashSet<String>,
}

/// A single scope frame, shared by reference so child frames can be
/// created cheaply and dropped without disturbing the parent.
#[derive(Clone)]
pub struct ScopeRef(Arc<Mutex<FrameData>>);

impl ScopeRef {
    pub fn root() -> Self {
        Self(Arc::new(Mutex::new(FrameData {
            parent: None,
            vars: IndexMap::new(),
            consts: std::collections::HashSet::new(),
        })))
    }

    /// Creates a child frame whose reads fall through to `self`.
    pub fn child(&self) -> Self {
        Self(Arc::new(Mutex::new(FrameData {
            parent: Some(self.clone()),
            vars: IndexMap::new(),
            consts: std::collections::HashSet::new(),
        })))
    }

    /// Reads a binding, falling through to ancestors. Returns `None` if
    /// unbound anywhere in the chain (the caller treats that as absent).
    pub async fn get(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self.clone());
        while let Some(f) = frame {
            let guard = f.0.lock().await;
            if let Some(v) = guard.vars.get(name) {
                return Some(v.clone());
            }
            frame = guard.parent.clone();
        }
        None
    }

    /// True if `name` is declared `const` in this frame or any ancestor.
    pub async fn is_const_anywhere(&self, name: &str) -> bool {
        let mut frame = Some(self.clone());
        while let Some(f) = frame {
            let guard = f.0.lock().await;
            if guard.consts.contains(name) {
                return true;
            }
            frame = guard.parent.clone();
        }
        false
    }

    /// True if `name` is already bound in *this* frame specifically
    /// (used by `constSet`'s no-redeclaration rule).
    pub async fn has_local(&self, name: &str) -> bool {
        self.0.lock().await.vars.contains_key(name)
    }

    /// Writes into the current (leaf) frame's own map, optionally marking
    /// the binding const. Callers must have already checked
    /// `is_const_anywhere` for `varSet`'s reassignment guard.
    pub async fn set_local(&self, name: &str, value: Value, as_const: bool) {
        let mut guard = self.0.lock().await;
        guard.vars.insert(name.to_string(), value);
        if as_const {
            guard.consts.insert(name.to_string());
        }
    }

    /// Shallow snapshot of the local frame's own bindings, used for trace
    /// diffing.
    pub async fn snapshot_local(&self) -> IndexMap<String, Value> {
        self.0.lock().await.vars.clone()
    }

    /// Full visible snapshot: every name reachable by `get`, with the
    /// nearest frame's binding winning. Used to compute the before/after
    /// state diff recorded in trace events.
    pub async fn snapshot_visible(&self) -> IndexMap<String, Value> {
        let mut chain = Vec::new();
        let mut frame = Some(self.clone());
        while let Some(f) = frame {
            let guard = f.0.lock().await;
            chain.push(guard.vars.clone());
            frame = guard.parent.clone();
        }
        let mut merged = IndexMap::new();
        for frame_vars in chain.into_iter().rev() {
            for (k, v) in frame_vars {
                merged.insert(k, v);
            }
        }
        merged
    }
}
