use std::collections::HashMap;

use crate::api::CommentId;

/// Key under which the loading and error state of operations is tracked
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKey {
    /// Root-level operations: creating a root comment, loading root pages
    Root,
    Comment(CommentId),
}

impl From<Option<CommentId>> for NodeKey {
    fn from(id: Option<CommentId>) -> NodeKey {
        match id {
            None => NodeKey::Root,
            Some(id) => NodeKey::Comment(id),
        }
    }
}

impl From<CommentId> for NodeKey {
    fn from(id: CommentId) -> NodeKey {
        NodeKey::Comment(id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OpState {
    Idle,
    Saving,

    /// Idle, with the message of the last failed attempt
    Failed(String),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct NodeState {
    saving: bool,
    error: Option<String>,
}

/// Per-key operation state.
///
/// Saving and error are tracked separately because a reply records its
/// failure under its root while being in flight under its direct parent.
#[derive(Clone, Debug, Default)]
pub struct OpTracker(HashMap<NodeKey, NodeState>);

impl OpTracker {
    pub fn new() -> OpTracker {
        OpTracker::default()
    }

    pub fn state(&self, key: &NodeKey) -> OpState {
        match self.0.get(key) {
            Some(NodeState { saving: true, .. }) => OpState::Saving,
            Some(NodeState {
                error: Some(e), ..
            }) => OpState::Failed(e.clone()),
            _ => OpState::Idle,
        }
    }

    pub fn is_saving(&self, key: &NodeKey) -> bool {
        self.0.get(key).map_or(false, |s| s.saving)
    }

    pub fn error(&self, key: &NodeKey) -> Option<&str> {
        self.0.get(key).and_then(|s| s.error.as_deref())
    }

    /// Starts an operation on `key`, clearing its last error. Returns false,
    /// changing nothing, if an operation is already in flight on `key`.
    pub fn begin(&mut self, key: NodeKey) -> bool {
        let s = self.0.entry(key).or_default();
        if s.saving {
            return false;
        }
        s.saving = true;
        s.error = None;
        true
    }

    pub fn clear_error(&mut self, key: &NodeKey) {
        if let Some(s) = self.0.get_mut(key) {
            s.error = None;
        }
        self.gc(key);
    }

    pub fn finish(&mut self, key: &NodeKey) {
        if let Some(s) = self.0.get_mut(key) {
            s.saving = false;
        }
        self.gc(key);
    }

    pub fn fail(&mut self, key: NodeKey, message: String) {
        self.0.entry(key).or_default().error = Some(message);
    }

    fn gc(&mut self, key: &NodeKey) {
        if self.0.get(key) == Some(&NodeState::default()) {
            self.0.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Uuid;

    #[test]
    fn lifecycle() {
        let k = NodeKey::Comment(CommentId(Uuid::new_v4()));
        let mut ops = OpTracker::new();
        assert_eq!(ops.state(&k), OpState::Idle);

        assert!(ops.begin(k));
        assert_eq!(ops.state(&k), OpState::Saving);
        assert!(!ops.begin(k));

        ops.finish(&k);
        ops.fail(k, String::from("boom"));
        assert_eq!(ops.state(&k), OpState::Failed(String::from("boom")));
        assert_eq!(ops.error(&k), Some("boom"));

        assert!(ops.begin(k));
        assert_eq!(ops.error(&k), None);
        ops.finish(&k);
        assert_eq!(ops.state(&k), OpState::Idle);
        assert!(ops.0.is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let a = NodeKey::Comment(CommentId(Uuid::new_v4()));
        let mut ops = OpTracker::new();
        assert!(ops.begin(NodeKey::Root));
        assert!(ops.begin(a));
        ops.fail(a, String::from("boom"));
        assert!(ops.is_saving(&NodeKey::Root));
        assert_eq!(ops.error(&NodeKey::Root), None);

        // an error recorded while in flight shows once the key settles
        assert_eq!(ops.state(&a), OpState::Saving);
        ops.finish(&a);
        assert_eq!(ops.state(&a), OpState::Failed(String::from("boom")));
    }

    #[test]
    fn node_key_conversions() {
        let id = CommentId(Uuid::new_v4());
        assert_eq!(NodeKey::from(None), NodeKey::Root);
        assert_eq!(NodeKey::from(Some(id)), NodeKey::Comment(id));
        assert_eq!(NodeKey::from(id), NodeKey::Comment(id));
    }
}
