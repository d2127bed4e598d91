use std::collections::HashMap;

use crate::{api::CommentId, Comment};

/// Canonical `id -> Comment` map. Every view dereferences through it, so it
/// is the only place comment data lives.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentStore(HashMap<CommentId, Comment>);

impl CommentStore {
    pub fn new() -> CommentStore {
        CommentStore(HashMap::new())
    }

    /// Inserts or replaces by id, returning the previous version if any
    pub fn upsert(&mut self, c: Comment) -> Option<Comment> {
        self.0.insert(c.id, c)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.0.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        self.0.get_mut(id)
    }

    pub fn remove(&mut self, id: &CommentId) -> Option<Comment> {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Comment> {
        self.0.values()
    }
}
