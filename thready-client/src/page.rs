use std::collections::HashSet;

use crate::api::{CommentId, Cursor};

/// Ordered, paginated sequence of comment ids. Order is the server's for
/// fetched pages and insertion order for locally created comments; it is
/// never re-sorted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdList {
    ids: Vec<CommentId>,
    members: HashSet<CommentId>,
    cursor: Option<Cursor>,
    has_next_page: bool,
}

/// Top-level comments of the mirrored resource
pub type RootIndex = IdList;

/// Flattened descendants of one root, all nesting levels merged
pub type ThreadBucket = IdList;

impl IdList {
    pub fn new() -> IdList {
        IdList::default()
    }

    /// Appends a fetched page and moves the cursor forward. Returns the ids
    /// that were actually added: pages can overlap when the server-side list
    /// shifted between two fetches, and an id is only ever listed once.
    pub fn append_page<I>(&mut self, ids: I, next: Option<Cursor>) -> Vec<CommentId>
    where
        I: IntoIterator<Item = CommentId>,
    {
        let added = ids
            .into_iter()
            .filter(|id| self.push_back(*id))
            .collect::<Vec<_>>();
        self.has_next_page = next.is_some();
        self.cursor = next;
        added
    }

    pub fn push_back(&mut self, id: CommentId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn push_front(&mut self, id: CommentId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.ids.insert(0, id);
        true
    }

    pub fn remove(&mut self, id: &CommentId) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.ids.retain(|i| i != id);
        true
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.members.contains(id)
    }

    pub fn ids(&self) -> &[CommentId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommentId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Uuid;

    fn ids(n: usize) -> Vec<CommentId> {
        (0..n).map(|_| CommentId(Uuid::new_v4())).collect()
    }

    #[test]
    fn append_page_moves_cursor() {
        let i = ids(4);
        let mut l = IdList::new();
        assert!(!l.has_next_page());

        l.append_page(i[..2].to_vec(), Some(Cursor(String::from("2"))));
        assert!(l.has_next_page());
        assert_eq!(l.cursor(), Some(&Cursor(String::from("2"))));

        l.append_page(i[2..].to_vec(), None);
        assert!(!l.has_next_page());
        assert_eq!(l.cursor(), None);
        assert_eq!(l.ids(), &i[..]);
    }

    #[test]
    fn overlapping_pages_do_not_duplicate() {
        let i = ids(3);
        let mut l = IdList::new();
        l.append_page(i[..2].to_vec(), Some(Cursor(String::from("2"))));
        let added = l.append_page(i[1..].to_vec(), None);
        assert_eq!(added, vec![i[2]]);
        assert_eq!(l.ids(), &i[..]);
    }

    #[test]
    fn local_insertions() {
        let i = ids(3);
        let mut l = IdList::new();
        assert!(l.push_back(i[1]));
        assert!(l.push_front(i[0]));
        assert!(l.push_back(i[2]));
        assert!(!l.push_back(i[0]));
        assert_eq!(l.ids(), &i[..]);

        assert!(l.remove(&i[1]));
        assert!(!l.remove(&i[1]));
        assert!(!l.contains(&i[1]));
        assert_eq!(l.ids(), &[i[0], i[2]]);
    }
}
