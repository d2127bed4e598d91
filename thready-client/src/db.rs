use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, ensure};

use crate::{
    api::{CommentId, Cursor, Status},
    Comment, CommentStore, IdList, ReplyCountPolicy, RootIndex, RootInsertion, ThreadBucket,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Deletion {
    /// Kept in place, redacted, because it still has descendants
    Redacted(CommentId),

    /// Removed, followed by every redacted ancestor it was the last
    /// descendant of, innermost first
    Purged(Vec<CommentId>),
}

/// Local mutation recorded while a reload is in flight
#[derive(Clone, Debug, Eq, PartialEq)]
enum Replay {
    Root(Comment, RootInsertion),
    Reply(CommentId, Comment),
    Delete(CommentId, ReplyCountPolicy),
}

/// Client-side mirror of one resource's discussion
///
/// Comments live in the store; the root index and the thread buckets only
/// hold ids. All the methods here are synchronous: the engine calls them once
/// the network round-trip of an operation has settled.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadDb {
    store: CommentStore,
    roots: RootIndex,
    threads: HashMap<CommentId, ThreadBucket>,

    /// Set between `start_journal` and `replace_with`
    journal: Option<Vec<Replay>>,
}

impl ThreadDb {
    pub fn new() -> ThreadDb {
        ThreadDb::default()
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    pub fn roots(&self) -> &RootIndex {
        &self.roots
    }

    pub fn thread(&self, root: &CommentId) -> Option<&ThreadBucket> {
        self.threads.get(root)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.store.get(id)
    }

    fn list(&self, parent: Option<&CommentId>) -> Option<&IdList> {
        match parent {
            None => Some(&self.roots),
            Some(root) => self.threads.get(root),
        }
    }

    /// Roots if `parent` is `None`, otherwise the flattened thread of root
    /// `parent`, in list order
    pub fn comments(&self, parent: Option<&CommentId>) -> Vec<Comment> {
        self.list(parent)
            .map(|l| {
                l.iter()
                    .filter_map(|id| self.store.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn cursor(&self, parent: Option<&CommentId>) -> Option<&Cursor> {
        self.list(parent).and_then(|l| l.cursor())
    }

    pub fn has_next_page(&self, parent: Option<&CommentId>) -> bool {
        self.list(parent).map_or(false, |l| l.has_next_page())
    }

    /// Appends a page of roots, returning the newly listed ids
    pub fn append_roots(&mut self, comments: Vec<Comment>, next: Option<Cursor>) -> Vec<CommentId> {
        let mut ids = Vec::with_capacity(comments.len());
        for c in comments {
            if !c.is_root() {
                tracing::warn!(id = ?c.id, "ignoring reply listed among root comments");
                continue;
            }
            ids.push(c.id);
            self.store.upsert(c);
        }
        let added = self.roots.append_page(ids.iter().copied(), next);
        for id in ids {
            self.threads.entry(id).or_default();
            self.ensure_reply_count(&id);
        }
        added
    }

    /// Appends a page of `root`'s thread, returning the newly listed ids
    pub fn append_replies(
        &mut self,
        root: CommentId,
        replies: Vec<Comment>,
        next: Option<Cursor>,
    ) -> Vec<CommentId> {
        if !self.roots.contains(&root) {
            tracing::warn!(?root, "ignoring thread page for a root that is not loaded");
            return Vec::new();
        }
        let mut ids = Vec::with_capacity(replies.len());
        for mut c in replies {
            if c.root_id.is_none() {
                c.root_id = Some(root);
            }
            if c.is_root() || c.thread_id() != root || self.roots.contains(&c.id) {
                tracing::warn!(id = ?c.id, ?root, "ignoring comment listed in a foreign thread");
                continue;
            }
            ids.push(c.id);
            self.store.upsert(c);
        }
        let added = self.threads.entry(root).or_default().append_page(ids, next);
        self.ensure_reply_count(&root);
        added
    }

    // The server's count may lag behind what it already served us
    fn ensure_reply_count(&mut self, root: &CommentId) {
        let loaded = self.threads.get(root).map_or(0, |t| t.len()) as u64;
        if let Some(r) = self.store.get_mut(root) {
            if r.reply_count < loaded {
                tracing::debug!(?root, reply_count = r.reply_count, loaded, "raising stale reply count");
                r.reply_count = loaded;
            }
        }
    }

    /// Starts recording local mutations, so that they survive a reload
    /// fetched before they were applied
    pub fn start_journal(&mut self) {
        self.journal = Some(Vec::new());
    }

    pub fn stop_journal(&mut self) {
        self.journal = None;
    }

    fn record(&mut self, r: Replay) {
        if let Some(j) = &mut self.journal {
            j.push(r);
        }
    }

    /// Swaps in a freshly loaded mirror, then replays onto it every local
    /// mutation recorded since `start_journal`. Mutations the fresh mirror
    /// already reflects are no-ops.
    pub fn replace_with(&mut self, fresh: ThreadDb) {
        let journal = self.journal.take().unwrap_or_default();
        *self = fresh;
        self.journal = None;
        if !journal.is_empty() {
            tracing::debug!(mutations = journal.len(), "replaying local mutations onto reloaded discussion");
        }
        for r in journal {
            match r {
                Replay::Root(c, at) => {
                    self.insert_root(c, at);
                }
                Replay::Reply(root, c) => {
                    self.insert_reply(root, c);
                }
                Replay::Delete(id, policy) => {
                    self.delete(&id, policy);
                }
            }
        }
    }

    /// Lists a freshly created root. Returns false if `c` is not a root or is
    /// already known.
    pub fn insert_root(&mut self, c: Comment, at: RootInsertion) -> bool {
        if !c.is_root() || self.store.contains(&c.id) {
            return false;
        }
        let id = c.id;
        self.record(Replay::Root(c.clone(), at));
        self.store.upsert(c);
        match at {
            RootInsertion::Prepend => self.roots.push_front(id),
            RootInsertion::Append => self.roots.push_back(id),
        };
        self.threads.entry(id).or_default();
        self.ensure_reply_count(&id);
        true
    }

    /// Whether a reply to `parent` can currently be filed in `root`'s thread
    pub fn accepts_reply(&self, root: &CommentId, parent: &CommentId) -> bool {
        self.roots.contains(root)
            && (parent == root || self.threads.get(root).map_or(false, |t| t.contains(parent)))
    }

    /// Appends a freshly created reply to `root`'s thread, whatever its depth,
    /// and counts it on the root. Returns the stored comment, or `None` if
    /// its root or direct parent is gone.
    ///
    /// A reply that is already listed in `root`'s thread (a reload brought it
    /// in first) is returned as stored, without being counted again.
    pub fn insert_reply(&mut self, root: CommentId, mut c: Comment) -> Option<Comment> {
        if self.threads.get(&root).map_or(false, |t| t.contains(&c.id)) {
            return self.store.get(&c.id).cloned();
        }
        let parent = c.parent_id?;
        if !self.accepts_reply(&root, &parent) || self.store.contains(&c.id) {
            return None;
        }
        c.root_id = Some(root);
        if self.store.get(&parent).map_or(true, |p| p.is_deleted()) {
            c.resolved.parent_author = None;
        }
        self.record(Replay::Reply(root, c.clone()));
        self.store.upsert(c.clone());
        self.threads.entry(root).or_default().push_back(c.id);
        if let Some(r) = self.store.get_mut(&root) {
            r.reply_count += 1;
        }
        Some(c)
    }

    /// A root has descendants iff its bucket is non-empty; a reply iff
    /// another comment of the same bucket points to it as its parent
    pub fn has_descendants(&self, id: &CommentId) -> bool {
        let c = match self.store.get(id) {
            None => return false,
            Some(c) => c,
        };
        match self.threads.get(&c.thread_id()) {
            None => false,
            Some(t) if c.is_root() => !t.is_empty(),
            Some(t) => t.iter().filter(|i| *i != id).any(|i| {
                self.store
                    .get(i)
                    .map_or(false, |d| d.parent_id == Some(*id))
            }),
        }
    }

    /// Applies a confirmed deletion. Returns `None` if `id` is not known.
    pub fn delete(&mut self, id: &CommentId, policy: ReplyCountPolicy) -> Option<Deletion> {
        if !self.store.contains(id) {
            return None;
        }
        self.record(Replay::Delete(*id, policy));
        if self.has_descendants(id) {
            self.store.get_mut(id)?.redact();
            return Some(Deletion::Redacted(*id));
        }
        let mut purged = Vec::new();
        let mut next = Some(*id);
        while let Some(id) = next {
            let c = match self.purge(&id, policy) {
                None => break,
                Some(c) => c,
            };
            purged.push(id);
            next = c.parent_id.filter(|p| {
                self.store.get(p).map_or(false, |p| p.is_deleted()) && !self.has_descendants(p)
            });
        }
        Some(Deletion::Purged(purged))
    }

    fn purge(&mut self, id: &CommentId, policy: ReplyCountPolicy) -> Option<Comment> {
        let c = self.store.remove(id)?;
        if c.is_root() {
            self.roots.remove(id);
            if let Some(t) = self.threads.remove(id) {
                if !t.is_empty() {
                    tracing::warn!(root = ?id, replies = t.len(), "purged a root that still had replies");
                }
            }
        } else {
            let root = c.thread_id();
            if let Some(t) = self.threads.get_mut(&root) {
                t.remove(id);
            }
            if let Some(r) = self.store.get_mut(&root) {
                r.reply_count = policy.after_purge(r.reply_count, 1);
            }
        }
        Some(c)
    }

    /// Checks the structural invariants of the mirror
    ///
    /// Two relaxations apply. A redacted comment with no loaded descendant is
    /// accepted while its thread still has unloaded pages, since its
    /// descendants may be on them. An active reply may lack its parent
    /// author, which happens whenever its parent is redacted or not loaded.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        let mut listed = HashSet::new();
        for id in self.roots.iter() {
            ensure!(listed.insert(*id), "{id:?} is listed twice");
            let c = self
                .store
                .get(id)
                .ok_or_else(|| anyhow!("root {id:?} is not in the store"))?;
            ensure!(c.is_root(), "{id:?} is in the root index but has a parent");
            ensure!(self.threads.contains_key(id), "root {id:?} has no thread bucket");
        }
        for (root, t) in self.threads.iter() {
            ensure!(self.roots.contains(root), "thread of unlisted root {root:?}");
            let r = self
                .store
                .get(root)
                .ok_or_else(|| anyhow!("root {root:?} is not in the store"))?;
            ensure!(
                r.reply_count >= t.len() as u64,
                "root {root:?} counts {} replies but {} are loaded",
                r.reply_count,
                t.len()
            );
            for id in t.iter() {
                ensure!(listed.insert(*id), "{id:?} is listed twice");
                let c = self
                    .store
                    .get(id)
                    .ok_or_else(|| anyhow!("reply {id:?} is not in the store"))?;
                ensure!(
                    !c.is_root() && c.thread_id() == *root,
                    "{id:?} is in the thread of {root:?} but does not belong to it"
                );
            }
        }
        ensure!(
            listed.len() == self.store.len(),
            "the store holds {} comments but {} are listed",
            self.store.len(),
            listed.len()
        );
        for c in self.store.values() {
            let active = c.status == Status::Active;
            ensure!(
                c.content.is_some() == active
                    && c.author.is_some() == active
                    && c.resolved.author.is_some() == active
                    && (active || c.resolved.parent_author.is_none()),
                "fields of {:?} do not match its status {:?} (only the parent author may be missing on an active comment)",
                c.id,
                c.status
            );
            if !active {
                // descendants may still be on a page we did not fetch
                let pending = self
                    .threads
                    .get(&c.thread_id())
                    .map_or(false, |t| t.has_next_page());
                ensure!(
                    pending || self.has_descendants(&c.id),
                    "redacted comment {:?} has no descendant left",
                    c.id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{Content, MemberId, Profile, Uuid},
        ResolvedFields,
    };

    fn comment(parent: Option<&Comment>) -> Comment {
        let author = MemberId(Uuid::new_v4());
        Comment {
            id: CommentId(Uuid::new_v4()),
            parent_id: parent.map(|p| p.id),
            root_id: parent.map(|p| p.thread_id()),
            status: Status::Active,
            content: Some(Content::text("lorem ipsum")),
            author: Some(author),
            reply_count: 0,
            created_at: chrono::Utc::now(),
            resolved: ResolvedFields {
                author: Some(Profile::unknown(author)),
                parent_author: parent.and_then(|p| p.author).map(Profile::unknown),
            },
        }
    }

    fn ids(comments: &[Comment]) -> Vec<CommentId> {
        comments.iter().map(|c| c.id).collect()
    }

    /// Root `a` with the given replies as its first (and only) thread page
    fn db_with(a: &Comment, replies: &[&Comment]) -> ThreadDb {
        let mut db = ThreadDb::new();
        let mut a = a.clone();
        a.reply_count = replies.len() as u64;
        db.append_roots(vec![a.clone()], None);
        db.append_replies(a.id, replies.iter().map(|c| (*c).clone()).collect(), None);
        db.check_invariants().unwrap();
        db
    }

    #[test]
    fn replies_land_flat_at_the_end_of_their_thread() {
        let a = comment(None);
        let b = comment(Some(&a));
        let mut db = db_with(&a, &[&b]);
        assert_eq!(db.get(&a.id).unwrap().reply_count, 1);

        let c = comment(Some(&b));
        assert!(db.insert_reply(a.id, c.clone()).is_some());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 2);
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id, c.id]);

        let d = comment(Some(&c));
        assert!(db.insert_reply(a.id, d.clone()).is_some());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 3);
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id, c.id, d.id]);
        db.check_invariants().unwrap();
    }

    #[test]
    fn replies_need_their_root_and_parent() {
        let a = comment(None);
        let b = comment(Some(&a));
        let stray = comment(Some(&comment(None)));
        let mut db = db_with(&a, &[]);

        assert!(db.insert_reply(a.id, comment(Some(&b))).is_none());
        assert!(db.insert_reply(a.id, stray.clone()).is_none());
        assert!(db.insert_reply(CommentId::stub(), comment(Some(&a))).is_none());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 0);
        assert!(db.comments(Some(&a.id)).is_empty());
    }

    #[test]
    fn already_listed_reply_is_returned_uncounted() {
        let a = comment(None);
        let b = comment(Some(&a));
        let mut db = db_with(&a, &[&b]);

        assert_eq!(db.insert_reply(a.id, b.clone()), Some(b.clone()));
        assert_eq!(db.get(&a.id).unwrap().reply_count, 1);
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id]);
        db.check_invariants().unwrap();
    }

    #[test]
    fn reload_replays_local_mutations() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&b));
        let mut db = db_with(&a, &[&b]);
        let fetched = db.clone();

        db.start_journal();
        db.insert_reply(a.id, c.clone()).unwrap();
        db.delete(&b.id, ReplyCountPolicy::Keep);
        db.replace_with(fetched);
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id, c.id]);
        assert!(db.get(&b.id).unwrap().is_deleted());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 2);
        db.check_invariants().unwrap();

        // mutations the reload already reflects are not applied twice
        let d = comment(Some(&a));
        let mut fetched = db.clone();
        db.start_journal();
        db.insert_reply(a.id, d.clone()).unwrap();
        fetched.insert_reply(a.id, d.clone()).unwrap();
        db.replace_with(fetched.clone());
        assert_eq!(db, fetched);

        // nothing is recorded once the journal is off
        db.start_journal();
        db.stop_journal();
        db.delete(&d.id, ReplyCountPolicy::Keep);
        db.replace_with(fetched.clone());
        assert_eq!(db, fetched);
    }

    #[test]
    fn delete_leaf_reply_purges_it() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&a));
        let mut db = db_with(&a, &[&b, &c]);

        assert!(!db.has_descendants(&b.id));
        assert_eq!(
            db.delete(&b.id, ReplyCountPolicy::Keep),
            Some(Deletion::Purged(vec![b.id]))
        );
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![c.id]);
        assert!(db.get(&b.id).is_none());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 2);
        db.check_invariants().unwrap();
    }

    #[test]
    fn delete_reply_with_descendant_redacts_it() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&b));
        let mut db = db_with(&a, &[&b, &c]);

        assert!(db.has_descendants(&b.id));
        assert_eq!(
            db.delete(&b.id, ReplyCountPolicy::Decrement),
            Some(Deletion::Redacted(b.id))
        );
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id, c.id]);
        let redacted = db.get(&b.id).unwrap();
        assert_eq!(redacted.status, Status::Deleted);
        assert_eq!(redacted.content, None);
        assert_eq!(redacted.author, None);
        assert_eq!(redacted.resolved, ResolvedFields::default());
        assert_eq!(db.get(&c.id), Some(&c));
        assert_eq!(db.get(&a.id).unwrap().reply_count, 2);
        db.check_invariants().unwrap();
    }

    #[test]
    fn delete_root_with_replies_keeps_thread() {
        let a = comment(None);
        let b = comment(Some(&a));
        let mut db = db_with(&a, &[&b]);

        assert_eq!(
            db.delete(&a.id, ReplyCountPolicy::Keep),
            Some(Deletion::Redacted(a.id))
        );
        assert_eq!(ids(&db.comments(None)), vec![a.id]);
        assert_eq!(ids(&db.comments(Some(&a.id))), vec![b.id]);
        assert_eq!(db.get(&a.id).unwrap().reply_count, 1);
        db.check_invariants().unwrap();
    }

    #[test]
    fn purging_last_descendant_prunes_redacted_ancestors() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&b));
        let d = comment(Some(&c));
        let mut db = db_with(&a, &[&b, &c, &d]);

        db.delete(&a.id, ReplyCountPolicy::Keep);
        db.delete(&b.id, ReplyCountPolicy::Keep);
        db.delete(&c.id, ReplyCountPolicy::Keep);
        db.check_invariants().unwrap();
        assert_eq!(db.comments(Some(&a.id)).len(), 3);

        assert_eq!(
            db.delete(&d.id, ReplyCountPolicy::Keep),
            Some(Deletion::Purged(vec![d.id, c.id, b.id, a.id]))
        );
        assert!(db.comments(None).is_empty());
        assert!(db.thread(&a.id).is_none());
        assert!(db.store().is_empty());
        db.check_invariants().unwrap();
    }

    #[test]
    fn pruning_stops_at_active_ancestor() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&b));
        let mut db = db_with(&a, &[&b, &c]);

        db.delete(&b.id, ReplyCountPolicy::Keep);
        assert_eq!(
            db.delete(&c.id, ReplyCountPolicy::Decrement),
            Some(Deletion::Purged(vec![c.id, b.id]))
        );
        assert_eq!(ids(&db.comments(None)), vec![a.id]);
        assert!(db.comments(Some(&a.id)).is_empty());
        assert_eq!(db.get(&a.id).unwrap().reply_count, 0);
        db.check_invariants().unwrap();
    }

    #[test]
    fn delete_unknown_is_a_no_op() {
        let a = comment(None);
        let b = comment(Some(&a));
        let mut db = db_with(&a, &[&b]);
        let before = db.clone();
        assert_eq!(db.delete(&CommentId::stub(), ReplyCountPolicy::Decrement), None);
        assert_eq!(db, before);
    }

    #[test]
    fn root_insertion_policy() {
        let a = comment(None);
        let b = comment(None);
        let c = comment(None);
        let mut db = db_with(&a, &[]);
        assert!(db.insert_root(b.clone(), RootInsertion::Prepend));
        assert!(db.insert_root(c.clone(), RootInsertion::Append));
        assert!(!db.insert_root(c.clone(), RootInsertion::Append));
        assert!(!db.insert_root(comment(Some(&a)), RootInsertion::Append));
        assert_eq!(ids(&db.comments(None)), vec![b.id, a.id, c.id]);
        db.check_invariants().unwrap();
    }

    #[test]
    fn stale_reply_count_is_raised() {
        let a = comment(None);
        let b = comment(Some(&a));
        let c = comment(Some(&a));
        let mut db = ThreadDb::new();
        db.append_roots(vec![a.clone()], None);
        db.append_replies(a.id, vec![b, c], Some(Cursor(String::from("2"))));
        assert_eq!(db.get(&a.id).unwrap().reply_count, 2);
        assert!(db.has_next_page(Some(&a.id)));
        assert_eq!(db.cursor(Some(&a.id)), Some(&Cursor(String::from("2"))));
        db.check_invariants().unwrap();
    }

    #[test]
    fn invariants_tolerate_unloaded_descendants_and_missing_parent_author() {
        let a = comment(None);
        let mut b = comment(Some(&a));
        b.redact();
        let mut db = ThreadDb::new();
        db.append_roots(vec![a.clone()], None);
        db.append_replies(a.id, vec![b.clone()], Some(Cursor(String::from("1"))));
        db.check_invariants().unwrap();

        // c replies to the redacted b, so it has no parent author
        let mut c = comment(Some(&b));
        c.resolved.parent_author = None;
        db.append_replies(a.id, vec![c.clone()], None);
        db.check_invariants().unwrap();

        let mut no_author = db.clone();
        no_author.store.get_mut(&c.id).unwrap().resolved.author = None;
        let err = no_author.check_invariants().unwrap_err().to_string();
        assert!(err.contains("only the parent author may be missing"), "{err}");

        let mut childless = ThreadDb::new();
        childless.append_roots(vec![a.clone()], None);
        childless.append_replies(a.id, vec![b.clone()], None);
        let err = childless.check_invariants().unwrap_err().to_string();
        assert!(err.contains("has no descendant left"), "{err}");
    }

    #[test]
    fn foreign_comments_are_not_listed() {
        let a = comment(None);
        let other = comment(None);
        let mut db = ThreadDb::new();
        db.append_roots(vec![a.clone(), comment(Some(&a))], None);
        assert_eq!(ids(&db.comments(None)), vec![a.id]);

        db.append_replies(a.id, vec![comment(Some(&other)), a.clone()], None);
        assert!(db.comments(Some(&a.id)).is_empty());

        assert!(db.append_replies(other.id, vec![comment(Some(&other))], None).is_empty());
        db.check_invariants().unwrap();
    }
}
