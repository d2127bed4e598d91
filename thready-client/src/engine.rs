use std::collections::HashMap;

use futures::channel::mpsc;
use parking_lot::Mutex;

use crate::{
    api::{
        CommentId, CommentPage, CommentService, Content, Cursor, Error, MemberDirectory, MemberId,
        NewComment, RootListing,
    },
    enrich, Change, Comment, Deletion, EngineConfig, Feeds, NodeKey, OpState, OpTracker, ThreadDb,
};

/// A page of roots along with the first page of each of their threads,
/// enriched and ready to be applied
struct Listing {
    roots: Vec<Comment>,
    next: Option<Cursor>,
    threads: Vec<(CommentId, Vec<Comment>, Option<Cursor>)>,
}

impl Listing {
    fn apply(self, db: &mut ThreadDb) {
        let added = db.append_roots(self.roots, self.next);
        for (root, replies, next) in self.threads {
            // A root we already had keeps its own thread pagination
            if added.contains(&root) {
                db.append_replies(root, replies, next);
            }
        }
    }
}

/// Keeps the client-side mirror of one resource's discussion in sync with
/// the remote service.
///
/// Every operation runs its network round-trip without holding any lock,
/// then applies its result to the mirror synchronously. At most one
/// operation is in flight per `NodeKey`: a second one started on the same
/// key is rejected and returns without doing anything.
pub struct ThreadEngine<S, M> {
    service: S,
    directory: M,
    config: EngineConfig,
    db: Mutex<ThreadDb>,
    ops: Mutex<OpTracker>,
    feeds: Mutex<Feeds>,
}

impl<S, M> ThreadEngine<S, M>
where
    S: CommentService,
    M: MemberDirectory,
{
    pub fn new(service: S, directory: M, config: EngineConfig) -> Self {
        ThreadEngine {
            service,
            directory,
            config,
            db: Mutex::new(ThreadDb::new()),
            ops: Mutex::new(OpTracker::new()),
            feeds: Mutex::new(Feeds::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Roots if `parent` is `None`, otherwise the flattened thread of root
    /// `parent`
    pub fn get_comments(&self, parent: Option<CommentId>) -> Vec<Comment> {
        self.db.lock().comments(parent.as_ref())
    }

    pub fn get_comment(&self, id: CommentId) -> Option<Comment> {
        self.db.lock().get(&id).cloned()
    }

    pub fn has_next_page(&self, parent: Option<CommentId>) -> bool {
        self.db.lock().has_next_page(parent.as_ref())
    }

    pub fn state(&self, key: impl Into<NodeKey>) -> OpState {
        self.ops.lock().state(&key.into())
    }

    pub fn is_loading(&self, key: impl Into<NodeKey>) -> bool {
        self.ops.lock().is_saving(&key.into())
    }

    pub fn get_error(&self, key: impl Into<NodeKey>) -> Option<String> {
        self.ops.lock().error(&key.into()).map(String::from)
    }

    /// Copy of the whole mirror
    pub fn snapshot(&self) -> ThreadDb {
        self.db.lock().clone()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Change> {
        self.feeds.lock().subscribe()
    }

    /// Replaces the mirror with the first page of roots, each with the first
    /// page of its thread
    pub async fn initial_load(&self) {
        let key = NodeKey::Root;
        if !self.begin(key) {
            return;
        }
        let res = self.do_initial_load().await;
        self.settle(key, key, res);
    }

    async fn do_initial_load(&self) -> Result<Option<()>, Error> {
        tracing::debug!(resource = ?self.config.resource, "loading discussion");
        self.db.lock().start_journal();
        let listing = match self
            .service
            .list_by_resource(self.config.resource, None)
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                self.db.lock().stop_journal();
                return Err(e);
            }
        };
        let listing = self.enrich_listing(listing).await;
        let mut db = ThreadDb::new();
        listing.apply(&mut db);
        tracing::info!(
            resource = ?self.config.resource,
            roots = db.roots().len(),
            comments = db.store().len(),
            "loaded discussion"
        );
        self.db.lock().replace_with(db);
        self.relay(Change::Loaded);
        Ok(Some(()))
    }

    /// Fetches the next page of roots (`None`) or of root `parent`'s thread.
    /// Does nothing if that list has no next page.
    pub async fn load_more(&self, parent: Option<CommentId>) {
        let cursor = {
            let db = self.db.lock();
            if !db.has_next_page(parent.as_ref()) {
                tracing::debug!(?parent, "no next page to load");
                return;
            }
            db.cursor(parent.as_ref()).cloned()
        };
        let key = NodeKey::from(parent);
        if !self.begin(key) {
            return;
        }
        let res = self.do_load_more(parent, cursor).await;
        self.settle(key, key, res);
    }

    async fn do_load_more(
        &self,
        parent: Option<CommentId>,
        cursor: Option<Cursor>,
    ) -> Result<Option<()>, Error> {
        let applied = match parent {
            None => {
                let listing = self
                    .service
                    .list_by_resource(self.config.resource, cursor.clone())
                    .await?;
                let listing = self.enrich_listing(listing).await;
                let mut db = self.db.lock();
                let fresh = db.cursor(None) == cursor.as_ref();
                if fresh {
                    listing.apply(&mut db);
                }
                fresh
            }
            Some(root) => {
                let page = self.service.list_replies(root, cursor.clone()).await?;
                let parents = self.known_authors(page.replies.iter().filter_map(|c| c.parent_id));
                let replies = enrich(&self.directory, page.replies, parents).await;
                let mut db = self.db.lock();
                let fresh = db.cursor(Some(&root)) == cursor.as_ref();
                if fresh {
                    db.append_replies(root, replies, page.paging_metadata.cursors.next);
                }
                fresh
            }
        };
        if applied {
            tracing::debug!(?parent, "loaded next page");
            self.relay(Change::PageLoaded(parent));
        } else {
            tracing::warn!(?parent, "discarding page fetched for a list that changed meanwhile");
        }
        Ok(Some(()))
    }

    /// Creates a root comment, returning it once listed
    pub async fn create_comment(&self, content: Content) -> Option<Comment> {
        let key = NodeKey::Root;
        if !self.begin(key) {
            return None;
        }
        let res = self.do_create_comment(content).await;
        self.settle(key, key, res)
    }

    async fn do_create_comment(&self, content: Content) -> Result<Option<Comment>, Error> {
        let new = NewComment {
            parent_id: None,
            content,
        };
        new.validate()?;
        tracing::debug!("creating root comment");
        let raw = self
            .service
            .create_comment(self.config.resource, new)
            .await?;
        let c = match enrich(&self.directory, vec![raw], HashMap::new())
            .await
            .into_iter()
            .next()
        {
            None => return Ok(None),
            Some(c) => c,
        };
        let inserted = self
            .db
            .lock()
            .insert_root(c.clone(), self.config.root_insertion);
        if !inserted {
            tracing::warn!(id = ?c.id, "discarding created comment that cannot be listed as a root");
            return Ok(None);
        }
        tracing::info!(id = ?c.id, "created root comment");
        self.relay(Change::Inserted(c.id));
        Ok(Some(c))
    }

    /// Replies to `parent`, which is either `root` itself or a comment of
    /// `root`'s thread.
    ///
    /// The operation is in flight under `parent`, but a failure is recorded
    /// under `root`.
    pub async fn create_reply(
        &self,
        root: CommentId,
        parent: CommentId,
        content: Content,
    ) -> Option<Comment> {
        let key = NodeKey::Comment(parent);
        if !self.begin(key) {
            return None;
        }
        let err_key = NodeKey::Comment(root);
        if err_key != key {
            self.ops.lock().clear_error(&err_key);
            self.relay(Change::OpState(err_key));
        }
        let res = self.do_create_reply(root, parent, content).await;
        self.settle(key, err_key, res)
    }

    async fn do_create_reply(
        &self,
        root: CommentId,
        parent: CommentId,
        content: Content,
    ) -> Result<Option<Comment>, Error> {
        let new = NewComment {
            parent_id: Some(parent),
            content,
        };
        new.validate()?;
        if !self.db.lock().accepts_reply(&root, &parent) {
            return Err(Error::NotFound(parent));
        }
        let parents = self.known_authors(std::iter::once(parent));
        tracing::debug!(?root, ?parent, "creating reply");
        let raw = self
            .service
            .create_comment(self.config.resource, new)
            .await?;
        let c = match enrich(&self.directory, vec![raw], parents)
            .await
            .into_iter()
            .next()
        {
            None => return Ok(None),
            Some(c) => c,
        };
        let id = c.id;
        let (known, inserted) = {
            let mut db = self.db.lock();
            let known = db.thread(&root).map_or(false, |t| t.contains(&id));
            (known, db.insert_reply(root, c))
        };
        match inserted {
            None => {
                tracing::warn!(?id, ?root, ?parent, "discarding reply whose parent went away meanwhile");
                Ok(None)
            }
            Some(c) if known => {
                tracing::debug!(?id, ?root, "created reply was already listed by a reload");
                Ok(Some(c))
            }
            Some(c) => {
                tracing::info!(?id, ?root, ?parent, "created reply");
                self.relay(Change::Inserted(id));
                Ok(Some(c))
            }
        }
    }

    /// Deletes a comment: it gets redacted if it still has descendants, and
    /// purged otherwise. Unknown ids are ignored.
    pub async fn delete_comment(&self, id: CommentId) {
        if !self.db.lock().store().contains(&id) {
            tracing::debug!(?id, "ignoring deletion of a comment that is not loaded");
            return;
        }
        let key = NodeKey::Comment(id);
        if !self.begin(key) {
            return;
        }
        let res = self.do_delete_comment(id).await;
        self.settle(key, key, res);
    }

    async fn do_delete_comment(&self, id: CommentId) -> Result<Option<()>, Error> {
        tracing::debug!(?id, "deleting comment");
        self.service.delete_comment(id).await?;
        let deletion = self
            .db
            .lock()
            .delete(&id, self.config.reply_count_on_purge);
        match deletion {
            None => {
                tracing::warn!(?id, "discarding deletion of a comment that went away meanwhile")
            }
            Some(Deletion::Redacted(id)) => {
                tracing::info!(?id, "redacted comment");
                self.relay(Change::Redacted(id));
            }
            Some(Deletion::Purged(ids)) => {
                tracing::info!(?id, purged = ids.len(), "purged comment");
                for id in ids {
                    self.relay(Change::Purged(id));
                }
            }
        }
        Ok(Some(()))
    }

    async fn enrich_listing(&self, listing: RootListing) -> Listing {
        let RootListing { page, mut threads } = listing;
        let CommentPage {
            comments,
            paging_metadata,
        } = page;
        let pages = comments
            .iter()
            .filter_map(|r| threads.remove(&r.id).map(|t| (r.id, t)))
            .collect::<Vec<_>>();
        for root in threads.keys() {
            tracing::warn!(?root, "ignoring thread page for a root absent from the listing");
        }

        let num_roots = comments.len();
        let mut raw = comments;
        let mut spans = Vec::with_capacity(pages.len());
        for (root, t) in pages {
            spans.push((root, t.replies.len(), t.paging_metadata.cursors.next));
            raw.extend(t.replies);
        }

        // Parents are always part of the listing, as threads come with their root
        let mut enriched = enrich(&self.directory, raw, HashMap::new())
            .await
            .into_iter();
        let roots = enriched.by_ref().take(num_roots).collect();
        let threads = spans
            .into_iter()
            .map(|(root, len, next)| (root, enriched.by_ref().take(len).collect(), next))
            .collect();
        Listing {
            roots,
            next: paging_metadata.cursors.next,
            threads,
        }
    }

    fn known_authors(
        &self,
        parents: impl Iterator<Item = CommentId>,
    ) -> HashMap<CommentId, MemberId> {
        let db = self.db.lock();
        parents
            .filter_map(|p| db.get(&p).and_then(|c| c.author).map(|a| (p, a)))
            .collect()
    }

    fn relay(&self, c: Change) {
        self.feeds.lock().relay(c)
    }

    fn begin(&self, key: NodeKey) -> bool {
        let started = self.ops.lock().begin(key);
        if started {
            self.relay(Change::OpState(key));
        } else {
            tracing::warn!(?key, "rejecting operation, another one is in flight on the same node");
        }
        started
    }

    /// Ends the operation in flight on `key`, recording a failure under
    /// `err_key`
    fn settle<T>(&self, key: NodeKey, err_key: NodeKey, res: Result<Option<T>, Error>) -> Option<T> {
        let (res, failed) = match res {
            Ok(v) => (v, false),
            Err(err) => {
                tracing::info!(?key, ?err_key, %err, "operation failed");
                self.ops.lock().fail(err_key, err.to_string());
                (None, true)
            }
        };
        self.ops.lock().finish(&key);
        self.relay(Change::OpState(key));
        if failed && err_key != key {
            self.relay(Change::OpState(err_key));
        }
        res
    }
}
