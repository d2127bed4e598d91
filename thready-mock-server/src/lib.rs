use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use thready_api::{
    Comment, CommentId, CommentPage, CommentService, Cursor, Error, MemberDirectory, MemberId,
    NewComment, PagingMetadata, Profile, ResourceId, RootListing, Status, ThreadPage, Uuid,
};
use tokio::sync::oneshot;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// In-memory comment backend and member directory
pub struct MockServer(Mutex<State>);

#[derive(Debug)]
struct State {
    page_size: usize,
    current_member: MemberId,
    members: HashMap<MemberId, Profile>,
    unreachable_members: HashSet<MemberId>,

    comments: HashMap<CommentId, Comment>,
    resource_of: HashMap<CommentId, ResourceId>,
    /// Newest first
    roots: HashMap<ResourceId, Vec<CommentId>>,
    /// Oldest first, all depths flattened
    threads: HashMap<CommentId, Vec<CommentId>>,

    /// Cursors are sequence numbers, so that pages stay consistent when
    /// comments get inserted or removed between two fetches
    seqs: HashMap<CommentId, u64>,
    next_seq: u64,

    fail_list: Option<Error>,
    fail_create: Option<Error>,
    fail_delete: Option<Error>,
    hold_list: Option<oneshot::Receiver<()>>,
    hold_create: Option<oneshot::Receiver<()>>,
    hold_delete: Option<oneshot::Receiver<()>>,
}

/// Serializable dump of one resource's thread
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub resource: ResourceId,
    pub page_size: usize,
    pub current_member: MemberId,
    pub members: Vec<Profile>,

    /// Roots newest first, each followed by its thread
    pub comments: Vec<Comment>,
}

impl Fixture {
    pub fn new(resource: ResourceId, member: Profile) -> Fixture {
        Fixture {
            resource,
            page_size: DEFAULT_PAGE_SIZE,
            current_member: member.id,
            members: vec![member],
            comments: Vec::new(),
        }
    }
}

impl State {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn post(&mut self, resource: ResourceId, new: NewComment) -> Result<Comment, Error> {
        new.validate()?;
        let root_id = match new.parent_id {
            None => None,
            Some(p) => {
                let root = self
                    .comments
                    .get(&p)
                    .ok_or(Error::NotFound(p))?
                    .thread_id();
                if self.resource_of.get(&root) != Some(&resource) {
                    return Err(Error::NotFound(p));
                }
                Some(root)
            }
        };
        let c = Comment {
            id: CommentId(Uuid::new_v4()),
            parent_id: new.parent_id,
            root_id,
            status: Status::Active,
            content: Some(new.content),
            author: Some(self.current_member),
            reply_count: 0,
            created_at: Utc::now(),
        };
        let seq = self.seq();
        self.seqs.insert(c.id, seq);
        match root_id {
            None => {
                self.roots.entry(resource).or_default().insert(0, c.id);
                self.resource_of.insert(c.id, resource);
                self.threads.insert(c.id, Vec::new());
            }
            Some(root) => {
                self.threads.entry(root).or_default().push(c.id);
                if let Some(r) = self.comments.get_mut(&root) {
                    r.reply_count += 1;
                }
            }
        }
        self.comments.insert(c.id, c.clone());
        Ok(c)
    }

    fn has_children(&self, c: &Comment) -> bool {
        let thread = self.threads.get(&c.thread_id());
        match thread {
            None => false,
            Some(t) if c.is_root() => !t.is_empty(),
            Some(t) => t
                .iter()
                .any(|r| self.comments.get(r).map_or(false, |r| r.parent_id == Some(c.id))),
        }
    }

    fn remove(&mut self, id: CommentId) -> Result<(), Error> {
        let c = self.comments.get(&id).cloned().ok_or(Error::NotFound(id))?;
        if self.has_children(&c) {
            if let Some(c) = self.comments.get_mut(&id) {
                c.status = Status::Deleted;
                c.content = None;
                c.author = None;
            }
            return Ok(());
        }
        let mut next = Some(c);
        while let Some(c) = next {
            self.comments.remove(&c.id);
            self.seqs.remove(&c.id);
            if c.is_root() {
                self.threads.remove(&c.id);
                if let Some(res) = self.resource_of.remove(&c.id) {
                    if let Some(roots) = self.roots.get_mut(&res) {
                        roots.retain(|r| *r != c.id);
                    }
                }
            } else {
                let root = c.thread_id();
                if let Some(t) = self.threads.get_mut(&root) {
                    t.retain(|r| *r != c.id);
                }
                if let Some(r) = self.comments.get_mut(&root) {
                    r.reply_count = r.reply_count.saturating_sub(1);
                }
            }
            next = c
                .parent_id
                .and_then(|p| self.comments.get(&p).cloned())
                .filter(|p| p.status == Status::Deleted && !self.has_children(p));
        }
        Ok(())
    }

    /// `ids` must be sorted by decreasing seq if `newest_first`, increasing
    /// otherwise
    fn page(
        &self,
        ids: &[CommentId],
        cursor: Option<&Cursor>,
        newest_first: bool,
    ) -> Result<(Vec<CommentId>, PagingMetadata), Error> {
        let after = match cursor {
            None => None,
            Some(Cursor(c)) => Some(
                c.strip_prefix("after-")
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| Error::Unknown(format!("invalid cursor {c:?}")))?,
            ),
        };
        let remaining = ids
            .iter()
            .filter(|id| {
                let seq = self.seqs.get(*id).copied().unwrap_or(0);
                match (after, newest_first) {
                    (None, _) => true,
                    (Some(a), true) => seq < a,
                    (Some(a), false) => seq > a,
                }
            })
            .copied()
            .collect::<Vec<_>>();
        let page = remaining
            .iter()
            .take(self.page_size)
            .copied()
            .collect::<Vec<_>>();
        let paging = match (remaining.len() > page.len(), page.last()) {
            (true, Some(last)) => PagingMetadata::next(Cursor(format!(
                "after-{}",
                self.seqs.get(last).copied().unwrap_or(0)
            ))),
            _ => PagingMetadata::last(),
        };
        Ok((page, paging))
    }

    fn collect(&self, ids: &[CommentId]) -> Vec<Comment> {
        ids.iter()
            .filter_map(|id| self.comments.get(id))
            .cloned()
            .collect()
    }

    fn thread_page(&self, root: CommentId, cursor: Option<&Cursor>) -> Result<ThreadPage, Error> {
        let ids = self.threads.get(&root).ok_or(Error::NotFound(root))?;
        let (ids, paging_metadata) = self.page(ids, cursor, false)?;
        Ok(ThreadPage {
            replies: self.collect(&ids),
            paging_metadata,
        })
    }

    fn root_listing(
        &self,
        resource: ResourceId,
        cursor: Option<&Cursor>,
    ) -> Result<RootListing, Error> {
        let roots = self.roots.get(&resource).cloned().unwrap_or_default();
        let (ids, paging_metadata) = self.page(&roots, cursor, true)?;
        let mut threads = HashMap::with_capacity(ids.len());
        for id in ids.iter() {
            threads.insert(*id, self.thread_page(*id, None)?);
        }
        Ok(RootListing {
            page: CommentPage {
                comments: self.collect(&ids),
                paging_metadata,
            },
            threads,
        })
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(State {
            page_size: DEFAULT_PAGE_SIZE,
            current_member: MemberId::stub(),
            members: HashMap::new(),
            unreachable_members: HashSet::new(),
            comments: HashMap::new(),
            resource_of: HashMap::new(),
            roots: HashMap::new(),
            threads: HashMap::new(),
            seqs: HashMap::new(),
            next_seq: 0,
            fail_list: None,
            fail_create: None,
            fail_delete: None,
            hold_list: None,
            hold_create: None,
            hold_delete: None,
        }))
    }

    pub fn from_fixture(f: Fixture) -> MockServer {
        let server = MockServer::new();
        {
            let mut s = server.0.lock();
            s.page_size = std::cmp::max(1, f.page_size);
            s.current_member = f.current_member;
            s.members = f.members.into_iter().map(|m| (m.id, m)).collect();
            let roots = f.comments.iter().filter(|c| c.is_root()).count() as u64;
            let mut root_idx = 0;
            let mut reply_idx = HashMap::new();
            for c in f.comments {
                let root = c.thread_id();
                let seq = if c.is_root() {
                    root_idx += 1;
                    s.roots.entry(f.resource).or_default().push(c.id);
                    s.resource_of.insert(c.id, f.resource);
                    s.threads.entry(c.id).or_default();
                    roots - root_idx + 1
                } else {
                    s.threads.entry(root).or_default().push(c.id);
                    let idx = reply_idx.entry(root).or_insert(0u64);
                    *idx += 1;
                    *idx
                };
                s.seqs.insert(c.id, seq);
                s.next_seq = std::cmp::max(s.next_seq, seq);
                s.comments.insert(c.id, c);
            }
        }
        server
    }

    pub fn to_fixture(&self, resource: ResourceId) -> Fixture {
        let s = self.0.lock();
        let mut comments = Vec::new();
        for root in s.roots.get(&resource).into_iter().flatten() {
            comments.extend(s.comments.get(root).cloned());
            comments.extend(s.collect(s.threads.get(root).map(|t| t.as_slice()).unwrap_or(&[])));
        }
        Fixture {
            resource,
            page_size: s.page_size,
            current_member: s.current_member,
            members: s.members.values().cloned().collect(),
            comments,
        }
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.0.lock().page_size = std::cmp::max(1, page_size);
    }

    pub fn admin_add_member(&self, name: &str) -> MemberId {
        let id = MemberId(Uuid::new_v4());
        self.0.lock().members.insert(
            id,
            Profile {
                id,
                name: String::from(name),
                avatar_url: None,
            },
        );
        id
    }

    /// Comments created from now on are authored by `member`
    pub fn act_as(&self, member: MemberId) {
        self.0.lock().current_member = member;
    }

    /// Posts a comment directly, bypassing failure injection and holds
    pub fn admin_post(
        &self,
        resource: ResourceId,
        parent: Option<CommentId>,
        text: &str,
    ) -> Result<Comment, Error> {
        self.0.lock().post(
            resource,
            NewComment {
                parent_id: parent,
                content: thready_api::Content::text(text),
            },
        )
    }

    pub fn admin_delete(&self, id: CommentId) -> Result<(), Error> {
        self.0.lock().remove(id)
    }

    pub fn make_unreachable(&self, member: MemberId) {
        self.0.lock().unreachable_members.insert(member);
    }

    pub fn fail_next_list(&self, err: Error) {
        self.0.lock().fail_list = Some(err);
    }

    pub fn fail_next_create(&self, err: Error) {
        self.0.lock().fail_create = Some(err);
    }

    pub fn fail_next_delete(&self, err: Error) {
        self.0.lock().fail_delete = Some(err);
    }

    /// The next root listing is computed right away, but only returned once
    /// the returned sender fires (or is dropped)
    pub fn hold_next_list(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        self.0.lock().hold_list = Some(receiver);
        sender
    }

    /// The next creation is applied server-side, but its response is only
    /// sent once the returned sender fires (or is dropped)
    pub fn hold_next_create(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        self.0.lock().hold_create = Some(receiver);
        sender
    }

    /// Same as `hold_next_create`, for deletions
    pub fn hold_next_delete(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        self.0.lock().hold_delete = Some(receiver);
        sender
    }

    pub fn test_comment(&self, id: CommentId) -> Option<Comment> {
        self.0.lock().comments.get(&id).cloned()
    }

    pub fn test_num_comments(&self) -> usize {
        self.0.lock().comments.len()
    }
}

#[async_trait]
impl CommentService for MockServer {
    async fn list_by_resource(
        &self,
        resource: ResourceId,
        cursor: Option<Cursor>,
    ) -> Result<RootListing, Error> {
        let (res, hold) = {
            let mut s = self.0.lock();
            if let Some(err) = s.fail_list.take() {
                return Err(err);
            }
            let res = s.root_listing(resource, cursor.as_ref());
            (res, s.hold_list.take())
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        res
    }

    async fn list_replies(
        &self,
        root: CommentId,
        cursor: Option<Cursor>,
    ) -> Result<ThreadPage, Error> {
        let mut s = self.0.lock();
        if let Some(err) = s.fail_list.take() {
            return Err(err);
        }
        s.thread_page(root, cursor.as_ref())
    }

    async fn create_comment(
        &self,
        resource: ResourceId,
        comment: NewComment,
    ) -> Result<Comment, Error> {
        let (res, hold) = {
            let mut s = self.0.lock();
            if let Some(err) = s.fail_create.take() {
                return Err(err);
            }
            let res = s.post(resource, comment);
            (res, s.hold_create.take())
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        res
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        let (res, hold) = {
            let mut s = self.0.lock();
            if let Some(err) = s.fail_delete.take() {
                return Err(err);
            }
            let res = s.remove(id);
            (res, s.hold_delete.take())
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        res
    }
}

#[async_trait]
impl MemberDirectory for MockServer {
    async fn get_member(&self, id: MemberId) -> Result<Profile, Error> {
        let s = self.0.lock();
        if s.unreachable_members.contains(&id) {
            return Err(Error::Unavailable(String::from("member directory timed out")));
        }
        s.members
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Unknown(format!("unknown member {id:?}")))
    }
}
