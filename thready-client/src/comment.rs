use crate::api::{self, CommentId, Content, MemberId, Profile, Status, Time};

/// Display-ready data attached to an active comment by the enrichment pipeline
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedFields {
    pub author: Option<Profile>,

    /// Author of the direct parent; absent for roots, and for replies whose
    /// parent is redacted or not materialized.
    ///
    /// This is the only resolved field that an active comment may lack.
    pub parent_author: Option<Profile>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    pub root_id: Option<CommentId>,
    pub status: Status,
    pub content: Option<Content>,
    pub author: Option<MemberId>,

    /// Authoritative descendant count, only meaningful on roots. May exceed
    /// the number of replies currently loaded.
    pub reply_count: u64,
    pub created_at: Time,

    pub resolved: ResolvedFields,
}

impl From<api::Comment> for Comment {
    fn from(c: api::Comment) -> Comment {
        let mut res = Comment {
            id: c.id,
            parent_id: c.parent_id,
            root_id: c.root_id,
            status: c.status,
            content: c.content,
            author: c.author,
            reply_count: c.reply_count,
            created_at: c.created_at,
            resolved: ResolvedFields::default(),
        };
        if res.is_deleted() {
            res.redact();
        }
        res
    }
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }

    /// Id of the root anchoring this comment's thread (self for roots)
    pub fn thread_id(&self) -> CommentId {
        match self.parent_id {
            None => self.id,
            Some(parent) => self.root_id.unwrap_or(parent),
        }
    }

    /// Soft-deletes this comment, keeping only its position in the tree
    pub fn redact(&mut self) {
        self.status = Status::Deleted;
        self.content = None;
        self.author = None;
        self.resolved = ResolvedFields::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Uuid;

    #[test]
    fn deleted_comments_arrive_redacted() {
        let c = Comment::from(api::Comment {
            id: CommentId(Uuid::new_v4()),
            parent_id: None,
            root_id: None,
            status: Status::Deleted,
            content: Some(Content::text("leaked")),
            author: Some(MemberId::stub()),
            reply_count: 3,
            created_at: chrono::Utc::now(),
        });
        assert!(c.is_deleted());
        assert_eq!(c.content, None);
        assert_eq!(c.author, None);
        assert_eq!(c.reply_count, 3);
    }
}
