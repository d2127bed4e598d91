use uuid::Uuid;

use crate::{Error, MemberId, Time, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// The thing a thread is attached to (an article, a task, a ticket...)
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    pub fn stub() -> ResourceId {
        ResourceId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Active,
    Deleted,
}

/// Rich-content payload, opaque to everything but the renderer
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Content(pub serde_json::Value);

impl Content {
    pub fn text(s: &str) -> Content {
        Content(serde_json::json!({ "text": s }))
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_value(&self.0)?;
        match &self.0 {
            serde_json::Value::Null => Err(Error::EmptyContent),
            serde_json::Value::String(s) if s.trim().is_empty() => Err(Error::EmptyContent),
            serde_json::Value::Object(o) if o.is_empty() => Err(Error::EmptyContent),
            _ => Ok(()),
        }
    }
}

fn validate_value(v: &serde_json::Value) -> Result<(), Error> {
    match v {
        serde_json::Value::String(s) => crate::validate_string(s),
        serde_json::Value::Array(a) => a.iter().try_for_each(validate_value),
        serde_json::Value::Object(o) => o.iter().try_for_each(|(k, v)| {
            crate::validate_string(k)?;
            validate_value(v)
        }),
        _ => Ok(()),
    }
}

/// A comment as returned by the remote service
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    pub root_id: Option<CommentId>,
    pub status: Status,

    /// Only set for active comments
    pub content: Option<Content>,
    pub author: Option<MemberId>,

    /// Total number of descendants known to the server, only meaningful on roots
    pub reply_count: u64,
    pub created_at: Time,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Id of the thread this comment lives in, which is its own id for roots
    pub fn thread_id(&self) -> CommentId {
        match self.parent_id {
            None => self.id,
            Some(parent) => self.root_id.unwrap_or(parent),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub parent_id: Option<CommentId>,
    pub content: Content,
}

impl NewComment {
    // See comments on other `validate` functions throughout thready-api
    pub fn validate(&self) -> Result<(), Error> {
        self.content.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_validation() {
        assert_eq!(Content::text("hello").validate(), Ok(()));
        assert_eq!(
            Content(serde_json::Value::Null).validate(),
            Err(Error::EmptyContent)
        );
        assert_eq!(
            Content(serde_json::json!({})).validate(),
            Err(Error::EmptyContent)
        );
        assert_eq!(
            Content(serde_json::json!("   ")).validate(),
            Err(Error::EmptyContent)
        );
        assert_eq!(
            Content::text("nul\0byte").validate(),
            Err(Error::NullByteInString(String::from("nul\0byte")))
        );
    }

    #[test]
    fn status_wire_format() {
        assert_eq!(
            serde_json::to_string(&Status::Deleted).unwrap(),
            r#""DELETED""#
        );
        assert_eq!(
            serde_json::from_str::<Status>(r#""ACTIVE""#).unwrap(),
            Status::Active
        );
    }

    #[test]
    fn thread_id_of_nested_reply() {
        let root = CommentId(Uuid::new_v4());
        let parent = CommentId(Uuid::new_v4());
        let c = Comment {
            id: CommentId(Uuid::new_v4()),
            parent_id: Some(parent),
            root_id: Some(root),
            status: Status::Active,
            content: Some(Content::text("x")),
            author: Some(MemberId::stub()),
            reply_count: 0,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(c.thread_id(), root);
        assert!(!c.is_root());
    }
}
