use std::collections::HashMap;

use crate::{Comment, CommentId};

/// Opaque pagination token, never parsed client-side
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Cursor(pub String);

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Cursors {
    pub next: Option<Cursor>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PagingMetadata {
    pub cursors: Cursors,
}

impl PagingMetadata {
    pub fn last() -> PagingMetadata {
        PagingMetadata::default()
    }

    pub fn next(cursor: Cursor) -> PagingMetadata {
        PagingMetadata {
            cursors: Cursors { next: Some(cursor) },
        }
    }
}

/// One page of root comments
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub paging_metadata: PagingMetadata,
}

/// One page of the flattened descendants of a root comment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPage {
    pub replies: Vec<Comment>,
    pub paging_metadata: PagingMetadata,
}

/// Answer to a root listing: the roots, plus the first page of each of their
/// threads
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RootListing {
    pub page: CommentPage,
    pub threads: HashMap<CommentId, ThreadPage>,
}
