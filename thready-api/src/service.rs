use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Comment, CommentId, Cursor, Error, MemberId, NewComment, Profile, ResourceId, RootListing,
    ThreadPage,
};

/// The remote comment backend, as seen by the client
#[async_trait]
pub trait CommentService {
    /// Lists one page of root comments, along with the first page of replies
    /// of each of them
    async fn list_by_resource(
        &self,
        resource: ResourceId,
        cursor: Option<Cursor>,
    ) -> Result<RootListing, Error>;

    /// Lists one page of the flattened descendants of `root`
    async fn list_replies(&self, root: CommentId, cursor: Option<Cursor>)
        -> Result<ThreadPage, Error>;

    async fn create_comment(
        &self,
        resource: ResourceId,
        comment: NewComment,
    ) -> Result<Comment, Error>;

    async fn delete_comment(&self, id: CommentId) -> Result<(), Error>;
}

#[async_trait]
pub trait MemberDirectory {
    async fn get_member(&self, id: MemberId) -> Result<Profile, Error>;
}

#[async_trait]
impl<T: ?Sized + CommentService + Send + Sync> CommentService for Arc<T> {
    async fn list_by_resource(
        &self,
        resource: ResourceId,
        cursor: Option<Cursor>,
    ) -> Result<RootListing, Error> {
        (**self).list_by_resource(resource, cursor).await
    }

    async fn list_replies(
        &self,
        root: CommentId,
        cursor: Option<Cursor>,
    ) -> Result<ThreadPage, Error> {
        (**self).list_replies(root, cursor).await
    }

    async fn create_comment(
        &self,
        resource: ResourceId,
        comment: NewComment,
    ) -> Result<Comment, Error> {
        (**self).create_comment(resource, comment).await
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        (**self).delete_comment(id).await
    }
}

#[async_trait]
impl<T: ?Sized + MemberDirectory + Send + Sync> MemberDirectory for Arc<T> {
    async fn get_member(&self, id: MemberId) -> Result<Profile, Error> {
        (**self).get_member(id).await
    }
}
