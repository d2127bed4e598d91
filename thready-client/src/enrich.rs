use std::collections::{HashMap, HashSet};

use futures::future::join_all;

use crate::{
    api::{self, CommentId, MemberDirectory, MemberId, Profile, Status},
    Comment, ResolvedFields,
};

/// Turns raw comments into display-ready ones.
///
/// `parent_authors` gives the author of parents that are not part of `raw`
/// (usually taken from the store). Every distinct member is fetched once,
/// and a member the directory fails to resolve is shown as unknown rather than
/// failing the whole batch.
pub async fn enrich<M>(
    directory: &M,
    raw: Vec<api::Comment>,
    mut parent_authors: HashMap<CommentId, MemberId>,
) -> Vec<Comment>
where
    M: ?Sized + MemberDirectory,
{
    let active = |c: &&api::Comment| c.status == Status::Active;
    parent_authors.extend(
        raw.iter()
            .filter(active)
            .filter_map(|c| c.author.map(|a| (c.id, a))),
    );
    let wanted = raw
        .iter()
        .filter(active)
        .flat_map(|c| {
            let parent = c.parent_id.and_then(|p| parent_authors.get(&p).copied());
            c.author.into_iter().chain(parent)
        })
        .collect::<HashSet<_>>();
    let profiles = resolve(directory, wanted).await;

    raw.into_iter()
        .map(|c| {
            let mut c = Comment::from(c);
            if c.status == Status::Active {
                if c.author.is_none() {
                    tracing::warn!(id = ?c.id, "active comment has no author");
                }
                let profile = |m: &MemberId| profiles.get(m).cloned();
                c.resolved = ResolvedFields {
                    author: c.author.as_ref().and_then(profile),
                    parent_author: c
                        .parent_id
                        .and_then(|p| parent_authors.get(&p))
                        .and_then(profile),
                };
            }
            c
        })
        .collect()
}

async fn resolve<M>(directory: &M, members: HashSet<MemberId>) -> HashMap<MemberId, Profile>
where
    M: ?Sized + MemberDirectory,
{
    let members = members.into_iter().collect::<Vec<_>>();
    let profiles = join_all(members.iter().map(|m| directory.get_member(*m))).await;
    members
        .into_iter()
        .zip(profiles)
        .map(|(m, p)| match p {
            Ok(p) => (m, p),
            Err(err) => {
                tracing::warn!(member = ?m, %err, "failed resolving member, showing as unknown");
                (m, Profile::unknown(m))
            }
        })
        .collect()
}
