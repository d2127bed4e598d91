use futures::channel::mpsc;

use crate::{api::CommentId, NodeKey};

/// Notification sent to subscribers after a change has been applied
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change {
    /// The whole mirror got (re)loaded
    Loaded,

    /// A page of roots (`None`) or of a thread got appended
    PageLoaded(Option<CommentId>),

    Inserted(CommentId),
    Redacted(CommentId),
    Purged(CommentId),

    OpState(NodeKey),
}

#[derive(Debug, Default)]
pub struct Feeds(Vec<mpsc::UnboundedSender<Change>>);

impl Feeds {
    pub fn new() -> Feeds {
        Feeds::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Change> {
        // unbounded so that relaying never waits on a slow subscriber
        let (sender, receiver) = mpsc::unbounded();
        self.0.push(sender);
        receiver
    }

    pub fn relay(&mut self, c: Change) {
        self.0.retain(|f| f.unbounded_send(c.clone()).is_ok());
    }
}
