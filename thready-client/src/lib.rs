mod comment;
pub use comment::{Comment, ResolvedFields};

mod config;
pub use config::{EngineConfig, ReplyCountPolicy, RootInsertion};

mod db;
pub use db::{Deletion, ThreadDb};

mod engine;
pub use engine::ThreadEngine;

mod enrich;
pub use enrich::enrich;

mod feed;
pub use feed::{Change, Feeds};

mod ops;
pub use ops::{NodeKey, OpState, OpTracker};

mod page;
pub use page::{IdList, RootIndex, ThreadBucket};

mod store;
pub use store::CommentStore;

mod fuzz;

pub mod api {
    pub use thready_api::*;
}
