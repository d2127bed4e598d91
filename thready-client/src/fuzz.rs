#![cfg(test)]

use std::{cmp, ops::RangeTo, panic::AssertUnwindSafe, sync::Arc};

use thready_mock_server::MockServer;

use crate::{
    api::{CommentId, Content, Error, ResourceId, Status, Uuid},
    EngineConfig, NodeKey, ReplyCountPolicy, RootInsertion, ThreadDb, ThreadEngine,
};

macro_rules! do_tokio_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Reload,
    LoadMore { root: Option<usize> },
    CreateRoot { empty: bool },
    Reply { comment: usize, empty: bool },
    Delete { comment: usize },

    /// Someone else comments, without the engine hearing about it
    ServerPost { parent: Option<usize> },
    FailNextCreate,
    FailNextDelete,
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end);
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1))
}

/// Every mirrored comment in list order, roots each followed by their thread
fn listed(db: &ThreadDb) -> Vec<CommentId> {
    db.roots()
        .iter()
        .flat_map(|r| {
            std::iter::once(*r).chain(db.thread(r).into_iter().flat_map(|t| t.iter().copied()))
        })
        .collect()
}

fn content(empty: bool) -> Content {
    match empty {
        true => Content(serde_json::Value::Null),
        false => Content::text("fuzz"),
    }
}

struct Fuzzer {
    server: Arc<MockServer>,
    resource: ResourceId,
    engine: ThreadEngine<Arc<MockServer>, Arc<MockServer>>,
}

impl Fuzzer {
    fn new(config: EngineConfig) -> Fuzzer {
        let server = Arc::new(MockServer::new());
        server.set_page_size(2);
        let alice = server.admin_add_member("alice");
        server.act_as(alice);
        let resource = config.resource;
        let engine = ThreadEngine::new(server.clone(), server.clone(), config);
        Fuzzer {
            server,
            resource,
            engine,
        }
    }

    fn pick(&self, fuzz_id: usize) -> Option<CommentId> {
        let ids = listed(&self.engine.snapshot());
        resize_int(fuzz_id, ..ids.len()).map(|i| ids[i])
    }

    async fn execute_fuzz_op(&self, op: FuzzOp) {
        match op {
            FuzzOp::Reload => self.engine.initial_load().await,
            FuzzOp::LoadMore { root: None } => self.engine.load_more(None).await,
            FuzzOp::LoadMore { root: Some(r) } => {
                let roots = self.engine.snapshot().roots().ids().to_vec();
                if let Some(r) = resize_int(r, ..roots.len()) {
                    self.engine.load_more(Some(roots[r])).await;
                }
            }
            FuzzOp::CreateRoot { empty } => {
                let res = self.engine.create_comment(content(empty)).await;
                assert_eq!(res.is_none(), self.engine.get_error(NodeKey::Root).is_some());
            }
            FuzzOp::Reply { comment, empty } => {
                if let Some(parent) = self.pick(comment) {
                    let root = self
                        .engine
                        .get_comment(parent)
                        .map(|c| c.thread_id())
                        .expect("picked comment is in the mirror");
                    let res = self.engine.create_reply(root, parent, content(empty)).await;
                    assert_eq!(res.is_none(), self.engine.get_error(root).is_some());
                }
            }
            FuzzOp::Delete { comment } => {
                if let Some(id) = self.pick(comment) {
                    self.engine.delete_comment(id).await;
                }
            }
            FuzzOp::ServerPost { parent } => {
                let parent = match parent {
                    None => None,
                    Some(p) => match self.pick(p) {
                        None => return,
                        Some(p) => Some(p),
                    },
                };
                // the parent may be gone server-side, that's fine
                let _ = self.server.admin_post(self.resource, parent, "elsewhere");
            }
            FuzzOp::FailNextCreate => self
                .server
                .fail_next_create(Error::Unavailable(String::from("fuzz"))),
            FuzzOp::FailNextDelete => self.server.fail_next_delete(Error::PermissionDenied),
        }
    }

    fn check(&self) {
        let db = self.engine.snapshot();
        db.check_invariants()
            .unwrap_or_else(|err| panic!("invariant violated: {err:#}\n{db:#?}"));
        for c in db.store().values() {
            let remote = self
                .server
                .test_comment(c.id)
                .unwrap_or_else(|| panic!("{:?} is mirrored but not on the server", c.id));
            if c.status == Status::Deleted {
                assert_eq!(remote.status, Status::Deleted, "{:?} redacted too early", c.id);
            }
        }
        assert!(!self.engine.is_loading(NodeKey::Root));
    }
}

do_tokio_test!(
    engine_keeps_invariants,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..64usize),
    |ops: Vec<FuzzOp>| async move {
        let resource = ResourceId(Uuid::new_v4());
        let fuzzer = Fuzzer::new(EngineConfig::for_resource(resource));
        fuzzer.engine.initial_load().await;
        for op in ops {
            fuzzer.execute_fuzz_op(op).await;
            fuzzer.check();
        }
    }
);

do_tokio_test!(
    engine_keeps_invariants_with_other_policies,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..64usize),
    |ops: Vec<FuzzOp>| async move {
        let fuzzer = Fuzzer::new(EngineConfig {
            root_insertion: RootInsertion::Append,
            reply_count_on_purge: ReplyCountPolicy::Decrement,
            ..EngineConfig::for_resource(ResourceId(Uuid::new_v4()))
        });
        fuzzer.engine.initial_load().await;
        for op in ops {
            fuzzer.execute_fuzz_op(op).await;
            fuzzer.check();
        }
    }
);
