use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context};
use thready_client::{
    api::{CommentId, Content, MemberId, Profile, ResourceId, Uuid},
    Comment, EngineConfig, NodeKey, ReplyCountPolicy, RootInsertion, ThreadEngine,
};
use thready_mock_server::{Fixture, MockServer};

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON dump of the discussion to work on
    #[structopt(short, long)]
    fixture: PathBuf,

    /// List new root comments last instead of first
    #[structopt(long)]
    append_roots: bool,

    /// Decrement a root's reply count when one of its replies is purged
    #[structopt(long)]
    decrement_on_purge: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create an empty discussion
    Init {
        /// Name of the member comments get posted as
        member: String,
    },

    /// Print the whole discussion
    Show,

    /// Post a root comment
    Comment { text: String },

    /// Reply to a comment
    Reply {
        root: Uuid,
        parent: Uuid,
        text: String,
    },

    /// Delete a comment
    Delete { id: Uuid },
}

type Engine = ThreadEngine<Arc<MockServer>, Arc<MockServer>>;

fn load_fixture(path: &PathBuf) -> anyhow::Result<Fixture> {
    let data = std::fs::read(path).with_context(|| format!("reading fixture {path:?}"))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing fixture {path:?}"))
}

fn save_fixture(path: &PathBuf, fixture: &Fixture) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(fixture).context("serializing fixture")?;
    std::fs::write(path, data).with_context(|| format!("writing fixture {path:?}"))
}

async fn load_everything(engine: &Engine) -> anyhow::Result<()> {
    engine.initial_load().await;
    while engine.has_next_page(None) {
        engine.load_more(None).await;
        check(engine, NodeKey::Root)?;
    }
    check(engine, NodeKey::Root)?;
    for root in engine.get_comments(None) {
        while engine.has_next_page(Some(root.id)) {
            engine.load_more(Some(root.id)).await;
            check(engine, root.id)?;
        }
    }
    Ok(())
}

fn check(engine: &Engine, key: impl Into<NodeKey>) -> anyhow::Result<()> {
    match engine.get_error(key) {
        None => Ok(()),
        Some(err) => Err(anyhow!("{err}")),
    }
}

fn text(c: &Comment) -> String {
    match &c.content {
        None => String::from("[deleted]"),
        Some(Content(serde_json::Value::Object(o))) => match o.get("text") {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => serde_json::Value::Object(o.clone()).to_string(),
        },
        Some(Content(v)) => v.to_string(),
    }
}

fn name(p: &Option<Profile>) -> &str {
    p.as_ref().map_or("?", |p| p.name.as_str())
}

fn print_comment(c: &Comment, depth: usize) {
    let indent = "    ".repeat(depth);
    match &c.resolved.parent_author {
        Some(to) => println!(
            "{indent}{} {} (to {}): {}",
            c.id.0,
            name(&c.resolved.author),
            to.name,
            text(c)
        ),
        None if c.is_root() => println!(
            "{indent}{} {} [{} replies]: {}",
            c.id.0,
            name(&c.resolved.author),
            c.reply_count,
            text(c)
        ),
        None => println!("{indent}{} {}: {}", c.id.0, name(&c.resolved.author), text(c)),
    }
}

fn show(engine: &Engine) {
    for root in engine.get_comments(None) {
        print_comment(&root, 0);
        let mut depths = HashMap::<CommentId, usize>::new();
        depths.insert(root.id, 0);
        for c in engine.get_comments(Some(root.id)) {
            let depth = c
                .parent_id
                .and_then(|p| depths.get(&p))
                .map_or(1, |d| d + 1);
            depths.insert(c.id, depth);
            print_comment(&c, depth);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    if let Command::Init { member } = &opt.cmd {
        let fixture = Fixture::new(
            ResourceId(Uuid::new_v4()),
            Profile {
                id: MemberId(Uuid::new_v4()),
                name: member.clone(),
                avatar_url: None,
            },
        );
        return save_fixture(&opt.fixture, &fixture);
    }

    let fixture = load_fixture(&opt.fixture)?;
    let resource = fixture.resource;
    let server = Arc::new(MockServer::from_fixture(fixture));
    let mut config = EngineConfig::for_resource(resource);
    if opt.append_roots {
        config.root_insertion = RootInsertion::Append;
    }
    if opt.decrement_on_purge {
        config.reply_count_on_purge = ReplyCountPolicy::Decrement;
    }
    let engine = ThreadEngine::new(server.clone(), server.clone(), config);
    load_everything(&engine)
        .await
        .context("loading discussion")?;
    tracing::debug!(comments = engine.snapshot().store().len(), "discussion loaded");

    match opt.cmd {
        Command::Init { .. } | Command::Show => {
            show(&engine);
            return Ok(());
        }
        Command::Comment { text } => {
            let c = engine.create_comment(Content::text(&text)).await;
            check(&engine, NodeKey::Root).context("posting comment")?;
            if let Some(c) = c {
                println!("{}", c.id.0);
            }
        }
        Command::Reply { root, parent, text } => {
            let (root, parent) = (CommentId(root), CommentId(parent));
            let c = engine.create_reply(root, parent, Content::text(&text)).await;
            check(&engine, root).context("posting reply")?;
            if let Some(c) = c {
                println!("{}", c.id.0);
            }
        }
        Command::Delete { id } => {
            let id = CommentId(id);
            if engine.get_comment(id).is_none() {
                return Err(anyhow!("no comment with id {}", id.0));
            }
            engine.delete_comment(id).await;
            check(&engine, id).context("deleting comment")?;
        }
    }

    engine
        .snapshot()
        .check_invariants()
        .context("checking the discussion after the change")?;
    save_fixture(&opt.fixture, &server.to_fixture(resource))
}
