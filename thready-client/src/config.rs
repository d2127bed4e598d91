use anyhow::Context;

use crate::api::ResourceId;

/// Where a freshly created root comment lands in the root index. The server
/// does not mandate a position.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootInsertion {
    #[default]
    Prepend,
    Append,
}

/// What happens to a root's `reply_count` when one of its replies is purged
/// from the client (hard delete). Whether the server decrements is not
/// settled, so this is kept behind a single switch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyCountPolicy {
    #[default]
    Keep,
    Decrement,
}

impl ReplyCountPolicy {
    /// New reply count of a root after `purged` of its replies got purged
    pub fn after_purge(self, reply_count: u64, purged: u64) -> u64 {
        match self {
            ReplyCountPolicy::Keep => reply_count,
            ReplyCountPolicy::Decrement => reply_count.saturating_sub(purged),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub resource: ResourceId,
    pub root_insertion: RootInsertion,
    pub reply_count_on_purge: ReplyCountPolicy,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig::for_resource(ResourceId::stub())
    }
}

impl EngineConfig {
    pub fn for_resource(resource: ResourceId) -> EngineConfig {
        EngineConfig {
            resource,
            root_insertion: RootInsertion::default(),
            reply_count_on_purge: ReplyCountPolicy::default(),
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<EngineConfig> {
        serde_json::from_str(json).context("parsing engine configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_count_policies() {
        assert_eq!(ReplyCountPolicy::Keep.after_purge(3, 2), 3);
        assert_eq!(ReplyCountPolicy::Decrement.after_purge(3, 2), 1);
        assert_eq!(ReplyCountPolicy::Decrement.after_purge(1, 2), 0);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "root-insertion": "append" }"#).unwrap();
        assert_eq!(cfg.root_insertion, RootInsertion::Append);
        assert_eq!(cfg.reply_count_on_purge, ReplyCountPolicy::Keep);
        assert_eq!(cfg.resource, ResourceId::stub());

        assert!(EngineConfig::from_json(r#"{ "root-insertion": "middle" }"#).is_err());
    }
}
