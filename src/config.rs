//! # Node configuration.
//!
//! Provides [`Config`], the settings one node of the cluster runs with.
//!
//! Config is used in two ways:
//! 1. **Node creation**: `Node::builder(config)`
//! 2. **Event sending**: [`Config::cluster_aware`] picks between topic publish and local apply
//!
//! ## Environment
//! [`Config::from_env`] reads:
//!
//! | variable                    | field            | default          |
//! |-----------------------------|------------------|------------------|
//! | `CLUSTERBUS_NODE_ID`        | `node_id`        | `node-1`         |
//! | `CLUSTERBUS_TOPIC`          | `topic`          | `cluster-events` |
//! | `CLUSTERBUS_TOPIC_CAPACITY` | `topic_capacity` | `1024`           |
//! | `CLUSTERBUS_CLUSTER_AWARE`  | `cluster_aware`  | `true`           |
//! | `CLUSTERBUS_MASTER`         | `master`         | `true`           |
//! | `CLUSTERBUS_GRACE_MS`       | `grace`          | `5000`           |

use std::time::Duration;

use envconfig::Envconfig;

/// Well-known topic carrying cluster events.
pub const DEFAULT_TOPIC: &str = "cluster-events";

/// Configuration of a single node.
///
/// ## Field semantics
/// - `node_id`: identifies this node in logs
/// - `topic`: name of the cluster-event topic
/// - `topic_capacity`: ring buffer size of a local topic (min 1; clamped)
/// - `cluster_aware`: `false` = single node, cluster events are applied locally without a topic
/// - `master`: only a master node arms schedulers flagged `on_master_only`
/// - `grace`: how long shutdown waits for timers and the cluster listener to stop
#[derive(Clone, Debug)]
pub struct Config {
    /// Node identifier used in log fields.
    pub node_id: String,

    /// Cluster-event topic name.
    pub topic: String,

    /// Capacity of the broadcast ring buffer behind a [`LocalTopic`](crate::LocalTopic).
    ///
    /// Nodes lagging more than `topic_capacity` messages skip the oldest ones.
    pub topic_capacity: usize,

    /// Whether cluster events travel over the topic.
    pub cluster_aware: bool,

    /// Whether this node arms master-only schedulers.
    pub master: bool,

    /// Maximum time shutdown waits for background tasks.
    pub grace: Duration,
}

impl Config {
    /// Loads the configuration from `CLUSTERBUS_*` environment variables.
    pub fn from_env() -> Result<Self, envconfig::Error> {
        EnvConfig::init_from_env().map(Into::into)
    }

    /// Returns a topic capacity clamped to a minimum of 1.
    #[inline]
    pub fn topic_capacity_clamped(&self) -> usize {
        self.topic_capacity.max(1)
    }

    /// Returns a copy with a different node id (handy for multi-node tests).
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `node_id = "node-1"`
    /// - `topic = "cluster-events"`
    /// - `topic_capacity = 1024`
    /// - `cluster_aware = true`
    /// - `master = true`
    /// - `grace = 5s`
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            topic_capacity: 1024,
            cluster_aware: true,
            master: true,
            grace: Duration::from_secs(5),
        }
    }
}

#[derive(Envconfig)]
struct EnvConfig {
    #[envconfig(from = "CLUSTERBUS_NODE_ID", default = "node-1")]
    node_id: String,

    #[envconfig(from = "CLUSTERBUS_TOPIC", default = "cluster-events")]
    topic: String,

    #[envconfig(from = "CLUSTERBUS_TOPIC_CAPACITY", default = "1024")]
    topic_capacity: usize,

    #[envconfig(from = "CLUSTERBUS_CLUSTER_AWARE", default = "true")]
    cluster_aware: bool,

    #[envconfig(from = "CLUSTERBUS_MASTER", default = "true")]
    master: bool,

    #[envconfig(from = "CLUSTERBUS_GRACE_MS", default = "5000")]
    grace_ms: u64,
}

impl From<EnvConfig> for Config {
    fn from(env: EnvConfig) -> Self {
        Self {
            node_id: env.node_id,
            topic: env.topic,
            topic_capacity: env.topic_capacity,
            cluster_aware: env.cluster_aware,
            master: env.master,
            grace: Duration::from_millis(env.grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_capacity_clamped() {
        let cfg = Config {
            topic_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.topic_capacity_clamped(), 1);
    }

    #[test]
    fn test_env_defaults_match_default() {
        let env = EnvConfig::init_from_hashmap(&Default::default()).expect("defaults parse");
        let cfg: Config = env.into();
        let def = Config::default();
        assert_eq!(cfg.topic, def.topic);
        assert_eq!(cfg.topic_capacity, def.topic_capacity);
        assert_eq!(cfg.cluster_aware, def.cluster_aware);
        assert_eq!(cfg.master, def.master);
        assert_eq!(cfg.grace, def.grace);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("CLUSTERBUS_NODE_ID", "worker-3"),
            ("CLUSTERBUS_CLUSTER_AWARE", "false"),
            ("CLUSTERBUS_MASTER", "false"),
            ("CLUSTERBUS_GRACE_MS", "250"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let cfg: Config = EnvConfig::init_from_hashmap(&vars).expect("parse").into();
        assert_eq!(cfg.node_id, "worker-3");
        assert!(!cfg.cluster_aware);
        assert!(!cfg.master);
        assert_eq!(cfg.grace, Duration::from_millis(250));
    }
}
