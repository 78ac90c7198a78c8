//! # Example: two_nodes
//!
//! Two nodes share one store and one topic. A scheduler row is added, changed and
//! deleted; both nodes follow every change.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► MemoryStores + LocalTopic (shared)
//!   ├─► node-a (master), node-b (worker): build → start → load_all
//!   │
//!   ├─► write scheduler row 5 ─► sender.notify(Scheduler, Add, 5)
//!   │        topic ─► both dispatchers ─► scheduler.load_from_db(5)
//!   ├─► change row 5           ─► notify(Scheduler, Reload, 5)
//!   └─► delete row 5           ─► notify(Scheduler, Remove, 5)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=clusterbus=debug cargo run --example two_nodes
//! ```

use std::{sync::Arc, time::Duration};

use clusterbus::{
    Action, ClusterTopic, Config, LocalTopic, MemoryStores, Node, ScheduledRun, SchedulerDef, Subsystem,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1) Shared infrastructure
    let stores = MemoryStores::new();
    let topic: Arc<dyn ClusterTopic> = Arc::new(LocalTopic::new("cluster-events", 256));

    // 2) Two nodes; only node-a runs master-only schedulers
    let node_a = Node::builder(Config::default().with_node_id("node-a"))
        .with_stores(stores.stores())
        .with_topic(Arc::clone(&topic))
        .build()?;
    let node_b = Node::builder(Config {
        master: false,
        ..Config::default().with_node_id("node-b")
    })
    .with_stores(stores.stores())
    .with_topic(Arc::clone(&topic))
    .build()?;

    for node in [&node_a, &node_b] {
        let id = node.config().node_id.clone();
        node.bus()
            .register_listener(&node.events().scheduler_executed, move |run: &ScheduledRun| {
                println!("[{id}] scheduler {} fired: {}", run.scheduler_id, run.event_data);
                Ok(())
            });
        node.start().await;
        node.load_all().await;
    }

    // 3) Add
    stores.schedulers.upsert(SchedulerDef {
        id: 5,
        interval: Duration::from_millis(300),
        event_data: "cleanup".into(),
        on_master_only: false,
    });
    node_a.sender().notify(Subsystem::Scheduler, Action::Add, 5).await?;
    tokio::time::sleep(Duration::from_millis(700)).await;

    // 4) Change: master-only now, node-b drops its timer
    stores.schedulers.upsert(SchedulerDef {
        id: 5,
        interval: Duration::from_millis(300),
        event_data: "cleanup (master only)".into(),
        on_master_only: true,
    });
    node_b.sender().notify(Subsystem::Scheduler, Action::Reload, 5).await?;
    tokio::time::sleep(Duration::from_millis(700)).await;

    // 5) Delete
    stores.schedulers.delete(5);
    node_a.sender().notify(Subsystem::Scheduler, Action::Remove, 5).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!(
        "armed after delete: node-a={:?} node-b={:?}",
        node_a.scheduler().scheduled_ids().await,
        node_b.scheduler().scheduled_ids().await
    );

    node_a.shutdown().await?;
    node_b.shutdown().await?;
    Ok(())
}
