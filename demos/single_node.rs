//! # Example: single_node
//!
//! A node that is not cluster-aware: modules react to lifecycle events, and a listener
//! row turns `USER_CREATED` into a welcome mail without any code change.
//!
//! ## Run
//! ```bash
//! cargo run --example single_node
//! ```

use std::sync::Arc;

use clusterbus::{
    Action, Config, ConsumerCatalog, ListenerDef, ListenerError, MemoryStores, Module, Node, Subsystem,
    UserEvent,
};
use tracing_subscriber::EnvFilter;

struct Billing;

impl Module for Billing {
    fn name(&self) -> &str {
        "billing"
    }

    fn ordinal(&self) -> i32 {
        20
    }

    fn on_user_created(&self, ev: &UserEvent) -> Result<(), ListenerError> {
        println!("billing: account opened for user {}", ev.user_id);
        Ok(())
    }
}

struct Audit;

impl Module for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    fn ordinal(&self) -> i32 {
        10
    }

    fn on_user_created(&self, ev: &UserEvent) -> Result<(), ListenerError> {
        println!("audit: user {} created", ev.user_id);
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut consumers = ConsumerCatalog::new();
    consumers.register("send_mail", |ev: &UserEvent, data: &[String]| {
        let template = data.first().map(String::as_str).unwrap_or("default");
        println!("mail: `{template}` to {}", ev.email);
        Ok(())
    });

    let stores = MemoryStores::new();
    let node = Node::builder(Config {
        cluster_aware: false,
        ..Config::default()
    })
    .with_stores(stores.stores())
    .with_consumers(consumers)
    .with_module(Arc::new(Billing))
    .with_module(Arc::new(Audit))
    .build()?;

    node.start().await;
    node.load_all().await;

    // Listener row added at runtime; applied locally since there is no topic.
    stores.listeners.upsert(ListenerDef {
        id: 1,
        event_name: "USER_CREATED".into(),
        consumer: "send_mail".into(),
        static_data: vec!["welcome".into()],
    });
    node.sender().notify(Subsystem::EventListener, Action::Add, 1).await?;

    // audit (10) → billing (20) → mail
    let out = node.bus().emit(
        &node.events().user_created,
        &UserEvent {
            user_id: 7,
            email: "grace@example.com".into(),
        },
    );
    println!("delivered={} failed={}", out.delivered, out.failed);

    node.shutdown().await?;
    Ok(())
}
