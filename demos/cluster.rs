//! Example of a 3-node cluster in one process.
//!
//! Run with:
//!   RUST_LOG=peercache=debug cargo run --example cluster

use bytes::Bytes;
use peercache::{Error, Group, GroupRegistry, Loader, PeerPool, PeerServer, PoolConfig};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// A slow "database" of scores.
struct ScoresDb {
    node: usize,
    data: HashMap<&'static str, &'static str>,
}

#[async_trait::async_trait]
impl Loader for ScoresDb {
    async fn load(&self, key: &str) -> peercache::Result<Bytes> {
        println!("[node {}] [SlowDB] search key {}", self.node, key);
        tokio::time::sleep(Duration::from_millis(50)).await;

        self.data
            .get(key)
            .map(|value| Bytes::from_static(value.as_bytes()))
            .ok_or_else(|| Error::NotFound(key.to_owned()))
    }
}

struct Node {
    addr: String,
    group: Arc<Group>,
    pool: Arc<PeerPool>,
}

async fn start_node(node: usize) -> Result<Node, Box<dyn std::error::Error>> {
    let registry = Arc::new(GroupRegistry::new());
    let group = registry.new_group(
        "scores",
        2 << 10,
        ScoresDb {
            node,
            data: HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")]),
        },
    );

    let (server, shutdown_tx) = PeerServer::bind("127.0.0.1:0", registry).await?;
    let addr = server.local_addr().to_string();
    tokio::spawn(async move {
        // Keep the shutdown sender alive for as long as the server runs
        let _shutdown_tx = shutdown_tx;
        if let Err(e) = server.run().await {
            eprintln!("server error: {}", e);
        }
    });

    let pool = Arc::new(PeerPool::new(addr.clone(), PoolConfig::default()));
    group.register_peers(pool.clone())?;

    Ok(Node { addr, group, pool })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "peercache=info".to_string()))
        .init();

    let mut nodes = Vec::new();
    for i in 1..=3 {
        nodes.push(start_node(i).await?);
    }

    let addrs: Vec<_> = nodes.iter().map(|n| n.addr.clone()).collect();
    for node in &nodes {
        node.pool.set(&addrs);
    }
    println!("Cluster: {:?}", addrs);

    for key in ["Tom", "Jack", "Sam", "Unknown"] {
        let owner = nodes[0].pool.owner(key).unwrap_or_default();
        println!("\n{} is owned by {}", key, owner);

        for (i, node) in nodes.iter().enumerate() {
            match node.group.get(key).await {
                Ok(value) => println!("[node {}] {} = {}", i + 1, key, value),
                Err(e) => println!("[node {}] {}: {}", i + 1, key, e),
            }
        }
    }

    println!();
    for (i, node) in nodes.iter().enumerate() {
        let stats = node.group.stats();
        let metrics = node.group.metrics_snapshot();
        println!(
            "[node {}] cached={} hits={} peer_loads={} local_loads={}",
            i + 1,
            stats.entries,
            metrics.cache_hits,
            metrics.peer_loads,
            metrics.local_loads
        );
    }

    Ok(())
}
