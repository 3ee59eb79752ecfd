//! Ping-pong over the in-process loopback transport.
//!
//! Run with `cargo run --example loopback`.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use muxbus::{Config, MemoryTransport, Multiplexer, Payload, Result};

const ROUNDS: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mux = Multiplexer::new(MemoryTransport::new(), Config::default().with_max_listeners(2));
    let rounds = Arc::new(AtomicUsize::new(0));

    let m = mux.clone();
    mux.on("ping", move |payload: Payload| {
        let mux = m.clone();
        async move {
            println!("ping {}", payload.as_str().unwrap_or_default());
            let _ = mux.emit("pong", payload).await;
        }
    })
    .await?;

    let m = mux.clone();
    let counter = rounds.clone();
    mux.on("pong", move |payload: Payload| {
        let mux = m.clone();
        let counter = counter.clone();
        async move {
            println!("pong {}", payload.as_str().unwrap_or_default());
            let round = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if round == ROUNDS {
                let _ = mux.quit().await;
            } else {
                let _ = mux.emit("ping", format!("#{}", round + 1)).await;
            }
        }
    })
    .await?;

    // the catch-all handler does not count against the limit of two
    mux.on_any(|payload: Payload| async move {
        tracing::debug!(?payload, "observed");
    });

    mux.emit("ping", "#1").await?;
    let exit = mux.run().await?;
    println!("stopped after {} rounds ({exit})", rounds.load(Ordering::SeqCst));
    Ok(())
}
