//! EventSource Stream Example
//!
//! Subscribes to a Server-Sent Events endpoint and prints every message
//! until the server ends the stream with a 204 or Ctrl-C is pressed.
//!
//! Run with: `cargo run -p hpx-eventsource --example eventsource_stream -- <url>`

use std::time::Duration;

use hpx_eventsource::{EventSource, EventSourceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8080/events".to_owned());

    let config = EventSourceConfig::new(url)
        .connect_timeout(Duration::from_secs(10))
        .retry_interval(Duration::from_secs(2));

    let source = EventSource::with_config(config).await?;
    let (handle, mut stream) = source.split();

    let ctrl_c = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.close();
            }
        })
    };

    while let Some(message) = stream.next_event().await {
        println!(
            "id={:?} event={:?} data={:?}",
            message.id(),
            message.name(),
            message.data()
        );
    }

    println!(
        "stream ended: state={} last_event_id={:?}",
        handle.ready_state(),
        handle.last_event_id()
    );
    ctrl_c.abort();
    Ok(())
}
