//! Quote manager entry point: the composition root that owns every
//! connection handle and threads it into the components.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lapin::options::{ExchangeDeclareOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use tokio::net::lookup_host;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quote_manager::cache::{QuoteCache, RedisQuoteCache};
use quote_manager::config::{Cli, Config};
use quote_manager::intake::RequestIntake;
use quote_manager::interceptor::BroadcastInterceptor;
use quote_manager::legacy::{LegacyQuoteClient, QuoteFetcher};
use quote_manager::publisher::QuoteBroadcaster;
use quote_manager::resolver::QuoteResolver;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        instance_id = %cli.instance_id,
        "Quote Manager v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Destinations are fixed; resolve the quote server once, up front.
    let legacy_addr = lookup_host(config.quote_server.address())
        .await
        .context("resolving the quote server address")?
        .next()
        .with_context(|| format!("no addresses for {}", config.quote_server.address()))?;
    info!(addr = %legacy_addr, "Quote server address resolved");

    let conn = Connection::connect(&config.rabbit.amqp_url(), ConnectionProperties::default())
        .await
        .context("connecting to the broker")?;

    // Make sure the shared queue and exchange exist before anything uses them.
    let setup = conn.create_channel().await?;
    setup
        .queue_declare(
            &config.queues.quote_request,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .context("declaring the request queue")?;
    setup
        .exchange_declare(
            &config.queues.quote_broadcast,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .context("declaring the broadcast exchange")?;

    let redis_client =
        redis::Client::open(config.redis.url()).context("invalid cache store target")?;
    let mut redis_conn = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("connecting to the cache store")?;
    let pong: String = redis::cmd("PING")
        .query_async(&mut redis_conn)
        .await
        .context("cache store did not answer PING")?;
    info!(pong = %pong, "Cache store connected");

    let cache: Arc<dyn QuoteCache> = Arc::new(RedisQuoteCache::new(
        redis_conn,
        config.redis.key_prefix.clone(),
        config.quote_policy.ttl_policy(),
    ));
    let fetcher: Arc<dyn QuoteFetcher> = Arc::new(LegacyQuoteClient::new(
        legacy_addr,
        config.quote_server.retry_policy(),
    ));
    let resolver = Arc::new(QuoteResolver::new(Arc::clone(&cache), fetcher));
    let broadcaster = Arc::new(
        QuoteBroadcaster::new(
            conn.create_channel().await?,
            config.queues.quote_broadcast.clone(),
            cli.instance_id.clone(),
        )
        .await?,
    );

    let intake = RequestIntake::new(
        conn.create_channel().await?,
        config.queues.quote_request.clone(),
        resolver,
        broadcaster,
    );
    let interceptor = BroadcastInterceptor::new(
        conn.create_channel().await?,
        config.queues.quote_broadcast.clone(),
        cli.instance_id.clone(),
        cache,
    );

    let intake_task = tokio::spawn(intake.run());
    let interceptor_task = tokio::spawn(interceptor.run());

    tokio::select! {
        res = intake_task => res.context("request intake task panicked")??,
        res = interceptor_task => res.context("broadcast interceptor task panicked")??,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
