//! Process entry point: parses CLI args, loads configuration, wires the AWS
//! clients, and runs the consumer loop alongside the health HTTP server
//! until a shutdown signal arrives (spec §6.3).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wifi_scan_pipeline::clients::delivery::FirehoseDeliveryClient;
use wifi_scan_pipeline::clients::object_store::S3ObjectStoreClient;
use wifi_scan_pipeline::clients::queue::SqsQueueClient;
use wifi_scan_pipeline::clients::{DeliveryClient, ObjectStoreClient, QueueClient};
use wifi_scan_pipeline::config::Settings;
use wifi_scan_pipeline::consumer::{Consumer, ConsumerStats};
use wifi_scan_pipeline::delivery::DeliveryBatcher;
use wifi_scan_pipeline::dispatch::FeedDispatcher;
use wifi_scan_pipeline::health::{self, HealthState};

#[derive(Debug, Parser)]
#[command(name = "wifi-scan-pipeline", about = "Normalizes WiFi-scan files into measurement records")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "PIPELINE_CONFIG", default_value = "config/pipeline.toml")]
    config: PathBuf,

    /// `json` for structured logs, `pretty` for local development.
    #[arg(long, env = "PIPELINE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let settings = Arc::new(Settings::load(&cli.config).context("loading configuration")?);

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let queue: Arc<dyn QueueClient> = Arc::new(SqsQueueClient::new(
        aws_sdk_sqs::Client::new(&aws_config),
        settings.queue_url.clone(),
    ));
    let object_store: Arc<dyn ObjectStoreClient> =
        Arc::new(S3ObjectStoreClient::new(aws_sdk_s3::Client::new(&aws_config)));
    let delivery_client: Arc<dyn DeliveryClient> =
        Arc::new(FirehoseDeliveryClient::new(aws_sdk_firehose::Client::new(&aws_config)));

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let delivery = Arc::new(DeliveryBatcher::new(delivery_client.clone(), &settings));
    let dispatcher = Arc::new(FeedDispatcher::from_settings(
        settings.clone(),
        object_store,
        delivery.clone(),
    ));
    let stats = Arc::new(ConsumerStats::default());

    let health_state = HealthState::new(
        queue.clone(),
        delivery_client,
        settings.stream_name.clone(),
        stats.clone(),
        Duration::from_secs(settings.delivery_timeout_secs),
        metrics_handle,
    );
    let health_router = health::router(health_state);
    let health_addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.health_port));

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(settings.clone(), queue, dispatcher, stats);

    let consumer_cancel = cancel.clone();
    let consumer_task = tokio::spawn(async move { consumer.run(consumer_cancel).await });

    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        axum::Server::bind(&health_addr)
            .serve(health_router.into_make_service())
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await.context("awaiting shutdown signal")?;
    tracing::info!(message = "shutdown signal received, draining.");
    cancel.cancel();

    let _ = consumer_task.await;
    let _ = server_task.await;
    delivery.close(Duration::from_millis(settings.shutdown_deadline_ms)).await;

    Ok(())
}
