use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use notification_dispatcher::{
    api::run_api_server,
    clients::rbmq::RabbitMqClient,
    config::Config,
    directory::PgDirectory,
    dispatch::{Dispatcher, run_cleanup_sweep, run_event_consumer, run_user_data_consumer},
    idempotency::IdempotencyTracker,
    models::channel::Channel,
    providers::{FcmProvider, MailerProvider, SendProvider, TwilioProvider},
    queue::{QueueManager, QueueOptions},
    store::RedisStore,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;

    run(config).await
}

async fn run(config: Config) -> Result<(), Error> {
    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let tracker = Arc::new(IdempotencyTracker::new(
        store,
        Duration::from_secs(config.processing_window_seconds),
    ));

    let directory = Arc::new(PgDirectory::connect(&config.database_url).await?);

    let queues = Arc::new(build_queue_manager(&config));
    queues.initialize().await?;

    if queues.channels().is_empty() {
        return Err(anyhow!("No notification channel is configured"));
    }

    info!(channels = ?queues.channels(), "Notification channels configured");

    let rbmq = Arc::new(RabbitMqClient::connect(&config).await?);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&tracker),
        Arc::clone(&queues),
        directory.clone(),
    ));

    tokio::spawn(run_cleanup_sweep(
        Arc::clone(&tracker),
        Duration::from_secs(config.cleanup_interval_seconds),
    ));

    {
        let config = config.clone();
        let queues = Arc::clone(&queues);
        tokio::spawn(async move {
            if let Err(e) = run_api_server(config, queues).await {
                error!(error = %e, "Health check server terminated");
            }
        });
    }

    {
        let rbmq = Arc::clone(&rbmq);
        let directory = directory.clone();
        tokio::spawn(async move {
            if let Err(e) = run_user_data_consumer(rbmq, directory).await {
                error!(error = %e, "User data consumer terminated");
            }
        });
    }

    tokio::select! {
        result = run_event_consumer(Arc::clone(&rbmq), dispatcher) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    queues.close_all().await;

    info!("Dispatcher stopped");

    Ok(())
}

fn build_queue_manager(config: &Config) -> QueueManager {
    let options = QueueOptions {
        concurrency: config.queue_concurrency,
        retry: config.retry_config(),
    };

    let mut manager = QueueManager::new();

    if let Some(fcm) = config.fcm_config() {
        let provider: Arc<dyn SendProvider> = Arc::new(FcmProvider::new(fcm));
        manager.register(Channel::Push, provider, options.clone());
    }

    if let Some(mailer) = config.mailer_config() {
        let provider: Arc<dyn SendProvider> = Arc::new(MailerProvider::new(mailer));
        manager.register(Channel::Email, provider, options.clone());
    }

    if let Some(twilio) = config.twilio_sms_config() {
        let provider: Arc<dyn SendProvider> = Arc::new(TwilioProvider::new("twilio-sms", twilio));
        manager.register(Channel::Sms, provider, options.clone());
    }

    if let Some(twilio) = config.twilio_whatsapp_config() {
        let provider: Arc<dyn SendProvider> =
            Arc::new(TwilioProvider::new("twilio-whatsapp", twilio));
        manager.register(Channel::Whatsapp, provider, options);
    }

    manager
}
