use std::{collections::HashMap, time::Instant};

use chrono::Utc;
use lapin::{Connection, ConnectionProperties};
use redis::AsyncCommands;
use tracing::debug;

use crate::{
    config::Config,
    directory::{PgDirectory, UserDirectory},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    config: Config,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("idempotency_store".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq().await);
        checks.insert("user_directory".to_string(), self.check_directory().await);

        let overall_status = Self::determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        let client = match redis::Client::open(self.config.redis_url.as_str()) {
            Ok(client) => client,
            Err(e) => return ServiceHealth::unhealthy(e.to_string()),
        };

        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let probe: Result<Option<String>, _> = conn.get("health:probe").await;
                match probe {
                    Ok(_) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        debug!(response_time_ms = elapsed, "Store health check passed");
                        ServiceHealth::healthy(elapsed)
                    }
                    Err(e) => ServiceHealth::unhealthy(e.to_string()),
                }
            }
            Err(e) => ServiceHealth::unhealthy(e.to_string()),
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match Connection::connect(&self.config.amqp_url, ConnectionProperties::default()).await {
            Ok(connection) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                let _ = connection.close(0, "health check").await;
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => ServiceHealth::unhealthy(e.to_string()),
        }
    }

    async fn check_directory(&self) -> ServiceHealth {
        let start = Instant::now();

        match PgDirectory::connect(&self.config.database_url).await {
            Ok(directory) => match directory.find_by_uid("health:probe").await {
                Ok(_) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "Directory health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => ServiceHealth::unhealthy(e.to_string()),
            },
            Err(e) => ServiceHealth::unhealthy(e.to_string()),
        }
    }

    fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let unhealthy = checks
            .values()
            .filter(|check| check.status == HealthStatus::Unhealthy)
            .count();

        match unhealthy {
            0 => HealthStatus::Healthy,
            n if n < checks.len() => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}
