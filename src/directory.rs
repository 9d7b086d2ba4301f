use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

use crate::error::DirectoryError;

/// Contact data held per user, one field per deliverable channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactRecord {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub device_token: Option<String>,
    pub whatsapp: Option<String>,
}

/// Boundary over the external user directory. The dispatcher only resolves
/// recipients; the upsert path exists for the user-data change consumer.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<ContactRecord>, DirectoryError>;

    async fn upsert(&self, record: ContactRecord) -> Result<(), DirectoryError>;
}

pub struct PgDirectory {
    client: tokio_postgres::Client,
}

impl PgDirectory {
    pub async fn connect(database_url: &str) -> Result<Self, DirectoryError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "User directory connection terminated");
            }
        });

        info!("User directory connection established");

        Ok(Self { client })
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<ContactRecord>, DirectoryError> {
        let row = self
            .client
            .query_opt(
                "SELECT uid, name, email, phone_number, device_token, whatsapp \
                 FROM user_contacts WHERE uid = $1",
                &[&uid],
            )
            .await?;

        Ok(row.map(|row| ContactRecord {
            uid: row.get("uid"),
            name: row.get("name"),
            email: row.get("email"),
            phone_number: row.get("phone_number"),
            device_token: row.get("device_token"),
            whatsapp: row.get("whatsapp"),
        }))
    }

    async fn upsert(&self, record: ContactRecord) -> Result<(), DirectoryError> {
        self.client
            .execute(
                "INSERT INTO user_contacts (uid, name, email, phone_number, device_token, whatsapp) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (uid) DO UPDATE SET \
                     name = COALESCE(EXCLUDED.name, user_contacts.name), \
                     email = COALESCE(EXCLUDED.email, user_contacts.email), \
                     phone_number = COALESCE(EXCLUDED.phone_number, user_contacts.phone_number), \
                     device_token = COALESCE(EXCLUDED.device_token, user_contacts.device_token), \
                     whatsapp = COALESCE(EXCLUDED.whatsapp, user_contacts.whatsapp)",
                &[
                    &record.uid,
                    &record.name,
                    &record.email,
                    &record.phone_number,
                    &record.device_token,
                    &record.whatsapp,
                ],
            )
            .await?;

        debug!(uid = %record.uid, "Contact record upserted");

        Ok(())
    }
}

/// HashMap-backed directory for tests and local development.
#[derive(Default)]
pub struct MemoryDirectory {
    records: Mutex<HashMap<String, ContactRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ContactRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.uid.clone(), record))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<ContactRecord>, DirectoryError> {
        Ok(self.records.lock().unwrap().get(uid).cloned())
    }

    async fn upsert(&self, record: ContactRecord) -> Result<(), DirectoryError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.uid.clone(), record);
        Ok(())
    }
}
