//! MongoDB-backed history.

use super::{HistoryStore, RecordId, StoreError};
use crate::config::Config;
use crate::extract::{Observation, ObservationRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored document layout: the canonical columns with a native date timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub timestamp: BsonDateTime,
    pub product_name: String,
    pub price: String,
    pub price_numeric: Option<f64>,
    pub discount: String,
    pub rating: String,
    pub num_ratings: String,
}

impl From<&Observation> for ObservationDocument {
    fn from(observation: &Observation) -> Self {
        let record = observation.to_record();
        Self {
            id: None,
            timestamp: BsonDateTime::from_millis(record.timestamp.timestamp_millis()),
            product_name: record.product_name,
            price: record.price,
            price_numeric: record.price_numeric,
            discount: record.discount,
            rating: record.rating,
            num_ratings: record.num_ratings,
        }
    }
}

impl ObservationDocument {
    /// Converts back to an observation; `None` if the stored date is out of range.
    pub fn into_observation(self) -> Option<Observation> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp.timestamp_millis())?;
        let record = ObservationRecord {
            timestamp,
            product_name: self.product_name,
            price: self.price,
            price_numeric: self.price_numeric,
            discount: self.discount,
            rating: self.rating,
            num_ratings: self.num_ratings,
        };
        Some(record.into_observation())
    }
}

/// History in a MongoDB collection. Connects lazily and reconnects after any failure.
pub struct MongoStore {
    uri: String,
    database: String,
    collection: String,
    handle: Mutex<Option<Collection<ObservationDocument>>>,
}

impl MongoStore {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
            handle: Mutex::new(None),
        }
    }

    /// Builds a store when a connection URI is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let uri = config.mongodb_uri.as_deref().filter(|u| !u.trim().is_empty())?;
        Some(Self::new(uri, &config.mongodb_database, &config.mongodb_collection))
    }

    async fn connect(&self) -> Result<Collection<ObservationDocument>, StoreError> {
        let mut options = ClientOptions::parse(&self.uri).await?;
        options.server_selection_timeout.get_or_insert(SERVER_SELECTION_TIMEOUT);
        options.app_name.get_or_insert_with(|| env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options)?;
        client.database("admin").run_command(doc! { "ping": 1 }).await?;

        info!("Connected to MongoDB {}.{}", self.database, self.collection);
        Ok(client.database(&self.database).collection(&self.collection))
    }

    /// Returns the cached collection handle, connecting first if needed.
    async fn collection(&self) -> Result<Collection<ObservationDocument>, StoreError> {
        let mut handle = self.handle.lock().await;
        if let Some(collection) = handle.as_ref() {
            return Ok(collection.clone());
        }

        let collection = self.connect().await?;
        *handle = Some(collection.clone());
        Ok(collection)
    }

    async fn reset(&self) {
        *self.handle.lock().await = None;
    }

    async fn query_recent(&self, n: usize) -> Result<Vec<Observation>, StoreError> {
        let collection = self.collection().await?;
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let documents: Vec<ObservationDocument> = collection
            .find(doc! { "price_numeric": { "$ne": null } })
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;

        Ok(documents.into_iter().filter_map(ObservationDocument::into_observation).collect())
    }
}

#[async_trait]
impl HistoryStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn open(&self) -> Result<(), StoreError> {
        match self.collection().await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.reset().await;
                Err(e)
            }
        }
    }

    async fn close(&self) {
        self.reset().await;
        debug!("Released MongoDB connection");
    }

    async fn append(&self, observation: &Observation) -> Result<RecordId, StoreError> {
        let result = async {
            let collection = self.collection().await?;
            let inserted = collection.insert_one(ObservationDocument::from(observation)).await?;
            Ok::<_, StoreError>(
                inserted.inserted_id.as_object_id().map(|id| id.to_hex()).unwrap_or_default(),
            )
        }
        .await;

        if result.is_err() {
            self.reset().await;
        }
        result
    }

    async fn most_recent(&self, n: usize) -> Vec<Observation> {
        match self.query_recent(n).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!("Could not query MongoDB history: {}", e);
                self.reset().await;
                Vec::new()
            }
        }
    }
}
