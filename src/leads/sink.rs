//! Destination for captured leads.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::model::LeadRecord;
use crate::error::DatabaseError;
use crate::store::Database;

/// Receives leads as they are captured.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn submit(&self, lead: LeadRecord) -> Result<(), DatabaseError>;
}

/// Persists leads through the store.
pub struct StoreLeadSink {
    db: Arc<dyn Database>,
}

impl StoreLeadSink {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LeadSink for StoreLeadSink {
    async fn submit(&self, lead: LeadRecord) -> Result<(), DatabaseError> {
        self.db.insert_lead(&lead).await?;
        info!(
            lead_id = %lead.id,
            source = %lead.source,
            interest = ?lead.interest,
            "Lead captured"
        );
        Ok(())
    }
}
