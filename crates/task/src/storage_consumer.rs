//! Write-expansion consumer, per spec §4.5.1: fans each delivered message
//! out into every session member's inbox, including the sender's own.

use sqlx::PgPool;

use resonance_protocol::FanOutEvent;
use resonance_storage::{inbox, sessions};

use crate::consumer_pool::EventHandler;

pub struct StorageHandler {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl EventHandler for StorageHandler {
    async fn handle(&self, event: &FanOutEvent) -> anyhow::Result<()> {
        let members = sessions::members(&self.pool, &event.session_id).await?;
        let recipients: Vec<String> = members.into_iter().map(|m| m.username).collect();
        inbox::fan_out(&self.pool, &event.session_id, &event.msg_id, event.seq_id, &recipients).await?;
        Ok(())
    }
}
