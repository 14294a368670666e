use std::sync::Arc;

use sqlx::PgPool;

use resonance_ids::SnowflakeGenerator;
use resonance_kv::{KvClient, sequencer};
use resonance_protocol::FanOutEvent;
use resonance_storage::{messages, models::MessageContent, sessions};

use crate::{Error, Result};

/// Shared handle to everything one call to [`ingest`] needs: the Postgres
/// pool, the Redis sequencer, and the process-local id generator.
pub struct Ingester {
    pub pool: PgPool,
    pub kv: KvClient,
    pub ids: Arc<SnowflakeGenerator>,
    pub outbox_topic: String,
}

pub struct Ingested {
    pub message: MessageContent,
    pub event: FanOutEvent,
}

/// One send, per spec §4.3: verify membership, allocate `msg_id` and
/// `seq_id`, then commit content + CAS'd `max_seq_id` + outbox row in a
/// single transaction.
impl Ingester {
    pub async fn ingest(&self, session_id: &str, from_username: &str, content: &str, msg_type: &str) -> Result<Ingested> {
        if !sessions::is_member(&self.pool, session_id, from_username).await? {
            return Err(Error::NotMember);
        }

        let msg_id = self.ids.next_id().map_err(|e| Error::Ids(e.to_string()))?.to_string();
        let seq_id = sequencer::next(&self.kv, session_id).await?;

        let timestamp = chrono::Utc::now().timestamp();
        let event = FanOutEvent {
            msg_id: msg_id.clone(),
            seq_id,
            session_id: session_id.to_string(),
            from_username: from_username.to_string(),
            content: content.to_string(),
            r#type: msg_type.to_string(),
            timestamp,
            trace_headers: Default::default(),
        };
        let payload = serde_json::to_value(&event)?;

        let message = messages::ingest(
            &self.pool,
            &msg_id,
            session_id,
            from_username,
            seq_id,
            content,
            msg_type,
            &self.outbox_topic,
            &payload,
        )
        .await?;

        Ok(Ingested { message, event })
    }
}
