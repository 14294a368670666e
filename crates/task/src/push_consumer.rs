//! Real-time delivery consumer, per spec §4.5.2: looks up recipients' live
//! routes and hands each gateway group off to the `GatewayManager`.

use std::{collections::HashMap, sync::Arc};

use sqlx::PgPool;

use resonance_kv::{KvClient, router};
use resonance_proto::PushMessage;
use resonance_protocol::FanOutEvent;
use resonance_storage::sessions;

use crate::{consumer_pool::EventHandler, gateway_manager::{GatewayManager, PushTask}};

pub struct PushHandler {
    pub pool: PgPool,
    pub kv: KvClient,
    pub manager: Arc<GatewayManager>,
}

#[async_trait::async_trait]
impl EventHandler for PushHandler {
    async fn handle(&self, event: &FanOutEvent) -> anyhow::Result<()> {
        let recipients = sessions::members_excluding(&self.pool, &event.session_id, &event.from_username).await?;
        if recipients.is_empty() {
            return Ok(());
        }

        let routes = router::get_many(&self.kv, &recipients).await?;
        if routes.is_empty() {
            return Ok(());
        }

        let session = sessions::get(&self.pool, &event.session_id).await?;
        let (session_name, session_type) = session.map_or((String::new(), 0), |s| (s.name, s.session_type as i32));

        let mut by_gateway: HashMap<String, Vec<String>> = HashMap::new();
        for (username, entry) in routes {
            by_gateway.entry(entry.gateway_id).or_default().push(username);
        }

        for (gateway_id, to_usernames) in by_gateway {
            let message = PushMessage {
                msg_id: event.msg_id.clone(),
                session_id: event.session_id.clone(),
                seq_id: event.seq_id,
                from_username: event.from_username.clone(),
                content: event.content.clone(),
                msg_type: event.r#type.clone(),
                timestamp: event.timestamp,
                session_name: session_name.clone(),
                session_type,
            };
            // A full queue must fail the whole job so the bus naks and
            // redelivers it — silently dropping a push here would mean a
            // recipient never gets it, with nothing left to retry.
            self.manager.enqueue(&gateway_id, PushTask { to_usernames, message }).await?;
        }

        Ok(())
    }
}
