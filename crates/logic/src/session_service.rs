use sqlx::PgPool;
use tonic::{Request, Response, Status};

use resonance_proto::{
    CreateSessionReply, CreateSessionRequest, GetContactListReply, GetContactListRequest,
    GetHistoryMessagesReply, GetHistoryMessagesRequest, GetSessionListReply, GetSessionListRequest,
    HealthCheckReply, HealthCheckRequest, InboxDeltaEvent, MessageRecord, PullInboxDeltaReply,
    PullInboxDeltaRequest, SearchUserReply, SearchUserRequest, SessionSummary,
    UpdateReadPositionReply, UpdateReadPositionRequest, session_service_server::SessionService,
};
use resonance_storage::{inbox, messages, models::SessionType, sessions};

use crate::Error;

pub struct SessionServiceImpl {
    pub pool: PgPool,
}

#[tonic::async_trait]
impl SessionService for SessionServiceImpl {
    async fn get_session_list(&self, request: Request<GetSessionListRequest>) -> Result<Response<GetSessionListReply>, Status> {
        let req = request.into_inner();
        let rows = sessions::list_for_user(&self.pool, &req.username).await.map_err(Error::from)?;
        let sessions = rows
            .into_iter()
            .map(|(session, unread)| SessionSummary {
                session_id: session.session_id,
                session_type: session.session_type as i32,
                name: session.name,
                unread_count: unread,
            })
            .collect();
        Ok(Response::new(GetSessionListReply { sessions }))
    }

    async fn create_session(&self, request: Request<CreateSessionRequest>) -> Result<Response<CreateSessionReply>, Status> {
        let req = request.into_inner();
        let members: Vec<&str> = req.members.iter().map(String::as_str).collect();

        let session = match SessionType::from_i16(req.session_type as i16) {
            Some(SessionType::Direct) if members.len() == 2 => {
                sessions::create_direct(&self.pool, members[0], members[1]).await.map_err(Error::from)?
            },
            _ => {
                let session_id = uuid::Uuid::new_v4().to_string();
                sessions::create_group(&self.pool, &session_id, &req.name, &req.owner_username, &members)
                    .await
                    .map_err(Error::from)?
            },
        };

        Ok(Response::new(CreateSessionReply { session_id: session.session_id }))
    }

    async fn get_history_messages(&self, request: Request<GetHistoryMessagesRequest>) -> Result<Response<GetHistoryMessagesReply>, Status> {
        let req = request.into_inner();
        let limit = if req.limit > 0 { req.limit as i64 } else { 50 };
        let rows = messages::history(&self.pool, &req.session_id, req.before_seq, limit).await.map_err(Error::from)?;
        let messages = rows
            .into_iter()
            .map(|m| MessageRecord {
                msg_id: m.msg_id,
                session_id: m.session_id,
                sender_username: m.sender_username,
                seq_id: m.seq_id,
                content: m.content,
                msg_type: m.msg_type,
                timestamp: m.created_at.timestamp(),
            })
            .collect();
        Ok(Response::new(GetHistoryMessagesReply { messages }))
    }

    async fn get_contact_list(&self, request: Request<GetContactListRequest>) -> Result<Response<GetContactListReply>, Status> {
        let req = request.into_inner();
        let usernames = sessions::contacts(&self.pool, &req.username).await.map_err(Error::from)?;
        Ok(Response::new(GetContactListReply { usernames }))
    }

    async fn search_user(&self, request: Request<SearchUserRequest>) -> Result<Response<SearchUserReply>, Status> {
        let req = request.into_inner();
        let limit = if req.limit > 0 { req.limit as i64 } else { 20 };
        let usernames = sessions::search_by_prefix(&self.pool, &req.prefix, limit).await.map_err(Error::from)?;
        Ok(Response::new(SearchUserReply { usernames }))
    }

    async fn update_read_position(&self, request: Request<UpdateReadPositionRequest>) -> Result<Response<UpdateReadPositionReply>, Status> {
        let req = request.into_inner();
        let unread_count = sessions::update_read_position(&self.pool, &req.session_id, &req.username, req.seq_id)
            .await
            .map_err(Error::from)?;
        inbox::mark_read(&self.pool, &req.username, &req.session_id, req.seq_id).await.map_err(Error::from)?;
        Ok(Response::new(UpdateReadPositionReply { unread_count }))
    }

    async fn pull_inbox_delta(&self, request: Request<PullInboxDeltaRequest>) -> Result<Response<PullInboxDeltaReply>, Status> {
        let req = request.into_inner();
        let limit = if req.limit > 0 { req.limit as i64 } else { 100 };
        let (rows, has_more) = inbox::pull_delta(&self.pool, &req.username, req.cursor_id, limit).await.map_err(Error::from)?;
        let events = rows
            .into_iter()
            .map(|e| InboxDeltaEvent {
                id: e.id,
                session_id: e.session_id,
                session_name: e.session_name,
                msg_id: e.msg_id,
                seq_id: e.seq_id,
                sender_username: e.sender_username,
                content: e.content,
                msg_type: e.msg_type,
                timestamp: e.created_at.timestamp(),
                is_read: e.is_read,
            })
            .collect();
        Ok(Response::new(PullInboxDeltaReply { events, has_more }))
    }

    async fn health_check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckReply>, Status> {
        Ok(Response::new(HealthCheckReply { ok: true, detail: String::new() }))
    }
}
