use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sender is not a member of this session")]
    NotMember,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username already taken")]
    UsernameTaken,

    #[error("id generation failed: {0}")]
    Ids(String),

    #[error(transparent)]
    Storage(#[from] resonance_storage::Error),

    #[error(transparent)]
    Kv(#[from] resonance_kv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tonic::Status {
    fn from(e: Error) -> Self {
        match e {
            Error::NotMember => tonic::Status::permission_denied(e.to_string()),
            Error::InvalidCredentials => tonic::Status::unauthenticated(e.to_string()),
            Error::UsernameTaken => tonic::Status::already_exists(e.to_string()),
            Error::Storage(resonance_storage::Error::SeqCasConflict(_)) => tonic::Status::internal(e.to_string()),
            Error::Storage(resonance_storage::Error::NotFound) => tonic::Status::not_found(e.to_string()),
            _ => tonic::Status::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_member_maps_to_permission_denied() {
        let status: tonic::Status = Error::NotMember.into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn invalid_credentials_maps_to_unauthenticated() {
        let status: tonic::Status = Error::InvalidCredentials.into();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn username_taken_maps_to_already_exists() {
        let status: tonic::Status = Error::UsernameTaken.into();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }

    #[test]
    fn seq_cas_conflict_maps_to_internal() {
        let status: tonic::Status = Error::Storage(resonance_storage::Error::SeqCasConflict("s1".into())).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let status: tonic::Status = Error::Storage(resonance_storage::Error::NotFound).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }
}
