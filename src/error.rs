use thiserror::Error;

/// Reasons an event cannot be turned into a notification. All of them mean
/// "skip this event"; none are retried.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("room {0} is private")]
    PrivateRoom(String),

    #[error("room {0} has no members")]
    EmptyRoom(String),

    #[error("room {0} not found")]
    UnknownRoom(String),

    #[error("member {member} is no longer in room {room}")]
    ActorLeftRoom { room: String, member: i64 },

    #[error("expected at least {expected} members, found {found}")]
    NotEnoughMembers { expected: usize, found: usize },

    #[error("user {0} not found")]
    UnknownUser(i64),

    #[error("nothing to build for {0}")]
    NothingToBuild(String),

    #[error("no builder registered for {0}")]
    UnexpectedEvent(String),

    #[error("lookup failed: {0}")]
    Lookup(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("device unregistered")]
    Unregistered,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
