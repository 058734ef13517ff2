use common::UserId;

/// The authenticated subject of a request, supplied by the auth layer.
pub trait CallerIdentity: Send + Sync {
    fn subject(&self) -> UserId;
}

impl CallerIdentity for UserId {
    fn subject(&self) -> UserId {
        *self
    }
}
