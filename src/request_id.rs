//! Task-local request id, scoped around each request by the logging
//! middleware so error responses can echo the id without threading it
//! through every call signature.

use std::cell::RefCell;
use std::fmt;

use futures::Future;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        RequestId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

pub async fn scope_request_id<Fut, R>(request_id: RequestId, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(Some(request_id)), future)
        .await
}

pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_id_is_visible_inside_and_gone_outside() {
        assert!(current_request_id().is_none());

        let seen = scope_request_id(RequestId::new("req-7"), async {
            current_request_id().map(|r| r.as_str().to_string())
        })
        .await;
        assert_eq!(seen.as_deref(), Some("req-7"));

        assert!(current_request_id().is_none());
    }
}
