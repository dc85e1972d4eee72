//! Delete request handed from the HTTP layer to the deletion pipeline.

/// A user's request to delete a set of their short tokens.
///
/// Consumed exactly once by a deletion worker and discarded afterwards; only
/// its effect on storage is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub user_id: String,
    pub tokens: Vec<String>,
}

impl DeleteRequest {
    pub fn new(user_id: impl Into<String>, tokens: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
