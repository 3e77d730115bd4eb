use domain::Id;
use serde::{Deserialize, Serialize};

/// Request body carrying a single list name or item text.
#[derive(Debug, Deserialize)]
pub(crate) struct ValueParams {
    pub(crate) value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValueResponse {
    pub(crate) value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct IdResponse {
    pub(crate) id: Id,
}
