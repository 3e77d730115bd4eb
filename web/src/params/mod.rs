//! This module holds typed parameters for various endpoint inputs and outputs.
//!
//! By using typed parameters, request bodies are validated (by type) before they
//! reach the domain layer, and response bodies keep the same shape the clients
//! already expect.

pub(crate) mod todo;
