//! Protobuf extractor and response.
//!
//! `Proto<T>` plays the role `Json<T>` plays for JSON APIs: it decodes the
//! request body into a prost message and encodes replies with the
//! `application/x-protobuf` content type.

use crate::constants::PROTOBUF_CONTENT_TYPE;
use crate::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
    response::{IntoResponse, Response},
};
use convoy_core::wire;
use prost::Message;

/// A protobuf request or response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Proto<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Proto<T>
where
    T: Message + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_parameter(format!("Failed to read request body: {}", e)))?;
        T::decode(bytes)
            .map(Proto)
            .map_err(|e| ApiError::invalid_parameter(format!("Malformed protobuf message: {}", e)))
    }
}

impl<T: Message> IntoResponse for Proto<T> {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
            self.0.encode_to_vec(),
        )
            .into_response()
    }
}

// ============================================================================
// REPLY ENVELOPE
// ============================================================================

/// Reply messages carrying `response_id` and `common_response`.
pub trait Envelope: Message + Default {
    fn seal(&mut self, response_id: Vec<u8>, common: wire::CommonResponse);
}

macro_rules! impl_envelope {
    ($($type:ty),* $(,)?) => {
        $(
            impl Envelope for $type {
                fn seal(&mut self, response_id: Vec<u8>, common: wire::CommonResponse) {
                    self.response_id = response_id;
                    self.common_response = Some(common);
                }
            }
        )*
    };
}

impl_envelope!(
    wire::HeartbeatResponse,
    wire::FetchConfigResponse,
    wire::OperatorResponse,
    wire::GetAgentGroupResponse,
    wire::ListAgentGroupsResponse,
    wire::GetConfigResponse,
    wire::ListConfigsResponse,
    wire::AppliedConfigsResponse,
    wire::AppliedGroupsResponse,
    wire::GetAgentResponse,
    wire::ListAgentsResponse,
);

/// Seal a successful reply, or tag the error with the request id.
pub fn reply<T: Envelope>(request_id: Vec<u8>, result: Result<T, impl Into<ApiError>>) -> Result<Proto<T>, ApiError> {
    match result {
        Ok(mut message) => {
            message.seal(request_id, wire::CommonResponse::accept());
            Ok(Proto(message))
        }
        Err(e) => Err(e.into().with_request_id(request_id)),
    }
}
