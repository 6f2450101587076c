//! Error Types for the Convoy API
//!
//! This module defines error handling for the transport layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct carried out of every handler
//! - IntoResponse implementation that writes a protobuf `CommonResponse`
//!
//! The integer in `CommonResponse::status` is the authoritative signal. The
//! HTTP status mirrors it.

use crate::constants::PROTOBUF_CONTENT_TYPE;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use convoy_core::{wire, ConfigError, ConvoyError, ErrorKind};
use prost::Message;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes surfaced to agents and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed request, missing field or forbidden value
    InvalidParameter,

    /// Identified entity does not exist
    NotFound,

    /// Creation collides with an existing record
    AlreadyExists,

    /// Config is already applied to the group
    AlreadyApplied,

    /// Config is not applied to the group
    NotApplied,

    /// Hard delete refused while groups reference the config
    StillReferenced,

    /// Heartbeat sequence number did not match
    SequenceOutOfOrder,

    /// Pending queue full or storage too slow
    ServerBusy,

    /// Unexpected storage or serialization failure
    InternalError,
}

impl ErrorCode {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::InvalidParameter => ErrorKind::InvalidParameter,
            ErrorCode::NotFound => ErrorKind::NotFound,
            ErrorCode::AlreadyExists => ErrorKind::AlreadyExists,
            ErrorCode::AlreadyApplied => ErrorKind::AlreadyApplied,
            ErrorCode::NotApplied => ErrorKind::NotApplied,
            ErrorCode::StillReferenced => ErrorKind::StillReferenced,
            ErrorCode::SequenceOutOfOrder => ErrorKind::SequenceOutOfOrder,
            ErrorCode::ServerBusy => ErrorKind::ServerBusy,
            ErrorCode::InternalError => ErrorKind::Internal,
        }
    }

    /// Value for `CommonResponse::status`.
    pub fn status(&self) -> i32 {
        self.kind().wire_status()
    }

    /// HTTP status mirroring [`ErrorCode::status`].
    pub fn status_code(&self) -> StatusCode {
        match self.status() {
            wire::status::BAD_REQUEST => StatusCode::BAD_REQUEST,
            wire::status::NOT_FOUND => StatusCode::NOT_FOUND,
            wire::status::SERVER_BUSY => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "Invalid parameter",
            ErrorCode::NotFound => "Not found",
            ErrorCode::AlreadyExists => "Already exists",
            ErrorCode::AlreadyApplied => "Config already applied to group",
            ErrorCode::NotApplied => "Config not applied to group",
            ErrorCode::StillReferenced => "Config still referenced by groups",
            ErrorCode::SequenceOutOfOrder => "Heartbeat sequence out of order",
            ErrorCode::ServerBusy => "Server busy",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidParameter => ErrorCode::InvalidParameter,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            ErrorKind::AlreadyApplied => ErrorCode::AlreadyApplied,
            ErrorKind::NotApplied => ErrorCode::NotApplied,
            ErrorKind::StillReferenced => ErrorCode::StillReferenced,
            ErrorKind::SequenceOutOfOrder => ErrorCode::SequenceOutOfOrder,
            ErrorKind::ServerBusy => ErrorCode::ServerBusy,
            ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error returned by every handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,

    /// Human-readable message, sent as `error_message`.
    pub message: String,

    /// Echoed as `response_id` so callers can correlate failures.
    pub request_id: Vec<u8>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: Vec::new(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_request_id(mut self, request_id: Vec<u8>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn status(&self) -> i32 {
        self.code.status()
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerBusy, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The reply envelope. Every response message starts with
    /// `response_id` and `common_response`, so this decodes as any of them.
    pub fn to_wire(&self) -> wire::OperatorResponse {
        wire::OperatorResponse {
            response_id: self.request_id.clone(),
            common_response: Some(wire::CommonResponse::failure(self.code.kind(), self.message.clone())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = %self.code, message = %self.message, "Request rejected");
        }
        let body = self.to_wire().encode_to_vec();
        (status, [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ConvoyError> for ApiError {
    fn from(err: ConvoyError) -> Self {
        ApiError::new(ErrorCode::from(err.kind()), err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
