//! Protobuf wire messages exchanged with agents and operators.
//!
//! Field tags are part of the protocol and must never be renumbered.

use std::collections::HashMap;

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ConfigStatus {
    Unset = 0,
    Applying = 1,
    Applied = 2,
    Failed = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CheckStatus {
    New = 0,
    Deleted = 1,
    Modified = 2,
    Same = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TagOperator {
    LogicAnd = 0,
    LogicOr = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RunningStatus {
    Init = 0,
    Online = 1,
    Offline = 2,
}

/// Values of [`CommonResponse::status`]. They mirror HTTP status codes.
pub mod status {
    pub const ACCEPT: i32 = 0;
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const INTERNAL_ERROR: i32 = 500;
    pub const SERVER_BUSY: i32 = 503;
}

// ============================================================================
// SHARED
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub error_message: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentGroupTag {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentAttributes {
    #[prost(string, tag = "1")]
    pub version: String,
    #[prost(string, tag = "2")]
    pub ip: String,
    #[prost(string, tag = "3")]
    pub hostname: String,
    #[prost(map = "string, string", tag = "100")]
    pub extras: HashMap<String, String>,
}

/// A config as an agent reports it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
    #[prost(enumeration = "ConfigStatus", tag = "3")]
    pub status: i32,
    #[prost(string, tag = "4")]
    pub message: String,
}

/// A config as the server hands it out.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigDetail {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub detail: Vec<u8>,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(bool, tag = "5")]
    pub tombstone: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigCheckResult {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub old_version: i64,
    #[prost(int64, tag = "3")]
    pub new_version: i64,
    #[prost(enumeration = "CheckStatus", tag = "4")]
    pub check_status: i32,
    #[prost(bytes = "vec", tag = "5")]
    pub content: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentGroup {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(message, repeated, tag = "3")]
    pub tags: Vec<AgentGroupTag>,
    #[prost(enumeration = "TagOperator", tag = "4")]
    pub tag_operator: i32,
    /// Legacy `key=value` selector. Takes precedence over `tags` when set.
    #[prost(string, tag = "5")]
    pub legacy_tag: String,
    #[prost(int64, tag = "6")]
    pub version: i64,
    /// Config name to Unix nanoseconds it was applied.
    #[prost(map = "string, int64", tag = "7")]
    pub applied_pipeline_configs: HashMap<String, i64>,
    #[prost(map = "string, int64", tag = "8")]
    pub applied_instance_configs: HashMap<String, i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub agent_type: String,
    #[prost(message, optional, tag = "3")]
    pub attributes: Option<AgentAttributes>,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<AgentGroupTag>,
    #[prost(enumeration = "RunningStatus", tag = "5")]
    pub running_status: i32,
    #[prost(int64, tag = "6")]
    pub startup_time: i64,
    #[prost(int32, tag = "7")]
    pub interval: i32,
    #[prost(int64, tag = "8")]
    pub latest_heartbeat: i64,
    #[prost(int64, tag = "9")]
    pub beat_cycle_time: i64,
    #[prost(uint32, tag = "10")]
    pub success_beat_count: u32,
    #[prost(uint32, tag = "11")]
    pub fail_beat_count: u32,
    #[prost(uint64, tag = "12")]
    pub sequence_num: u64,
    #[prost(message, repeated, tag = "13")]
    pub pipeline_configs: Vec<ConfigInfo>,
    #[prost(message, repeated, tag = "14")]
    pub instance_configs: Vec<ConfigInfo>,
}

// ============================================================================
// AGENT API
// ============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub sequence_num: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub instance_id: Vec<u8>,
    #[prost(string, tag = "4")]
    pub agent_type: String,
    #[prost(message, optional, tag = "5")]
    pub attributes: Option<AgentAttributes>,
    #[prost(message, repeated, tag = "6")]
    pub tags: Vec<AgentGroupTag>,
    #[prost(int64, tag = "7")]
    pub startup_time: i64,
    #[prost(int32, tag = "8")]
    pub interval: i32,
    #[prost(message, repeated, tag = "9")]
    pub pipeline_configs: Vec<ConfigInfo>,
    #[prost(message, repeated, tag = "10")]
    pub instance_configs: Vec<ConfigInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, repeated, tag = "3")]
    pub pipeline_check_results: Vec<ConfigCheckResult>,
    #[prost(message, repeated, tag = "4")]
    pub instance_check_results: Vec<ConfigCheckResult>,
    /// Suggested heartbeat interval in seconds. Zero means no suggestion.
    #[prost(int32, tag = "5")]
    pub interval: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchConfigRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub instance_id: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub req_configs: Vec<ConfigInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchConfigResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, repeated, tag = "3")]
    pub config_details: Vec<ConfigDetail>,
}

// ============================================================================
// OPERATOR API
// ============================================================================

/// Reply carrying only the response envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OperatorResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentGroupRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub agent_group: Option<AgentGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupNameRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub group_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAgentGroupResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, optional, tag = "3")]
    pub agent_group: Option<AgentGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListAgentGroupsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, repeated, tag = "3")]
    pub agent_groups: Vec<AgentGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigDetailRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub config_detail: Option<ConfigDetail>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigNameRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub config_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetConfigResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, optional, tag = "3")]
    pub config_detail: Option<ConfigDetail>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListConfigsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, repeated, tag = "3")]
    pub config_details: Vec<ConfigDetail>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigGroupRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub config_name: String,
    #[prost(string, tag = "3")]
    pub group_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppliedConfigsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(string, repeated, tag = "3")]
    pub config_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppliedGroupsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(string, repeated, tag = "3")]
    pub agent_group_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAgentRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub request_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub instance_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAgentResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, optional, tag = "3")]
    pub agent: Option<AgentInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListAgentsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub response_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub common_response: Option<CommonResponse>,
    #[prost(message, repeated, tag = "3")]
    pub agents: Vec<AgentInfo>,
}
