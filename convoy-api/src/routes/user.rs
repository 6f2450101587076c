//! Operator API
//!
//! Group, config and agent management under `/User`. Only a primary
//! instance mounts these routes. Config routes exist once per kind, e.g.
//! `/User/CreatePipelineConfig` and `/User/CreateInstanceConfig`.

use crate::error::{ApiError, ApiResult};
use crate::proto::{reply, Proto};
use crate::services::agent_info;
use crate::state::AppState;
use axum::{extract::State, routing::post, Router};
use convoy_core::{wire, BodyMode, ConfigKind};

type Reply<T> = ApiResult<Proto<T>>;

// ============================================================================
// AGENT GROUPS
// ============================================================================

pub async fn create_agent_group(
    State(state): State<AppState>,
    Proto(req): Proto<wire::AgentGroupRequest>,
) -> Reply<wire::OperatorResponse> {
    let result = state.plane.create_group(req.agent_group).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

pub async fn update_agent_group(
    State(state): State<AppState>,
    Proto(req): Proto<wire::AgentGroupRequest>,
) -> Reply<wire::OperatorResponse> {
    let result = state.plane.update_group(req.agent_group).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

pub async fn delete_agent_group(
    State(state): State<AppState>,
    Proto(req): Proto<wire::GroupNameRequest>,
) -> Reply<wire::OperatorResponse> {
    let result = state.plane.delete_group(&req.group_name).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

pub async fn get_agent_group(
    State(state): State<AppState>,
    Proto(req): Proto<wire::GroupNameRequest>,
) -> Reply<wire::GetAgentGroupResponse> {
    let result = state.plane.get_group(&req.group_name).await;
    reply(
        req.request_id,
        result.map(|group| wire::GetAgentGroupResponse {
            agent_group: Some(group.to_wire()),
            ..Default::default()
        }),
    )
}

pub async fn list_agent_groups(
    State(state): State<AppState>,
    Proto(req): Proto<wire::ListRequest>,
) -> Reply<wire::ListAgentGroupsResponse> {
    let groups = state.plane.list_groups().await;
    let message = wire::ListAgentGroupsResponse {
        agent_groups: groups.iter().map(|g| g.to_wire()).collect(),
        ..Default::default()
    };
    reply(req.request_id, Ok::<_, ApiError>(message))
}

// ============================================================================
// AGENTS
// ============================================================================

pub async fn list_agents(
    State(state): State<AppState>,
    Proto(req): Proto<wire::GroupNameRequest>,
) -> Reply<wire::ListAgentsResponse> {
    let result = state.plane.list_agents(&req.group_name).await;
    reply(
        req.request_id,
        result.map(|views| wire::ListAgentsResponse {
            agents: views.iter().map(agent_info).collect(),
            ..Default::default()
        }),
    )
}

pub async fn get_agent(
    State(state): State<AppState>,
    Proto(req): Proto<wire::GetAgentRequest>,
) -> Reply<wire::GetAgentResponse> {
    let result = state.plane.get_agent(&req.instance_id).await;
    reply(
        req.request_id,
        result.map(|view| wire::GetAgentResponse {
            agent: Some(agent_info(&view)),
            ..Default::default()
        }),
    )
}

// ============================================================================
// CONFIGS
// ============================================================================

async fn create_config(state: AppState, kind: ConfigKind, req: wire::ConfigDetailRequest) -> Reply<wire::OperatorResponse> {
    let result = state.plane.create_config(kind, req.config_detail).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

async fn update_config(state: AppState, kind: ConfigKind, req: wire::ConfigDetailRequest) -> Reply<wire::OperatorResponse> {
    let result = state.plane.update_config(kind, req.config_detail).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

async fn delete_config(state: AppState, kind: ConfigKind, req: wire::ConfigNameRequest) -> Reply<wire::OperatorResponse> {
    let result = state.plane.delete_config(kind, &req.config_name).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

async fn get_config(state: AppState, kind: ConfigKind, req: wire::ConfigNameRequest) -> Reply<wire::GetConfigResponse> {
    let result = state.plane.get_config(kind, &req.config_name).await;
    reply(
        req.request_id,
        result.map(|config| wire::GetConfigResponse {
            config_detail: Some(config.to_wire(BodyMode::WithBody)),
            ..Default::default()
        }),
    )
}

async fn list_configs(state: AppState, kind: ConfigKind, req: wire::ListRequest) -> Reply<wire::ListConfigsResponse> {
    let configs = state.plane.list_configs(kind).await;
    let message = wire::ListConfigsResponse {
        config_details: configs.iter().map(|c| c.to_wire(BodyMode::WithBody)).collect(),
        ..Default::default()
    };
    reply(req.request_id, Ok::<_, ApiError>(message))
}

async fn apply_config(state: AppState, kind: ConfigKind, req: wire::ConfigGroupRequest) -> Reply<wire::OperatorResponse> {
    let result = state.plane.apply_config(kind, &req.config_name, &req.group_name).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

async fn remove_config(state: AppState, kind: ConfigKind, req: wire::ConfigGroupRequest) -> Reply<wire::OperatorResponse> {
    let result = state.plane.remove_config(kind, &req.config_name, &req.group_name).await;
    reply(req.request_id, result.map(|_| wire::OperatorResponse::default()))
}

async fn applied_configs(state: AppState, kind: ConfigKind, req: wire::GroupNameRequest) -> Reply<wire::AppliedConfigsResponse> {
    let result = state.plane.applied_configs(kind, &req.group_name).await;
    reply(
        req.request_id,
        result.map(|config_names| wire::AppliedConfigsResponse {
            config_names,
            ..Default::default()
        }),
    )
}

async fn applied_groups(state: AppState, kind: ConfigKind, req: wire::ConfigNameRequest) -> Reply<wire::AppliedGroupsResponse> {
    let result = state.plane.applied_groups(kind, &req.config_name).await;
    reply(
        req.request_id,
        result.map(|agent_group_names| wire::AppliedGroupsResponse {
            agent_group_names,
            ..Default::default()
        }),
    )
}

// ============================================================================
// ROUTER
// ============================================================================

/// Config routes for one kind.
fn config_routes(kind: ConfigKind) -> Router<AppState> {
    let title = kind.title();
    Router::new()
        .route(
            &format!("/Create{title}Config"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigDetailRequest>| create_config(s, kind, req)),
        )
        .route(
            &format!("/Update{title}Config"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigDetailRequest>| update_config(s, kind, req)),
        )
        .route(
            &format!("/Delete{title}Config"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigNameRequest>| delete_config(s, kind, req)),
        )
        .route(
            &format!("/Get{title}Config"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigNameRequest>| get_config(s, kind, req)),
        )
        .route(
            &format!("/List{title}Configs"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ListRequest>| list_configs(s, kind, req)),
        )
        .route(
            &format!("/Apply{title}ConfigToAgentGroup"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigGroupRequest>| apply_config(s, kind, req)),
        )
        .route(
            &format!("/Remove{title}ConfigFromAgentGroup"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigGroupRequest>| remove_config(s, kind, req)),
        )
        .route(
            &format!("/GetApplied{title}ConfigsForAgentGroup"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::GroupNameRequest>| applied_configs(s, kind, req)),
        )
        .route(
            &format!("/GetAppliedAgentGroupsWith{title}Config"),
            post(move |State(s): State<AppState>, Proto(req): Proto<wire::ConfigNameRequest>| applied_groups(s, kind, req)),
        )
}

pub fn create_router() -> Router<AppState> {
    let router = Router::new()
        .route("/CreateAgentGroup", post(create_agent_group))
        .route("/UpdateAgentGroup", post(update_agent_group))
        .route("/DeleteAgentGroup", post(delete_agent_group))
        .route("/GetAgentGroup", post(get_agent_group))
        .route("/ListAgentGroups", post(list_agent_groups))
        .route("/ListAgents", post(list_agents))
        .route("/GetAgent", post(get_agent));
    ConfigKind::ALL
        .into_iter()
        .fold(router, |router, kind| router.merge(config_routes(kind)))
}
