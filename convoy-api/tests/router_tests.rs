//! HTTP surface tests over the full axum router.

mod support;

use axum::http::StatusCode;
use convoy_core::{wire, DEFAULT_GROUP_NAME};
use support::{beat, call, detail, get_json, group, post_raw, primary_app, secondary_app};

fn status_of(common: &Option<wire::CommonResponse>) -> i32 {
    common.as_ref().map(|c| c.status).unwrap_or(-1)
}

#[tokio::test]
async fn test_heartbeat_over_http() {
    let (app, plane) = primary_app().await;
    plane
        .create_config(convoy_core::ConfigKind::Pipeline, detail("c1", "body"))
        .await
        .unwrap();
    plane
        .apply_config(convoy_core::ConfigKind::Pipeline, "c1", DEFAULT_GROUP_NAME)
        .await
        .unwrap();

    let (status, reply): (_, wire::HeartbeatResponse) =
        call(&app, "/Agent/HeartBeat", &beat("a1", 0, &[("env", "prod")], &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response_id, b"a1-0");
    assert_eq!(status_of(&reply.common_response), wire::status::ACCEPT);
    assert_eq!(reply.pipeline_check_results.len(), 1);
    assert_eq!(reply.pipeline_check_results[0].content, b"body");
}

#[tokio::test]
async fn test_rejected_heartbeat_echoes_request_id() {
    let (app, _) = primary_app().await;
    let _: (_, wire::HeartbeatResponse) = call(&app, "/Agent/HeartBeat", &beat("a1", 0, &[], &[])).await;

    let (status, reply): (_, wire::HeartbeatResponse) =
        call(&app, "/Agent/HeartBeat", &beat("a1", 7, &[], &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.response_id, b"a1-7");
    let common = reply.common_response.expect("common response");
    assert_eq!(common.status, wire::status::BAD_REQUEST);
    assert!(!common.error_message.is_empty());
    assert!(reply.pipeline_check_results.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (app, _) = primary_app().await;
    let (status, bytes) = post_raw(&app, "/Agent/HeartBeat", vec![0xff, 0xff, 0xff]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let reply = <wire::OperatorResponse as prost::Message>::decode(bytes.as_slice()).unwrap();
    assert_eq!(status_of(&reply.common_response), wire::status::BAD_REQUEST);
}

#[tokio::test]
async fn test_operator_config_routes() {
    let (app, _) = primary_app().await;

    let create = wire::ConfigDetailRequest {
        request_id: b"r1".to_vec(),
        config_detail: detail("nginx", "tail /var/log/nginx"),
    };
    let (status, reply): (_, wire::OperatorResponse) = call(&app, "/User/CreatePipelineConfig", &create).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response_id, b"r1");
    assert_eq!(status_of(&reply.common_response), wire::status::ACCEPT);

    let (status, reply): (_, wire::OperatorResponse) = call(&app, "/User/CreatePipelineConfig", &create).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(status_of(&reply.common_response), wire::status::BAD_REQUEST);

    let get = wire::ConfigNameRequest {
        request_id: b"r2".to_vec(),
        config_name: "nginx".to_string(),
    };
    let (_, reply): (_, wire::GetConfigResponse) = call(&app, "/User/GetPipelineConfig", &get).await;
    let config = reply.config_detail.expect("config detail");
    assert_eq!(config.version, 1);
    assert_eq!(config.detail, b"tail /var/log/nginx");

    let (status, reply): (_, wire::GetConfigResponse) = call(&app, "/User/GetInstanceConfig", &get).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(status_of(&reply.common_response), wire::status::NOT_FOUND);
    assert!(reply.config_detail.is_none());

    let apply = wire::ConfigGroupRequest {
        request_id: b"r3".to_vec(),
        config_name: "nginx".to_string(),
        group_name: DEFAULT_GROUP_NAME.to_string(),
    };
    let (status, _): (_, wire::OperatorResponse) =
        call(&app, "/User/ApplyPipelineConfigToAgentGroup", &apply).await;
    assert_eq!(status, StatusCode::OK);

    let (_, reply): (_, wire::AppliedGroupsResponse) =
        call(&app, "/User/GetAppliedAgentGroupsWithPipelineConfig", &get).await;
    assert_eq!(reply.agent_group_names, vec![DEFAULT_GROUP_NAME]);

    let list = wire::ListRequest { request_id: b"r4".to_vec() };
    let (_, reply): (_, wire::ListConfigsResponse) = call(&app, "/User/ListPipelineConfigs", &list).await;
    assert_eq!(reply.config_details.len(), 1);
}

#[tokio::test]
async fn test_operator_group_and_agent_routes() {
    let (app, _) = primary_app().await;
    let create = wire::AgentGroupRequest {
        request_id: b"g1".to_vec(),
        agent_group: group("web", &[("app", "web")], wire::TagOperator::LogicAnd),
    };
    let (status, _): (_, wire::OperatorResponse) = call(&app, "/User/CreateAgentGroup", &create).await;
    assert_eq!(status, StatusCode::OK);

    let _: (_, wire::HeartbeatResponse) = call(&app, "/Agent/HeartBeat", &beat("a1", 0, &[("app", "web")], &[])).await;
    let _: (_, wire::HeartbeatResponse) = call(&app, "/Agent/HeartBeat", &beat("a2", 0, &[("app", "db")], &[])).await;

    let by_group = wire::GroupNameRequest {
        request_id: b"g2".to_vec(),
        group_name: "web".to_string(),
    };
    let (_, reply): (_, wire::ListAgentsResponse) = call(&app, "/User/ListAgents", &by_group).await;
    assert_eq!(reply.agents.len(), 1);
    assert_eq!(reply.agents[0].instance_id, b"a1");

    let (_, reply): (_, wire::GetAgentGroupResponse) = call(&app, "/User/GetAgentGroup", &by_group).await;
    assert_eq!(reply.agent_group.map(|g| g.name), Some("web".to_string()));

    let get_agent = wire::GetAgentRequest {
        request_id: b"g3".to_vec(),
        instance_id: b"a2".to_vec(),
    };
    let (_, reply): (_, wire::GetAgentResponse) = call(&app, "/User/GetAgent", &get_agent).await;
    let agent = reply.agent.expect("agent");
    assert_eq!(agent.sequence_num, 0);
    assert_eq!(agent.running_status, wire::RunningStatus::Init as i32);

    let (_, reply): (_, wire::ListAgentGroupsResponse) =
        call(&app, "/User/ListAgentGroups", &wire::ListRequest::default()).await;
    let names: Vec<String> = reply.agent_groups.into_iter().map(|g| g.name).collect();
    assert_eq!(names, vec![DEFAULT_GROUP_NAME.to_string(), "web".to_string()]);
}

#[tokio::test]
async fn test_secondary_serves_agent_api_only() {
    let (app, _) = secondary_app().await;

    let (status, _) = post_raw(&app, "/User/ListAgentGroups", Vec::new()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, reply): (_, wire::HeartbeatResponse) = call(&app, "/Agent/HeartBeat", &beat("a1", 0, &[], &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_of(&reply.common_response), wire::status::ACCEPT);
}

#[tokio::test]
async fn test_health_probes() {
    let (app, _) = primary_app().await;

    let (status, body) = get_json(&app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = get_json(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["storage"]["driver"], "memory");
    assert_eq!(body["details"]["identity"], "primary");
}
