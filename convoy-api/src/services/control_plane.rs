//! Control Plane Service
//!
//! Orchestrates the registries and the resolver for one request at a time.
//! Handlers translate wire messages at the edges; everything here works on
//! domain types, except the agent API which is wire in and wire out.

use crate::config::ServerConfig;
use convoy_agents::{AgentRegistry, AgentView, HeartbeatInput, ReportedStatuses};
use convoy_configs::Catalog;
use convoy_core::{
    tags_from_wire, wire, AgentConfigStatus, AgentGroup, Config, ConfigKind, ConvoyError,
    ConvoyResult, InstanceId,
};
use convoy_resolver::{fetch_bodies, group_matches, ResolveInput, Resolver};
use convoy_storage::StoreHandle;
use std::sync::Arc;

/// Everything a request handler needs.
pub struct ControlPlane {
    catalog: Arc<Catalog>,
    agents: Arc<AgentRegistry>,
    resolver: Resolver,
    interval_hint: i32,
}

impl ControlPlane {
    pub fn new(catalog: Arc<Catalog>, agents: Arc<AgentRegistry>, resolver: Resolver, interval_hint: i32) -> Self {
        Self {
            catalog,
            agents,
            resolver,
            interval_hint,
        }
    }

    /// Build the registries over `store` and load them. The default group
    /// is created if storage lacks it.
    pub async fn bootstrap(store: StoreHandle, config: &ServerConfig) -> ConvoyResult<Self> {
        let catalog = Arc::new(Catalog::new(store.clone(), config.config_delete_policy));
        catalog.load().await?;
        let agents = Arc::new(AgentRegistry::new(store, config.agent_settings()));
        let loaded = agents.load().await?;
        tracing::info!(agents = loaded, identity = %config.identity, "Control plane ready");
        Ok(Self::new(
            catalog,
            agents,
            Resolver::new(config.inline_config_bodies),
            config.heartbeat_interval_hint_secs,
        ))
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    // ========================================================================
    // AGENT API
    // ========================================================================

    /// Record a heartbeat and tell the agent what to change.
    ///
    /// The agent record is only queued here; the batch writer persists it.
    pub async fn heartbeat(&self, req: wire::HeartbeatRequest) -> ConvoyResult<wire::HeartbeatResponse> {
        let input = heartbeat_input(req)?;
        let reported_pipeline = input.statuses.versions(ConfigKind::Pipeline);
        let reported_instance = input.statuses.versions(ConfigKind::Instance);

        let agent = self.agents.heartbeat(input).await?;
        let snapshot = self.catalog.snapshot().await;
        let plan = self.resolver.plan(
            &snapshot,
            ResolveInput {
                tags: &agent.tags,
                reported_pipeline: &reported_pipeline,
                reported_instance: &reported_instance,
            },
        );
        if !plan.is_empty() {
            tracing::debug!(
                instance_id = %agent.instance_id,
                pipeline = plan.pipeline.len(),
                instance = plan.instance.len(),
                "Heartbeat answered"
            );
        }

        Ok(wire::HeartbeatResponse {
            pipeline_check_results: plan.pipeline.iter().map(|e| e.to_wire()).collect(),
            instance_check_results: plan.instance.iter().map(|e| e.to_wire()).collect(),
            interval: self.interval_hint,
            ..Default::default()
        })
    }

    /// Bodies of the requested configs. Unknown names are left out of the
    /// reply; deleted ones come back as tombstones without a body.
    pub async fn fetch_configs(&self, kind: ConfigKind, req: wire::FetchConfigRequest) -> ConvoyResult<wire::FetchConfigResponse> {
        let names: Vec<String> = req.req_configs.into_iter().map(|c| c.name).collect();
        let snapshot = self.catalog.snapshot().await;
        let config_details = fetch_bodies(&snapshot, kind, &names);
        tracing::debug!(kind = %kind, requested = names.len(), returned = config_details.len(), "Config bodies fetched");
        Ok(wire::FetchConfigResponse {
            config_details,
            ..Default::default()
        })
    }

    // ========================================================================
    // GROUPS
    // ========================================================================

    pub async fn create_group(&self, msg: Option<wire::AgentGroup>) -> ConvoyResult<AgentGroup> {
        let group = AgentGroup::from_wire(require(msg, "agent_group")?)?;
        self.catalog
            .create_group(&group.name, group.description, group.selector)
            .await
    }

    pub async fn update_group(&self, msg: Option<wire::AgentGroup>) -> ConvoyResult<AgentGroup> {
        let group = AgentGroup::from_wire(require(msg, "agent_group")?)?;
        self.catalog
            .update_group(&group.name, group.description, group.selector)
            .await
    }

    pub async fn delete_group(&self, name: &str) -> ConvoyResult<()> {
        self.catalog.delete_group(name).await
    }

    pub async fn get_group(&self, name: &str) -> ConvoyResult<AgentGroup> {
        self.catalog.get_group(name).await
    }

    pub async fn list_groups(&self) -> Vec<AgentGroup> {
        self.catalog.list_groups().await
    }

    // ========================================================================
    // AGENTS
    // ========================================================================

    /// Agents whose tags place them in `group`, ordered by instance id.
    pub async fn list_agents(&self, group: &str) -> ConvoyResult<Vec<AgentView>> {
        let group = self.catalog.get_group(group).await?;
        let views = self.agents.list()?;
        Ok(views
            .into_iter()
            .filter(|view| group_matches(&group, &view.agent.tags))
            .collect())
    }

    pub async fn get_agent(&self, instance_id: &[u8]) -> ConvoyResult<AgentView> {
        if instance_id.is_empty() {
            return Err(ConvoyError::invalid("instance_id must not be empty"));
        }
        self.agents.get(&InstanceId::new(instance_id)).await
    }

    // ========================================================================
    // CONFIGS
    // ========================================================================

    pub async fn create_config(&self, kind: ConfigKind, msg: Option<wire::ConfigDetail>) -> ConvoyResult<Config> {
        let config = Config::from_wire(kind, require(msg, "config_detail")?)?;
        self.catalog
            .create_config(kind, &config.name, config.content, config.description)
            .await
    }

    pub async fn update_config(&self, kind: ConfigKind, msg: Option<wire::ConfigDetail>) -> ConvoyResult<Config> {
        let config = Config::from_wire(kind, require(msg, "config_detail")?)?;
        self.catalog
            .update_config(kind, &config.name, config.content, config.description)
            .await
    }

    pub async fn delete_config(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        self.catalog.delete_config(kind, name).await
    }

    pub async fn get_config(&self, kind: ConfigKind, name: &str) -> ConvoyResult<Config> {
        self.catalog.get_config(kind, name).await
    }

    pub async fn list_configs(&self, kind: ConfigKind) -> Vec<Config> {
        self.catalog.list_configs(kind).await
    }

    // ========================================================================
    // RELATIONS
    // ========================================================================

    pub async fn apply_config(&self, kind: ConfigKind, config: &str, group: &str) -> ConvoyResult<()> {
        self.catalog.apply_config(kind, config, group).await.map(|_| ())
    }

    pub async fn remove_config(&self, kind: ConfigKind, config: &str, group: &str) -> ConvoyResult<()> {
        self.catalog.remove_config(kind, config, group).await.map(|_| ())
    }

    pub async fn applied_configs(&self, kind: ConfigKind, group: &str) -> ConvoyResult<Vec<String>> {
        self.catalog.applied_configs(kind, group).await
    }

    pub async fn applied_groups(&self, kind: ConfigKind, config: &str) -> ConvoyResult<Vec<String>> {
        self.catalog.applied_groups(kind, config).await
    }
}

fn require<T>(field: Option<T>, name: &str) -> ConvoyResult<T> {
    field.ok_or_else(|| ConvoyError::invalid(format!("{} is required", name)))
}

/// Translate a heartbeat request into registry input.
fn heartbeat_input(req: wire::HeartbeatRequest) -> ConvoyResult<HeartbeatInput> {
    if req.instance_id.is_empty() {
        return Err(ConvoyError::invalid("instance_id must not be empty"));
    }
    let instance_id = InstanceId::new(req.instance_id);
    let decode = |kind: ConfigKind, reported: Vec<wire::ConfigInfo>| {
        reported
            .into_iter()
            .map(|info| AgentConfigStatus::from_wire(&instance_id, kind, info))
            .collect::<ConvoyResult<Vec<_>>>()
    };
    let statuses = ReportedStatuses {
        pipeline: decode(ConfigKind::Pipeline, req.pipeline_configs)?,
        instance: decode(ConfigKind::Instance, req.instance_configs)?,
    };
    let attributes = req.attributes.unwrap_or_default();

    Ok(HeartbeatInput {
        agent_type: req.agent_type,
        ip: attributes.ip,
        hostname: attributes.hostname,
        version: attributes.version,
        attributes: attributes.extras.into_iter().collect(),
        tags: tags_from_wire(&req.tags),
        interval: req.interval,
        startup_time: req.startup_time,
        sequence_num: req.sequence_num,
        statuses,
        ..HeartbeatInput::new(instance_id)
    })
}

/// Encode an agent with the config statuses it last reported.
pub fn agent_info(view: &AgentView) -> wire::AgentInfo {
    let mut info = view.agent.to_wire();
    info.pipeline_configs = view.statuses.pipeline.iter().map(|s| s.to_wire()).collect();
    info.instance_configs = view.statuses.instance.iter().map(|s| s.to_wire()).collect();
    info
}
