//! Update plans and on-demand body delivery.

use crate::diff::{diff, ConfigUpdateInfo};
use crate::matcher::candidate_configs;
use convoy_configs::CatalogSnapshot;
use convoy_core::{wire, BodyMode, ConfigKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What the resolver needs to know about one agent.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub tags: &'a BTreeMap<String, String>,
    pub reported_pipeline: &'a HashMap<String, i64>,
    pub reported_instance: &'a HashMap<String, i64>,
}

impl ResolveInput<'_> {
    fn reported(&self, kind: ConfigKind) -> &HashMap<String, i64> {
        match kind {
            ConfigKind::Pipeline => self.reported_pipeline,
            ConfigKind::Instance => self.reported_instance,
        }
    }
}

/// Per-kind instructions returned on a heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub pipeline: Vec<ConfigUpdateInfo>,
    pub instance: Vec<ConfigUpdateInfo>,
}

impl UpdatePlan {
    pub fn get(&self, kind: ConfigKind) -> &[ConfigUpdateInfo] {
        match kind {
            ConfigKind::Pipeline => &self.pipeline,
            ConfigKind::Instance => &self.instance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty() && self.instance.is_empty()
    }
}

/// Turns a catalog snapshot and an agent's view into an [`UpdatePlan`].
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    mode: BodyMode,
}

impl Resolver {
    /// With `inline_bodies` off, plans carry statuses only and agents fetch
    /// bodies separately.
    pub fn new(inline_bodies: bool) -> Self {
        Self {
            mode: if inline_bodies {
                BodyMode::WithBody
            } else {
                BodyMode::WithoutBody
            },
        }
    }

    pub fn body_mode(&self) -> BodyMode {
        self.mode
    }

    pub fn plan(&self, snapshot: &CatalogSnapshot, input: ResolveInput<'_>) -> UpdatePlan {
        let resolve = |kind: ConfigKind| {
            let candidates = candidate_configs(&snapshot.groups, input.tags, kind);
            diff(&candidates, snapshot.configs(kind), input.reported(kind), self.mode)
        };
        let plan = UpdatePlan {
            pipeline: resolve(ConfigKind::Pipeline),
            instance: resolve(ConfigKind::Instance),
        };
        tracing::trace!(
            pipeline = plan.pipeline.len(),
            instance = plan.instance.len(),
            "Update plan resolved"
        );
        plan
    }
}

/// Current details for the requested configs of `kind`, each name once.
///
/// Unknown names are skipped. A tombstoned config comes back with
/// `tombstone` set and an empty body.
pub fn fetch_bodies(snapshot: &CatalogSnapshot, kind: ConfigKind, requested: &[String]) -> Vec<wire::ConfigDetail> {
    let configs = snapshot.configs(kind);
    let wanted: BTreeSet<&String> = requested.iter().collect();
    wanted
        .into_iter()
        .filter_map(|name| configs.get(name))
        .map(|c| {
            let mode = if c.is_live() {
                BodyMode::WithBody
            } else {
                BodyMode::WithoutBody
            };
            c.to_wire(mode)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_core::{AgentGroup, Config, ConfigUpdateStatus, TagOperator};
    use convoy_test_utils::fixtures::{instance_config, pipeline_config, tag_selector, tags};
    use std::sync::Arc;

    fn index(configs: Vec<Config>) -> HashMap<String, Arc<Config>> {
        configs.into_iter().map(|c| (c.name.clone(), Arc::new(c))).collect()
    }

    fn snapshot() -> CatalogSnapshot {
        let mut default = AgentGroup::default_group();
        default.applied_pipeline_configs.insert("base".into(), Utc::now());
        let mut web = AgentGroup::new("web", "", tag_selector(&[("role", "web")], TagOperator::And));
        web.applied_pipeline_configs.insert("nginx".into(), Utc::now());
        web.applied_instance_configs.insert("cpu".into(), Utc::now());

        let mut retired = pipeline_config("retired", "r");
        retired.mark_deleted();
        CatalogSnapshot {
            groups: vec![Arc::new(default), Arc::new(web)],
            pipeline_configs: index(vec![
                pipeline_config("base", "b"),
                pipeline_config("nginx", "n"),
                retired,
            ]),
            instance_configs: index(vec![instance_config("cpu", "c")]),
        }
    }

    #[test]
    fn test_plan_follows_group_membership() {
        let snapshot = snapshot();
        let empty = HashMap::new();
        let web_tags = tags(&[("role", "web")]);
        let plan = Resolver::new(true).plan(
            &snapshot,
            ResolveInput {
                tags: &web_tags,
                reported_pipeline: &empty,
                reported_instance: &empty,
            },
        );
        let names: Vec<_> = plan.pipeline.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["base", "nginx"]);
        assert_eq!(plan.instance.len(), 1);
        assert_eq!(plan.get(ConfigKind::Instance)[0].content.as_deref(), Some(&b"c"[..]));

        let untagged = tags(&[]);
        let reported: HashMap<String, i64> = [("nginx".to_string(), 1)].into();
        let plan = Resolver::new(false).plan(
            &snapshot,
            ResolveInput {
                tags: &untagged,
                reported_pipeline: &reported,
                reported_instance: &empty,
            },
        );
        assert_eq!(plan.pipeline.len(), 2);
        assert!(plan.pipeline.iter().all(|e| e.content.is_none()));
        let nginx = plan.pipeline.iter().find(|e| e.name == "nginx").unwrap();
        assert_eq!(nginx.status, ConfigUpdateStatus::Deleted);
        assert!(plan.instance.is_empty());
    }

    #[test]
    fn test_fetch_skips_unknown_and_marks_tombstoned() {
        let snapshot = snapshot();
        let requested = vec![
            "nginx".to_string(),
            "retired".to_string(),
            "ghost".to_string(),
            "nginx".to_string(),
        ];
        let details = fetch_bodies(&snapshot, ConfigKind::Pipeline, &requested);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].name, "nginx");
        assert_eq!(details[0].detail, b"n");
        assert!(!details[0].tombstone);

        assert_eq!(details[1].name, "retired");
        assert!(details[1].tombstone);
        assert!(details[1].detail.is_empty());
        assert_eq!(details[1].version, 2);

        assert!(fetch_bodies(&snapshot, ConfigKind::Instance, &["nginx".to_string()]).is_empty());
    }
}
