//! Per-agent comparison of candidate configs against reported versions.

use convoy_core::{wire, BodyMode, Config, ConfigUpdateStatus};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One line of an update plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdateInfo {
    pub name: String,
    pub status: ConfigUpdateStatus,
    /// Version the agent reported, if any.
    pub old_version: Option<i64>,
    /// Current server version, or the reported one when the config is gone.
    pub new_version: i64,
    /// Present for NEW and MODIFIED entries when bodies travel inline.
    pub content: Option<Vec<u8>>,
}

impl ConfigUpdateInfo {
    pub fn to_wire(&self) -> wire::ConfigCheckResult {
        wire::ConfigCheckResult {
            name: self.name.clone(),
            old_version: self.old_version.unwrap_or(0),
            new_version: self.new_version,
            check_status: wire::CheckStatus::from(self.status) as i32,
            content: self.content.clone().unwrap_or_default(),
        }
    }
}

/// Diff `candidates` against what the agent reported.
///
/// | reported | live candidate | result                   |
/// |----------|----------------|--------------------------|
/// | no       | yes            | NEW                      |
/// | v        | yes, v < cur   | MODIFIED                 |
/// | v        | yes, v >= cur  | SAME                     |
/// | v        | no             | DELETED                  |
///
/// A candidate name with no config behind it counts as absent. Output is
/// ordered by name and holds each name at most once.
pub fn diff(
    candidates: &BTreeSet<String>,
    configs: &HashMap<String, Arc<Config>>,
    reported: &HashMap<String, i64>,
    mode: BodyMode,
) -> Vec<ConfigUpdateInfo> {
    let names: BTreeSet<&String> = candidates.iter().chain(reported.keys()).collect();
    let body = |config: &Config| match mode {
        BodyMode::WithBody => Some(config.content.clone()),
        BodyMode::WithoutBody => None,
    };

    let mut plan = Vec::with_capacity(names.len());
    for name in names {
        let config = configs.get(name);
        let live = config.filter(|c| candidates.contains(name) && c.is_live());
        let entry = match (reported.get(name).copied(), live) {
            (None, None) => continue,
            (None, Some(config)) => ConfigUpdateInfo {
                name: name.clone(),
                status: ConfigUpdateStatus::New,
                old_version: None,
                new_version: config.version,
                content: body(config),
            },
            (Some(version), Some(config)) if version < config.version => ConfigUpdateInfo {
                name: name.clone(),
                status: ConfigUpdateStatus::Modified,
                old_version: Some(version),
                new_version: config.version,
                content: body(config),
            },
            (Some(version), Some(config)) => ConfigUpdateInfo {
                name: name.clone(),
                status: ConfigUpdateStatus::Same,
                old_version: Some(version),
                new_version: config.version,
                content: None,
            },
            (Some(version), None) => ConfigUpdateInfo {
                name: name.clone(),
                status: ConfigUpdateStatus::Deleted,
                old_version: Some(version),
                new_version: config.map(|c| c.version).unwrap_or(version),
                content: None,
            },
        };
        plan.push(entry);
    }
    plan
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use convoy_test_utils::generators::arb_config;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every candidate or reported name shows up at most once, and a
        /// body travels only with NEW and MODIFIED entries.
        #[test]
        fn prop_plan_shape(
            table in prop::collection::vec(arb_config(), 0..8),
            candidate_mask in prop::collection::vec(any::<bool>(), 8),
            reported_versions in prop::collection::hash_map("[a-z][a-z0-9_-]{0,3}", 0i64..100, 0..6),
        ) {
            let configs: HashMap<String, Arc<Config>> =
                table.iter().map(|c| (c.name.clone(), Arc::new(c.clone()))).collect();
            let candidates: BTreeSet<String> = table
                .iter()
                .zip(candidate_mask.iter())
                .filter(|(_, keep)| **keep)
                .map(|(c, _)| c.name.clone())
                .collect();
            let plan = diff(&candidates, &configs, &reported_versions, BodyMode::WithBody);

            let mut seen = BTreeSet::new();
            for entry in &plan {
                prop_assert!(seen.insert(entry.name.clone()));
                prop_assert!(candidates.contains(&entry.name) || reported_versions.contains_key(&entry.name));
                let has_body = matches!(entry.status, ConfigUpdateStatus::New | ConfigUpdateStatus::Modified);
                prop_assert_eq!(entry.content.is_some(), has_body);
                if entry.status == ConfigUpdateStatus::Deleted {
                    prop_assert!(reported_versions.contains_key(&entry.name));
                }
            }
            for name in reported_versions.keys() {
                prop_assert!(seen.contains(name));
            }
        }
    }
}
