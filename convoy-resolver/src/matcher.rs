//! Group membership from agent tags.

use convoy_core::{AgentGroup, ConfigKind, GroupSelector, TagOperator};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Whether `tags` satisfy `selector`. Values compare bytewise, so an empty
/// value only matches an empty value.
pub fn selector_matches(selector: &GroupSelector, tags: &BTreeMap<String, String>) -> bool {
    match selector {
        GroupSelector::Legacy { tag } => {
            !tag.name.is_empty() && tags.get(&tag.name) == Some(&tag.value)
        }
        GroupSelector::Tags { tags: wanted, operator } => {
            if wanted.is_empty() {
                return false;
            }
            let has = |t: &convoy_core::GroupTag| tags.get(&t.name) == Some(&t.value);
            match operator {
                TagOperator::And => wanted.iter().all(has),
                TagOperator::Or => wanted.iter().any(has),
            }
        }
    }
}

/// The default group matches everyone; other groups go by their selector.
pub fn group_matches(group: &AgentGroup, tags: &BTreeMap<String, String>) -> bool {
    group.is_default() || selector_matches(&group.selector, tags)
}

/// Names of the groups an agent with `tags` belongs to, ordered by name.
pub fn matching_groups(groups: &[Arc<AgentGroup>], tags: &BTreeMap<String, String>) -> Vec<String> {
    let mut names: Vec<String> = groups
        .iter()
        .filter(|g| group_matches(g, tags))
        .map(|g| g.name.clone())
        .collect();
    names.sort();
    names
}

/// Union of the configs of `kind` applied to every group matching `tags`.
pub fn candidate_configs(
    groups: &[Arc<AgentGroup>],
    tags: &BTreeMap<String, String>,
    kind: ConfigKind,
) -> BTreeSet<String> {
    groups
        .iter()
        .filter(|g| group_matches(g, tags))
        .flat_map(|g| g.applied(kind).keys().cloned())
        .collect()
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use convoy_test_utils::generators::{arb_agent, arb_selector, arb_tags};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// AND implies OR for the same tag list.
        #[test]
        fn prop_and_implies_or(selector in arb_selector(), tags in arb_tags()) {
            if let GroupSelector::Tags { tags: wanted, .. } = &selector {
                let and = GroupSelector::Tags { tags: wanted.clone(), operator: TagOperator::And };
                let or = GroupSelector::Tags { tags: wanted.clone(), operator: TagOperator::Or };
                if selector_matches(&and, &tags) {
                    prop_assert!(selector_matches(&or, &tags));
                }
            }
        }

        /// A selector built from an agent's own tags matches that agent.
        #[test]
        fn prop_own_tags_match(agent in arb_agent()) {
            prop_assume!(!agent.tags.is_empty());
            let wanted: Vec<_> = agent
                .tags
                .iter()
                .map(|(k, v)| convoy_core::GroupTag::new(k.clone(), v.clone()))
                .collect();
            for operator in [TagOperator::And, TagOperator::Or] {
                let selector = GroupSelector::Tags { tags: wanted.clone(), operator };
                prop_assert!(selector_matches(&selector, &agent.tags));
            }
        }
    }
}
