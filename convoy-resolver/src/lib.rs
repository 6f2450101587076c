//! Convoy Resolver
//!
//! Decides which configs an agent should run. Groups are matched against
//! the agent's tags, the configs applied to matching groups form the
//! candidate set, and the candidates are diffed against the versions the
//! agent reported. Everything here is a pure function over a catalog
//! snapshot.

mod diff;
mod matcher;
mod plan;

pub use diff::{diff, ConfigUpdateInfo};
pub use matcher::{candidate_configs, group_matches, matching_groups, selector_matches};
pub use plan::{fetch_bodies, ResolveInput, Resolver, UpdatePlan};
