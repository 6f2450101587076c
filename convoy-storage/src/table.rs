//! Logical tables

use convoy_core::ConfigKind;
use std::fmt;

/// Every logical table the control plane persists.
///
/// Keys are strings. Tables with composite keys join their parts with `/`;
/// only the last part may itself contain `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    PipelineConfig,
    InstanceConfig,
    AgentGroup,
    Agent,
    AgentPipelineConfig,
    AgentInstanceConfig,
    // Legacy machine-group protocol
    Machine,
    MachineGroup,
    CollectionConfig,
    AgentAlarm,
    AgentStatus,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::PipelineConfig,
        Table::InstanceConfig,
        Table::AgentGroup,
        Table::Agent,
        Table::AgentPipelineConfig,
        Table::AgentInstanceConfig,
        Table::Machine,
        Table::MachineGroup,
        Table::CollectionConfig,
        Table::AgentAlarm,
        Table::AgentStatus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::PipelineConfig => "pipeline_config",
            Table::InstanceConfig => "instance_config",
            Table::AgentGroup => "agent_group",
            Table::Agent => "agent",
            Table::AgentPipelineConfig => "agent_pipeline_config",
            Table::AgentInstanceConfig => "agent_instance_config",
            Table::Machine => "machine",
            Table::MachineGroup => "machine_group",
            Table::CollectionConfig => "collection_config",
            Table::AgentAlarm => "agent_alarm",
            Table::AgentStatus => "agent_status",
        }
    }

    /// Column names the key is split into by relational backends.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Table::PipelineConfig
            | Table::InstanceConfig
            | Table::AgentGroup
            | Table::MachineGroup
            | Table::CollectionConfig => &["name"],
            Table::Agent | Table::AgentStatus => &["instance_id"],
            Table::Machine => &["machine_id"],
            Table::AgentPipelineConfig | Table::AgentInstanceConfig => {
                &["agent_instance_id", "config_name"]
            }
            Table::AgentAlarm => &["agent_instance_id", "alarm_time"],
        }
    }

    /// Table holding config bodies of `kind`.
    pub fn configs(kind: ConfigKind) -> Table {
        match kind {
            ConfigKind::Pipeline => Table::PipelineConfig,
            ConfigKind::Instance => Table::InstanceConfig,
        }
    }

    /// Table holding agent-reported statuses for configs of `kind`.
    pub fn agent_configs(kind: ConfigKind) -> Table {
        match kind {
            ConfigKind::Pipeline => Table::AgentPipelineConfig,
            ConfigKind::Instance => Table::AgentInstanceConfig,
        }
    }

    /// Split `key` into one part per key column.
    pub fn split_key<'k>(&self, key: &'k str) -> Option<Vec<&'k str>> {
        let columns = self.key_columns().len();
        let parts: Vec<&str> = key.splitn(columns, '/').collect();
        (parts.len() == columns).then_some(parts)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_unique() {
        let mut names: Vec<_> = Table::ALL.iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Table::ALL.len());
    }

    #[test]
    fn test_split_composite_key() {
        let parts = Table::AgentPipelineConfig.split_key("ab01/nginx/access").unwrap();
        assert_eq!(parts, vec!["ab01", "nginx/access"]);
    }

    #[test]
    fn test_split_rejects_missing_part() {
        assert!(Table::AgentInstanceConfig.split_key("ab01").is_none());
        assert_eq!(Table::Agent.split_key("ab01").unwrap(), vec!["ab01"]);
    }

    #[test]
    fn test_kind_tables_are_distinct() {
        assert_ne!(
            Table::configs(ConfigKind::Pipeline),
            Table::configs(ConfigKind::Instance)
        );
        assert_ne!(
            Table::agent_configs(ConfigKind::Pipeline),
            Table::agent_configs(ConfigKind::Instance)
        );
    }
}
