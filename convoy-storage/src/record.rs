//! Mapping from entities to their table and key.

use crate::Table;
use convoy_core::legacy::{AgentAlarm, AgentStatusReport, CollectionConfig, Machine, MachineGroup};
use convoy_core::{Agent, AgentConfigStatus, AgentGroup, Config};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An entity persisted as one row.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn table(&self) -> Table;
    fn key(&self) -> String;
}

impl Record for Config {
    fn table(&self) -> Table {
        Table::configs(self.kind)
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Record for AgentGroup {
    fn table(&self) -> Table {
        Table::AgentGroup
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Record for Agent {
    fn table(&self) -> Table {
        Table::Agent
    }

    fn key(&self) -> String {
        self.instance_id.to_hex()
    }
}

impl Record for AgentConfigStatus {
    fn table(&self) -> Table {
        Table::agent_configs(self.kind)
    }

    fn key(&self) -> String {
        AgentConfigStatus::key(self)
    }
}

impl Record for Machine {
    fn table(&self) -> Table {
        Table::Machine
    }

    fn key(&self) -> String {
        self.machine_id.clone()
    }
}

impl Record for MachineGroup {
    fn table(&self) -> Table {
        Table::MachineGroup
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Record for CollectionConfig {
    fn table(&self) -> Table {
        Table::CollectionConfig
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Record for AgentAlarm {
    fn table(&self) -> Table {
        Table::AgentAlarm
    }

    fn key(&self) -> String {
        AgentAlarm::key(self)
    }
}

impl Record for AgentStatusReport {
    fn table(&self) -> Table {
        Table::AgentStatus
    }

    fn key(&self) -> String {
        self.instance_id.to_hex()
    }
}
