//! Environment variables exported to scripts and sessions.
//!
//! Derived only from the project, the environment row and the current
//! allocations.

use crate::db::{Environment, Project};
use crate::ports::{by_service, Allocation};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const PREFIX: &str = "GROVE_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVars {
    pub root: PathBuf,
    pub env_name: String,
    pub env_id: i64,
    pub env_path: PathBuf,
    pub data_dir: PathBuf,
    pub project: String,
    pub branch: String,
    /// Variable name -> host port.
    pub ports: BTreeMap<String, u16>,
}

/// `GROVE_<SERVICE>_PORT`, upper-cased with non-alphanumerics as `_`.
pub fn port_var(service: &str) -> String {
    let normalized: String = service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{PREFIX}{normalized}_PORT")
}

impl EnvVars {
    pub fn build(project: &Project, env: &Environment, allocations: &[Allocation]) -> Self {
        let mut ports = BTreeMap::new();
        for (service, slots) in by_service(allocations) {
            let base = port_var(&service);
            if let Some(first) = slots.first() {
                ports.insert(base.clone(), first.host_port);
            }
            for slot in &slots {
                ports.insert(format!("{base}_{}", slot.container_port), slot.host_port);
            }
        }

        Self {
            root: project.root_path.clone(),
            env_name: env.name.clone(),
            env_id: env.id,
            env_path: env.path.clone(),
            data_dir: project.data_dir(&env.name),
            project: project.name.clone(),
            branch: env.branch.clone(),
            ports,
        }
    }

    /// `(name, value)` pairs: fixed variables first, then ports by name.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (format!("{PREFIX}ROOT"), self.root.to_string_lossy().to_string()),
            (format!("{PREFIX}ENV_NAME"), self.env_name.clone()),
            (format!("{PREFIX}ENV_ID"), self.env_id.to_string()),
            (format!("{PREFIX}ENV_PATH"), self.env_path.to_string_lossy().to_string()),
            (format!("{PREFIX}DATA_DIR"), self.data_dir.to_string_lossy().to_string()),
            (format!("{PREFIX}PROJECT"), self.project.clone()),
            (format!("{PREFIX}BRANCH"), self.branch.clone()),
        ];
        vars.extend(
            self.ports
                .iter()
                .map(|(name, port)| (name.clone(), port.to_string())),
        );
        vars
    }

    /// `export NAME='value'` lines suitable for `eval`.
    pub fn to_shell_export(&self) -> String {
        self.pairs()
            .into_iter()
            .map(|(k, v)| format!("export {k}={}", shell_quote(&v)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in self.pairs() {
            map.insert(key, Value::String(value));
        }
        map.insert(format!("{PREFIX}ENV_ID"), Value::from(self.env_id));
        for (name, port) in &self.ports {
            map.insert(name.clone(), Value::from(*port));
        }
        Value::Object(map)
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
