//! Compose manifest parsing and per-environment isolation.
//!
//! The manifest is kept as a YAML document so that everything grove does not
//! touch (build contexts, env files, `${VAR}` interpolation) passes through to
//! `docker compose` unchanged. Isolation rewrites three things:
//! - published ports, to the allocator's host ports
//! - the default network name, to one unique per project/environment
//! - named volume names, prefixed with the same identity
//!
//! Fixed `container_name` entries are dropped as well, since two environments
//! cannot both own a container called `db`.

use crate::error::{Error, Result};
use crate::ports::Allocation;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Manifest names probed in order.
pub const COMPOSE_FILENAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// File name of the generated, environment-scoped manifest.
pub const ISOLATED_MANIFEST: &str = "docker-compose.grove.yml";

/// Return the first compose file name present in `dir`.
pub fn detect_compose_file(dir: &Path) -> Option<&'static str> {
    COMPOSE_FILENAMES
        .iter()
        .copied()
        .find(|name| dir.join(name).is_file())
}

/// Sanitize a label for use in compose project, network and volume names.
pub fn sanitize_name(name: &str) -> String {
    let mapped: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut collapsed = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('-').to_string()
}

/// `docker compose -p` tag for an environment. Also used as its network name.
pub fn container_project_name(project: &str, env: &str) -> String {
    format!("grove-{}-{}", sanitize_name(project), sanitize_name(env))
}

pub fn volume_name(project: &str, env: &str, volume: &str) -> String {
    format!("{}_{}", container_project_name(project, env), volume)
}

/// One published port declaration of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortSpec {
    host_ip: Option<String>,
    target: u16,
    protocol: Option<String>,
}

/// A parsed compose manifest.
#[derive(Debug, Clone)]
pub struct ComposeManifest {
    dir: PathBuf,
    file_name: String,
    doc: Mapping,
}

impl ComposeManifest {
    /// Locate and parse the manifest in `dir`.
    ///
    /// Returns [`Error::ManifestNotFound`] when no known compose file exists,
    /// which callers treat as simple mode.
    pub fn parse(dir: &Path) -> Result<Self> {
        let file_name = detect_compose_file(dir).ok_or_else(|| Error::ManifestNotFound {
            dir: dir.to_string_lossy().to_string(),
        })?;
        let content = fs::read_to_string(dir.join(file_name))?;
        Self::from_yaml(dir, file_name, &content)
    }

    pub fn from_yaml(dir: &Path, file_name: &str, content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigInvalid(format!("{file_name}: {e}")))?;
        let doc = match value {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => {
                return Err(Error::ConfigInvalid(format!(
                    "{file_name}: top level must be a mapping"
                )));
            }
        };
        if let Some(services) = doc.get("services") {
            if !services.is_mapping() && !services.is_null() {
                return Err(Error::ConfigInvalid(format!(
                    "{file_name}: `services` must be a mapping"
                )));
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
            doc,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Where the isolated manifest for this directory is written.
    pub fn isolated_path(&self) -> PathBuf {
        self.dir.join(ISOLATED_MANIFEST)
    }

    fn services(&self) -> impl Iterator<Item = (String, &Value)> {
        self.doc
            .get("services")
            .and_then(Value::as_mapping)
            .into_iter()
            .flat_map(|m| m.iter())
            .filter_map(|(k, v)| k.as_str().map(|name| (name.to_string(), v)))
    }

    /// Service names in declaration order.
    pub fn service_names(&self) -> Vec<String> {
        self.services().map(|(name, _)| name).collect()
    }

    /// Container ports each service publishes. Services without ports are omitted.
    pub fn service_ports(&self) -> Result<BTreeMap<String, Vec<u16>>> {
        let mut result = BTreeMap::new();
        for (name, service) in self.services() {
            let specs = service_port_specs(&name, service)?;
            if specs.is_empty() {
                continue;
            }
            let mut targets: Vec<u16> = specs.iter().map(|s| s.target).collect();
            targets.sort_unstable();
            targets.dedup();
            result.insert(name, targets);
        }
        Ok(result)
    }

    /// Rewrite ports, the default network and named volumes for one environment.
    pub fn apply_isolation(
        &mut self,
        project_name: &str,
        env_name: &str,
        allocations: &[Allocation],
    ) -> Result<()> {
        let tag = container_project_name(project_name, env_name);
        let host_ports: HashMap<(&str, u16), u16> = allocations
            .iter()
            .map(|a| ((a.service.as_str(), a.container_port), a.host_port))
            .collect();

        if let Some(services) = self.doc.get_mut("services").and_then(Value::as_mapping_mut) {
            for (key, service) in services.iter_mut() {
                let Some(name) = key.as_str() else { continue };
                let Some(service) = service.as_mapping_mut() else { continue };

                service.remove("container_name");

                let Some(declared) = service.get("ports") else { continue };
                let mut rewritten = Vec::new();
                for entry in port_entries(name, declared)? {
                    for spec in entry_specs(name, entry)? {
                        let Some(host) = host_ports.get(&(name, spec.target)) else {
                            debug!("No allocation for {}:{}, dropping port", name, spec.target);
                            continue;
                        };
                        match entry {
                            // long syntax keeps mode, name and app_protocol
                            Value::Mapping(long) => {
                                let mut long = long.clone();
                                long.insert("published".into(), Value::Number((*host).into()));
                                rewritten.push(Value::Mapping(long));
                            }
                            _ => rewritten.push(Value::String(render_port(&spec, *host))),
                        }
                    }
                }
                if rewritten.is_empty() {
                    service.remove("ports");
                } else {
                    service.insert("ports".into(), Value::Sequence(rewritten));
                }
            }
        }

        let networks = mapping_entry(&mut self.doc, "networks");
        let default = mapping_entry(networks, "default");
        default.insert("name".into(), Value::String(tag));

        if let Some(volumes) = self.doc.get_mut("volumes").and_then(Value::as_mapping_mut) {
            for (key, volume) in volumes.iter_mut() {
                let Some(volume_key) = key.as_str().map(str::to_string) else { continue };
                if volume.is_null() {
                    *volume = Value::Mapping(Mapping::new());
                }
                let Some(spec) = volume.as_mapping_mut() else { continue };
                if is_external(spec) {
                    continue;
                }
                spec.insert(
                    "name".into(),
                    Value::String(volume_name(project_name, env_name, &volume_key)),
                );
            }
        }

        Ok(())
    }

    /// Serialize the (transformed) manifest to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let body = serde_yaml::to_string(&Value::Mapping(self.doc.clone()))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let content = format!(
            "# Generated by grove from {}. Regenerated on every start; do not edit.\n{body}",
            self.file_name
        );
        fs::write(path, content)?;
        debug!("Wrote isolated manifest {:?}", path);
        Ok(())
    }

    /// The underlying document, for inspection.
    pub fn document(&self) -> &Mapping {
        &self.doc
    }
}

fn mapping_entry<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let entry = map
        .entry(Value::String(key.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !entry.is_mapping() {
        *entry = Value::Mapping(Mapping::new());
    }
    match entry {
        Value::Mapping(m) => m,
        _ => unreachable!("entry was just set to a mapping"),
    }
}

fn is_external(volume: &Mapping) -> bool {
    match volume.get("external") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Mapping(_)) => true,
        _ => false,
    }
}

fn service_port_specs(service: &str, definition: &Value) -> Result<Vec<PortSpec>> {
    match definition.as_mapping().and_then(|m| m.get("ports")) {
        Some(ports) => port_specs_of(service, ports),
        None => Ok(Vec::new()),
    }
}

fn port_specs_of(service: &str, ports: &Value) -> Result<Vec<PortSpec>> {
    let entries = port_entries(service, ports)?;

    let mut specs = Vec::new();
    for entry in entries {
        specs.extend(entry_specs(service, entry)?);
    }
    Ok(specs)
}

fn port_entries<'a>(service: &str, ports: &'a Value) -> Result<&'a [Value]> {
    match ports {
        Value::Null => Ok(&[]),
        Value::Sequence(seq) => Ok(seq),
        _ => Err(Error::ConfigInvalid(format!(
            "service {service}: `ports` must be a list"
        ))),
    }
}

fn entry_specs(service: &str, entry: &Value) -> Result<Vec<PortSpec>> {
    match entry {
        Value::Number(n) => Ok(vec![PortSpec {
            host_ip: None,
            target: number_to_port(service, n.as_u64())?,
            protocol: None,
        }]),
        Value::String(s) => parse_short_syntax(service, s),
        Value::Mapping(m) => Ok(vec![parse_long_syntax(service, m)?]),
        other => Err(Error::ConfigInvalid(format!(
            "service {service}: unsupported port entry {other:?}"
        ))),
    }
}

fn number_to_port(service: &str, n: Option<u64>) -> Result<u16> {
    n.and_then(|n| u16::try_from(n).ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| Error::ConfigInvalid(format!("service {service}: invalid port number")))
}

fn parse_port(service: &str, raw: &str) -> Result<u16> {
    number_to_port(service, raw.trim().parse::<u64>().ok())
        .map_err(|_| Error::ConfigInvalid(format!("service {service}: invalid port {raw:?}")))
}

/// Split on `sep` except inside `${...}` interpolations, which may carry
/// defaults such as `${WEB_PORT:-8080}`.
fn split_outside_interpolation(raw: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                depth += 1;
            }
            '}' if depth > 0 => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Host IP position of a three-part short port: an IPv4 literal, empty, or
/// a whole interpolation. Bracketed IPv6 is handled before splitting.
fn is_host_ip(segment: &str) -> bool {
    segment.is_empty()
        || segment.parse::<Ipv4Addr>().is_ok()
        || (segment.starts_with("${") && segment.ends_with('}'))
}

/// `[HOST_IP:][PUBLISHED:]TARGET[-TARGET_END][/PROTOCOL]`
fn parse_short_syntax(service: &str, raw: &str) -> Result<Vec<PortSpec>> {
    let raw = raw.trim();
    let invalid = || Error::ConfigInvalid(format!("service {service}: invalid port {raw:?}"));

    let (rest, protocol) = match split_outside_interpolation(raw, '/').as_slice() {
        [rest] => (*rest, None),
        [rest, proto] => (*rest, Some(proto.to_string())),
        _ => return Err(invalid()),
    };

    let (host_ip, segments) = if rest.starts_with('[') {
        let end = rest.find("]:").ok_or_else(invalid)?;
        if rest[1..end].parse::<Ipv6Addr>().is_err() {
            return Err(invalid());
        }
        (
            Some(rest[..=end].to_string()),
            split_outside_interpolation(&rest[end + 2..], ':'),
        )
    } else {
        let mut segments = split_outside_interpolation(rest, ':');
        if segments.len() == 3 {
            let ip = segments.remove(0);
            if !is_host_ip(ip) {
                return Err(invalid());
            }
            (Some(ip.to_string()), segments)
        } else {
            (None, segments)
        }
    };
    if segments.len() > 2 {
        return Err(invalid());
    }

    let target = segments.last().copied().unwrap_or(rest);
    let (start, end) = match target.split_once('-') {
        Some((a, b)) => (parse_port(service, a)?, parse_port(service, b)?),
        None => {
            let p = parse_port(service, target)?;
            (p, p)
        }
    };
    if end < start {
        return Err(Error::ConfigInvalid(format!(
            "service {service}: invalid port range {raw:?}"
        )));
    }

    Ok((start..=end)
        .map(|target| PortSpec {
            host_ip: host_ip.clone().filter(|ip| !ip.is_empty()),
            target,
            protocol: protocol.clone(),
        })
        .collect())
}

fn parse_long_syntax(service: &str, entry: &Mapping) -> Result<PortSpec> {
    let target = match entry.get("target") {
        Some(Value::Number(n)) => number_to_port(service, n.as_u64())?,
        Some(Value::String(s)) => parse_port(service, s)?,
        _ => {
            return Err(Error::ConfigInvalid(format!(
                "service {service}: long-syntax port requires `target`"
            )));
        }
    };
    Ok(PortSpec {
        host_ip: entry
            .get("host_ip")
            .and_then(Value::as_str)
            .map(str::to_string),
        target,
        protocol: entry
            .get("protocol")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn render_port(spec: &PortSpec, host_port: u16) -> String {
    let mut out = String::new();
    if let Some(ref ip) = spec.host_ip {
        out.push_str(ip);
        out.push(':');
    }
    out.push_str(&format!("{}:{}", host_port, spec.target));
    if let Some(ref proto) = spec.protocol {
        out.push('/');
        out.push_str(proto);
    }
    out
}
