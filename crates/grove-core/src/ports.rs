//! Deterministic host-port allocation.
//!
//! Each environment owns the 100 host ports starting at
//! `10000 + environment_id * 100`. A container port maps to
//! `base + (container_port % 100)`; when that slot is already taken within the
//! same call, the first free slot scanning up from `base` is used instead.
//!
//! Services are visited in name order and ports in ascending order, so the
//! same manifest and environment id always produce the same allocations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const BASE_PORT: u32 = 10_000;
pub const PORTS_PER_ENVIRONMENT: u32 = 100;

/// A single published port for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortSlot {
    pub container_port: u16,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub service: String,
    pub container_port: u16,
    pub host_port: u16,
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.service, self.container_port, self.host_port)
    }
}

/// Inclusive host port range owned by an environment.
pub fn port_range(environment_id: i64) -> Result<(u16, u16)> {
    let base = i64::from(BASE_PORT) + environment_id * i64::from(PORTS_PER_ENVIRONMENT);
    let last = base + i64::from(PORTS_PER_ENVIRONMENT) - 1;
    if environment_id < 0 || last > i64::from(u16::MAX) {
        return Err(Error::PortRangeInvalid(environment_id));
    }
    Ok((base as u16, last as u16))
}

/// Allocate host ports for every declared `(service, container_port)` pair.
///
/// Fails with [`Error::PortRangeExhausted`] when more than 100 ports are
/// requested, before anything is assigned.
pub fn allocate(
    environment_id: i64,
    service_ports: &BTreeMap<String, Vec<u16>>,
) -> Result<Vec<Allocation>> {
    let (base, _) = port_range(environment_id)?;

    let requested: usize = service_ports
        .values()
        .map(|ports| ports.iter().collect::<BTreeSet<_>>().len())
        .sum();
    if requested > PORTS_PER_ENVIRONMENT as usize {
        return Err(Error::PortRangeExhausted {
            environment_id,
            requested,
        });
    }

    let mut claimed = [false; PORTS_PER_ENVIRONMENT as usize];
    let mut allocations = Vec::with_capacity(requested);

    for (service, ports) in service_ports {
        let sorted: BTreeSet<u16> = ports.iter().copied().collect();
        for container_port in sorted {
            let preferred = usize::from(container_port % 100);
            let offset = if claimed[preferred] {
                // Count check above guarantees a free slot.
                claimed
                    .iter()
                    .position(|taken| !taken)
                    .ok_or(Error::PortRangeExhausted {
                        environment_id,
                        requested,
                    })?
            } else {
                preferred
            };
            claimed[offset] = true;
            allocations.push(Allocation {
                service: service.clone(),
                container_port,
                host_port: base + offset as u16,
            });
        }
    }

    Ok(allocations)
}

/// Group allocations by service, ports sorted by container port.
pub fn by_service(allocations: &[Allocation]) -> BTreeMap<String, Vec<PortSlot>> {
    let mut grouped: BTreeMap<String, Vec<PortSlot>> = BTreeMap::new();
    for alloc in allocations {
        grouped.entry(alloc.service.clone()).or_default().push(PortSlot {
            container_port: alloc.container_port,
            host_port: alloc.host_port,
        });
    }
    for slots in grouped.values_mut() {
        slots.sort();
    }
    grouped
}
