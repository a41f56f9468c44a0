//! Dependency resolution: cycle checks and transitive time displacement.

use std::collections::{HashMap, VecDeque};

use contracts::{ReadoutError, StreamId};

use crate::registry::Registry;

/// Walk the dependencies of `name` (produced by a driver reading `dependencies`)
/// and fail if any path leads back to a collection already on it.
pub(crate) fn validate_dependencies(
    registry: &Registry,
    name: &str,
    dependencies: &[StreamId],
) -> Result<(), ReadoutError> {
    let mut ancestors = vec![name];
    walk(registry, name, dependencies, &mut ancestors)
}

fn walk<'a>(
    registry: &'a Registry,
    name: &str,
    dependencies: &'a [StreamId],
    ancestors: &mut Vec<&'a str>,
) -> Result<(), ReadoutError> {
    for dependency in dependencies {
        if ancestors.contains(&dependency.as_str()) {
            return Err(ReadoutError::CircularDependency {
                dependency: name.to_string(),
                dependent: dependency.to_string(),
            });
        }
        let entry = registry.stream(dependency).map_err(|_| {
            ReadoutError::UnregisteredDependency {
                dependency: dependency.to_string(),
                consumer: name.to_string(),
            }
        })?;
        let producer = registry.driver(entry.descriptor.producer)?;

        ancestors.push(dependency.as_str());
        walk(registry, dependency, &producer.dependencies, ancestors)?;
        ancestors.pop();
    }
    Ok(())
}

/// Largest displacement among `dependencies` plus the driver's own displacement.
///
/// Dependencies must be registered; their displacements are already cached.
pub(crate) fn total_time_displacement(
    registry: &Registry,
    consumer: &str,
    dependencies: &[StreamId],
    local_displacement: f64,
) -> Result<f64, ReadoutError> {
    let mut upstream: f64 = 0.0;
    for dependency in dependencies {
        let entry = registry.stream(dependency).map_err(|_| {
            ReadoutError::UnregisteredDependency {
                dependency: dependency.to_string(),
                consumer: consumer.to_string(),
            }
        })?;
        upstream = upstream.max(entry.descriptor.time_displacement);
    }
    Ok(upstream + local_displacement)
}

/// Order every registered stream so that each comes after the streams its
/// producer reads (Kahn's algorithm over the whole graph).
pub(crate) fn topological_order(registry: &Registry) -> Result<Vec<StreamId>, ReadoutError> {
    let names = registry.stream_names();
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut consumers: HashMap<&str, Vec<&str>> = HashMap::new();

    for entry in registry.streams() {
        let name = entry.descriptor.name.as_str();
        let producer = registry.driver(entry.descriptor.producer)?;
        for dependency in &producer.dependencies {
            if !registry.contains(dependency) {
                return Err(ReadoutError::UnregisteredDependency {
                    dependency: dependency.to_string(),
                    consumer: name.to_string(),
                });
            }
            consumers.entry(dependency.as_str()).or_default().push(name);
            *in_degree.entry(name).or_default() += 1;
        }
    }

    let mut ready: VecDeque<&str> = names
        .iter()
        .map(StreamId::as_str)
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(name) = ready.pop_front() {
        order.push(StreamId::from(name));
        for &consumer in consumers.get(name).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(consumer) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(consumer);
                }
            }
        }
    }

    if order.len() < names.len() {
        return Err(cycle_error(registry, &in_degree));
    }
    Ok(order)
}

/// Describe one edge of a cycle left over by the sort
fn cycle_error(registry: &Registry, in_degree: &HashMap<&str, usize>) -> ReadoutError {
    let stuck = registry.streams().find_map(|entry| {
        let name = entry.descriptor.name.as_str();
        if in_degree.get(name).copied().unwrap_or(0) == 0 {
            return None;
        }
        let producer = registry.driver(entry.descriptor.producer).ok()?;
        producer
            .dependencies
            .iter()
            .find(|d| in_degree.get(d.as_str()).copied().unwrap_or(0) > 0)
            .map(|d| (name.to_string(), d.to_string()))
    });

    match stuck {
        Some((dependency, dependent)) => ReadoutError::CircularDependency {
            dependency,
            dependent,
        },
        None => ReadoutError::Other("dependency graph contains a cycle".into()),
    }
}
