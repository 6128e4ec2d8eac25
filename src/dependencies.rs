//! Component dependency graph checks
//!
//! Dependencies are edges between components of the same composition. The
//! existence check is always available; cycle detection is opt-in and uses a
//! depth-first walk over the same edges.

use std::collections::{HashMap, HashSet};

use crate::validation::ValidatedComponent;

/// Report every dependency that names a component missing from the composition
///
/// Violations are returned in declaration order: components first, then each
/// component's dependency list.
pub fn check_dependencies(components: &[ValidatedComponent]) -> Result<(), Vec<String>> {
    let names: HashSet<&str> = components.iter().map(|c| c.name.as_str()).collect();

    let errors: Vec<String> = components
        .iter()
        .flat_map(|component| {
            component
                .dependencies
                .iter()
                .filter(|dep| !names.contains(dep.as_str()))
                .map(move |dep| {
                    format!(
                        "Component '{}' depends on '{}' which does not exist",
                        component.name, dep
                    )
                })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Find dependency cycles
///
/// Each cycle is returned as the path of component names that closes on its
/// first element, e.g. `["a", "b", "a"]`. Edges to missing components are
/// ignored.
pub fn find_cycles(components: &[ValidatedComponent]) -> Vec<Vec<String>> {
    let mut edges: HashMap<&str, &[String]> = HashMap::new();
    for component in components {
        edges
            .entry(component.name.as_str())
            .or_insert(component.dependencies.as_slice());
    }

    let mut walk = CycleWalk {
        edges: &edges,
        done: HashSet::new(),
        path: Vec::new(),
        cycles: Vec::new(),
    };
    for component in components {
        walk.visit(&component.name);
    }
    walk.cycles
}

struct CycleWalk<'a> {
    edges: &'a HashMap<&'a str, &'a [String]>,
    done: HashSet<&'a str>,
    path: Vec<&'a str>,
    cycles: Vec<Vec<String>>,
}

impl<'a> CycleWalk<'a> {
    fn visit(&mut self, name: &'a str) {
        if self.done.contains(name) {
            return;
        }
        if let Some(start) = self.path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = self.path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            self.cycles.push(cycle);
            return;
        }
        let Some(deps) = self.edges.get(name).copied() else {
            return;
        };

        self.path.push(name);
        for dep in deps {
            self.visit(dep);
        }
        self.path.pop();
        self.done.insert(name);
    }
}

/// Run the full dependency check
///
/// Missing dependencies are always reported. When `reject_cycles` is set,
/// each cycle is reported as well.
pub fn check_dependency_graph(
    components: &[ValidatedComponent],
    reject_cycles: bool,
) -> Result<(), Vec<String>> {
    let mut errors = check_dependencies(components).err().unwrap_or_default();

    if reject_cycles {
        errors.extend(
            find_cycles(components)
                .into_iter()
                .map(|cycle| format!("Dependency cycle detected: {}", cycle.join(" -> "))),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
