//! Dependency-ordered component bootstrap.
//!
//! Components declare dependencies by name. Initialization proceeds in
//! topological rounds: every component whose dependencies are satisfied
//! runs in the current round, so independent components start together. A
//! dependency cycle is a fatal startup error naming the cycle members,
//! never silently resolved by an arbitrary tie-break.

use std::collections::{HashMap, HashSet};

use crate::error::{ComputationError, ConfigurationError, TerraError, TerraResult};

type InitFn = Box<dyn Fn() -> Result<(), ComputationError> + Send + Sync>;

struct Component {
    name: String,
    dependencies: Vec<String>,
    init: InitFn,
}

/// Registry of bootstrappable components.
#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<Component>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.components.iter().map(|c| &c.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component with its dependencies and init function.
    ///
    /// Re-registering a name replaces the previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        dependencies: Vec<String>,
        init: impl Fn() -> Result<(), ComputationError> + Send + Sync + 'static,
    ) {
        let name = name.into();
        self.components.retain(|c| c.name != name);
        self.components.push(Component {
            name,
            dependencies,
            init: Box::new(init),
        });
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Computes the topological initialization rounds.
    ///
    /// Each round lists the components that become ready together, in
    /// lexical order (deterministic).
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::UnknownDependency` for a dependency on an
    ///   unregistered name.
    /// - `ConfigurationError::DependencyCycle` naming the components in
    ///   the cycle, plus any blocked behind it (lexically sorted).
    pub fn rounds(&self) -> Result<Vec<Vec<String>>, ConfigurationError> {
        let known: HashSet<&str> = self.components.iter().map(|c| c.name.as_str()).collect();
        for component in &self.components {
            for dep in &component.dependencies {
                if !known.contains(dep.as_str()) {
                    return Err(ConfigurationError::UnknownDependency {
                        component: component.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut remaining: HashMap<&str, HashSet<&str>> = self
            .components
            .iter()
            .map(|c| {
                (
                    c.name.as_str(),
                    c.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut rounds: Vec<Vec<String>> = Vec::new();
        let mut done: HashSet<&str> = HashSet::new();

        while !remaining.is_empty() {
            let mut ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.iter().all(|d| done.contains(d)))
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                // Everything left participates in (or depends on) a cycle.
                let mut members: Vec<String> =
                    remaining.keys().map(ToString::to_string).collect();
                members.sort();
                return Err(ConfigurationError::DependencyCycle { members });
            }

            ready.sort_unstable();
            for name in &ready {
                remaining.remove(name);
                done.insert(name);
            }
            rounds.push(ready.into_iter().map(ToString::to_string).collect());
        }

        Ok(rounds)
    }

    /// Runs every component's init function in dependency order.
    ///
    /// Returns the executed rounds. An init failure stops the bootstrap:
    /// components in later rounds (and later in the same round) do not run.
    pub fn bootstrap(&self) -> TerraResult<Vec<Vec<String>>> {
        let rounds = self.rounds().map_err(TerraError::Configuration)?;
        let by_name: HashMap<&str, &Component> = self
            .components
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        for round in &rounds {
            for name in round {
                let component = by_name
                    .get(name.as_str())
                    .ok_or_else(|| TerraError::internal("bootstrap round lists unknown component"))?;
                tracing::debug!(component = %name, "bootstrapping component");
                (component.init)().map_err(TerraError::Computation)?;
            }
        }

        Ok(rounds)
    }
}
