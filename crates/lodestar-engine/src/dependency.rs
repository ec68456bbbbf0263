//! Dependency resolution: attaching concrete upstream references to a
//! job's declared and discovered dependencies.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use lodestar_state::{ProjectStore, SpecStore, SpecStoreFactory};
use lodestar_types::{
    DependencyKind, Event, JobDependency, JobSpec, Observer, Project, ProjectName,
};
use regex::Regex;

use crate::errors::{Result, SyncError};

/// Upstream macro references embedded in task config values and asset
/// templates, e.g. `{{ upstream "daily-rollup" }}`.
static UPSTREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*upstream\s+"([^"]+)"\s*\}\}"#).expect("valid upstream macro regex")
});

/// Resolves the dependency list of a single spec against the project's
/// spec set and, for qualified references, the project registry.
///
/// `resolve` is deterministic for a fixed store snapshot and never mutates
/// its input; the enriched dependency set is attached to a returned copy.
pub struct DependencyResolver {
    projects: Option<Arc<dyn ProjectStore>>,
    foreign_specs: Option<Arc<dyn SpecStoreFactory>>,
}

impl DependencyResolver {
    /// A resolver for intra-project and external dependencies only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            projects: None,
            foreign_specs: None,
        }
    }

    /// A resolver that can also chase `project/job` qualified references
    /// through the registry.
    #[must_use]
    pub fn with_registry(
        projects: Arc<dyn ProjectStore>,
        foreign_specs: Arc<dyn SpecStoreFactory>,
    ) -> Self {
        Self {
            projects: Some(projects),
            foreign_specs: Some(foreign_specs),
        }
    }

    /// Materialize `spec`'s dependency list.
    ///
    /// Upstreams come from the declared `dependencies` entries plus
    /// `{{ upstream "name" }}` macros scanned out of task config values
    /// and asset templates. Duplicates collapse onto one entry.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cycle`] when the spec names itself;
    /// [`SyncError::UnknownDependency`] when an upstream without an
    /// external marker resolves nowhere (also notified on `observer`);
    /// [`SyncError::Store`] on storage failure.
    pub fn resolve(
        &self,
        project: &Project,
        store: &dyn SpecStore,
        spec: &JobSpec,
        observer: Option<&dyn Observer>,
    ) -> Result<JobSpec> {
        let mut resolved: BTreeMap<String, JobDependency> = BTreeMap::new();

        for (name, declared) in &spec.dependencies {
            if declared.kind == DependencyKind::External {
                resolved.insert(name.clone(), declared.clone());
                continue;
            }
            let dependency = self.classify(project, store, spec, name, observer)?;
            resolved.insert(dependency.0, dependency.1);
        }

        for name in discover_upstream_macros(spec) {
            if resolved.contains_key(&name) {
                continue;
            }
            let dependency = self.classify(project, store, spec, &name, observer)?;
            resolved.insert(dependency.0, dependency.1);
        }

        let mut enriched = spec.clone();
        enriched.dependencies = resolved;
        Ok(enriched)
    }

    /// Work out what a non-external upstream reference points at.
    fn classify(
        &self,
        project: &Project,
        store: &dyn SpecStore,
        spec: &JobSpec,
        reference: &str,
        observer: Option<&dyn Observer>,
    ) -> Result<(String, JobDependency)> {
        if let Some((project_name, job_name)) = reference.split_once('/') {
            return self.classify_foreign(project, spec, project_name, job_name, observer);
        }

        if reference == spec.name {
            return Err(SyncError::Cycle {
                nodes: vec![spec.name.clone()],
            });
        }

        if store.get_by_name(reference)?.is_some() {
            return Ok((
                reference.to_string(),
                JobDependency {
                    kind: DependencyKind::IntraProject,
                    project: None,
                },
            ));
        }

        Err(self.unknown(spec, reference, observer))
    }

    fn classify_foreign(
        &self,
        project: &Project,
        spec: &JobSpec,
        project_name: &str,
        job_name: &str,
        observer: Option<&dyn Observer>,
    ) -> Result<(String, JobDependency)> {
        if project_name == project.name.as_str() && job_name == spec.name {
            return Err(SyncError::Cycle {
                nodes: vec![spec.name.clone()],
            });
        }

        let (Some(projects), Some(foreign_specs)) = (&self.projects, &self.foreign_specs) else {
            let reference = format!("{project_name}/{job_name}");
            return Err(self.unknown(spec, &reference, observer));
        };

        let foreign_project = match projects.get_by_name(project_name) {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                let reference = format!("{project_name}/{job_name}");
                return Err(self.unknown(spec, &reference, observer));
            }
            Err(e) => return Err(e.into()),
        };

        let foreign_store = foreign_specs.open(&foreign_project)?;
        if foreign_store.get_by_name(job_name)?.is_none() {
            let reference = format!("{project_name}/{job_name}");
            return Err(self.unknown(spec, &reference, observer));
        }

        let kind = if project_name == project.name.as_str() {
            DependencyKind::IntraProject
        } else {
            DependencyKind::InterProject
        };
        Ok((
            job_name.to_string(),
            JobDependency {
                kind,
                project: if kind == DependencyKind::InterProject {
                    ProjectName::new(project_name)
                } else {
                    None
                },
            },
        ))
    }

    fn unknown(
        &self,
        spec: &JobSpec,
        reference: &str,
        observer: Option<&dyn Observer>,
    ) -> SyncError {
        if let Some(observer) = observer {
            observer.notify(&Event::JobUnknownDependencyUsed {
                job: spec.name.clone(),
                dependency: reference.to_string(),
            });
        }
        SyncError::UnknownDependency {
            job: spec.name.clone(),
            dependency: reference.to_string(),
        }
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Upstream names referenced by macros in task config and assets, in
/// first-seen order with duplicates removed.
fn discover_upstream_macros(spec: &JobSpec) -> Vec<String> {
    let mut seen = Vec::new();
    let sources = spec
        .task
        .config
        .values()
        .chain(spec.assets.values());
    for text in sources {
        for capture in UPSTREAM_RE.captures_iter(text) {
            let name = capture[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use lodestar_state::memory::{MemRegistry, MemSpecStore, MemSpecStoreFactory};
    use lodestar_types::progress::testing::RecordingObserver;
    use lodestar_types::{Schedule, Task};

    use super::*;

    fn spec(name: &str) -> JobSpec {
        JobSpec {
            version: 1,
            name: name.to_string(),
            owner: "lodestar".to_string(),
            schedule: Schedule {
                start_date: Utc.with_ymd_and_hms(2020, 12, 2, 0, 0, 0).unwrap(),
                end_date: None,
                interval: "@daily".to_string(),
            },
            task: Task {
                kind: "bq2bq".to_string(),
                ..Task::default()
            },
            assets: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    fn declared(name: &str, kind: DependencyKind) -> (String, JobDependency) {
        (
            name.to_string(),
            JobDependency {
                kind,
                project: None,
            },
        )
    }

    #[test]
    fn resolves_declared_intra_project_dependency() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::with_specs([spec("upstream-job")]);
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("upstream-job", DependencyKind::IntraProject)]);

        let resolved = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap();
        assert_eq!(
            resolved.dependencies["upstream-job"].kind,
            DependencyKind::IntraProject
        );
        // Input untouched.
        assert_eq!(subject.dependencies.len(), 1);
    }

    #[test]
    fn external_dependencies_pass_through_unresolved() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::new();
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("warehouse-export", DependencyKind::External)]);

        let resolved = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap();
        assert_eq!(
            resolved.dependencies["warehouse-export"].kind,
            DependencyKind::External
        );
    }

    #[test]
    fn discovers_macros_in_config_and_assets() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::with_specs([spec("rollup"), spec("ingest")]);
        let mut subject = spec("test");
        subject.task.config.insert(
            "sql_source".to_string(),
            r#"select * from {{ upstream "rollup" }}"#.to_string(),
        );
        subject.assets.insert(
            "query.sql".to_string(),
            r#"join {{ upstream "ingest" }} using (id) -- {{ upstream "rollup" }}"#.to_string(),
        );

        let resolved = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap();
        assert_eq!(resolved.dependencies.len(), 2);
        assert!(resolved.dependencies.contains_key("rollup"));
        assert!(resolved.dependencies.contains_key("ingest"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::with_specs([spec("test")]);
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("test", DependencyKind::IntraProject)]);

        let err = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::Cycle { nodes } if nodes == vec!["test".to_string()]));
    }

    #[test]
    fn unknown_dependency_notifies_and_errors() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::new();
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("ghost", DependencyKind::IntraProject)]);

        let observer = RecordingObserver::new();
        let err = DependencyResolver::new()
            .resolve(&project, &store, &subject, Some(&observer))
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownDependency { .. }));

        let events = observer.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::JobUnknownDependencyUsed { job, dependency }
                if job == "test" && dependency == "ghost"
        ));
    }

    #[test]
    fn qualified_reference_resolves_through_registry() {
        let project = Project::new("proj").unwrap();
        let other = Project::new("other").unwrap();

        let registry = Arc::new(MemRegistry::new());
        registry.save(&other).unwrap();

        let foreign_factory = Arc::new(MemSpecStoreFactory::new());
        foreign_factory
            .store_for(&other)
            .save(&spec("shared-rollup"))
            .unwrap();

        let resolver = DependencyResolver::with_registry(registry, foreign_factory);
        let store = MemSpecStore::new();
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("other/shared-rollup", DependencyKind::IntraProject)]);

        let resolved = resolver.resolve(&project, &store, &subject, None).unwrap();
        let dep = &resolved.dependencies["shared-rollup"];
        assert_eq!(dep.kind, DependencyKind::InterProject);
        assert_eq!(dep.project.as_ref().unwrap().as_str(), "other");
    }

    #[test]
    fn qualified_reference_without_registry_is_unknown() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::new();
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("other/shared-rollup", DependencyKind::IntraProject)]);

        let err = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap_err();
        assert!(
            matches!(err, SyncError::UnknownDependency { dependency, .. }
                if dependency == "other/shared-rollup")
        );
    }

    #[test]
    fn duplicate_references_are_deduplicated() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::with_specs([spec("rollup")]);
        let mut subject = spec("test");
        subject
            .dependencies
            .extend([declared("rollup", DependencyKind::IntraProject)]);
        subject.task.config.insert(
            "sql".to_string(),
            r#"{{ upstream "rollup" }}"#.to_string(),
        );

        let resolved = DependencyResolver::new()
            .resolve(&project, &store, &subject, None)
            .unwrap();
        assert_eq!(resolved.dependencies.len(), 1);
    }

    #[test]
    fn resolution_is_deterministic() {
        let project = Project::new("proj").unwrap();
        let store = MemSpecStore::with_specs([spec("a"), spec("b")]);
        let mut subject = spec("test");
        subject.dependencies.extend([
            declared("b", DependencyKind::IntraProject),
            declared("a", DependencyKind::IntraProject),
        ]);

        let resolver = DependencyResolver::new();
        let first = resolver.resolve(&project, &store, &subject, None).unwrap();
        let second = resolver.resolve(&project, &store, &subject, None).unwrap();
        assert_eq!(first, second);
    }
}
