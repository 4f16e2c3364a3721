//! Live project set and document routing.

use camino::Utf8Path;

use crate::descriptor::ProjectDescriptor;
use crate::descriptor::ProjectId;
use crate::selector::Selector;

/// One registered project: its descriptor plus whatever runtime object the
/// host attached to it.
#[derive(Debug)]
pub struct RegisteredProject<P> {
    id: ProjectId,
    descriptor: ProjectDescriptor,
    project: P,
}

impl<P> RegisteredProject<P> {
    #[must_use]
    pub fn id(&self) -> ProjectId {
        self.id
    }

    #[must_use]
    pub fn descriptor(&self) -> &ProjectDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn project(&self) -> &P {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut P {
        &mut self.project
    }

    #[must_use]
    pub fn into_project(self) -> P {
        self.project
    }
}

/// Owns every live project. Ids increase monotonically for the lifetime of
/// the registry, across [`Self::unregister_all`] calls.
#[derive(Debug)]
pub struct ProjectRegistry<P> {
    entries: Vec<RegisteredProject<P>>,
    next_id: u32,
}

impl<P> Default for ProjectRegistry<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<P> ProjectRegistry<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ProjectDescriptor, project: P) -> ProjectId {
        let id = ProjectId::from_raw(self.next_id);
        self.next_id += 1;
        tracing::debug!(
            id = %id,
            config = ?descriptor.config_path(),
            selectors = descriptor.selectors().len(),
            "registered project"
        );
        self.entries.push(RegisteredProject {
            id,
            descriptor,
            project,
        });
        id
    }

    /// Remove every project, handing them back for disposal.
    pub fn unregister_all(&mut self) -> Vec<RegisteredProject<P>> {
        std::mem::take(&mut self.entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProject<P>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisteredProject<P>> {
        self.entries.iter_mut()
    }

    #[must_use]
    pub fn get(&self, id: ProjectId) -> Option<&RegisteredProject<P>> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn get_mut(&mut self, id: ProjectId) -> Option<&mut RegisteredProject<P>> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// The project that owns `path`, if any.
    ///
    /// Among projects with a config path, the one holding the best-ranked
    /// matching selector wins; ties go to the earlier registration. A project
    /// with a matching negated selector is skipped entirely. When nothing
    /// matches, the first configless project is returned.
    #[must_use]
    pub fn resolve(&self, path: &Utf8Path) -> Option<&RegisteredProject<P>> {
        let mut best: Option<(usize, &RegisteredProject<P>)> = None;

        for entry in &self.entries {
            if entry.descriptor.config_path().is_none() {
                continue;
            }

            let Some(rank) = best_match(entry.descriptor.selectors(), path) else {
                continue;
            };

            if best.is_none_or(|(best_rank, _)| rank < best_rank) {
                best = Some((rank, entry));
            }
        }

        best.map(|(_, entry)| entry).or_else(|| {
            self.entries
                .iter()
                .find(|entry| entry.descriptor.config_path().is_none())
        })
    }

    #[must_use]
    pub fn resolve_id(&self, path: &Utf8Path) -> Option<ProjectId> {
        self.resolve(path).map(RegisteredProject::id)
    }
}

/// Best rank among the selectors matching `path`, or `None` if nothing
/// matches or a negated selector vetoes the project.
fn best_match(selectors: &[Selector], path: &Utf8Path) -> Option<usize> {
    let negated = selectors.iter().filter(|s| s.is_negated());
    let positive = selectors.iter().filter(|s| !s.is_negated());

    let mut best = None;
    for selector in negated.chain(positive) {
        if !selector.matches(path) {
            continue;
        }
        if selector.is_negated() {
            return None;
        }
        let rank = selector.priority().rank();
        if best.is_none_or(|b| rank < b) {
            best = Some(rank);
        }
    }
    best
}
