//! Content dependency graph and per-section closure scanning

use super::section::{ObjectId, SceneSection, SectionDependencyInfo};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Metadata and direct dependencies of one content object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentNode {
    pub type_name: String,
    pub path: String,
    pub dependencies: Vec<ObjectId>,
}

/// Directed graph of content objects
#[derive(Clone, Debug, Default)]
pub struct ContentGraph {
    nodes: HashMap<ObjectId, ContentNode>,
}

impl ContentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an object without dependencies
    pub fn add_object(&mut self, id: ObjectId, type_name: impl Into<String>, path: impl Into<String>) {
        self.nodes.insert(id, ContentNode {
            type_name: type_name.into(),
            path: path.into(),
            dependencies: Vec::new(),
        });
    }

    /// Record that `from` references `to`. Returns false if `from` is unknown.
    pub fn add_dependency(&mut self, from: ObjectId, to: ObjectId) -> bool {
        match self.nodes.get_mut(&from) {
            Some(node) => {
                if !node.dependencies.contains(&to) {
                    node.dependencies.push(to);
                }
                true
            }
            None => false,
        }
    }

    pub fn node(&self, id: ObjectId) -> Option<&ContentNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every object reachable from `roots`, roots included, in depth-first
    /// pre-order without duplicates. Unknown objects are kept as leaves.
    pub fn closure(&self, roots: &[ObjectId]) -> Vec<ObjectId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<ObjectId> = roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);

            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.dependencies.iter().rev().copied());
            }
        }

        order
    }

    /// Dependency listing of one section.
    ///
    /// Objects missing from the graph get a null type and an empty path, which
    /// dedupe validation reports.
    pub fn section_info(&self, section: SceneSection, roots: &[ObjectId]) -> SectionDependencyInfo {
        let dependencies = self.closure(roots);
        let mut types = Vec::with_capacity(dependencies.len());
        let mut paths = Vec::with_capacity(dependencies.len());

        for id in &dependencies {
            match self.nodes.get(id) {
                Some(node) => {
                    types.push(Some(node.type_name.clone()));
                    paths.push(node.path.clone());
                }
                None => {
                    types.push(None);
                    paths.push(String::new());
                }
            }
        }

        SectionDependencyInfo::new(section, dependencies, types, paths)
    }

    /// Dependency listings of many sections, scanned in parallel.
    /// Output order matches input order.
    pub fn section_infos(&self, sections: &[(SceneSection, Vec<ObjectId>)]) -> Vec<SectionDependencyInfo> {
        sections
            .par_iter()
            .map(|(section, roots)| self.section_info(*section, roots))
            .collect()
    }
}
