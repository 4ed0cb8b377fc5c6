//! The parameter/result tree.
//!
//! A [`Tree`] owns every node by full path, keeps a [`PathIndex`] in step with
//! each add and remove, and records which parameters are explored and which
//! runs have completed. Structural mutation is single-threaded: workers only
//! ever see an owned [`RunView`] and hand back a [`RunOutput`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{ExplorationError, Result, StructuralError};
use crate::exploration::{exploration_fingerprint, Combination, ExplorationPlan};
use crate::naming::{
    self, is_within, join, leaf_of, owning_run, parent_of, reject_reserved, run_prefix,
    run_scoped_path, validate_path, RUNS_GROUP,
};
use crate::node::{Group, Node, NodeHandle, Parameter, Payload, ResultNode};
use crate::path_index::PathIndex;
use crate::value::Value;

#[path = "tree/view.rs"]
mod view;

pub use view::{RunInput, RunOutput, RunView};

const ROOT: &str = "";

#[derive(Debug, Clone)]
pub struct Tree {
    name: String,
    nodes: HashMap<String, Node>,
    index: PathIndex,
    explored: Vec<String>,
    run_count: usize,
    completed: BTreeSet<usize>,
}

impl Tree {
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), Node::Group(Group::default()));
        Self {
            name: name.into(),
            nodes,
            index: PathIndex::new(),
            explored: Vec::new(),
            run_count: 0,
            completed: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Number of nodes, the root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- structure ---------------------------------------------------------

    pub fn add_group(&mut self, path: &str) -> Result<()> {
        reject_reserved(path)?;
        self.insert_node(path, Node::Group(Group::default()))
    }

    /// Adds a parameter; its type tag is taken from `default`.
    pub fn add_parameter(&mut self, path: &str, default: impl Into<Value>) -> Result<()> {
        reject_reserved(path)?;
        self.insert_node(path, Node::Parameter(Parameter::new(default.into())))
    }

    /// Adds an aggregate (run-independent) result with named items.
    pub fn add_result<K, V>(&mut self, path: &str, items: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        reject_reserved(path)?;
        let items = items
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        self.insert_node(path, Node::Result(ResultNode::loaded(None, items)))
    }

    /// Adds an aggregate result holding a single item named after the leaf.
    pub fn add_result_value(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let leaf = leaf_of(path).to_string();
        let value: Value = value.into();
        self.add_result(path, [(leaf, value)])
    }

    fn insert_node(&mut self, path: &str, node: Node) -> Result<()> {
        validate_path(path)?;
        if self.nodes.contains_key(path) {
            return Err(StructuralError::DuplicatePath(path.to_string()).into());
        }
        let parent = parent_of(path);
        self.ensure_group(parent)?;

        self.group_mut(parent)?.push_child(leaf_of(path));
        self.nodes.insert(path.to_string(), node);
        self.index.insert(path);
        Ok(())
    }

    /// Creates `path` and any missing ancestors as groups.
    fn ensure_group(&mut self, path: &str) -> Result<()> {
        match self.nodes.get(path) {
            Some(Node::Group(_)) => return Ok(()),
            Some(_) => return Err(StructuralError::NotAGroup(path.to_string()).into()),
            None => {}
        }
        let parent = parent_of(path);
        self.ensure_group(parent)?;
        self.group_mut(parent)?.push_child(leaf_of(path));
        self.nodes
            .insert(path.to_string(), Node::Group(Group::default()));
        self.index.insert(path);
        Ok(())
    }

    fn group_mut(&mut self, path: &str) -> Result<&mut Group> {
        match self.nodes.get_mut(path) {
            Some(Node::Group(group)) => Ok(group),
            Some(_) => Err(StructuralError::NotAGroup(path.to_string()).into()),
            None => Err(StructuralError::NotFound(path.to_string()).into()),
        }
    }

    /// Removes the node at `full_path` together with its subtree.
    pub fn remove(&mut self, full_path: &str) -> Result<()> {
        if full_path.is_empty() {
            return Err(StructuralError::RootRemoval.into());
        }
        if !self.nodes.contains_key(full_path) {
            return Err(StructuralError::NotFound(full_path.to_string()).into());
        }

        let doomed = self.subtree_paths(full_path);
        if let Some(explored) = doomed
            .iter()
            .find(|path| self.explored.iter().any(|explored| explored == *path))
        {
            return Err(StructuralError::ExploredParameter(explored.clone()).into());
        }

        self.group_mut(parent_of(full_path))?
            .remove_child(leaf_of(full_path));
        for path in &doomed {
            self.nodes.remove(path);
            self.index.remove(path);
        }
        Ok(())
    }

    // -- lookup ------------------------------------------------------------

    /// Resolves a full path or a natural-naming shorthand.
    pub fn get(&self, shorthand: &str) -> Result<NodeHandle<'_>> {
        let full = self.index.resolve(shorthand)?;
        self.handle(&full)
    }

    /// Like [`Tree::get`], but only among nodes a run view of `run` may see.
    pub fn get_in_run(&self, run: usize, shorthand: &str) -> Result<NodeHandle<'_>> {
        let full = self
            .index
            .resolve_visible(shorthand, |path| owning_run(path).map_or(true, |owner| owner == run))?;
        self.handle(&full)
    }

    fn handle(&self, full: &str) -> Result<NodeHandle<'_>> {
        self.nodes
            .get_key_value(full)
            .map(|(path, node)| NodeHandle::new(path, node))
            .ok_or_else(|| StructuralError::NotFound(full.to_string()).into())
    }

    pub fn contains(&self, full_path: &str) -> bool {
        !full_path.is_empty() && self.nodes.contains_key(full_path)
    }

    pub fn node(&self, full_path: &str) -> Option<&Node> {
        self.nodes.get(full_path)
    }

    pub fn root(&self) -> &Group {
        match self.nodes.get(ROOT) {
            Some(Node::Group(group)) => group,
            _ => unreachable!("the root group is created in Tree::new and never removed"),
        }
    }

    pub fn group(&self, shorthand: &str) -> Result<&Group> {
        let handle = self.get(shorthand)?;
        handle.as_group().ok_or_else(|| wrong_type(&handle, "group"))
    }

    pub fn parameter(&self, shorthand: &str) -> Result<&Parameter> {
        let handle = self.get(shorthand)?;
        handle
            .as_parameter()
            .ok_or_else(|| wrong_type(&handle, "parameter"))
    }

    pub fn result(&self, shorthand: &str) -> Result<&ResultNode> {
        let handle = self.get(shorthand)?;
        handle.as_result().ok_or_else(|| wrong_type(&handle, "result"))
    }

    /// Depth-first traversal in insertion order, root excluded.
    pub fn nodes(&self) -> Vec<(&str, &Node)> {
        self.subtree(ROOT)
    }

    /// `path` and its descendants, depth first. Empty when `path` is unknown.
    pub fn subtree(&self, path: &str) -> Vec<(&str, &Node)> {
        let mut out = Vec::new();
        self.walk(path, &mut out);
        out
    }

    fn walk<'a>(&'a self, path: &str, out: &mut Vec<(&'a str, &'a Node)>) {
        let Some((key, node)) = self.nodes.get_key_value(path) else {
            return;
        };
        if !key.is_empty() {
            out.push((key.as_str(), node));
        }
        if let Node::Group(group) = node {
            for child in group.children() {
                self.walk(&join(key, child), out);
            }
        }
    }

    fn subtree_paths(&self, path: &str) -> Vec<String> {
        self.subtree(path)
            .into_iter()
            .map(|(path, _)| path.to_string())
            .collect()
    }

    pub fn parameters(&self) -> Vec<(&str, &Parameter)> {
        self.nodes()
            .into_iter()
            .filter_map(|(path, node)| node.as_parameter().map(|parameter| (path, parameter)))
            .collect()
    }

    /// Aggregate-scope results.
    pub fn aggregate_results(&self) -> Vec<(&str, &ResultNode)> {
        self.nodes()
            .into_iter()
            .filter_map(|(path, node)| node.as_result().map(|result| (path, result)))
            .filter(|(_, result)| result.run().is_none())
            .collect()
    }

    /// Rebuilds the path index from a full traversal.
    pub fn rebuild_index(&mut self) {
        let index = PathIndex::rebuild(self.nodes().into_iter().map(|(path, _)| path));
        self.index = index;
    }

    // -- exploration -------------------------------------------------------

    pub fn is_explored(&self) -> bool {
        !self.explored.is_empty()
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Explored parameter paths in declaration order.
    pub fn explored_parameters(&self) -> &[String] {
        &self.explored
    }

    /// Binds per-run values; allowed once per tree.
    pub fn explore(&mut self, plan: &ExplorationPlan) -> Result<()> {
        if self.is_explored() {
            return Err(ExplorationError::AlreadyExplored.into());
        }
        let resolved = self.check_plan(plan)?;

        for (path, (_, values)) in resolved.iter().zip(plan.axes()) {
            self.parameter_mut(path)?.set_explored(values.clone());
        }
        self.explored = resolved;
        self.run_count = plan.run_count();
        Ok(())
    }

    /// Appends further runs to an explored tree; the plan must cover exactly the explored parameters.
    pub fn expand(&mut self, plan: &ExplorationPlan) -> Result<()> {
        if !self.is_explored() {
            return Err(ExplorationError::NotExplored.into());
        }
        let resolved = self.check_plan(plan)?;
        let expected: BTreeSet<&String> = self.explored.iter().collect();
        let actual: BTreeSet<&String> = resolved.iter().collect();
        if expected != actual {
            return Err(ExplorationError::ParameterSetMismatch {
                expected: self.explored.clone(),
                actual: resolved,
            }
            .into());
        }

        for (path, (_, values)) in resolved.iter().zip(plan.axes()) {
            self.parameter_mut(path)?.extend_explored(values.clone());
        }
        self.run_count += plan.run_count();
        Ok(())
    }

    /// Resolves every axis to a parameter and type-checks its values.
    fn check_plan(&self, plan: &ExplorationPlan) -> Result<Vec<String>> {
        let mut resolved = Vec::with_capacity(plan.axes().len());
        for (axis, values) in plan.axes() {
            let full = self
                .index
                .resolve(axis)
                .map_err(|_| ExplorationError::UnknownParameter(axis.clone()))?;
            let parameter = self
                .nodes
                .get(&full)
                .and_then(Node::as_parameter)
                .ok_or_else(|| ExplorationError::UnknownParameter(axis.clone()))?;
            if resolved.contains(&full) {
                return Err(ExplorationError::DuplicateAxis(full).into());
            }
            if values.len() != plan.run_count() {
                return Err(ExplorationError::LengthMismatch {
                    path: full,
                    expected: plan.run_count(),
                    actual: values.len(),
                }
                .into());
            }
            if let Some((index, value)) = values
                .iter()
                .enumerate()
                .find(|(_, value)| !parameter.default_value().is_type_compatible(value))
            {
                return Err(ExplorationError::TypeMismatch {
                    path: full,
                    index,
                    expected: parameter.default_value().type_name().to_string(),
                    actual: value.type_name().to_string(),
                }
                .into());
            }
            resolved.push(full);
        }
        Ok(resolved)
    }

    fn parameter_mut(&mut self, full_path: &str) -> Result<&mut Parameter> {
        match self.nodes.get_mut(full_path) {
            Some(Node::Parameter(parameter)) => Ok(parameter),
            Some(other) => Err(StructuralError::WrongNodeType {
                path: full_path.to_string(),
                expected: "parameter",
                actual: other.type_name(),
            }
            .into()),
            None => Err(StructuralError::NotFound(full_path.to_string()).into()),
        }
    }

    fn check_run(&self, run: usize) -> Result<()> {
        if run >= self.run_count {
            return Err(StructuralError::RunOutOfRange {
                run,
                run_count: self.run_count,
            }
            .into());
        }
        Ok(())
    }

    /// Values the explored parameters take in `run`.
    pub fn bindings(&self, run: usize) -> Result<Combination> {
        self.check_run(run)?;
        self.explored
            .iter()
            .map(|path| -> Result<(String, Value)> {
                let value = self
                    .nodes
                    .get(path)
                    .and_then(Node::as_parameter)
                    .and_then(|parameter| parameter.value_for_run(run))
                    .ok_or_else(|| StructuralError::NotFound(path.clone()))?;
                Ok((path.clone(), value.clone()))
            })
            .collect()
    }

    /// Indices of runs whose bindings satisfy `predicate`.
    pub fn find_runs<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&Combination) -> bool,
    {
        (0..self.run_count)
            .filter(|&run| {
                self.bindings(run)
                    .map(|binding| predicate(&binding))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Digest of the explored lists, in declaration order.
    pub fn exploration_fingerprint(&self) -> Option<String> {
        if !self.is_explored() {
            return None;
        }
        let axes: Vec<(&str, &[Value])> = self
            .explored
            .iter()
            .filter_map(|path| {
                let values = self.nodes.get(path)?.as_parameter()?.explored()?;
                Some((path.as_str(), values))
            })
            .collect();
        Some(exploration_fingerprint(axes))
    }

    // -- runs --------------------------------------------------------------

    pub fn run_name(&self, run: usize) -> String {
        naming::run_name(run)
    }

    /// Owned input message for run `run`: every parameter bound to its run value.
    pub fn run_input(&self, run: usize) -> Result<RunInput> {
        self.check_run(run)?;
        let mut parameters = BTreeMap::new();
        for (path, parameter) in self.parameters() {
            let value = parameter
                .value_for_run(run)
                .ok_or_else(|| StructuralError::NotFound(path.to_string()))?;
            parameters.insert(path.to_string(), value.clone());
        }
        Ok(RunInput {
            run,
            parameters,
            explored: self.explored.clone(),
        })
    }

    /// Run-bound facade handed to the simulation callback.
    pub fn run_view(&self, run: usize) -> Result<RunView> {
        Ok(RunView::new(self.run_input(run)?))
    }

    /// Materializes a finished run's results and marks it completed.
    pub fn integrate_run(&mut self, output: RunOutput) -> Result<()> {
        self.check_run(output.run)?;
        if self.completed.contains(&output.run) {
            return Err(StructuralError::RunAlreadyCompleted(output.run).into());
        }
        for (path, items) in output.results {
            let full = run_scoped_path(output.run, &path);
            self.insert_node(&full, Node::Result(ResultNode::loaded(Some(output.run), items)))?;
        }
        self.completed.insert(output.run);
        Ok(())
    }

    pub fn completed_runs(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    pub fn is_completed(&self, run: usize) -> bool {
        self.completed.contains(&run)
    }

    /// Results of `run`, keyed by their path relative to the run namespace.
    pub fn run_results(&self, run: usize) -> Vec<(&str, &ResultNode)> {
        let prefix = run_prefix(run);
        self.subtree(&prefix)
            .into_iter()
            .filter_map(|(path, node)| {
                let relative = path.strip_prefix(prefix.as_str())?.strip_prefix(naming::SEPARATOR)?;
                node.as_result().map(|result| (relative, result))
            })
            .collect()
    }

    /// Value of item `item` of result `path` in `run`, when loaded.
    pub fn run_value(&self, run: usize, path: &str, item: &str) -> Option<&Value> {
        self.nodes
            .get(&run_scoped_path(run, path))?
            .as_result()?
            .value(item)
    }

    // -- restore API used by storage backends -------------------------------

    pub fn restore_group(&mut self, full_path: &str) -> Result<()> {
        validate_path(full_path)?;
        self.ensure_group(full_path)
    }

    /// Inserts or replaces a parameter, bypassing exploration checks.
    ///
    /// Call [`Tree::restore_exploration`] once all parameters are in place.
    pub fn restore_parameter(
        &mut self,
        full_path: &str,
        default: Value,
        explored: Option<Vec<Value>>,
    ) -> Result<()> {
        let mut parameter = Parameter::new(default);
        if let Some(values) = explored {
            parameter.set_explored(values);
        }
        self.replace_node(full_path, Node::Parameter(parameter))
    }

    /// Inserts or replaces a result node; run-scoped paths are accepted.
    pub fn restore_result(
        &mut self,
        full_path: &str,
        run: Option<usize>,
        items: BTreeMap<String, Payload>,
    ) -> Result<()> {
        self.replace_node(full_path, Node::Result(ResultNode::new(run, items)))
    }

    fn replace_node(&mut self, full_path: &str, node: Node) -> Result<()> {
        match self.nodes.get_mut(full_path) {
            Some(existing) if existing.type_name() == node.type_name() => {
                *existing = node;
                Ok(())
            }
            Some(existing) => Err(StructuralError::WrongNodeType {
                path: full_path.to_string(),
                expected: node.type_name(),
                actual: existing.type_name(),
            }
            .into()),
            None => self.insert_node(full_path, node),
        }
    }

    /// Declares the explored parameters and run count of restored parameters.
    pub fn restore_exploration(&mut self, explored: Vec<String>, run_count: usize) -> Result<()> {
        for path in &explored {
            let parameter = self
                .nodes
                .get(path)
                .and_then(Node::as_parameter)
                .ok_or_else(|| ExplorationError::UnknownParameter(path.clone()))?;
            let actual = parameter.explored().map_or(0, <[Value]>::len);
            if actual != run_count {
                return Err(ExplorationError::LengthMismatch {
                    path: path.clone(),
                    expected: run_count,
                    actual,
                }
                .into());
            }
        }
        self.explored = explored;
        self.run_count = run_count;
        Ok(())
    }

    pub fn mark_completed(&mut self, run: usize) -> Result<()> {
        self.check_run(run)?;
        self.completed.insert(run);
        Ok(())
    }

    /// Replaces one item of a result, typically a resolved placeholder.
    pub fn set_result_item(&mut self, full_path: &str, item: &str, payload: Payload) -> Result<()> {
        match self.nodes.get_mut(full_path) {
            Some(Node::Result(result)) => {
                result.set_item(item, payload);
                Ok(())
            }
            Some(other) => Err(StructuralError::WrongNodeType {
                path: full_path.to_string(),
                expected: "result",
                actual: other.type_name(),
            }
            .into()),
            None => Err(StructuralError::NotFound(full_path.to_string()).into()),
        }
    }

    /// `true` when `path` lies in the run namespace.
    pub fn is_run_scoped(path: &str) -> bool {
        is_within(path, RUNS_GROUP)
    }
}

fn wrong_type(handle: &NodeHandle<'_>, expected: &'static str) -> crate::error::Error {
    StructuralError::WrongNodeType {
        path: handle.path().to_string(),
        expected,
        actual: handle.node().type_name(),
    }
    .into()
}

#[cfg(test)]
#[path = "tree/tests.rs"]
mod tests;
