//! Tree nodes: groups, parameters and results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(Group),
    Parameter(Parameter),
    Result(ResultNode),
}

impl Node {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Parameter(_) => "parameter",
            Self::Result(_) => "result",
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Self::Parameter(parameter) => Some(parameter),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&ResultNode> {
        match self {
            Self::Result(result) => Some(result),
            _ => None,
        }
    }
}

/// Pure container. Child names keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    children: Vec<String>,
}

impl Group {
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub(crate) fn push_child(&mut self, name: &str) {
        if !self.children.iter().any(|child| child == name) {
            self.children.push(name.to_string());
        }
    }

    pub(crate) fn remove_child(&mut self, name: &str) {
        self.children.retain(|child| child != name);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    default: Value,
    kind: ValueKind,
    explored: Option<Vec<Value>>,
}

impl Parameter {
    pub fn new(default: Value) -> Self {
        Self {
            kind: default.kind(),
            default,
            explored: None,
        }
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_explored(&self) -> bool {
        self.explored.is_some()
    }

    pub fn explored(&self) -> Option<&[Value]> {
        self.explored.as_deref()
    }

    /// The run-bound value, or the default for parameters that are not explored.
    pub fn value_for_run(&self, run: usize) -> Option<&Value> {
        match &self.explored {
            Some(values) => values.get(run),
            None => Some(&self.default),
        }
    }

    pub(crate) fn set_explored(&mut self, values: Vec<Value>) {
        self.explored = Some(values);
    }

    pub(crate) fn extend_explored(&mut self, values: Vec<Value>) {
        self.explored.get_or_insert_with(Vec::new).extend(values);
    }
}

/// Where an unloaded item lives inside a store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// Identifies the store that handed out the locator.
    pub store: u64,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Loaded(Value),
    Unresolved(Locator),
}

impl Payload {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unresolved(_) => None,
        }
    }

    pub fn locator(&self) -> Option<Locator> {
        match self {
            Self::Loaded(_) => None,
            Self::Unresolved(locator) => Some(*locator),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Named data items scoped to one run, or to the aggregate scope when `run` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultNode {
    run: Option<usize>,
    items: BTreeMap<String, Payload>,
}

impl ResultNode {
    pub fn new(run: Option<usize>, items: BTreeMap<String, Payload>) -> Self {
        Self { run, items }
    }

    pub fn loaded(run: Option<usize>, items: BTreeMap<String, Value>) -> Self {
        Self {
            run,
            items: items
                .into_iter()
                .map(|(name, value)| (name, Payload::Loaded(value)))
                .collect(),
        }
    }

    pub fn run(&self) -> Option<usize> {
        self.run
    }

    pub fn items(&self) -> &BTreeMap<String, Payload> {
        &self.items
    }

    pub fn item(&self, name: &str) -> Option<&Payload> {
        self.items.get(name)
    }

    /// Loaded value of `name`; `None` when missing or still unresolved.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.items.get(name).and_then(Payload::value)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.items.values().all(Payload::is_loaded)
    }

    /// Loaded items only.
    pub fn loaded_values(&self) -> BTreeMap<String, Value> {
        self.items
            .iter()
            .filter_map(|(name, payload)| payload.value().map(|value| (name.clone(), value.clone())))
            .collect()
    }

    pub(crate) fn set_item(&mut self, name: &str, payload: Payload) {
        self.items.insert(name.to_string(), payload);
    }
}

/// Typed handle returned by tree lookups.
#[derive(Debug, Clone, Copy)]
pub struct NodeHandle<'a> {
    path: &'a str,
    node: &'a Node,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(path: &'a str, node: &'a Node) -> Self {
        Self { path, node }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn as_group(&self) -> Option<&'a Group> {
        self.node.as_group()
    }

    pub fn as_parameter(&self) -> Option<&'a Parameter> {
        self.node.as_parameter()
    }

    pub fn as_result(&self) -> Option<&'a ResultNode> {
        self.node.as_result()
    }
}
