//! Test identity tree.
//!
//! A suite description holds one child per test candidate, or one
//! intermediate node per method when a method expands into several
//! candidates (or the suite is parameterized). Test display names follow
//! `method[#iteration] [{params}] [seedChain](Class)`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::randomness::{format_seed_chain, parse_seed_chain};

/// A node in the test identity tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Description {
    display_name: String,
    class_name: Option<String>,
    method_name: Option<String>,
    children: Vec<Description>,
}

impl Description {
    /// Root node of a suite
    #[must_use]
    pub fn suite(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            display_name: class_name.clone(),
            class_name: Some(class_name),
            method_name: None,
            children: Vec::new(),
        }
    }

    /// Intermediate node grouping the candidates of one method
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            display_name: name.into(),
            class_name: None,
            method_name: None,
            children: Vec::new(),
        }
    }

    /// Leaf node of one candidate; `method` is the decorated test name
    #[must_use]
    pub fn test(class_name: impl Into<String>, method: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let method = method.into();
        Self {
            display_name: format!("{method}({class_name})"),
            class_name: Some(class_name),
            method_name: Some(method),
            children: Vec::new(),
        }
    }

    /// Display name
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Owning class name
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Decorated method name (leaves only)
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    /// Undecorated method name (leaves only)
    #[must_use]
    pub fn bare_method_name(&self) -> Option<&str> {
        self.method_name.as_deref().map(bare_method_name)
    }

    /// Child nodes
    #[must_use]
    pub fn children(&self) -> &[Description] {
        &self.children
    }

    /// Append a child node
    pub fn add_child(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Whether this node is a single test
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.method_name.is_some()
    }

    /// Whether this node contains other nodes
    #[must_use]
    pub fn is_suite(&self) -> bool {
        !self.is_test()
    }

    /// All leaves, depth first
    #[must_use]
    pub fn tests(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_tests(&mut out);
        out
    }

    fn collect_tests<'a>(&'a self, out: &mut Vec<&'a Self>) {
        if self.is_test() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_tests(out);
        }
    }

    /// Number of leaves
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests().len()
    }

    /// Same node without children
    #[must_use]
    pub fn childless(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Components of a decorated test name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestName {
    /// Bare method name
    pub method: String,
    /// Iteration index, only rendered for repeated tests
    pub iteration: Option<u32>,
    /// Parameter label, e.g. `value=3 name=x`
    pub params: Option<String>,
    /// Seed chain of the candidate
    pub seed_chain: Vec<u64>,
    /// Owning class, when parsed from a full display name
    pub class_name: Option<String>,
}

impl TestName {
    /// Render the decorated method part (without the class).
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = self.method.clone();
        if let Some(i) = self.iteration {
            out.push_str(&format!("#{i}"));
        }
        if let Some(params) = &self.params {
            out.push_str(&format!(" {{{params}}}"));
        }
        if !self.seed_chain.is_empty() {
            out.push(' ');
            out.push_str(&format_seed_chain(&self.seed_chain));
        }
        out
    }

    /// Parse a decorated name, with or without the `(Class)` suffix.
    #[must_use]
    pub fn parse(display: &str) -> Option<Self> {
        let caps = name_pattern().captures(display)?;
        let seed_chain = match caps.name("seed") {
            Some(m) => parse_seed_chain(m.as_str()).ok()?,
            None => Vec::new(),
        };
        Some(Self {
            method: caps.name("method")?.as_str().to_string(),
            iteration: caps.name("iter").and_then(|m| m.as_str().parse().ok()),
            params: caps.name("params").map(|m| m.as_str().to_string()),
            seed_chain,
            class_name: caps.name("class").map(|m| m.as_str().to_string()),
        })
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<method>[^#\s(\[{]+)(?:#(?P<iter>\d+))?(?: \{(?P<params>[^}]*)\})?(?: (?P<seed>\[[0-9A-Fa-f:]+\]))?(?:\((?P<class>[^()]*)\))?$",
        )
        .expect("test name pattern is valid")
    })
}

/// Strip iteration, parameter and seed decorations from a test name.
#[must_use]
pub fn bare_method_name(display: &str) -> &str {
    let end = display
        .find(|c: char| c == '#' || c == ' ' || c == '(')
        .unwrap_or(display.len());
    &display[..end]
}
