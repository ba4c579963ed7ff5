//! Unit dependency graph
//!
//! Built once at startup from the unit directories plus the built-in units,
//! read-only afterwards. Missing dependencies are allowed here; they only
//! fail when the scheduler tries to start them.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::{is_unit_file, parse_unit, Builtin, UnitDefinition};

#[derive(Debug, Default)]
pub struct Graph {
    /// Units loaded from unit files
    disk: BTreeMap<String, UnitDefinition>,
    /// Built-in units, consulted first
    builtin: BTreeMap<String, UnitDefinition>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph containing only the built-in units
    pub fn with_builtins() -> Self {
        let mut graph = Self::new();
        graph.add_builtins();
        graph
    }

    /// Add an on-disk unit. The first definition of a name wins.
    pub fn insert(&mut self, name: &str, unit: UnitDefinition) -> bool {
        if self.disk.contains_key(name) {
            log::debug!("{} already loaded, ignoring duplicate", name);
            return false;
        }
        self.disk.insert(name.to_string(), unit);
        true
    }

    /// Register the built-in units alongside whatever is already loaded
    pub fn add_builtins(&mut self) {
        for builtin in Builtin::ALL {
            if self.disk.contains_key(builtin.name()) {
                log::debug!("Built-in {} overrides unit file", builtin.name());
            }
            self.builtin
                .insert(builtin.name().to_string(), builtin.definition());
        }
    }

    /// Look up a unit, built-ins first
    pub fn get(&self, name: &str) -> Option<&UnitDefinition> {
        self.builtin.get(name).or_else(|| self.disk.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All unit names, built-in and on-disk
    pub fn names(&self) -> BTreeSet<&str> {
        self.builtin
            .keys()
            .chain(self.disk.keys())
            .map(String::as_str)
            .collect()
    }

    /// Number of units loaded from disk
    pub fn disk_len(&self) -> usize {
        self.disk.len()
    }

    /// Dependencies of `name` that exist in the graph
    fn known_dependencies<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.get(name)
            .map(|unit| {
                unit.dependencies
                    .iter()
                    .filter(|dep| self.contains(dep))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render the on-disk units as a Graphviz digraph
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph systemd {\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  node [shape=box, style=filled, fillcolor=lightgrey];\n");
        for (name, unit) in &self.disk {
            let _ = writeln!(out, "  \"{}\";", name);
            for dep in &unit.dependencies {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", name, dep);
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Load unit files from `unit_dirs` and merge in the built-in units
pub fn build_graph(unit_dirs: &[PathBuf]) -> Graph {
    let mut graph = Graph::new();

    for dir in unit_dirs {
        for name in list_directory(dir) {
            if !is_unit_file(&name) {
                continue;
            }
            if let Some(content) = read_file(&dir.join(&name)) {
                graph.insert(&name, parse_unit(&content));
            }
        }
    }

    log::info!("Loaded {} unit files", graph.disk_len());
    graph.add_builtins();
    graph
}

/// Sorted entry names of a directory; empty if it cannot be read
fn list_directory(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

fn read_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Find every set of units that depend on each other in a cycle
///
/// Returns the strongly connected components that contain a cycle (more
/// than one member, or a unit depending on itself), each sorted by name.
pub fn find_cycles(graph: &Graph) -> Vec<Vec<String>> {
    let mut tarjan = Tarjan {
        graph,
        next_index: 0,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        cycles: Vec::new(),
    };

    for name in graph.names() {
        if !tarjan.index.contains_key(name) {
            tarjan.visit(name);
        }
    }

    tarjan.cycles
}

/// Tarjan's strongly connected components
struct Tarjan<'g> {
    graph: &'g Graph,
    next_index: usize,
    index: HashMap<&'g str, usize>,
    lowlink: HashMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: HashSet<&'g str>,
    cycles: Vec<Vec<String>>,
}

impl<'g> Tarjan<'g> {
    fn visit(&mut self, v: &'g str) {
        self.index.insert(v, self.next_index);
        self.lowlink.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let graph = self.graph;
        let deps = graph.known_dependencies(v);
        for &w in &deps {
            if !self.index.contains_key(w) {
                self.visit(w);
                let low = self.lowlink[v].min(self.lowlink[w]);
                self.lowlink.insert(v, low);
            } else if self.on_stack.contains(w) {
                let low = self.lowlink[v].min(self.index[w]);
                self.lowlink.insert(v, low);
            }
        }

        if self.lowlink[v] != self.index[v] {
            return;
        }

        let mut component = Vec::new();
        while let Some(w) = self.stack.pop() {
            self.on_stack.remove(w);
            component.push(w.to_string());
            if w == v {
                break;
            }
        }

        if component.len() > 1 || deps.contains(&v) {
            component.sort();
            self.cycles.push(component);
        }
    }
}
