//! Call graph: caller → callee edges between function declarations
//!
//! Every function declaration is a node, including primitives. An edge
//! `f → g` means the body of `f` itself (not the body of a function nested
//! in `f`) contains a call to `g`.

use crate::ast::{Ast, Chunk, ExpId, ExpKind, FunDecId};
use crate::visitor::{walk_chunk, walk_exp, walk_function_dec, Visitor, VisitorResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallGraph {
    edges: BTreeMap<FunDecId, BTreeSet<FunDecId>>,
}

impl CallGraph {
    pub fn build(ast: &Ast) -> Self {
        let mut builder = CallGraphBuilder::default();
        // The builder never fails.
        let _ = builder.visit_chunks(ast, &ast.root);
        builder.graph
    }

    pub fn add_function(&mut self, function: FunDecId) {
        self.edges.entry(function).or_default();
    }

    pub fn link(&mut self, caller: FunDecId, callee: FunDecId) {
        self.add_function(callee);
        self.edges.entry(caller).or_default().insert(callee);
    }

    pub fn functions(&self) -> impl Iterator<Item = FunDecId> + '_ {
        self.edges.keys().copied()
    }

    pub fn callees(&self, caller: FunDecId) -> impl Iterator<Item = FunDecId> + '_ {
        self.edges.get(&caller).into_iter().flatten().copied()
    }

    pub fn callers(&self, callee: FunDecId) -> impl Iterator<Item = FunDecId> + '_ {
        self.edges
            .iter()
            .filter(move |(_, callees)| callees.contains(&callee))
            .map(|(caller, _)| *caller)
    }

    pub fn calls(&self, caller: FunDecId, callee: FunDecId) -> bool {
        self.edges
            .get(&caller)
            .map_or(false, |callees| callees.contains(&callee))
    }

    /// Graphviz rendering, labelled with source names
    pub fn to_dot(&self, ast: &Ast) -> String {
        let mut out = String::from("digraph callgraph {\n");
        for function in self.functions() {
            let _ = writeln!(out, "  {} [label=\"{}\"];", function, ast.fun_dec(function).name);
        }
        for (caller, callees) in &self.edges {
            for callee in callees {
                let _ = writeln!(out, "  {} -> {};", caller, callee);
            }
        }
        out.push_str("}\n");
        out
    }
}

#[derive(Default)]
struct CallGraphBuilder {
    graph: CallGraph,
    caller: Option<FunDecId>,
}

impl Visitor for CallGraphBuilder {
    fn visit_chunk(&mut self, ast: &Ast, chunk: &Chunk) -> VisitorResult<()> {
        // Nodes first, so mutually recursive calls link to known functions.
        if let Chunk::Functions(decs) = chunk {
            for dec in decs {
                self.graph.add_function(*dec);
            }
        }
        walk_chunk(self, ast, chunk)
    }

    fn visit_function_dec(&mut self, ast: &Ast, id: FunDecId) -> VisitorResult<()> {
        let saved = self.caller.replace(id);
        let result = walk_function_dec(self, ast, id);
        self.caller = saved;
        result
    }

    fn visit_exp(&mut self, ast: &Ast, id: ExpId) -> VisitorResult<()> {
        if let (ExpKind::Call { callee, .. }, Some(caller)) = (&ast.exp(id).kind, self.caller) {
            self.graph.link(caller, *callee);
        }
        walk_exp(self, ast, id)
    }
}
