//! Capture lists for lambda lifting
//!
//! A function receives, ahead of its formals, one pointer per escaped
//! variable it needs from an enclosing frame. It needs a variable when:
//!
//! - its own body reads or writes it,
//! - a function nested in it needs it, or
//! - a function it calls directly needs it,
//!
//! unless the variable is declared inside the function itself, in which case
//! the function owns the storage and passes its address down. The lists are
//! the least fixpoint of these rules and are ordered by declaration handle.

use super::{CodegenError, CodegenResult};
use crate::ast::{Ast, FunDecId, VarDecId, VarId, VarKind};
use crate::semantic::{CallGraph, EscapeMap};
use crate::visitor::utils::DeclarationCollector;
use crate::visitor::{walk_function_dec, walk_var, Visitor, VisitorError, VisitorResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Escaped variables each function receives by address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureLists {
    lists: BTreeMap<FunDecId, BTreeSet<VarDecId>>,
}

impl CaptureLists {
    pub fn compute(ast: &Ast, escapes: &EscapeMap) -> CodegenResult<Self> {
        let calls = CallGraph::build(ast);
        let mut scan = FunctionScan::new(escapes);
        scan.visit_chunks(ast, &ast.root).map_err(|err| match err {
            VisitorError::UnboundReference { name, dec } => CodegenError::InternalError(format!(
                "variable `{}` ({}) missing from the escape map",
                name, dec
            )),
            other => CodegenError::InternalError(other.to_string()),
        })?;

        let declared: BTreeMap<FunDecId, BTreeSet<VarDecId>> = scan
            .direct
            .keys()
            .map(|function| (*function, DeclarationCollector::collect(ast, *function)))
            .collect();

        let mut lists = scan.direct.clone();
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (function, own) in &declared {
                let mut needed = scan.direct[function].clone();
                for child in scan.children.get(function).into_iter().flatten() {
                    needed.extend(lists[child].iter().copied());
                }
                for callee in calls.callees(*function) {
                    if let Some(list) = lists.get(&callee) {
                        needed.extend(list.iter().copied());
                    }
                }
                needed.retain(|dec| !own.contains(dec));
                if lists[function] != needed {
                    lists.insert(*function, needed);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!("capture lists settled after {} rounds", rounds);

        Ok(Self { lists })
    }

    /// Capture list of `function`, in parameter order
    pub fn get(&self, function: FunDecId) -> Vec<VarDecId> {
        self.lists
            .get(&function)
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn captures(&self, function: FunDecId, dec: VarDecId) -> bool {
        self.lists
            .get(&function)
            .map_or(false, |list| list.contains(&dec))
    }
}

/// Per-function direct references to escaped variables, and nesting
struct FunctionScan<'e> {
    escapes: &'e EscapeMap,
    current: Vec<FunDecId>,
    direct: BTreeMap<FunDecId, BTreeSet<VarDecId>>,
    children: BTreeMap<FunDecId, Vec<FunDecId>>,
}

impl<'e> FunctionScan<'e> {
    fn new(escapes: &'e EscapeMap) -> Self {
        Self {
            escapes,
            current: Vec::new(),
            direct: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

impl Visitor for FunctionScan<'_> {
    fn visit_function_dec(&mut self, ast: &Ast, id: FunDecId) -> VisitorResult<()> {
        if let Some(parent) = self.current.last() {
            self.children.entry(*parent).or_default().push(id);
        }
        self.direct.entry(id).or_default();
        self.current.push(id);
        let result = walk_function_dec(self, ast, id);
        self.current.pop();
        result
    }

    fn visit_var(&mut self, ast: &Ast, id: VarId) -> VisitorResult<()> {
        if let VarKind::Simple { name, def } = &ast.var(id).kind {
            let escaped = self.escapes.get(*def).ok_or_else(|| VisitorError::UnboundReference {
                name: name.clone(),
                dec: *def,
            })?;
            if let (true, Some(function)) = (escaped, self.current.last()) {
                self.direct.entry(*function).or_default().insert(*def);
            }
            return Ok(());
        }
        walk_var(self, ast, id)
    }
}
