//! Per-type member lookup tables.
//!
//! Every nominal (or built-in) type declaration owns a `name → [decl]` table
//! covering its own members plus the members contributed by extensions in
//! every loaded module. Tables are built on first lookup and stamped with the
//! module-table generation; a lookup against a newer generation re-scans only
//! the modules loaded since.

use crate::modules::ModuleTable;
use aven_parser::{NodeArena, NodeId, NodeKind};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::RefCell;
use tracing::trace;

#[derive(Debug, Default)]
struct MemberTable {
    map: FxHashMap<String, SmallVec<[NodeId; 2]>>,
    generation: u32,
}

/// Lazily built member tables, keyed by type declaration.
///
/// Interior mutability keeps lookups usable from shared-reference contexts
/// (the solver); the compiler is single-threaded by contract.
#[derive(Debug, Default)]
pub struct MemberTables {
    tables: RefCell<FxHashMap<NodeId, MemberTable>>,
}

impl MemberTables {
    pub fn new() -> Self {
        MemberTables::default()
    }

    /// All declarations named `name` visible as members of `type_decl`,
    /// extensions included.
    pub fn lookup(
        &self,
        arena: &NodeArena,
        modules: &ModuleTable,
        type_decl: NodeId,
        name: &str,
    ) -> SmallVec<[NodeId; 2]> {
        self.ensure(arena, modules, type_decl);
        let tables = self.tables.borrow();
        tables
            .get(&type_decl)
            .and_then(|t| t.map.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Every member name defined for `type_decl` (used by diagnostics).
    pub fn member_names(
        &self,
        arena: &NodeArena,
        modules: &ModuleTable,
        type_decl: NodeId,
    ) -> Vec<String> {
        self.ensure(arena, modules, type_decl);
        let tables = self.tables.borrow();
        tables
            .get(&type_decl)
            .map(|t| t.map.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure(&self, arena: &NodeArena, modules: &ModuleTable, type_decl: NodeId) {
        let current = modules.generation();
        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(type_decl).or_default();

        if table.generation == 0 {
            // First lookup: the type's own members seed the table.
            for member in own_members(arena, type_decl) {
                insert(table, arena, member);
            }
            trace!(?type_decl, "built member table");
        } else if table.generation >= current {
            return;
        }

        // Fold in extensions from modules loaded since the last scan. A
        // fresh table has generation 0, so this folds every loaded module.
        let scanned = table.generation;
        for module in modules.loaded_since(scanned) {
            let Some(root) = modules.entry(module).root else {
                continue;
            };
            let NodeKind::Module(m) = &arena.get(root).kind else {
                continue;
            };
            for &stmt in &m.stmts {
                let NodeKind::Extension(ext) = &arena.get(stmt).kind else {
                    continue;
                };
                let extended = match &arena.get(ext.extended).kind {
                    NodeKind::IdentSign(sign) => sign.referred_decl,
                    _ => None,
                };
                if extended == Some(type_decl) {
                    for &member in &ext.members {
                        insert(table, arena, member);
                    }
                }
            }
        }
        table.generation = current;
    }
}

fn own_members(arena: &NodeArena, type_decl: NodeId) -> Vec<NodeId> {
    match &arena.get(type_decl).kind {
        NodeKind::Nominal(n) => n.members.clone(),
        NodeKind::BuiltinType(b) => b.members.clone(),
        _ => Vec::new(),
    }
}

fn insert(table: &mut MemberTable, arena: &NodeArena, member: NodeId) {
    if let Some(name) = arena.get(member).name() {
        table.map.entry(name.to_string()).or_default().push(member);
    }
}
