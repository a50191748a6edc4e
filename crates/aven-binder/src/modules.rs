//! The module table.
//!
//! One table per compiler invocation, ordered by load: the index of an entry
//! is its [`ModuleId`]. Every load bumps a generation counter; member lookup
//! tables record the generation they were built at and fold in extensions
//! from modules loaded since (see [`crate::members`]).

use aven_parser::{ModuleId, NodeId};
use indexmap::IndexMap;
use std::fmt;

/// Identifies a loadable module.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleIdent {
    Builtin,
    Stdlib,
    Local(String),
}

impl fmt::Display for ModuleIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleIdent::Builtin => f.write_str("builtin"),
            ModuleIdent::Stdlib => f.write_str("stdlib"),
            ModuleIdent::Local(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub ident: ModuleIdent,
    /// Root module node; `None` until the module's source has been parsed.
    pub root: Option<NodeId>,
    /// Generation at which this module was created.
    pub generation: u32,
    /// True once the whole pipeline ran over the module.
    pub typed: bool,
}

#[derive(Debug, Default)]
pub struct ModuleTable {
    entries: IndexMap<ModuleIdent, ModuleEntry>,
    generation: u32,
}

impl ModuleTable {
    pub fn new() -> Self {
        ModuleTable::default()
    }

    /// Current generation; incremented on every module creation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Create a module entry, or return the existing one. The boolean is
    /// `true` when the module was created by this call.
    pub fn create(&mut self, ident: ModuleIdent) -> (bool, ModuleId) {
        if let Some(index) = self.entries.get_index_of(&ident) {
            return (false, ModuleId(index as u32));
        }
        self.generation += 1;
        let entry = ModuleEntry {
            ident: ident.clone(),
            root: None,
            generation: self.generation,
            typed: false,
        };
        let (index, _) = self.entries.insert_full(ident, entry);
        (true, ModuleId(index as u32))
    }

    pub fn get(&self, ident: &ModuleIdent) -> Option<ModuleId> {
        self.entries.get_index_of(ident).map(|i| ModuleId(i as u32))
    }

    pub fn entry(&self, id: ModuleId) -> &ModuleEntry {
        self.entries
            .get_index(id.0 as usize)
            .map(|(_, entry)| entry)
            .expect("module id out of range")
    }

    pub fn set_root(&mut self, id: ModuleId, root: NodeId) {
        if let Some((_, entry)) = self.entries.get_index_mut(id.0 as usize) {
            entry.root = Some(root);
        }
    }

    pub fn set_typed(&mut self, id: ModuleId) {
        if let Some((_, entry)) = self.entries.get_index_mut(id.0 as usize) {
            entry.typed = true;
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.entries.len() as u32).map(ModuleId)
    }

    /// Modules created after the given generation, in load order.
    pub fn loaded_since(&self, generation: u32) -> impl Iterator<Item = ModuleId> + '_ {
        self.entries
            .values()
            .enumerate()
            .filter(move |(_, e)| e.generation > generation)
            .map(|(i, _)| ModuleId(i as u32))
    }
}
