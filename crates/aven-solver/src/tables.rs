//! Side tables over the AST: realized types per node, and the conformance
//! registry.

use crate::intern::TypeInterner;
use crate::types::{QualType, TypeId, TypeKey};
use aven_parser::NodeId;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Realized qualified type of every declaration, expression, and signature
/// node. Written by the realizer and the extractor, finalized by the
/// dispatcher.
#[derive(Debug, Default)]
pub struct TypeTable {
    map: FxHashMap<NodeId, QualType>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable::default()
    }

    pub fn get(&self, node: NodeId) -> Option<QualType> {
        self.map.get(&node).copied()
    }

    pub fn set(&mut self, node: NodeId, ty: QualType) {
        self.map.insert(node, ty);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.map.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.map.keys().copied()
    }
}

/// Explicit conformances, populated by the realizer from heritage clauses.
///
/// `conforms` is reflexive-free and transitive across interface-to-interface
/// entries; `types_conforming` is the reverse query the solver uses to
/// expand an unknown-subtype constraint into a disjunction.
#[derive(Debug, Default)]
pub struct ConformanceTable {
    /// type → interfaces it declares conformance to, in registration order.
    direct: IndexMap<TypeId, Vec<TypeId>>,
}

impl ConformanceTable {
    pub fn new() -> Self {
        ConformanceTable::default()
    }

    pub fn add(&mut self, ty: TypeId, interface: TypeId) {
        let entry = self.direct.entry(ty).or_default();
        if !entry.contains(&interface) {
            entry.push(interface);
        }
    }

    pub fn conforms(&self, interner: &TypeInterner, t: TypeId, u: TypeId) -> bool {
        // A bound generic conforms when its base does.
        let t = match interner.lookup(t) {
            TypeKey::BoundGeneric { base, .. } => base,
            _ => t,
        };
        let mut work = vec![t];
        let mut seen = vec![t];
        while let Some(current) = work.pop() {
            if let Some(interfaces) = self.direct.get(&current) {
                for &interface in interfaces {
                    if interface == u {
                        return true;
                    }
                    if !seen.contains(&interface) {
                        seen.push(interface);
                        work.push(interface);
                    }
                }
            }
        }
        false
    }

    /// Every interface `t` conforms to, directly or transitively.
    pub fn supertypes(&self, interner: &TypeInterner, t: TypeId) -> Vec<TypeId> {
        let t = match interner.lookup(t) {
            TypeKey::BoundGeneric { base, .. } => base,
            _ => t,
        };
        let mut result = Vec::new();
        let mut work = vec![t];
        while let Some(current) = work.pop() {
            if let Some(interfaces) = self.direct.get(&current) {
                for &interface in interfaces {
                    if !result.contains(&interface) {
                        result.push(interface);
                        work.push(interface);
                    }
                }
            }
        }
        result.sort();
        result
    }

    /// Every registered type that conforms to `u`.
    pub fn types_conforming(&self, interner: &TypeInterner, u: TypeId) -> Vec<TypeId> {
        let mut result: Vec<TypeId> = self
            .direct
            .keys()
            .copied()
            .filter(|&t| self.conforms(interner, t, u))
            .collect();
        result.sort();
        result
    }
}
