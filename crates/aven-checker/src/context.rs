//! The compiler context and the module loading pipeline.

use crate::{builtin, capture, check, realize};
use aven_binder::{MemberTables, ModuleIdent, ModuleTable, NameBinder};
use aven_common::Diagnostic;
use aven_parser::{ModuleId, NodeArena, NodeId, NodeKind, Parser};
use aven_solver::{ConformanceTable, QualType, TypeId, TypeInterner, TypeTable};
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{debug, info};

/// The Aven standard module, written in Aven. `Array`, `Set`, and `Map` give
/// collection literals their types.
const STDLIB_SOURCE: &str = "\
struct Array<Element> { }
struct Set<Element> { }
struct Map<Key, Value> { }
fun print(item: Anything) { }
";

/// Supplies source text for local modules.
pub trait ModuleLoader {
    fn source_for(&self, ident: &ModuleIdent) -> Result<String, LoadError>;
}

/// In-memory loader used by tests and embedded callers.
pub struct StringLoader {
    sources: FxHashMap<String, String>,
}

impl StringLoader {
    pub fn new() -> Self {
        StringLoader {
            sources: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl Default for StringLoader {
    fn default() -> Self {
        StringLoader::new()
    }
}

impl ModuleLoader for StringLoader {
    fn source_for(&self, ident: &ModuleIdent) -> Result<String, LoadError> {
        match ident {
            ModuleIdent::Local(name) => self
                .sources
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::NotFound(ident.clone())),
            other => Err(LoadError::NotFound(other.clone())),
        }
    }
}

#[derive(Debug)]
pub enum LoadError {
    NotFound(ModuleIdent),
    Io(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotFound(ident) => write!(f, "module '{ident}' was not found"),
            LoadError::Io(message) => write!(f, "i/o error: {message}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Placeholder declarations of the stdlib collection types, used to type
/// array, set, and map literals.
#[derive(Debug, Default, Clone)]
pub struct CollectionTypes {
    pub array: Option<(TypeId, NodeId)>,
    pub set: Option<(TypeId, NodeId)>,
    pub map: Option<(TypeId, NodeId, NodeId)>,
}

/// Owner of all state shared by the passes of one compiler invocation.
pub struct CompilerContext {
    pub arena: NodeArena,
    pub modules: ModuleTable,
    pub members: MemberTables,
    pub interner: TypeInterner,
    pub types: TypeTable,
    pub conformances: ConformanceTable,
    /// Built-in type ids to their declarations in the `builtin` module.
    pub builtin_decls: FxHashMap<TypeId, NodeId>,
    pub builtin_root: NodeId,
    pub stdlib_root: Option<NodeId>,
    pub collections: CollectionTypes,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilerContext {
    /// Create a context with `builtin` and `stdlib` loaded and typed.
    pub fn new() -> Self {
        let mut arena = NodeArena::new();
        let mut modules = ModuleTable::new();
        let members = MemberTables::new();
        let interner = TypeInterner::new();

        let (_, builtin_id) = modules.create(ModuleIdent::Builtin);
        let builtin_root = builtin::synthesize(&mut arena, builtin_id);
        modules.set_root(builtin_id, builtin_root);

        let mut ctx = CompilerContext {
            arena,
            modules,
            members,
            interner,
            types: TypeTable::new(),
            conformances: ConformanceTable::new(),
            builtin_decls: FxHashMap::default(),
            builtin_root,
            stdlib_root: None,
            collections: CollectionTypes::default(),
            diagnostics: Vec::new(),
        };
        ctx.index_builtin_decls();
        ctx.run_semantic_passes(builtin_id, builtin_root);
        ctx.modules.set_typed(builtin_id);

        ctx.load_stdlib();
        ctx
    }

    fn index_builtin_decls(&mut self) {
        let NodeKind::Module(m) = &self.arena.get(self.builtin_root).kind else {
            return;
        };
        for &decl in &m.stmts {
            let NodeKind::BuiltinType(b) = &self.arena.get(decl).kind else {
                continue;
            };
            let ty = match b.name.as_str() {
                "Anything" => TypeId::ANYTHING,
                "Nothing" => TypeId::NOTHING,
                "Bool" => TypeId::BOOL,
                "Int" => TypeId::INT,
                "Float" => TypeId::FLOAT,
                "String" => TypeId::STRING,
                _ => continue,
            };
            self.builtin_decls.insert(ty, decl);
        }
    }

    fn load_stdlib(&mut self) {
        let (_, stdlib_id) = self.modules.create(ModuleIdent::Stdlib);
        let (root, parse_diags) =
            Parser::parse_module(&mut self.arena, stdlib_id, "stdlib", STDLIB_SOURCE);
        debug_assert!(parse_diags.is_empty(), "stdlib must parse: {parse_diags:?}");
        self.diagnostics.extend(parse_diags);
        self.modules.set_root(stdlib_id, root);
        self.run_semantic_passes(stdlib_id, root);
        self.modules.set_typed(stdlib_id);
        self.stdlib_root = Some(root);
        self.index_collections(root);
    }

    fn index_collections(&mut self, stdlib_root: NodeId) {
        let NodeKind::Module(m) = &self.arena.get(stdlib_root).kind else {
            return;
        };
        for &decl in &m.stmts {
            let NodeKind::Nominal(n) = &self.arena.get(decl).kind else {
                continue;
            };
            let Some(base) = self.types.get(decl).map(|q| q.ty) else {
                continue;
            };
            match (n.name.as_str(), n.placeholders.as_slice()) {
                ("Array", [element]) => self.collections.array = Some((base, *element)),
                ("Set", [element]) => self.collections.set = Some((base, *element)),
                ("Map", [key, value]) => self.collections.map = Some((base, *key, *value)),
                _ => {}
            }
        }
    }

    /// Create (or fetch) a module entry, per the loader API. The flag is
    /// `true` when this call created the module.
    pub fn create_module(&mut self, ident: ModuleIdent) -> (bool, ModuleId) {
        self.modules.create(ident)
    }

    /// Load a module: locate source, parse, and run the semantic pipeline.
    /// Loading an already-loaded module returns it unchanged.
    pub fn load_module(
        &mut self,
        ident: ModuleIdent,
        loader: &dyn ModuleLoader,
    ) -> Result<ModuleId, LoadError> {
        let (created, id) = self.modules.create(ident.clone());
        if !created {
            return Ok(id);
        }
        info!(module = %ident, "loading module");
        let source = loader.source_for(&ident)?;
        let name = ident.to_string();
        let (root, parse_diags) = Parser::parse_module(&mut self.arena, id, &name, &source);
        let failed_to_parse = !parse_diags.is_empty();
        self.diagnostics.extend(parse_diags);
        self.modules.set_root(id, root);
        // A module that failed to parse is not realized; its surviving
        // declarations would only produce cascading noise.
        if failed_to_parse {
            debug!(module = %ident, "skipping semantic passes after parse errors");
            return Ok(id);
        }
        self.run_semantic_passes(id, root);
        self.modules.set_typed(id);
        Ok(id)
    }

    fn run_semantic_passes(&mut self, _id: ModuleId, root: NodeId) {
        let bind_diags = NameBinder::bind_module(
            &mut self.arena,
            &self.modules,
            &self.members,
            self.builtin_root,
            self.stdlib_root,
            root,
        );
        self.diagnostics.extend(bind_diags);

        let realize_diags = realize::realize_module(
            &self.arena,
            &self.interner,
            &mut self.types,
            &mut self.conformances,
            root,
        );
        self.diagnostics.extend(realize_diags);

        let check_diags = check::check_module(self, root);
        self.diagnostics.extend(check_diags);

        let capture_diags = capture::analyze_module(&self.arena, root);
        self.diagnostics.extend(capture_diags);
    }

    /// Finalized type of a node, if any pass assigned one.
    pub fn type_of(&self, node: NodeId) -> Option<QualType> {
        self.types.get(node)
    }

    /// Render a node's finalized type.
    pub fn display_type_of(&self, node: NodeId) -> Option<String> {
        self.types
            .get(node)
            .map(|q| self.interner.display_qual(&self.arena, &q))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        CompilerContext::new()
    }
}
