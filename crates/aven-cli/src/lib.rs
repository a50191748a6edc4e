//! Driver logic for the `aven` command-line tool.

use anyhow::{Context as _, Result};
use aven_binder::ModuleIdent;
use aven_checker::{CompilerContext, LoadError, ModuleLoader};
use aven_common::{Diagnostic, LineMap};
use aven_parser::NodeKind;
use std::path::{Path, PathBuf};

/// Loads local modules from the directory of the root source file.
pub struct FileLoader {
    root_dir: PathBuf,
}

impl FileLoader {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        FileLoader {
            root_dir: root_dir.into(),
        }
    }
}

impl ModuleLoader for FileLoader {
    fn source_for(&self, ident: &ModuleIdent) -> Result<String, LoadError> {
        match ident {
            ModuleIdent::Local(name) => {
                let path = self.root_dir.join(format!("{name}.aven"));
                std::fs::read_to_string(&path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        LoadError::NotFound(ident.clone())
                    } else {
                        LoadError::Io(e.to_string())
                    }
                })
            }
            other => Err(LoadError::NotFound(other.clone())),
        }
    }
}

/// Result of checking one file.
pub struct CheckReport {
    pub module_name: String,
    pub diagnostics: Vec<Diagnostic>,
    pub line_map: LineMap,
    /// `name: type` pairs for every top-level declaration.
    pub top_level_types: Vec<(String, String)>,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Check a single source file through the full pipeline.
pub fn check_file(path: &Path) -> Result<CheckReport> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;
    let module_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();
    let root_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let loader = FileLoader::new(root_dir);

    let mut ctx = CompilerContext::new();
    let module = ctx
        .load_module(ModuleIdent::Local(module_name.clone()), &loader)
        .with_context(|| format!("cannot load module '{module_name}'"))?;

    let mut top_level_types = Vec::new();
    if let Some(root) = ctx.modules.entry(module).root {
        if let NodeKind::Module(m) = &ctx.arena.get(root).kind {
            for &stmt in &m.stmts {
                let Some(name) = ctx.arena.get(stmt).name() else {
                    continue;
                };
                if let Some(rendered) = ctx.display_type_of(stmt) {
                    top_level_types.push((name.to_string(), rendered));
                }
            }
        }
    }

    Ok(CheckReport {
        module_name,
        diagnostics: ctx.diagnostics,
        line_map: LineMap::new(&source),
        top_level_types,
    })
}
