//! Module loader.
//!
//! Resolves `require` statements before lowering. Path-like requires load
//! `<name>.carv` relative to the importing file, parse it, and splice its
//! statements ahead of the importing program; built-in module names
//! (`net`, `fs`) are reported as aliases for the code generator. Cycles
//! and duplicate loads are guarded by canonical path.

use anyhow::{anyhow, Context, Result};
use carv_parser::ast::{Program, Statement};
use carv_parser::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Built-in module names whose methods lower to runtime helpers.
const BUILTIN_MODULES: &[&str] = &["net", "fs"];

/// The fully loaded program plus the built-in aliases it registered.
pub struct LoadedProgram {
    pub program: Program,
    pub builtin_aliases: Vec<String>,
}

/// Load an entry file and every file it requires, merged in dependency
/// order.
pub fn load(entry: &Path) -> Result<LoadedProgram> {
    let mut loaded = HashSet::new();
    let mut aliases = Vec::new();
    let mut program = Program::empty();
    load_into(entry, &mut loaded, &mut aliases, &mut program)?;
    Ok(LoadedProgram {
        program,
        builtin_aliases: aliases,
    })
}

fn load_into(
    path: &Path,
    loaded: &mut HashSet<PathBuf>,
    aliases: &mut Vec<String>,
    merged: &mut Program,
) -> Result<()> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("cannot resolve module path {}", path.display()))?;
    if !loaded.insert(canonical.clone()) {
        // Already merged (diamond requires are fine, true cycles too:
        // the first visit wins and the re-entry is a no-op).
        return Ok(());
    }

    let source = std::fs::read_to_string(&canonical)
        .with_context(|| format!("cannot read {}", canonical.display()))?;
    let parser = Parser::new(&source)
        .map_err(|errors| anyhow!("lex errors in {}: {}", canonical.display(), errors[0]))?;
    let program = parser.parse().map_err(|errors| {
        anyhow!(
            "parse errors in {}: {}",
            canonical.display(),
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        )
    })?;

    let base = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    for stmt in program.statements {
        match &stmt {
            Statement::Require(req) => {
                if BUILTIN_MODULES.contains(&req.module.as_str()) {
                    let alias = req
                        .alias
                        .as_ref()
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| req.module.clone());
                    if !aliases.contains(&alias) {
                        aliases.push(alias);
                    }
                    // Keep the statement: the generator also inspects it
                    // for runtime feature flags.
                    merged.statements.push(stmt);
                } else {
                    let target = base.join(format!("{}.carv", req.module));
                    load_into(&target, loaded, aliases, merged)?;
                }
            }
            _ => merged.statements.push(stmt),
        }
    }

    Ok(())
}
