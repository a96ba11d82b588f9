//! Compilation entry points.

use super::artifact::{ClauseInfo, CompiledContract, ParamInfo, ReqInfo, Step};
use super::ast::{Contract, Param, Pragma};
use super::builder::render;
use super::checks::{ContractFacts, check_contract, dependency_order, resolve_inheritance};
use super::codegen::{Callee, Generated, generate};
use super::errors::{CompileError, WithContext};
use super::parser::parse;
use super::types::Type;
use semver::{Version, VersionReq};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Include the per-emission stack snapshots in each artifact.
    pub steps: bool,
}

/// Compiles every contract in `source`, in source order.
pub fn compile(source: &str) -> Result<Vec<CompiledContract>, CompileError> {
    compile_with(source, &CompileOptions::default())
}

/// Compiles source that has no file to resolve imports against.
pub fn compile_with(
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<CompiledContract>, CompileError> {
    let program = parse(source)?;
    if let Some(import) = program.imports.first() {
        return Err(CompileError::UnresolvedImport {
            path: import.path.clone(),
        });
    }
    check_pragmas(&program.pragmas)?;
    compile_contracts(program.contracts, options)
}

/// Compiles the file at `path` together with everything it imports.
///
/// Imports resolve relative to the importing file. Each file is loaded once,
/// imported contracts come before the importer's own.
pub fn compile_file(
    path: impl AsRef<Path>,
    options: &CompileOptions,
) -> Result<Vec<CompiledContract>, CompileError> {
    let mut loader = Loader::default();
    loader.load(path.as_ref())?;
    compile_contracts(loader.contracts, options)
}

#[derive(Default)]
struct Loader {
    loaded: HashSet<PathBuf>,
    /// Files whose imports are being loaded.
    active: Vec<PathBuf>,
    contracts: Vec<Contract>,
}

impl Loader {
    fn load(&mut self, path: &Path) -> Result<(), CompileError> {
        let path = path.canonicalize().map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if self.active.contains(&path) {
            return Err(CompileError::ImportCycle {
                path: path.display().to_string(),
            });
        }
        if !self.loaded.insert(path.clone()) {
            return Ok(());
        }

        let source = fs::read_to_string(&path).map_err(|e| CompileError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let program = parse(&source)?;
        check_pragmas(&program.pragmas)?;

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.active.push(path);
        for import in &program.imports {
            self.load(&dir.join(&import.path))
                .context_with(|| format!("in import \"{}\"", import.path))?;
        }
        self.active.pop();
        self.contracts.extend(program.contracts);
        Ok(())
    }
}

/// Checks `pragma version` constraints against this compiler's version.
pub fn check_pragmas(pragmas: &[Pragma]) -> Result<(), CompileError> {
    let current = env!("CARGO_PKG_VERSION");
    let version = Version::parse(current).map_err(|e| CompileError::BadPragma {
        required: current.to_string(),
        reason: e.to_string(),
    })?;
    for pragma in pragmas {
        let req = VersionReq::parse(&pragma.constraint).map_err(|e| CompileError::BadPragma {
            required: pragma.constraint.clone(),
            reason: e.to_string(),
        })?;
        if !req.matches(&version) {
            return Err(CompileError::Pragma {
                required: pragma.constraint.clone(),
                version: version.to_string(),
            });
        }
    }
    Ok(())
}

fn compile_contracts(
    mut contracts: Vec<Contract>,
    options: &CompileOptions,
) -> Result<Vec<CompiledContract>, CompileError> {
    let mut names = HashSet::new();
    for contract in &contracts {
        if !names.insert(contract.name.clone()) {
            return Err(CompileError::DuplicateName {
                name: contract.name.clone(),
            });
        }
    }

    resolve_inheritance(&mut contracts)?;
    let signatures: HashMap<String, Vec<Type>> = contracts
        .iter()
        .map(|c| (c.name.clone(), c.params.iter().map(|p| p.ty.clone()).collect()))
        .collect();

    let mut facts = Vec::with_capacity(contracts.len());
    for contract in &mut contracts {
        let name = contract.name.clone();
        facts.push(check_contract(contract, &signatures).context_with(|| format!("in contract {name}"))?);
    }

    let mut callees = HashMap::new();
    let mut compiled = Vec::with_capacity(contracts.len());
    for index in dependency_order(&contracts)? {
        let contract = &contracts[index];
        let generated =
            generate(contract, &callees).context_with(|| format!("in contract {}", contract.name))?;
        callees.insert(
            contract.name.clone(),
            Callee {
                body: generated.body.clone(),
                recursive: contract.recursive,
            },
        );
        let artifact = artifact(contract, &facts[index], generated, options);
        crate::info!(
            "compiled contract {}: {} clauses, {} byte body, recursive {}",
            artifact.name,
            artifact.clauses.len(),
            artifact.body_bytecode.len(),
            artifact.recursive
        );
        compiled.push((index, artifact));
    }
    compiled.sort_by_key(|(index, _)| *index);
    Ok(compiled.into_iter().map(|(_, artifact)| artifact).collect())
}

fn param_info(param: &Param, inferred: Option<&Type>) -> ParamInfo {
    ParamInfo {
        name: param.name.clone(),
        declared_type: param.ty.clone(),
        inferred_type: inferred.cloned(),
    }
}

fn artifact(
    contract: &Contract,
    facts: &ContractFacts,
    generated: Generated,
    options: &CompileOptions,
) -> CompiledContract {
    let Generated {
        body,
        opcodes,
        items,
        clauses: records,
        ..
    } = generated;

    let clauses = contract
        .clauses
        .iter()
        .zip(records)
        .enumerate()
        .map(|(i, (clause, record))| ClauseInfo {
            name: clause.name.clone(),
            params: clause.params.iter().map(|p| param_info(p, None)).collect(),
            reqs: clause
                .reqs
                .iter()
                .map(|r| ReqInfo {
                    name: r.name.clone(),
                    amount: r.amount.to_string(),
                    asset: r.asset.to_string(),
                })
                .collect(),
            values: record.values,
            hash_calls: facts.hash_calls.get(i).cloned().unwrap_or_default(),
            contracts: record.contracts,
            block_height: record.block_height,
        })
        .collect();

    let steps = options.steps.then(|| {
        items
            .iter()
            .map(|item| Step {
                opcodes: render(&item.ops),
                stack: item.stack.entries().iter().map(ToString::to_string).collect(),
            })
            .collect()
    });

    CompiledContract {
        name: contract.name.clone(),
        params: contract
            .params
            .iter()
            .map(|p| param_info(p, facts.inferred.get(&p.name)))
            .collect(),
        clauses,
        value: contract.value.to_string(),
        body_bytecode: body,
        body_opcodes: opcodes,
        recursive: contract.recursive,
        steps,
    }
}
