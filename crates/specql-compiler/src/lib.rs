//! # SpecQL Action Compiler
//!
//! This crate compiles declarative entity actions into PL/pgSQL stored
//! functions that return a standard mutation result.
//!
//! ## Architecture
//!
//! ```text
//! Entity YAML
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Frontend   │  YAML → IR (entities, actions, steps)
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Validate   │  Structure errors + coherence warnings
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Codegen    │  Params, Trinity lookup, steps, success response
//! │ (IR → SQL)   │
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use specql_compiler::{Compiler, CompilerConfig};
//!
//! let config = CompilerConfig {
//!     domain_dir: "entities".into(),
//!     out_dir: "generated/sql".into(),
//!     ..Default::default()
//! };
//!
//! let result = Compiler::new(config).compile()?;
//! println!("{} functions", result.functions);
//! ```

pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod expression;
pub mod frontend;
pub mod ir;
pub mod validate;

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, warn};

use codegen::plpgsql::Stmt;
use codegen::steps::refresh_own;
use codegen::{
    trinity, ActionShape, CompiledFunction, ExceptionHandler, ParameterGenerator, References,
    ResponseGenerator, StepCompiler,
};
use diagnostic::{Location, Warning};
use expression::ExpressionCompiler;
use frontend::{Frontend, YamlFrontend};
use ir::{Action, DomainIR, Entity};
use validate::{ActionValidator, ValidationReport};

pub use config::CompilerConfig;
pub use diagnostic::CompilerError;

/// File holding the mutation-result type DDL, sorted before every function.
pub const RESULT_TYPE_FILE: &str = "000_mutation_result.sql";

/// A compiled action and the warnings its validation produced.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub function: CompiledFunction,
    pub warnings: Vec<Warning>,
}

/// Compiles single actions.
///
/// Holds the configuration and the expression compiler; it has no mutable
/// state, so one instance can compile actions from many threads.
pub struct ActionCompiler {
    config: CompilerConfig,
    expressions: ExpressionCompiler,
}

impl ActionCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        let expressions = ExpressionCompiler::new(&config);
        Self {
            config,
            expressions,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn validate(&self, action: &Action, entity: &Entity, known: &[Entity]) -> ValidationReport {
        ActionValidator::new(&self.config).validate(action, entity, known)
    }

    /// Validates and compiles one action of `entity`.
    ///
    /// `known` holds every entity that steps may target.
    pub fn compile(
        &self,
        action: &Action,
        entity: &Entity,
        known: &[Entity],
    ) -> Result<CompileOutput, CompilerError> {
        let report = self.validate(action, entity, known);
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error);
        }
        for warning in &report.warnings {
            warn!(%warning, "validation warning");
        }

        let location = Location::new(&entity.name, &action.name);
        let shape = ActionShape::analyze(action, entity);

        let steps = StepCompiler::new(
            entity,
            known,
            &self.config,
            &self.expressions,
            &shape,
            location.clone(),
        );
        let mut refs = References::default();
        let mut step_block = steps.compile_action(&action.steps, &mut refs)?;
        if shape.existing_row {
            trinity::fill_reloads(&mut step_block, entity, &refs.fields);
        }

        let (signature, declarations) =
            ParameterGenerator::new(&self.config).generate(entity, &shape, &refs.fields, &location)?;

        let mut body = Vec::new();
        if shape.existing_row {
            body.push(Stmt::comment("resolve internal key"));
            body.extend(trinity::resolve_pk(
                entity,
                &entity.id_param(),
                &self.config.error_sqlstate,
            ));
            body.push(Stmt::Blank);
        }
        let hydration = trinity::hydrate(entity, &refs.fields, shape.existing_row);
        if !hydration.is_empty() {
            body.push(Stmt::comment("load referenced fields"));
            body.extend(hydration);
            body.push(Stmt::Blank);
        }
        body.extend(step_block);
        body.push(Stmt::Blank);
        if let Some(key) = shape.key_variable().filter(|_| shape.needs_refresh(entity)) {
            body.push(Stmt::comment("Refresh table view (self)"));
            body.push(refresh_own(entity, key));
            body.push(Stmt::Blank);
        }
        body.extend(ResponseGenerator::new(entity, action.impact.as_ref()).generate(shape.key_variable()));

        let function = CompiledFunction {
            name: format!("{}.{}", entity.schema, action.name),
            signature,
            declarations,
            body,
            exception_handler: Some(self.exception_handler()),
            return_type: self.config.result_type.clone(),
            header: header(action, entity),
        };

        debug!(
            function = %function.name,
            params = function.signature.len(),
            depth = function.body.iter().map(Stmt::depth).max().unwrap_or(0),
            "compiled action"
        );
        Ok(CompileOutput {
            function,
            warnings: report.warnings,
        })
    }

    /// Turns symbolic guard failures into a failed mutation result.
    fn exception_handler(&self) -> ExceptionHandler {
        ExceptionHandler {
            sqlstate: self.config.error_sqlstate.clone(),
            body: vec![
                Stmt::assign("v_result.status", "'failed:' || SQLERRM"),
                Stmt::assign("v_result.message", "SQLERRM"),
                Stmt::sql("RETURN v_result;"),
            ],
        }
    }
}

fn header(action: &Action, entity: &Entity) -> Vec<String> {
    let mut header = vec![format!("Action: {}.{}", entity.name, action.name)];
    if !action.requires.is_empty() {
        header.push(format!("Requires: {}", action.requires.join(", ")));
    }
    header
}

/// The main compiler struct that drives a whole project.
pub struct Compiler {
    compiler: ActionCompiler,
}

/// Generated SQL files, relative to the output directory.
#[derive(Debug, Default)]
pub struct GeneratedSql {
    pub files: Vec<(PathBuf, String)>,
    pub warnings: Vec<Warning>,
}

/// Result of a successful compilation.
#[derive(Debug)]
pub struct CompileResult {
    /// Number of entities loaded.
    pub entities: usize,
    /// Number of functions written.
    pub functions: usize,
    pub warnings: Vec<Warning>,
}

/// The validation report of one action.
#[derive(Debug)]
pub struct ActionReport {
    pub entity: String,
    pub action: String,
    pub report: ValidationReport,
}

impl Compiler {
    /// Creates a new compiler with the given configuration.
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            compiler: ActionCompiler::new(config),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        self.compiler.config()
    }

    /// Loads every entity file of the domain directory.
    pub fn load(&self) -> Result<DomainIR, CompilerError> {
        YamlFrontend::new().parse_directory(&self.config().domain_dir)
    }

    /// Compiles the domain directory into the output directory.
    ///
    /// This runs the full pipeline:
    /// 1. Load entity files into IR
    /// 2. Validate and compile every action
    /// 3. Write the result type and one file per action
    pub fn compile(&self) -> Result<CompileResult, CompilerError> {
        let domain = self.load()?;
        let generated = self.generate(&domain)?;
        self.write_output(&generated)?;

        Ok(CompileResult {
            entities: domain.entities.len(),
            functions: generated.files.len() - 1,
            warnings: generated.warnings,
        })
    }

    /// Compiles every action of `domain` without touching the file system.
    ///
    /// Actions compile in parallel; files and warnings keep domain order and
    /// the first error in domain order is returned.
    pub fn generate(&self, domain: &DomainIR) -> Result<GeneratedSql, CompilerError> {
        let known = domain.known_entities();
        let jobs: Vec<(&Entity, &Action)> = domain
            .entities
            .iter()
            .flat_map(|d| d.actions.iter().map(move |a| (&d.entity, a)))
            .collect();

        let results: Vec<Result<CompileOutput, CompilerError>> = jobs
            .par_iter()
            .map(|(entity, action)| self.compiler.compile(action, entity, &known))
            .collect();

        let mut generated = GeneratedSql::default();
        generated.files.push((
            PathBuf::from(RESULT_TYPE_FILE),
            codegen::mutation_result_type(&self.config().result_type),
        ));
        for ((entity, action), result) in jobs.iter().zip(results) {
            let output = result?;
            generated.files.push((
                PathBuf::from(&entity.schema).join(format!("{}.sql", action.name)),
                output.function.render(),
            ));
            generated.warnings.extend(output.warnings);
        }
        Ok(generated)
    }

    /// Validates every action without generating code.
    pub fn check(&self) -> Result<Vec<ActionReport>, CompilerError> {
        let domain = self.load()?;
        let known = domain.known_entities();
        let reports = domain
            .entities
            .iter()
            .flat_map(|d| d.actions.iter().map(move |a| (&d.entity, a)))
            .map(|(entity, action)| ActionReport {
                entity: entity.name.clone(),
                action: action.name.clone(),
                report: self.compiler.validate(action, entity, &known),
            })
            .collect();
        Ok(reports)
    }

    /// Writes generated files to the output directory.
    fn write_output(&self, generated: &GeneratedSql) -> Result<(), CompilerError> {
        let out_dir = &self.config().out_dir;
        std::fs::create_dir_all(out_dir).map_err(|e| CompilerError::io(out_dir, e.to_string()))?;

        for (filename, content) in &generated.files {
            let path = out_dir.join(filename);
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CompilerError::io(parent, e.to_string()))?;
            }
            std::fs::write(&path, content).map_err(|e| CompilerError::io(&path, e.to_string()))?;
            debug!(path = %path.display(), "wrote file");
        }

        Ok(())
    }
}
