//! Typed registry of query templates.

use super::repository;
use super::{
    dialect_for, Operation, RepositoryOperation, Role, SourceDialect, SourceOperation,
    QueryTemplate,
};
use crate::error::ProfilerError;
use crate::models::Engine;
use crate::Result;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Every template of every engine, keyed by `(Operation, Engine)`.
///
/// Built once from the [`SourceDialect`] implementations and the generated
/// repository statements; lookups never parse or concatenate SQL at run
/// time.
#[derive(Debug)]
pub struct DialectCatalog {
    templates: HashMap<(Operation, Engine), QueryTemplate>,
}

impl DialectCatalog {
    /// Builds the catalog for every known engine.
    pub fn build() -> Self {
        let mut templates = HashMap::new();
        for engine in Engine::ALL {
            let dialect = dialect_for(engine);
            for operation in SourceOperation::ALL {
                if let Some(source) = dialect.source_template(operation) {
                    let operation = Operation::Source(operation);
                    templates.insert(
                        (operation, engine),
                        template(dialect, operation, source.body, source.params),
                    );
                }
            }
            if let Some(statements) = repository::statements(dialect) {
                for (operation, sql) in statements {
                    let operation = Operation::Repository(operation);
                    templates.insert((operation, engine), template(dialect, operation, &sql, &[]));
                }
            }
        }
        debug!("Dialect catalog built with {} templates", templates.len());
        Self { templates }
    }

    /// Process-wide catalog.
    pub fn global() -> &'static Self {
        static CATALOG: OnceLock<DialectCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::build)
    }

    /// Template for an operation on an engine.
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` when the engine has no such template.
    pub fn template(&self, operation: Operation, engine: Engine) -> Result<&QueryTemplate> {
        self.templates
            .get(&(operation, engine))
            .ok_or_else(|| {
                ProfilerError::unsupported_operation(operation.to_string(), engine.to_string())
            })
    }

    /// Shorthand for a source template.
    pub fn source(&self, operation: SourceOperation, engine: Engine) -> Result<&QueryTemplate> {
        self.template(Operation::Source(operation), engine)
    }

    /// Shorthand for a repository template.
    pub fn repository(
        &self,
        operation: RepositoryOperation,
        engine: Engine,
    ) -> Result<&QueryTemplate> {
        self.template(Operation::Repository(operation), engine)
    }

    /// Whether the engine has a template for the operation.
    pub fn supports(&self, operation: Operation, engine: Engine) -> bool {
        self.templates.contains_key(&(operation, engine))
    }

    /// Verifies that an engine can play a role before any work starts.
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` naming the first missing operation.
    pub fn require(&self, engine: Engine, role: Role) -> Result<()> {
        for operation in role.required_operations() {
            if !self.supports(operation, engine) {
                return Err(ProfilerError::unsupported_operation(
                    format!("{} (needed as {})", operation, role),
                    engine.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Engines able to play a role.
    pub fn engines_for(&self, role: Role) -> Vec<Engine> {
        Engine::ALL
            .into_iter()
            .filter(|engine| self.require(*engine, role).is_ok())
            .collect()
    }
}

fn template(
    dialect: &dyn SourceDialect,
    operation: Operation,
    body: &str,
    params: &[super::BindParam],
) -> QueryTemplate {
    QueryTemplate::new(
        operation,
        dialect.engine(),
        dialect.placeholder_style(),
        dialect.quote_style(),
        body,
        params,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PlaceholderStyle, QuoteStyle};
    use crate::error::ErrorKind;
    use crate::models::{KeyDepth, RecordSet};

    #[test]
    fn test_every_engine_is_a_source() {
        let catalog = DialectCatalog::build();
        for engine in Engine::ALL {
            catalog.require(engine, Role::Source).unwrap();
        }
    }

    #[test]
    fn test_sqlserver_cannot_host_repository() {
        let catalog = DialectCatalog::build();
        let err = catalog
            .require(Engine::SqlServer, Role::Repository)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.is_fatal());
        assert_eq!(
            catalog.engines_for(Role::Repository),
            vec![Engine::Sqlite, Engine::Postgres, Engine::MySql, Engine::MariaDb]
        );
    }

    #[test]
    fn test_missing_template_is_unsupported() {
        let catalog = DialectCatalog::build();
        let err = catalog
            .repository(RepositoryOperation::Insert(RecordSet::Dates), Engine::SqlServer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.to_string().contains("SQL Server"));
    }

    #[test]
    fn test_template_styles_follow_engine() {
        let catalog = DialectCatalog::global();
        let pg = catalog.source(SourceOperation::ColumnCount, Engine::Postgres).unwrap();
        assert_eq!(pg.placeholder_style(), PlaceholderStyle::DollarNumbered);
        assert!(pg.body().contains("$3"));

        let mssql = catalog.source(SourceOperation::ColumnCount, Engine::SqlServer).unwrap();
        assert_eq!(mssql.quote_style(), QuoteStyle::Bracket);
        assert!(mssql.body().contains("@P3"));

        let mysql = catalog
            .repository(RepositoryOperation::Exists(RecordSet::Tables, KeyDepth::Table), Engine::MySql)
            .unwrap();
        assert_eq!(mysql.body().matches('?').count(), 4);
    }

    #[test]
    fn test_only_catalog_queries_bind_values() {
        let catalog = DialectCatalog::global();
        for engine in Engine::ALL {
            for operation in SourceOperation::ALL {
                let params = catalog.source(operation, engine).unwrap().params();
                let binds = matches!(
                    operation,
                    SourceOperation::ColumnCatalog | SourceOperation::ColumnCount
                );
                assert_eq!(!params.is_empty(), binds, "{} {:?}", engine, operation);
            }
        }
    }

    #[test]
    fn test_value_counts_compare_the_text_projection() {
        use crate::dialect::{dialect_for, Identifiers};
        use crate::models::SchemaScope;

        let catalog = DialectCatalog::global();
        let key = SchemaScope::new("localhost", "shop", "sales").table("orders");
        for engine in Engine::ALL {
            let column = Identifiers::new().identifier("column", "v");
            let projection = catalog
                .source(SourceOperation::TextProjection, engine)
                .unwrap()
                .render(&column)
                .unwrap();
            let ids = Identifiers::table(&key).identifier("column", "v");
            let grouped_raw = format!("GROUP BY {}", dialect_for(engine).quote_style().quote("v"));
            for operation in [SourceOperation::UniqueCount, SourceOperation::Frequency] {
                let sql = catalog.source(operation, engine).unwrap().render(&ids).unwrap();
                assert!(sql.contains(&projection), "{} {:?}: {}", engine, operation, sql);
                assert!(!sql.contains(&grouped_raw), "{} {:?}: {}", engine, operation, sql);
            }
        }
    }

    #[test]
    fn test_postgres_stats_cast_through_numeric() {
        let catalog = DialectCatalog::global();
        for operation in [SourceOperation::BasicStats, SourceOperation::Percentiles] {
            let body = catalog.source(operation, Engine::Postgres).unwrap().body();
            assert!(body.contains("CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)"));
            assert!(!body.contains("CAST({column} AS DOUBLE PRECISION)"));
        }
    }

    #[test]
    fn test_every_source_template_renders() {
        use crate::dialect::Identifiers;
        use crate::models::SchemaScope;

        let catalog = DialectCatalog::global();
        let key = SchemaScope::new("localhost", "shop", "sales").table("orders");
        let ids = Identifiers::table(&key)
            .identifier("column", "status")
            .fragment("columns", "1".to_string());
        for engine in Engine::ALL {
            for operation in SourceOperation::ALL {
                let sql = catalog.source(operation, engine).unwrap().render(&ids).unwrap();
                assert!(!sql.contains('{'), "{} {:?}: {}", engine, operation, sql);
            }
        }
    }
}
