//! Two-phase query templates.
//!
//! Identifiers cannot be bound as parameters, so templates reference them
//! through `{slot}` markers. [`QueryTemplate::render`] fills every slot with
//! a quoted identifier (or a prebuilt SQL fragment) and refuses to produce
//! SQL while any slot is left open. Value parameters are bound afterwards by
//! the connection layer.

use super::{BindParam, Operation, PlaceholderStyle, QuoteStyle};
use crate::connection::SqlValue;
use crate::error::ProfilerError;
use crate::models::{Engine, TableKey};
use crate::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Pre-compiled `{slot}` marker pattern.
#[allow(clippy::expect_used)]
fn slot_pattern() -> &'static Regex {
    static SLOT: OnceLock<Regex> = OnceLock::new();
    SLOT.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("Invalid slot pattern"))
}

/// Structural substitutions for a template's `{slot}` markers.
#[derive(Debug, Clone, Default)]
pub struct Identifiers {
    quoted: BTreeMap<&'static str, String>,
    fragments: BTreeMap<&'static str, String>,
}

impl Identifiers {
    /// Creates an empty substitution set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `{schema}` and `{table}` from a table key.
    pub fn table(key: &TableKey) -> Self {
        Self::new()
            .identifier("schema", &key.schema)
            .identifier("table", &key.table)
    }

    /// Adds an identifier that will be quoted with the template's style.
    pub fn identifier(mut self, slot: &'static str, name: &str) -> Self {
        self.quoted.insert(slot, name.to_string());
        self
    }

    /// Adds a SQL fragment produced by another rendered template.
    pub fn fragment(mut self, slot: &'static str, sql: String) -> Self {
        self.fragments.insert(slot, sql);
        self
    }
}

/// A validated template for one `(operation, engine)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    operation: Operation,
    engine: Engine,
    placeholder: PlaceholderStyle,
    quote: QuoteStyle,
    body: String,
    params: Vec<BindParam>,
}

impl QueryTemplate {
    /// Creates a template; `body` uses `?` for bind values and is rewritten
    /// to the engine's placeholder style.
    pub fn new(
        operation: Operation,
        engine: Engine,
        placeholder: PlaceholderStyle,
        quote: QuoteStyle,
        body: &str,
        params: &[BindParam],
    ) -> Self {
        Self {
            operation,
            engine,
            placeholder,
            quote,
            body: placeholder.rewrite(body),
            params: params.to_vec(),
        }
    }

    /// Operation this template implements.
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Engine this template targets.
    pub const fn engine(&self) -> Engine {
        self.engine
    }

    /// Placeholder convention of the body.
    pub const fn placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder
    }

    /// Identifier quoting convention.
    pub const fn quote_style(&self) -> QuoteStyle {
        self.quote
    }

    /// Template text with placeholders already in the engine's style.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Named values the template binds, in order.
    pub fn params(&self) -> &[BindParam] {
        &self.params
    }

    /// Names of the `{slot}` markers in the body.
    pub fn slots(&self) -> Vec<&str> {
        slot_pattern()
            .captures_iter(&self.body)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Phase one: substitutes every slot.
    ///
    /// # Errors
    /// Returns a configuration error naming the first slot without a value.
    pub fn render(&self, identifiers: &Identifiers) -> Result<String> {
        let mut rendered = String::with_capacity(self.body.len());
        let mut last = 0;
        for caps in slot_pattern().captures_iter(&self.body) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            rendered.push_str(&self.body[last..whole.start()]);
            let name = name.as_str();
            if let Some(identifier) = identifiers.quoted.get(name) {
                rendered.push_str(&self.quote.quote(identifier));
            } else if let Some(fragment) = identifiers.fragments.get(name) {
                rendered.push_str(fragment);
            } else {
                return Err(ProfilerError::configuration(format!(
                    "no value for slot '{{{}}}' in {} template for {}",
                    name, self.operation, self.engine
                )));
            }
            last = whole.end();
        }
        rendered.push_str(&self.body[last..]);
        Ok(rendered)
    }

    /// Phase two helper: the bind values this template declares, drawn from
    /// a table key.
    pub fn bind_values(&self, key: &TableKey) -> Vec<SqlValue> {
        self.params
            .iter()
            .map(|param| match param {
                BindParam::Catalog => SqlValue::from(key.catalog.as_str()),
                BindParam::Schema => SqlValue::from(key.schema.as_str()),
                BindParam::Table => SqlValue::from(key.table.as_str()),
            })
            .collect()
    }
}
