//! Registry of known column type conversions
//!
//! A conversion is an SQL fragment appended to
//! `ALTER TABLE {table} ALTER COLUMN {column}`, plus a risk flag and a
//! warning describing the data that may be lost. Placeholders `{table}`,
//! `{column}` and `{maxLength}` are filled in at render time, after both
//! identifiers have been validated.

use crate::type_mapper::DEFAULT_VARCHAR_LENGTH;
use metasync_core::{validate_identifier, ModelError};
use std::collections::HashMap;

/// Key for widening a bounded VARCHAR
const VARCHAR_SMALL: &str = "VARCHAR(SMALL)";

/// Key for narrowing a bounded VARCHAR
const VARCHAR_LARGE: &str = "VARCHAR(LARGE)";

/// One registered conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConversion {
    /// Fragment after `ALTER COLUMN {column}`, e.g. `TYPE TEXT`
    pub sql_template: String,

    pub risky: bool,

    /// Description of the possible data loss
    pub warning: Option<String>,
}

impl TypeConversion {
    pub fn safe(sql_template: impl Into<String>) -> Self {
        Self {
            sql_template: sql_template.into(),
            risky: false,
            warning: None,
        }
    }

    pub fn risky(sql_template: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            sql_template: sql_template.into(),
            risky: true,
            warning: Some(warning.into()),
        }
    }

    /// Render the full `ALTER TABLE` statement for a column
    ///
    /// `max_length` defaults to 255 when the field declares none.
    pub fn render(
        &self,
        table: &str,
        column: &str,
        max_length: Option<u32>,
    ) -> Result<RenderedConversion, ModelError> {
        validate_identifier(table)?;
        validate_identifier(column)?;

        let length = max_length.unwrap_or(DEFAULT_VARCHAR_LENGTH).to_string();
        let fill = |template: &str| {
            template
                .replace("{table}", table)
                .replace("{column}", column)
                .replace("{maxLength}", &length)
        };

        Ok(RenderedConversion {
            sql: format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                table,
                column,
                fill(&self.sql_template)
            ),
            risky: self.risky,
            warning: self.warning.as_deref().map(fill),
        })
    }
}

/// A conversion with placeholders filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConversion {
    pub sql: String,
    pub risky: bool,
    pub warning: Option<String>,
}

/// Lookup table keyed by (from, to) canonical type names
#[derive(Debug, Clone)]
pub struct TypeConversionRegistry {
    conversions: HashMap<(String, String), TypeConversion>,
}

impl TypeConversionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            conversions: HashMap::new(),
        }
    }

    /// Registry preloaded with the standard PostgreSQL conversions
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_safe_conversions();
        registry.register_risky_conversions();
        registry
    }

    /// Register or replace a conversion
    pub fn register(&mut self, from: &str, to: &str, conversion: TypeConversion) {
        self.conversions
            .insert((from.to_uppercase(), to.to_uppercase()), conversion);
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }

    /// Find the conversion from a live type to a declared type
    ///
    /// Tries the exact pair first, then the VARCHAR length direction, then
    /// the pair with length qualifiers stripped.
    pub fn find(&self, from: &str, to: &str) -> Option<&TypeConversion> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();

        if let Some(conversion) = self.lookup(&from, &to) {
            return Some(conversion);
        }

        if let (Some(old_len), Some(new_len)) = (varchar_length(&from), varchar_length(&to)) {
            let key = if new_len >= old_len {
                (VARCHAR_SMALL, VARCHAR_LARGE)
            } else {
                (VARCHAR_LARGE, VARCHAR_SMALL)
            };
            if let Some(conversion) = self.lookup(key.0, key.1) {
                return Some(conversion);
            }
        }

        self.lookup(&strip_length(&from), &strip_length(&to))
    }

    fn lookup(&self, from: &str, to: &str) -> Option<&TypeConversion> {
        self.conversions.get(&(from.to_string(), to.to_string()))
    }

    fn register_safe_conversions(&mut self) {
        self.register("VARCHAR", "TEXT", TypeConversion::safe("TYPE TEXT"));
        self.register("CHAR", "VARCHAR", TypeConversion::safe("TYPE VARCHAR({maxLength})"));
        self.register("SMALLINT", "INTEGER", TypeConversion::safe("TYPE INTEGER"));
        self.register("INTEGER", "BIGINT", TypeConversion::safe("TYPE BIGINT"));
        self.register("REAL", "DOUBLE PRECISION", TypeConversion::safe("TYPE DOUBLE PRECISION"));
        self.register("DATE", "TIMESTAMP", TypeConversion::safe("TYPE TIMESTAMP"));
        self.register("DATE", "TIMESTAMPTZ", TypeConversion::safe("TYPE TIMESTAMPTZ"));
        self.register("TIMESTAMP", "TIMESTAMPTZ", TypeConversion::safe("TYPE TIMESTAMPTZ"));
        self.register("JSON", "JSONB", TypeConversion::safe("TYPE JSONB USING {column}::JSONB"));
        self.register(
            VARCHAR_SMALL,
            VARCHAR_LARGE,
            TypeConversion::safe("TYPE VARCHAR({maxLength})"),
        );
    }

    fn register_risky_conversions(&mut self) {
        let truncate = TypeConversion::risky(
            "TYPE VARCHAR({maxLength}) USING LEFT({column}, {maxLength})",
            "Data will be truncated to {maxLength} characters",
        );
        self.register("TEXT", "VARCHAR", truncate.clone());
        self.register(VARCHAR_LARGE, VARCHAR_SMALL, truncate);

        self.register(
            "BIGINT",
            "INTEGER",
            range_check("INTEGER", -2147483648, 2147483647),
        );
        self.register(
            "INTEGER",
            "SMALLINT",
            range_check("SMALLINT", -32768, 32767),
        );

        self.register(
            "TIMESTAMPTZ",
            "TIMESTAMP",
            TypeConversion::risky(
                "TYPE TIMESTAMP USING {column}::TIMESTAMP",
                "Timezone information will be lost",
            ),
        );
        self.register(
            "TIMESTAMP",
            "DATE",
            TypeConversion::risky("TYPE DATE USING {column}::DATE", "Time information will be lost"),
        );

        for text in ["TEXT", "VARCHAR"] {
            self.register(
                text,
                "JSON",
                pattern_cast("JSON", r"^[\[\{]", "Invalid JSON values will become NULL"),
            );
            self.register(
                text,
                "UUID",
                pattern_cast(
                    "UUID",
                    "^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
                    "Invalid UUID values will become NULL",
                ),
            );
            self.register(
                text,
                "INTEGER",
                pattern_cast("INTEGER", "^-?[0-9]+$", "Non-numeric values will become NULL"),
            );
            self.register(
                text,
                "BOOLEAN",
                TypeConversion::risky(
                    "TYPE BOOLEAN\n\
                     USING CASE\n  \
                     WHEN LOWER({column}) IN ('true', 't', 'yes', 'y', '1') THEN TRUE\n  \
                     WHEN LOWER({column}) IN ('false', 'f', 'no', 'n', '0') THEN FALSE\n  \
                     ELSE NULL\n\
                     END",
                    "Unrecognized values will become NULL",
                ),
            );
        }
    }
}

impl Default for TypeConversionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Narrowing integer cast that nulls out-of-range values
fn range_check(target: &str, min: i64, max: i64) -> TypeConversion {
    TypeConversion::risky(
        format!(
            "TYPE {target}\nUSING CASE\n  WHEN {{column}} BETWEEN {min} AND {max} THEN {{column}}::{target}\n  ELSE NULL\nEND"
        ),
        format!("Values out of {target} range ({min} to {max}) will become NULL"),
    )
}

/// Cast guarded by a regex match, nulling values that do not match
fn pattern_cast(target: &str, pattern: &str, warning: &str) -> TypeConversion {
    TypeConversion::risky(
        format!(
            "TYPE {target}\nUSING CASE\n  WHEN {{column}} ~ '{pattern}' THEN {{column}}::{target}\n  ELSE NULL\nEND"
        ),
        warning,
    )
}

/// Length of a `VARCHAR(n)` spelling
fn varchar_length(sql_type: &str) -> Option<u32> {
    sql_type
        .strip_prefix("VARCHAR(")?
        .strip_suffix(')')?
        .trim()
        .parse()
        .ok()
}

/// `VARCHAR(n)` becomes `VARCHAR`, `CHAR(n)` becomes `CHAR`
fn strip_length(sql_type: &str) -> String {
    if sql_type.starts_with("VARCHAR") {
        "VARCHAR".to_string()
    } else if sql_type.starts_with("CHAR(") {
        "CHAR".to_string()
    } else {
        sql_type.to_string()
    }
}
