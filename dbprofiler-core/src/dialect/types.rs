//! Classification of declared column types.
//!
//! Stage runners decide which columns they profile from the type name the
//! source catalog reports, so the sets below are engine-agnostic and matched
//! on a normalized name: lowercase, trimmed, without a length or precision
//! suffix (`VARCHAR(255)` -> `varchar`, `decimal(10,2) unsigned` -> `decimal`).

/// Date and time types; profiled by the Dates stage.
pub const DATE_TYPES: &[&str] = &[
    "datetime",
    "timestamp",
    "date",
    "datetime2",
    "smalldatetime",
    "timestamp_ntz",
    "timestamp_tz",
    "timestamp_ltz",
    "timestamp without time zone",
    "timestamp with time zone",
    "datetimeoffset",
];

/// Numeric types; profiled by the Stats stage.
pub const NUMERIC_TYPES: &[&str] = &[
    "int",
    "integer",
    "decimal",
    "numeric",
    "float",
    "money",
    "tinyint",
    "bigint",
    "smallint",
    "real",
    "double",
    "double precision",
    "mediumint",
    "smallmoney",
];

/// Free text, binary and large-object types; never bulk loaded and never
/// histogrammed by the Data Values stage.
pub const FILTERED_TYPES: &[&str] = &[
    "text",
    "ntext",
    "image",
    "blob",
    "binary",
    "varbinary",
    "jsonb",
    "tsvector",
    "array",
    "bytea",
    "regconfig",
    "nclob",
    "lob",
    "longtext",
    "mediumtext",
    "longblob",
    "mediumblob",
    "json",
    "xml",
];

/// Category of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Date,
    Numeric,
    Filtered,
    Other,
}

/// Normalizes a declared type name for matching.
pub fn normalize(data_type: &str) -> String {
    let base = data_type.split('(').next().unwrap_or(data_type);
    let mut normalized = base.trim().to_ascii_lowercase();
    for modifier in [" unsigned", " signed", " zerofill"] {
        if let Some(stripped) = normalized.strip_suffix(modifier) {
            normalized = stripped.trim_end().to_string();
        }
    }
    normalized
}

/// Classifies a declared type.
pub fn classify(data_type: &str) -> TypeClass {
    let normalized = normalize(data_type);
    let name = normalized.as_str();
    if DATE_TYPES.contains(&name) {
        TypeClass::Date
    } else if NUMERIC_TYPES.contains(&name) {
        TypeClass::Numeric
    } else if FILTERED_TYPES.contains(&name) || name.ends_with("[]") {
        TypeClass::Filtered
    } else {
        TypeClass::Other
    }
}

/// Whether the Dates stage profiles this type.
pub fn is_date(data_type: &str) -> bool {
    classify(data_type) == TypeClass::Date
}

/// Whether the Stats stage profiles this type.
pub fn is_numeric(data_type: &str) -> bool {
    classify(data_type) == TypeClass::Numeric
}

/// Whether the type is excluded from bulk loading and value histograms.
pub fn is_filtered(data_type: &str) -> bool {
    classify(data_type) == TypeClass::Filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("VARCHAR(255)"), "varchar");
        assert_eq!(normalize(" decimal(10,2) "), "decimal");
        assert_eq!(normalize("int unsigned"), "int");
        assert_eq!(normalize("timestamp without time zone"), "timestamp without time zone");
    }

    #[test]
    fn test_classify_per_engine_spellings() {
        assert_eq!(classify("INTEGER"), TypeClass::Numeric);
        assert_eq!(classify("double precision"), TypeClass::Numeric);
        assert_eq!(classify("decimal(10,2)"), TypeClass::Numeric);
        assert_eq!(classify("DATETIME"), TypeClass::Date);
        assert_eq!(classify("timestamp with time zone"), TypeClass::Date);
        assert_eq!(classify("datetime2"), TypeClass::Date);
        assert_eq!(classify("bytea"), TypeClass::Filtered);
        assert_eq!(classify("LONGTEXT"), TypeClass::Filtered);
        assert_eq!(classify("integer[]"), TypeClass::Filtered);
        assert_eq!(classify("varchar(100)"), TypeClass::Other);
        assert_eq!(classify(""), TypeClass::Other);
    }

    #[test]
    fn test_predicates() {
        assert!(is_date("date"));
        assert!(is_numeric("bigint"));
        assert!(is_filtered("blob"));
        assert!(!is_filtered("character varying"));
    }
}
