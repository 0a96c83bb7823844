//! Static keyword tables for the T-SQL grammar.
//!
//! All lookups are against uppercase text; the tokenizer matches
//! case-insensitively by uppercasing candidate words.

use phf::{phf_map, phf_set};

/// The fixed single-word keyword set.
static KEYWORDS: phf::Set<&'static str> = phf_set! {
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "AUTHORIZATION",
    "BACKUP", "BEGIN", "BETWEEN", "BREAK", "BROWSE", "BULK", "BY",
    "CASCADE", "CASE", "CATCH", "CHECK", "CHECKPOINT", "CLOSE", "CLUSTERED",
    "COLLATE", "COLUMN", "COMMIT", "COMPUTE", "CONSTRAINT", "CONTAINS",
    "CONTINUE", "CREATE", "CROSS", "CURRENT", "CURSOR",
    "DATABASE", "DBCC", "DEALLOCATE", "DECLARE", "DEFAULT", "DELETE", "DENY",
    "DESC", "DISK", "DISTINCT", "DISTRIBUTED", "DROP", "DUMP", "DYNAMIC",
    "ELSE", "END", "ERRLVL", "ESCAPE", "EXCEPT", "EXEC", "EXECUTE", "EXISTS",
    "EXIT", "EXTERNAL",
    "FAST_FORWARD", "FETCH", "FILE", "FILLFACTOR", "FOR", "FOREIGN",
    "FREETEXT", "FROM", "FULL", "FUNCTION",
    "GLOBAL", "GOTO", "GRANT", "GROUP",
    "HAVING", "HOLDLOCK",
    "IDENTITY", "IF", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO",
    "IS", "ISOLATION",
    "JOIN",
    "KEY", "KILL",
    "LEFT", "LEVEL", "LIKE", "LINENO", "LOAD", "LOCAL",
    "MATCHED", "MERGE",
    "NATIONAL", "NEXT", "NOCHECK", "NOCOUNT", "NONCLUSTERED", "NOT", "NULL",
    "OF", "OFF", "OFFSETS", "ON", "ONLY", "OPEN", "OPTION", "OR", "ORDER",
    "OUT", "OUTER", "OUTPUT", "OVER",
    "PARTITION", "PERCENT", "PIVOT", "PLAN", "PRECISION", "PRIMARY", "PRINT",
    "PROC", "PROCEDURE", "PUBLIC",
    "RAISERROR", "READ", "READONLY", "RECONFIGURE", "RECURSIVE", "REFERENCES",
    "REPEATABLE", "REPLICATION", "RESTORE", "RESTRICT", "RETURN", "RETURNS",
    "REVERT", "REVOKE", "RIGHT", "ROLLBACK", "ROWCOUNT", "ROWGUIDCOL", "ROWS",
    "RULE",
    "SAVE", "SCHEMA", "SCROLL", "SELECT", "SERIALIZABLE", "SET", "SETUSER",
    "SHUTDOWN", "SNAPSHOT", "SOME", "STATIC", "STATISTICS", "SYNONYM",
    "TABLE", "TABLESAMPLE", "TEXTSIZE", "THEN", "TO", "TOP", "TRAN",
    "TRANSACTION", "TRIGGER", "TRUNCATE", "TRY", "TSEQUAL",
    "UNCOMMITTED", "UNION", "UNIQUE", "UNPIVOT", "UPDATE", "UPDATETEXT",
    "USE", "USER", "USING",
    "VALUES", "VARYING", "VIEW",
    "WAITFOR", "WHEN", "WHERE", "WHILE", "WITH", "WITHIN", "WRITETEXT",
    "XLOCK",
};

/// T-SQL built-in data type names.
static DATA_TYPES: phf::Set<&'static str> = phf_set! {
    "BIGINT", "BINARY", "BIT", "CHAR", "CHARACTER", "DATE", "DATETIME",
    "DATETIME2", "DATETIMEOFFSET", "DEC", "DECIMAL", "FLOAT", "IMAGE", "INT",
    "INTEGER", "MONEY", "NCHAR", "NTEXT", "NUMERIC", "NVARCHAR", "REAL",
    "ROWVERSION", "SMALLDATETIME", "SMALLINT", "SMALLMONEY", "SQL_VARIANT",
    "TEXT", "TIME", "TIMESTAMP", "TINYINT", "UNIQUEIDENTIFIER", "VARBINARY",
    "VARCHAR", "XML",
};

/// Built-in functions that are lexically keywords but format as functions
/// when followed by an argument list.
static FUNCTION_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "ABS", "AVG", "CAST", "CEILING", "CHARINDEX", "COALESCE", "CONCAT",
    "CONVERT", "COUNT", "COUNT_BIG", "DATALENGTH", "DATEADD", "DATEDIFF",
    "DATENAME", "DATEPART", "DAY", "FLOOR", "GETDATE", "GETUTCDATE",
    "ISNULL", "LEN", "LOWER", "LTRIM", "MAX", "MIN", "MONTH", "NEWID",
    "NULLIF", "OBJECT_ID", "PATINDEX", "POWER", "RAND", "REPLACE", "ROUND",
    "ROW_NUMBER", "RTRIM", "SCOPE_IDENTITY", "STDEV", "STUFF", "SUBSTRING",
    "SUM", "SUSER_SNAME", "UPPER", "YEAR",
};

/// Niladic pseudo-column keywords, emitted with keyword casing but never
/// treated as clause structure.
static PSEUDO_NAMES: phf::Set<&'static str> = phf_set! {
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "SESSION_USER", "SYSTEM_USER",
};

/// Non-canonical keyword spellings remapped when KeywordStandardization is
/// enabled, before casing is applied.
static KEYWORD_REMAPPING: phf::Map<&'static str, &'static str> = phf_map! {
    "PROC" => "PROCEDURE",
    "TRAN" => "TRANSACTION",
    "EXEC" => "EXECUTE",
    "INT" => "INTEGER",
    "DEC" => "DECIMAL",
    "CHARACTER" => "CHAR",
};

/// Multi-word keywords recognized by the tokenizer as single compound
/// tokens. Longest match wins; sequences sharing a prefix must be listed
/// longest first.
pub static COMPOUND_KEYWORDS: &[&[&str]] = &[
    &["LEFT", "OUTER", "JOIN"],
    &["RIGHT", "OUTER", "JOIN"],
    &["FULL", "OUTER", "JOIN"],
    &["LEFT", "JOIN"],
    &["RIGHT", "JOIN"],
    &["FULL", "JOIN"],
    &["INNER", "JOIN"],
    &["CROSS", "JOIN"],
    &["CROSS", "APPLY"],
    &["OUTER", "APPLY"],
    &["GROUP", "BY"],
    &["ORDER", "BY"],
    &["PARTITION", "BY"],
    &["INSERT", "INTO"],
    &["DELETE", "FROM"],
    &["UNION", "ALL"],
    &["BEGIN", "TRY"],
    &["BEGIN", "CATCH"],
    &["END", "TRY"],
    &["END", "CATCH"],
    &["PRIMARY", "KEY"],
    &["FOREIGN", "KEY"],
    &["WHEN", "MATCHED"],
    &["WHEN", "NOT", "MATCHED"],
    &["IS", "NOT", "NULL"],
    &["IS", "NULL"],
    &["NOT", "IN"],
    &["NOT", "LIKE"],
    &["NOT", "BETWEEN"],
    &["NOT", "EXISTS"],
];

pub fn is_keyword(upper: &str) -> bool {
    KEYWORDS.contains(upper) || DATA_TYPES.contains(upper) || FUNCTION_KEYWORDS.contains(upper)
}

pub fn is_data_type(upper: &str) -> bool {
    DATA_TYPES.contains(upper)
}

pub fn is_function_keyword(upper: &str) -> bool {
    FUNCTION_KEYWORDS.contains(upper)
}

pub fn is_pseudo_name(upper: &str) -> bool {
    PSEUDO_NAMES.contains(upper)
}

/// Canonical spelling for a keyword, if a remapping exists.
pub fn standardized(upper: &str) -> Option<&'static str> {
    KEYWORD_REMAPPING.get(upper).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_membership() {
        assert!(is_keyword("SELECT"));
        assert!(is_keyword("FROM"));
        assert!(is_keyword("VARCHAR"));
        assert!(is_keyword("COUNT"));
        assert!(!is_keyword("MY_TABLE"));
    }

    #[test]
    fn test_data_type_vs_function() {
        assert!(is_data_type("INT"));
        assert!(!is_data_type("SELECT"));
        assert!(is_function_keyword("SUM"));
        assert!(!is_function_keyword("WHERE"));
    }

    #[test]
    fn test_standardization() {
        assert_eq!(standardized("PROC"), Some("PROCEDURE"));
        assert_eq!(standardized("EXEC"), Some("EXECUTE"));
        assert_eq!(standardized("SELECT"), None);
    }

    #[test]
    fn test_compound_prefix_ordering() {
        // Any sequence must come after every longer sequence that shares
        // its prefix, so longest-match scanning can take the first hit.
        for (i, seq) in COMPOUND_KEYWORDS.iter().enumerate() {
            for longer in COMPOUND_KEYWORDS[i + 1..].iter() {
                assert!(
                    !(longer.len() > seq.len() && longer[..seq.len()] == **seq),
                    "{:?} is shadowed by longer {:?}",
                    seq,
                    longer
                );
            }
        }
    }
}
