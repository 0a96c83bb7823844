use tsqlfmt::{format_string, FormatterKind, Mode, PARSE_ERROR_WARNING};

fn default_mode() -> Mode {
    Mode::default()
}

fn mode_for(formatter: FormatterKind) -> Mode {
    Mode {
        formatter,
        ..Mode::default()
    }
}

const SAMPLES: &[&str] = &[
    "SELECT a, b FROM t",
    "select distinct x.id , y.[name] from dbo.x join dbo.y on x.id = y.xid where x.flag = 1 and y.kind in ('a','b')",
    "IF @x = 1 BEGIN SELECT 1 END ELSE BEGIN SELECT 2 END",
    "DECLARE @n INT; SET @n = 0; WHILE @n < 10 BEGIN SET @n = @n + 1 END",
    "CREATE TABLE dbo.t (id INT NOT NULL, name VARCHAR(50) NULL)",
    "INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')",
    "WITH cte (id) AS (SELECT id FROM t) SELECT * FROM cte",
    "SELECT CASE WHEN a BETWEEN 1 AND 10 THEN 'low' ELSE 'high' END FROM t",
    "SELECT 1\nGO\nSELECT 2\nGO",
    "-- touch-up\nUPDATE t SET a = 1, b = 2 WHERE id = 3;",
    "/* header\n   comment */ SELECT 1",
    "EXEC dbo.proc_name @p1 = 1, @p2 = 'x'",
];

// The identity formatter reproduces its input byte for byte, whatever
// the parser thought of it.

#[test]
fn test_identity_is_lossless() {
    let mode = mode_for(FormatterKind::Identity);
    for source in SAMPLES {
        let result = format_string(source, &mode).unwrap();
        assert_eq!(&result, source, "identity output differs for {:?}", source);
    }
}

#[test]
fn test_identity_lossless_on_malformed_input() {
    let mode = mode_for(FormatterKind::Identity);
    for source in [
        "SELECT (a FROM t",
        "BEGIN SELECT 1",
        "SELECT 'unterminated",
        "CASE WHEN",
        "/* open comment",
    ] {
        let result = format_string(source, &mode).unwrap();
        assert_eq!(result, source);
    }
}

// The standard formatter's output is a fixed point: formatting a second
// time changes nothing.

#[test]
fn test_standard_output_is_stable() {
    let mode = default_mode();
    for source in SAMPLES {
        let once = format_string(source, &mode).unwrap();
        let twice = format_string(&once, &mode).unwrap();
        assert_eq!(twice, once, "reformat not stable for {:?}", source);
    }
}

#[test]
fn test_standard_select_layout() {
    let result = format_string("SELECT a, b FROM t WHERE a = 1", &default_mode()).unwrap();
    assert_eq!(result, "SELECT\n\ta\n\t,b\nFROM t\nWHERE a = 1;\n");
}

#[test]
fn test_standard_uppercases_keywords() {
    let result = format_string("select a from t where x = 1", &default_mode()).unwrap();
    assert!(result.contains("SELECT"));
    assert!(result.contains("FROM"));
    assert!(result.contains("WHERE"));
    assert!(!result.contains("select"));
}

#[test]
fn test_standard_preserves_identifiers_and_strings() {
    let result = format_string(
        "SELECT [MyColumn], 'Hello World' FROM [My Table]",
        &default_mode(),
    )
    .unwrap();
    assert!(result.contains("[MyColumn]"));
    assert!(result.contains("'Hello World'"));
    assert!(result.contains("[My Table]"));
}

#[test]
fn test_comma_modes() {
    let source = "SELECT a, b, c FROM t";
    let leading = format_string(source, &default_mode()).unwrap();
    assert!(leading.contains("\n\t,b"));

    let mut mode = default_mode();
    mode.options.trailing_commas = true;
    let trailing = format_string(source, &mode).unwrap();
    assert!(trailing.contains("a,\n"));

    mode.options.trailing_commas = false;
    mode.options.space_after_expanded_comma = true;
    let spaced = format_string(source, &mode).unwrap();
    assert!(spaced.contains("\n\t, b"));

    mode.options.expand_comma_lists = false;
    let inline = format_string(source, &mode).unwrap();
    assert!(inline.contains("a, b, c"));
}

#[test]
fn test_parse_error_keeps_all_content_and_warns() {
    let source = "SELECT (a FROM t";
    let result = format_string(source, &default_mode()).unwrap();
    assert!(result.starts_with(PARSE_ERROR_WARNING));
    for word in ["SELECT", "a", "FROM", "t"] {
        assert!(result.contains(word), "missing {:?} in {:?}", word, result);
    }
}

#[test]
fn test_noformat_region_is_untouched() {
    let source = "--[noformat]\nselect   a,b   from t\n--[/noformat]\n";
    let result = format_string(source, &default_mode()).unwrap();
    assert!(result.contains("select   a,b   from t"));
}

#[test]
fn test_obfuscating_minifies() {
    let mode = mode_for(FormatterKind::Obfuscating);
    let result = format_string("SELECT  a ,\n\tb\nFROM   t\nWHERE x = 1\n", &mode).unwrap();
    assert!(!result.contains('\n'));
    assert!(!result.contains('\t'));
    assert!(!result.contains("  "));
}

#[test]
fn test_obfuscating_output_retokenizes_identically() {
    use tsqlfmt::token::TokenKind;
    use tsqlfmt::tokenizer::tokenize;

    let mode = mode_for(FormatterKind::Obfuscating);
    for source in SAMPLES {
        let minified = format_string(source, &mode).unwrap();
        let original: Vec<_> = tokenize(source)
            .into_iter()
            .filter(|t| t.kind != TokenKind::WhiteSpace)
            .collect();
        let reparsed: Vec<_> = tokenize(&minified)
            .into_iter()
            .filter(|t| t.kind != TokenKind::WhiteSpace)
            .collect();
        assert_eq!(
            original.len(),
            reparsed.len(),
            "token count drifted for {:?}",
            source
        );
        for (a, b) in original.iter().zip(reparsed.iter()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.text, b.text);
        }
    }
}

#[test]
fn test_batch_separator_layout() {
    let result = format_string("SELECT 1\nGO\nSELECT 2", &default_mode()).unwrap();
    assert_eq!(result, "SELECT\n\t1;\nGO\n\nSELECT\n\t2;\n");
}

#[test]
fn test_begin_end_block_indentation() {
    let result = format_string("IF @x = 1 BEGIN SELECT 1 END", &default_mode()).unwrap();
    assert_eq!(result, "IF @x = 1\nBEGIN\n\tSELECT\n\t\t1\nEND;\n");
}

#[test]
fn test_create_table_layout() {
    let result = format_string(
        "CREATE TABLE dbo.t (id INT NOT NULL, name VARCHAR(50))",
        &default_mode(),
    )
    .unwrap();
    assert!(result.contains("CREATE TABLE dbo.t"));
    assert!(result.contains("VARCHAR(50)"));
    assert!(result.contains("\n\t,name") || result.contains(",\n"));
}

#[test]
fn test_html_output_escapes_and_tags() {
    let mut mode = default_mode();
    mode.options.html_coloring = true;
    let result = format_string("SELECT a FROM t WHERE x < 'b&c'", &mode).unwrap();
    assert!(result.contains("class=\"SQLKeyword\""));
    assert!(result.contains("&lt;"));
    assert!(result.contains("&amp;"));
    assert!(!result.contains("< '"));
}

#[test]
fn test_keyword_standardization() {
    let mut mode = default_mode();
    mode.options.keyword_standardization = true;
    let result = format_string("EXEC dbo.p @a = 1", &mode).unwrap();
    assert!(result.contains("EXECUTE"));
}
