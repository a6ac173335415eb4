//! String escaping for generated automation scripts
//!
//! Every value spliced into a generated script goes through one of these
//! functions. They are the only thing standing between user-controlled text
//! (subject, body, recipient, file paths) and the interpreter's grammar.

use base64::prelude::{Engine as _, BASE64_STANDARD};

/// Escape a value for use inside an AppleScript double-quoted string literal.
///
/// Backslashes are doubled first, then double quotes are prefixed with a
/// backslash. Reversing the order would double-escape the quote escapes.
///
/// ```
/// assert_eq!(automation::escape::applescript_string(r#"a\"b"#), r#"a\\\"b"#);
/// ```
pub fn applescript_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Quote a value as a PowerShell single-quoted (verbatim) string literal.
///
/// Single-quoted strings never expand `$variables` or subexpressions, so the
/// only character that needs neutralizing is the delimiter itself. PowerShell
/// accepts the typographic single quotes as delimiters too; each is doubled.
///
/// ```
/// assert_eq!(automation::escape::powershell_literal("it's"), "'it''s'");
/// ```
pub fn powershell_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if is_powershell_single_quote(c) {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

fn is_powershell_single_quote(c: char) -> bool {
    matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}')
}

/// Encode a script for `powershell -EncodedCommand` (base64 of UTF-16LE).
pub fn encode_powershell_command(script: &str) -> String {
    let bytes: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applescript_plain_text_unchanged() {
        assert_eq!(applescript_string("Hello world"), "Hello world");
    }

    #[test]
    fn test_applescript_backslash_before_quote() {
        assert_eq!(applescript_string("\\"), "\\\\");
        assert_eq!(applescript_string("\""), "\\\"");
        // A pre-escaped quote must not collapse back into a delimiter
        assert_eq!(applescript_string("\\\""), "\\\\\\\"");
    }

    #[test]
    fn test_applescript_injection_stays_inside_literal() {
        let hostile = "\" & (do shell script \"rm -rf ~\") & \"";
        let escaped = applescript_string(hostile);
        // Every quote in the output is preceded by an odd run of backslashes
        let chars: Vec<char> = escaped.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            if *c == '"' {
                let run = chars[..i].iter().rev().take_while(|c| **c == '\\').count();
                assert_eq!(run % 2, 1, "unescaped quote at {}", i);
            }
        }
    }

    #[test]
    fn test_powershell_literal_doubles_quotes() {
        assert_eq!(powershell_literal(""), "''");
        assert_eq!(powershell_literal("O'Brien"), "'O''Brien'");
        assert_eq!(powershell_literal("\u{2019}"), "'\u{2019}\u{2019}'");
    }

    #[test]
    fn test_powershell_literal_leaves_expansion_chars() {
        // $ and backtick have no meaning inside single quotes
        assert_eq!(powershell_literal("$env:PATH `n"), "'$env:PATH `n'");
    }

    #[test]
    fn test_encode_powershell_command() {
        // "ab" -> 61 00 62 00
        assert_eq!(encode_powershell_command("ab"), "YQBiAA==");
        assert_eq!(encode_powershell_command(""), "");
    }
}
