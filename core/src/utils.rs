//! Shared helpers for building shell scripts and command lines.

/// Quote a single word for a POSIX shell.
/// Words made only of safe characters are returned as-is, everything else is
/// wrapped in single quotes with embedded quotes spelled as `'\''`.
#[inline]
pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty() && word.chars().all(is_safe_char);
    if safe {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | ',' | '=' | '+' | '@')
}

/// Join words into a single shell command line, quoting each one.
#[inline]
pub(crate) fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render an argument vector for log output.
#[inline]
pub(crate) fn display_argv<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
}
