//! `$name` / `${name}` expansion and shell-style argument splitting.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// `${` without a closing brace.
    UnterminatedBrace(usize),
    /// Quotes left open after expansion.
    UnbalancedQuotes,
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::UnterminatedBrace(pos) => {
                write!(f, "missing '}}' for variable reference at offset {}", pos)
            }
            ExpandError::UnbalancedQuotes => write!(f, "unbalanced quotes"),
        }
    }
}

impl std::error::Error for ExpandError {}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace variable references with values from `lookup`. Unknown names
/// expand to nothing; text inside single quotes and `\$` are left alone.
pub fn expand_vars<F>(text: &str, lookup: F) -> Result<String, ExpandError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some((pos, c)) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            '\\' if !in_single => {
                out.push(c);
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
            }
            '$' if !in_single => match chars.peek().copied() {
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, nc) in chars.by_ref() {
                        if nc == '}' {
                            closed = true;
                            break;
                        }
                        name.push(nc);
                    }
                    if !closed {
                        return Err(ExpandError::UnterminatedBrace(pos));
                    }
                    out.push_str(&lookup(&name).unwrap_or_default());
                }
                Some((_, '#')) => {
                    chars.next();
                    out.push_str(&lookup("#").unwrap_or_default());
                }
                Some((_, nc)) if is_name_char(nc) => {
                    let mut name = String::new();
                    while let Some((_, nc)) = chars.peek().copied() {
                        if !is_name_char(nc) {
                            break;
                        }
                        name.push(nc);
                        chars.next();
                    }
                    out.push_str(&lookup(&name).unwrap_or_default());
                }
                _ => out.push('$'),
            },
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Expand variables, then split into words with shell quoting rules.
pub fn split_args<F>(text: &str, lookup: F) -> Result<Vec<String>, ExpandError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_vars(text, lookup)?;
    shlex::split(&expanded).ok_or(ExpandError::UnbalancedQuotes)
}
