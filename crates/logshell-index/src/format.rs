use once_cell::sync::Lazy;
use regex::Regex;

// Quoted strings first so numbers inside them do not leave partial matches,
// then hex literals, then decimal numbers (including dotted versions/IPs).
static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap());
static HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:[.:]\d+)*\b").unwrap());

/// Reduce a log message to its shape by masking the variable parts with `#`,
/// so `took 12ms for "a"` and `took 7ms for "b"` share a format.
pub fn message_format(body: &str) -> String {
    let masked = QUOTED.replace_all(body, "#");
    let masked = HEX.replace_all(&masked, "#");
    NUMBER.replace_all(&masked, "#").into_owned()
}
