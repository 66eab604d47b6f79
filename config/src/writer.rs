use std::fmt::Write as _;

use crate::value::{Node, Value};

/// Serializes a tree back to configuration text.
///
/// The output parses to a tree equal to the input: quoting is applied to
/// any string the bare-word lexer would not read back verbatim.
pub fn to_text(node: &Node) -> String {
    let mut out = String::new();
    write_pairs(node, 0, &mut out);
    out
}

fn write_pairs(node: &Node, depth: usize, out: &mut String) {
    for (key, value) in node.iter() {
        indent(depth, out);
        out.push_str(key);
        out.push_str(" = ");
        write_value(value, depth, out);
        out.push('\n');
    }
}

fn write_value(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Str(s) => write_str(s, out),
        Value::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float(v) => {
            // keep a decimal point so the value reads back as a float
            if v.fract() == 0.0 && v.is_finite() {
                let _ = write!(out, "{v:.1}");
            } else {
                let _ = write!(out, "{v}");
            }
        }
        Value::Array(items) => {
            out.push('{');
            for item in items {
                out.push(' ');
                write_value(item, depth, out);
            }
            out.push_str(" }");
        }
        Value::Node(child) => {
            if child.is_empty() {
                out.push_str("{ }");
            } else {
                out.push_str("{\n");
                write_pairs(child, depth + 1, out);
                indent(depth, out);
                out.push('}');
            }
        }
    }
}

fn write_str(s: &str, out: &mut String) {
    if is_bare_safe(s) {
        out.push_str(s);
    } else {
        out.push('"');
        for ch in s.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out.push('"');
    }
}

/// A string survives as a bare word when it lexes back to the same string.
fn is_bare_safe(s: &str) -> bool {
    !s.is_empty()
        && s.parse::<i64>().is_err()
        && s.parse::<f64>().is_err()
        && s.bytes().all(|b| {
            !b.is_ascii_whitespace() && !matches!(b, b'{' | b'}' | b'=' | b'"' | b',' | b'/')
        })
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn round_trip_preserves_the_tree() {
        let text = r#"
            Data = {
                DDB1 = {
                    Class = GamDataSource
                    Signals = {
                        sigX = { Type = int32 NumberOfElements = 4 Default = { 1 2 3 4 } }
                    }
                }
            }
            Title = "with spaces"
            Rate = 0.5
        "#;
        let first = parse(text).expect("first parse");
        let serialized = to_text(&first);
        let second = parse(&serialized).expect("reparse serialized text");
        assert_eq!(first, second, "serialized form:\n{serialized}");
    }

    #[test]
    fn floats_read_back_as_floats() {
        let mut node = Node::new();
        node.insert("Gain", 2.0f64);
        let reparsed = parse(&to_text(&node)).expect("reparse");
        assert_eq!(reparsed.get("Gain"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn numeric_looking_strings_are_quoted() {
        let mut node = Node::new();
        node.insert("Version", "42");
        let reparsed = parse(&to_text(&node)).expect("reparse");
        assert_eq!(reparsed.get_str("Version"), Some("42"));
    }
}
