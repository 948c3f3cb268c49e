//! Relaxed JSONPath evaluation
//!
//! Accepts `{.a.b}`, `$.a.b`, `.a.b` and `a.b` as the same path. Supported
//! segments are dotted names (with `\.` for a literal dot), quoted keys
//! (`['a.b']`, `["a"]`), array indices (`[0]`, `[-1]`) and wildcards (`[*]`,
//! `.*`). Filters and slices are not supported.

use serde_json::Value;

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
    Wildcard,
}

/// A compiled path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Compile a relaxed path expression
    pub fn compile(expression: &str) -> Result<Self, TemplateError> {
        let invalid = |reason: &str| TemplateError::InvalidPath {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let path = normalize(expression);
        let chars: Vec<char> = path.chars().collect();
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut after_bracket = false;
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '\\' if i + 1 < chars.len() => {
                    current.push(chars[i + 1]);
                    i += 2;
                }
                '.' => {
                    if !current.is_empty() {
                        segments.push(name_segment(std::mem::take(&mut current)));
                    } else if !after_bracket {
                        return Err(invalid("empty path segment"));
                    }
                    after_bracket = false;
                    i += 1;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(name_segment(std::mem::take(&mut current)));
                    }
                    let close = closing_bracket(&chars, i + 1).ok_or_else(|| invalid("unterminated '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(bracket_segment(inner.trim()).ok_or_else(|| {
                        invalid(&format!("unsupported selector [{}]", inner))
                    })?);
                    after_bracket = true;
                    i = close + 1;
                }
                c => {
                    current.push(c);
                    after_bracket = false;
                    i += 1;
                }
            }
        }

        if !current.is_empty() {
            segments.push(name_segment(current));
        } else if path.ends_with('.') && !path.ends_with("\\.") {
            return Err(invalid("trailing '.'"));
        }

        Ok(Self { segments })
    }

    /// Whether the path can select more than one value
    pub fn is_multi(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Wildcard))
    }

    /// The segments ahead of the first wildcard
    fn fixed_prefix(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .take_while(|s| !matches!(s, Segment::Wildcard))
                .cloned()
                .collect(),
        }
    }

    /// Select every value matched by the path
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (Segment::Key(key), Value::Object(map)) => {
                        if let Some(v) = map.get(key) {
                            next.push(v);
                        }
                    }
                    (Segment::Key(key), Value::Array(items)) => {
                        if let Some(v) = key.parse::<usize>().ok().and_then(|idx| items.get(idx)) {
                            next.push(v);
                        }
                    }
                    (Segment::Index(idx), Value::Array(items)) => {
                        let resolved = if *idx < 0 { items.len() as i64 + idx } else { *idx };
                        if resolved >= 0 {
                            if let Some(v) = items.get(resolved as usize) {
                                next.push(v);
                            }
                        }
                    }
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    _ => {}
                }
            }
            current = next;
        }
        current
    }
}

/// Evaluate `expression` against `root` and render the result as text.
///
/// Strings come back raw, scalars as their JSON text and objects/arrays as
/// compact JSON, so structured values can be embedded in other JSON
/// documents. A wildcard path yields a JSON array, provided the part of the
/// path ahead of the first wildcard exists.
pub fn parse_json_path(root: &Value, expression: &str) -> Result<String, TemplateError> {
    let path = JsonPath::compile(expression)?;
    let results = path.select(root);

    if path.is_multi() {
        if results.is_empty() && path.fixed_prefix().select(root).is_empty() {
            return Err(TemplateError::NotFound {
                expression: expression.to_string(),
            });
        }
        let collected: Vec<&Value> = results;
        return serde_json::to_string(&collected).map_err(|e| TemplateError::InvalidPath {
            expression: expression.to_string(),
            reason: e.to_string(),
        });
    }

    match results.first() {
        Some(value) => Ok(text_value(value)),
        None => Err(TemplateError::NotFound {
            expression: expression.to_string(),
        }),
    }
}

/// Render a JSON value the way substitutions expect it
pub fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize(expression: &str) -> &str {
    let mut expr = expression.trim();
    if let Some(inner) = expr.strip_prefix('{').and_then(|e| e.strip_suffix('}')) {
        expr = inner.trim();
    }
    if let Some(rest) = expr.strip_prefix('$') {
        expr = rest;
    }
    expr.strip_prefix('.').unwrap_or(expr)
}

fn name_segment(name: String) -> Segment {
    if name == "*" {
        Segment::Wildcard
    } else {
        Segment::Key(name)
    }
}

fn bracket_segment(inner: &str) -> Option<Segment> {
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(key) = inner.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return Some(Segment::Key(key.to_string()));
        }
    }
    inner.parse::<i64>().ok().map(Segment::Index)
}

fn closing_bracket(chars: &[char], start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in chars[start..].iter().enumerate() {
        match (quote, *c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(*c),
            (None, ']') => return Some(start + offset),
            (None, _) => {}
        }
    }
    None
}
