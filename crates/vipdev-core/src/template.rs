//! Environment template evaluation
//!
//! A deliberately small language evaluated against a JSON context:
//!
//! ```text
//! name: {{ siteSlug }}
//! {{#if wordpress.mode == "local"}}
//!   - {{ wordpress.dir }}:/wp
//! {{else}}
//!   - wordpress:/wp
//! {{/if}}
//! {{#unless multisite}}single{{/unless}}
//! title: {{ json wpTitle }}
//! ```
//!
//! `{{ json path }}` emits the value as a JSON literal, which is also a valid
//! YAML flow scalar; use it for free-form text such as titles.
//!
//! Block tags alone on a line swallow that line, so the output keeps the
//! indentation of the surrounding YAML.

use serde_json::Value;

use crate::error::RenderError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var {
        path: String,
        json: bool,
        line: usize,
    },
    Block {
        negate: bool,
        cond: Condition,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: String,
    equals: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Unless,
}

impl BlockKind {
    fn name(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Unless => "unless",
        }
    }
}

struct Frame {
    kind: BlockKind,
    cond: Condition,
    line: usize,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn body(&mut self) -> &mut Vec<Node> {
        self.otherwise.as_mut().unwrap_or(&mut self.then)
    }
}

enum Token<'a> {
    Text(&'a str),
    Tag { body: &'a str, line: usize },
}

impl Template {
    /// Parse template text
    ///
    /// # Errors
    /// `RenderError::Syntax` for unclosed tags, unbalanced blocks or
    /// malformed expressions
    pub fn parse(src: &str) -> Result<Self, RenderError> {
        let mut root: Vec<Node> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        for token in tokenize(src)? {
            let (body, line) = match token {
                Token::Text(text) => {
                    current(&mut stack, &mut root).push(Node::Text(text.to_string()));
                    continue;
                }
                Token::Tag { body, line } => (body, line),
            };

            if let Some(expr) = body.strip_prefix("#if ") {
                stack.push(open_block(BlockKind::If, expr, line)?);
            } else if let Some(expr) = body.strip_prefix("#unless ") {
                stack.push(open_block(BlockKind::Unless, expr, line)?);
            } else if body == "else" {
                let frame = stack
                    .last_mut()
                    .ok_or_else(|| RenderError::syntax(line, "`else` outside a block"))?;
                if frame.otherwise.is_some() {
                    return Err(RenderError::syntax(line, "duplicate `else`"));
                }
                frame.otherwise = Some(Vec::new());
            } else if let Some(name) = body.strip_prefix('/') {
                let frame = stack.pop().ok_or_else(|| {
                    RenderError::syntax(line, format!("`/{name}` without an open block"))
                })?;
                if frame.kind.name() != name.trim() {
                    return Err(RenderError::syntax(
                        line,
                        format!(
                            "`/{}` closes `#{}` opened at line {}",
                            name.trim(),
                            frame.kind.name(),
                            frame.line
                        ),
                    ));
                }
                let node = Node::Block {
                    negate: frame.kind == BlockKind::Unless,
                    cond: frame.cond,
                    then: frame.then,
                    otherwise: frame.otherwise.unwrap_or_default(),
                };
                current(&mut stack, &mut root).push(node);
            } else {
                let (expr, json) = match body.strip_prefix("json ") {
                    Some(expr) => (expr, true),
                    None => (body, false),
                };
                let path = parse_path(expr, line)?;
                current(&mut stack, &mut root).push(Node::Var { path, json, line });
            }
        }

        if let Some(frame) = stack.last() {
            return Err(RenderError::syntax(
                frame.line,
                format!("`#{}` is never closed", frame.kind.name()),
            ));
        }
        Ok(Self { nodes: root })
    }

    /// Render against `context`
    ///
    /// # Errors
    /// `RenderError::MissingBinding` when an interpolated path is missing or null
    pub fn render(&self, context: &Value) -> Result<String, RenderError> {
        let mut out = String::new();
        render_nodes(&self.nodes, context, &mut out)?;
        Ok(out)
    }
}

fn current<'a>(stack: &'a mut [Frame], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => frame.body(),
        None => root,
    }
}

fn open_block(kind: BlockKind, expr: &str, line: usize) -> Result<Frame, RenderError> {
    Ok(Frame {
        kind,
        cond: parse_condition(expr, line)?,
        line,
        then: Vec::new(),
        otherwise: None,
    })
}

fn is_block_tag(body: &str) -> bool {
    body.starts_with('#') || body.starts_with('/') || body == "else"
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

fn tokenize(src: &str) -> Result<Vec<Token<'_>>, RenderError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(offset) = src[pos..].find(OPEN) {
        let start = pos + offset;
        let line = 1 + src[..start].matches('\n').count();
        let body_start = start + OPEN.len();
        let close = src[body_start..]
            .find(CLOSE)
            .ok_or_else(|| RenderError::syntax(line, "unclosed `{{`"))?;
        let body = src[body_start..body_start + close].trim();

        let mut text_end = start;
        let mut next = body_start + close + CLOSE.len();
        if is_block_tag(body) {
            let line_start = src[..start].rfind('\n').map_or(0, |i| i + 1);
            let line_end = src[next..].find('\n').map_or(src.len(), |i| next + i);
            if line_start >= pos && is_blank(&src[line_start..start]) && is_blank(&src[next..line_end])
            {
                text_end = line_start;
                next = (line_end + 1).min(src.len());
            }
        }

        if text_end > pos {
            tokens.push(Token::Text(&src[pos..text_end]));
        }
        tokens.push(Token::Tag { body, line });
        pos = next;
    }

    if pos < src.len() {
        tokens.push(Token::Text(&src[pos..]));
    }
    Ok(tokens)
}

fn parse_path(expr: &str, line: usize) -> Result<String, RenderError> {
    let path = expr.trim();
    let valid = !path.is_empty()
        && path.split('.').all(|seg| {
            !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(path.to_string())
    } else {
        Err(RenderError::syntax(line, format!("invalid field path {path:?}")))
    }
}

fn parse_condition(expr: &str, line: usize) -> Result<Condition, RenderError> {
    let Some((path, literal)) = expr.split_once("==") else {
        return Ok(Condition {
            path: parse_path(expr, line)?,
            equals: None,
        });
    };

    let literal = literal.trim();
    let literal = literal
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(literal);
    Ok(Condition {
        path: parse_path(path, line)?,
        equals: Some(literal.to_string()),
    })
}

/// Look up a dotted path in `root`
#[must_use]
pub fn get_by_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        _ => None,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl Condition {
    fn eval(&self, context: &Value) -> bool {
        let Some(value) = get_by_path(context, &self.path) else {
            return false;
        };
        match &self.equals {
            Some(literal) => !value.is_null() && stringify(value) == *literal,
            None => truthy(value),
        }
    }
}

fn render_nodes(nodes: &[Node], context: &Value, out: &mut String) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { path, json, line } => match get_by_path(context, path) {
                Some(value) if !value.is_null() && *json => {
                    out.push_str(&serde_json::to_string(value).map_err(RenderError::Context)?);
                }
                Some(value) if !value.is_null() => out.push_str(&stringify(value)),
                _ => {
                    tracing::debug!("unbound `{path}` at template line {line}");
                    return Err(RenderError::MissingBinding(path.clone()));
                }
            },
            Node::Block {
                negate,
                cond,
                then,
                otherwise,
            } => {
                let branch = if cond.eval(context) != *negate { then } else { otherwise };
                render_nodes(branch, context, out)?;
            }
        }
    }
    Ok(())
}
