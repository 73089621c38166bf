/// Script parser — Yarn-style text into a [`DialogueTree`].
///
/// A script is a sequence of node blocks terminated by `===`. Each block
/// has `key: value` headers (at least `title:`), a `---` separator and a
/// body. Body lines are classified by prefix:
///
/// - `-> text [<<if expr>>]` opens a choice
/// - `<<jump node>>` sets the active transition
/// - `<<set $flag = true>>` raises a flag; other set commands stay in the
///   content as inline mutations
/// - `<<if>>` / `<<elseif>>` / `<<else>>` / `<<endif>>` delimit conditional
///   content blocks
/// - anything else is a dialogue line, optionally `Speaker: text`
///
/// The default parser is lenient: lines it does not understand are skipped
/// and blocks without a title or separator are dropped. Strict mode turns
/// the first such line or block into an error.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

use crate::core::commands::{parse_command, parse_literal, FLAG_ID};
use crate::schema::condition::{Condition, Operator};
use crate::schema::node::{BlockKind, Choice, ConditionalBlock, DialogueNode, NodeKind};
use crate::schema::tree::DialogueTree;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line} in node '{node}': unrecognized line '{text}'")]
    UnrecognizedLine {
        node: String,
        line: usize,
        text: String,
    },
    #[error("block starting at line {line} has no {missing}")]
    MalformedBlock { line: usize, missing: &'static str },
    #[error("line {line}: duplicate node title '{node}'")]
    DuplicateNode { node: String, line: usize },
}

/// Parser behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject unrecognized lines and malformed blocks instead of skipping
    /// them.
    pub strict: bool,
}

/// Quoted literals or conjunctions. Quoted literals are matched so that an
/// `and` or `&&` inside a string never splits a term.
static EXPR_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|\s+and\s+|\s*&&\s*"#).expect("expression token regex must compile")
});

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\$({})\s*(==|!=|>=|<=|>|<|\bis\b|\beq\b|\bneq\b|\bgte\b|\blte\b|\bgt\b|\blt\b)\s*(.+)$",
        FLAG_ID
    ))
    .expect("comparison regex must compile")
});

static FLAG_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\$({})$", FLAG_ID)).expect("flag regex must compile"));

/// Parse a script leniently. Never fails; an empty or unusable script
/// yields an empty tree.
pub fn parse(text: &str) -> DialogueTree {
    match parse_with(text, ParseOptions::default()) {
        Ok(tree) => tree,
        // Lenient parsing has no error paths.
        Err(_) => DialogueTree::new("", "", ""),
    }
}

/// Read and parse a script file.
pub fn load_script(path: &Path, options: ParseOptions) -> Result<DialogueTree, ScriptError> {
    let contents = std::fs::read_to_string(path)?;
    parse_with(&contents, options)
}

/// Parse a script with explicit options.
pub fn parse_with(text: &str, options: ParseOptions) -> Result<DialogueTree, ScriptError> {
    let header = FileHeader::scan(text);
    let mut nodes: Vec<DialogueNode> = Vec::new();

    for block in split_blocks(text) {
        let Some(node) = parse_block(&block, options)? else {
            continue;
        };
        if nodes.iter().any(|n| n.id == node.id) {
            if options.strict {
                return Err(ScriptError::DuplicateNode {
                    node: node.id,
                    line: block.first_line,
                });
            }
            debug!("skipping duplicate node '{}' at line {}", node.id, block.first_line);
            continue;
        }
        nodes.push(node);
    }

    let start = header
        .start
        .filter(|s| nodes.iter().any(|n| &n.id == s))
        .or_else(|| nodes.first().map(|n| n.id.clone()))
        .unwrap_or_default();
    let id = header.id.unwrap_or_else(|| start.clone());
    let title = header.title.unwrap_or_else(|| id.clone());

    let mut tree = DialogueTree::new(id, title, start);
    for node in nodes {
        tree.nodes.insert(node.id.clone(), node);
    }
    Ok(tree)
}

/// Tree identity carried in `//` comments before the first node.
#[derive(Debug, Default)]
struct FileHeader {
    id: Option<String>,
    title: Option<String>,
    start: Option<String>,
}

impl FileHeader {
    fn scan(text: &str) -> FileHeader {
        let mut header = FileHeader::default();
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with("title:") || line == "---" || line == "===" {
                break;
            }
            let Some(comment) = line.strip_prefix("//") else {
                continue;
            };
            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "dialogue" => header.id = Some(value),
                "name" => header.title = Some(value),
                "start" => header.start = Some(value),
                _ => {}
            }
        }
        header
    }
}

/// Raw lines of one `===`-terminated block.
struct RawBlock<'a> {
    first_line: usize,
    lines: Vec<(usize, &'a str)>,
}

fn split_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let mut blocks = Vec::new();
    let mut current = RawBlock {
        first_line: 1,
        lines: Vec::new(),
    };
    for (idx, line) in text.lines().enumerate() {
        let number = idx + 1;
        if line.trim() == "===" {
            let next = RawBlock {
                first_line: number + 1,
                lines: Vec::new(),
            };
            blocks.push(std::mem::replace(&mut current, next));
        } else {
            current.lines.push((number, line));
        }
    }
    // A trailing block without `===` still counts if it has content.
    if current.lines.iter().any(|(_, l)| !l.trim().is_empty()) {
        blocks.push(current);
    }
    blocks
}

fn parse_block(block: &RawBlock<'_>, options: ParseOptions) -> Result<Option<DialogueNode>, ScriptError> {
    let mut title = None;
    let mut speaker = None;
    let mut body_start = None;

    for (pos, (_, line)) in block.lines.iter().enumerate() {
        let line = line.trim();
        if line == "---" {
            body_start = Some(pos + 1);
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim() {
                "title" if !value.is_empty() => title = Some(value.to_string()),
                "speaker" if !value.is_empty() => speaker = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let (Some(title), Some(body_start)) = (title, body_start) else {
        let only_comments = block.lines.iter().all(|(_, l)| {
            let l = l.trim();
            l.is_empty() || l.starts_with("//")
        });
        if only_comments {
            return Ok(None);
        }
        if options.strict {
            let missing = if body_start.is_none() { "'---' separator" } else { "title" };
            return Err(ScriptError::MalformedBlock {
                line: block.first_line,
                missing,
            });
        }
        debug!("skipping block at line {}: no title or separator", block.first_line);
        return Ok(None);
    };

    let mut body = BodyParser::new(title, speaker, options);
    for (number, line) in &block.lines[body_start..] {
        body.line(*number, line)?;
    }
    Ok(Some(body.finish()))
}

/// Open conditional block being accumulated.
struct DraftBlock {
    kind: BlockKind,
    condition: Vec<Condition>,
    speaker: Option<String>,
    lines: Vec<String>,
    next: Option<String>,
}

impl DraftBlock {
    fn new(kind: BlockKind, condition: Vec<Condition>) -> Self {
        Self {
            kind,
            condition,
            speaker: None,
            lines: Vec::new(),
            next: None,
        }
    }

    fn finish(self) -> ConditionalBlock {
        ConditionalBlock {
            kind: self.kind,
            condition: self.condition,
            content: self.lines.join("\n"),
            speaker: self.speaker,
            next_node_id: self.next,
        }
    }
}

/// Accumulates body lines into the fields of one node.
struct BodyParser {
    id: String,
    header_speaker: Option<String>,
    options: ParseOptions,
    speaker: Option<String>,
    lines: Vec<String>,
    next: Option<String>,
    set_flags: Vec<String>,
    choices: Vec<Choice>,
    blocks: Vec<ConditionalBlock>,
    open: Option<DraftBlock>,
}

impl BodyParser {
    fn new(id: String, header_speaker: Option<String>, options: ParseOptions) -> Self {
        Self {
            id,
            header_speaker,
            options,
            speaker: None,
            lines: Vec::new(),
            next: None,
            set_flags: Vec::new(),
            choices: Vec::new(),
            blocks: Vec::new(),
            open: None,
        }
    }

    fn line(&mut self, number: usize, raw: &str) -> Result<(), ScriptError> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(());
        }
        let recognized = if let Some(rest) = line.strip_prefix("->") {
            self.choice(rest.trim())
        } else if line.starts_with("<<") {
            self.command(line)
        } else {
            self.text(line)
        };
        if recognized {
            return Ok(());
        }
        if self.options.strict {
            return Err(ScriptError::UnrecognizedLine {
                node: self.id.clone(),
                line: number,
                text: line.to_string(),
            });
        }
        debug!("node '{}' line {}: ignoring '{}'", self.id, number, line);
        Ok(())
    }

    fn choice(&mut self, rest: &str) -> bool {
        let (text, conditions) = match rest.find("<<if") {
            Some(idx) => {
                let Some(expr) = rest[idx..].strip_prefix("<<if").and_then(|s| s.trim_end().strip_suffix(">>")) else {
                    return false;
                };
                let Some(conditions) = parse_expression(expr) else {
                    return false;
                };
                (rest[..idx].trim(), conditions)
            }
            None => (rest, Vec::new()),
        };
        if text.is_empty() {
            return false;
        }
        let mut choice = Choice::new(format!("{}_choice_{}", self.id, self.choices.len() + 1), text);
        if !conditions.is_empty() {
            choice.conditions = Some(conditions);
        }
        self.choices.push(choice);
        true
    }

    fn command(&mut self, line: &str) -> bool {
        let Some(inner) = line.strip_prefix("<<").and_then(|s| s.strip_suffix(">>")) else {
            return false;
        };
        let inner = inner.trim();
        let (keyword, arg) = match inner.split_once(char::is_whitespace) {
            Some((k, a)) => (k, a.trim()),
            None => (inner, ""),
        };

        match keyword {
            "if" => {
                if self.open.is_some() {
                    return false;
                }
                let Some(condition) = parse_expression(arg) else {
                    return false;
                };
                self.open = Some(DraftBlock::new(BlockKind::If, condition));
                true
            }
            "elseif" => {
                let Some(open) = self.open.take() else {
                    return false;
                };
                if open.kind == BlockKind::Else {
                    self.open = Some(open);
                    return false;
                }
                let Some(condition) = parse_expression(arg) else {
                    self.open = Some(open);
                    return false;
                };
                self.blocks.push(open.finish());
                self.open = Some(DraftBlock::new(BlockKind::ElseIf, condition));
                true
            }
            "else" => {
                let Some(open) = self.open.take() else {
                    return false;
                };
                if open.kind == BlockKind::Else || !arg.is_empty() {
                    self.open = Some(open);
                    return false;
                }
                self.blocks.push(open.finish());
                self.open = Some(DraftBlock::new(BlockKind::Else, Vec::new()));
                true
            }
            "endif" => {
                // Also closes a choice's inline condition, which needs no action.
                if let Some(open) = self.open.take() {
                    self.blocks.push(open.finish());
                }
                true
            }
            "jump" => {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    return false;
                }
                let target = Some(arg.to_string());
                if let Some(open) = self.open.as_mut() {
                    open.next = target;
                } else if let Some(choice) = self.choices.last_mut() {
                    choice.next_node_id = target;
                } else {
                    self.next = target;
                }
                true
            }
            "set" => self.set(line),
            _ => false,
        }
    }

    fn set(&mut self, line: &str) -> bool {
        let Some(command) = parse_command(line) else {
            return false;
        };
        if let Some(open) = self.open.as_mut() {
            open.lines.push(line.to_string());
        } else if let Some(choice) = self.choices.last_mut() {
            if !command.is_boolean_raise() {
                return false;
            }
            choice.set_flags.get_or_insert_with(Vec::new).push(command.flag);
        } else if command.is_boolean_raise() {
            self.set_flags.push(command.flag);
        } else {
            self.lines.push(line.to_string());
        }
        true
    }

    fn text(&mut self, line: &str) -> bool {
        let (speaker, text) = split_speaker(line);
        let (text, raw) = (unescape_text(text), unescape_text(line));
        if let Some(open) = self.open.as_mut() {
            push_line(&mut open.speaker, &mut open.lines, speaker, text, raw);
            return true;
        }
        if !self.choices.is_empty() {
            return false;
        }
        push_line(&mut self.speaker, &mut self.lines, speaker, text, raw);
        true
    }

    fn finish(mut self) -> DialogueNode {
        if let Some(open) = self.open.take() {
            self.blocks.push(open.finish());
        }

        let speaker = self.header_speaker.or(self.speaker);
        let kind = if !self.choices.is_empty() {
            NodeKind::Player {
                choices: self.choices,
            }
        } else if !self.blocks.is_empty()
            && self.lines.is_empty()
            && self.set_flags.is_empty()
            && self.next.is_none()
        {
            NodeKind::Conditional {
                conditional_blocks: self.blocks,
            }
        } else {
            NodeKind::Npc {
                content: self.lines.join("\n"),
                next_node_id: self.next,
                set_flags: (!self.set_flags.is_empty()).then_some(self.set_flags),
                conditional_blocks: (!self.blocks.is_empty()).then_some(self.blocks),
            }
        };

        DialogueNode {
            id: self.id,
            speaker,
            kind,
        }
    }
}

/// Record a dialogue line. The first speaker seen becomes the owner's
/// speaker; lines by that speaker lose their prefix, lines by anyone else
/// keep it.
fn push_line(owner: &mut Option<String>, lines: &mut Vec<String>, speaker: Option<&str>, text: String, raw: String) {
    match speaker {
        Some(name) if owner.is_none() => {
            *owner = Some(name.to_string());
            lines.push(text);
        }
        Some(name) if owner.as_deref() == Some(name) => lines.push(text),
        _ => lines.push(raw),
    }
}

/// Split `Speaker: text` into its parts.
///
/// An escaped colon (`Remember\: the gate`) never introduces a speaker.
pub fn split_speaker(line: &str) -> (Option<&str>, &str) {
    let Some((name, text)) = line.split_once(": ") else {
        return (None, line);
    };
    let name = name.trim();
    let plausible = !name.is_empty()
        && name.chars().count() <= 40
        && !name.contains(&['<', '>', '$', '"', ':'][..])
        && !name.starts_with('-')
        && !name.ends_with('\\');
    if plausible {
        (Some(name), text.trim())
    } else {
        (None, line)
    }
}

/// Undo the escapes of a dialogue line: `\:` is a literal colon and
/// `\\` a literal backslash. Other backslashes are kept as written.
pub fn unescape_text(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('\\' | ':')) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a condition expression: terms joined by `and` / `&&`.
///
/// Terms are `$flag`, `not $flag`, `!$flag` or `$flag <op> <literal>`.
/// Returns `None` if any term is malformed. An empty expression is an
/// empty (always true) condition list.
pub fn parse_expression(expr: &str) -> Option<Vec<Condition>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Some(Vec::new());
    }
    split_terms(expr).into_iter().map(parse_term).collect()
}

fn split_terms(expr: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut start = 0;
    for token in EXPR_TOKEN.find_iter(expr) {
        if token.as_str().starts_with('"') {
            continue;
        }
        terms.push(&expr[start..token.start()]);
        start = token.end();
    }
    terms.push(&expr[start..]);
    terms
}

fn parse_term(term: &str) -> Option<Condition> {
    let term = term.trim();
    let negated = term
        .strip_prefix("not ")
        .or_else(|| term.strip_prefix('!'))
        .map(str::trim);
    if let Some(rest) = negated {
        let caps = FLAG_REF.captures(rest)?;
        return Some(Condition::is_not_set(&caps[1]));
    }
    if let Some(caps) = FLAG_REF.captures(term) {
        return Some(Condition::is_set(&caps[1]));
    }
    let caps = COMPARISON.captures(term)?;
    let operator = Operator::from_symbol(&caps[2])?;
    let value = parse_literal(&caps[3])?;
    Some(Condition {
        flag: caps[1].to_string(),
        operator,
        value: Some(value),
    })
}
