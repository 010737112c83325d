//! Toxicity score for Python source text.
//!
//! `score = complexity_weight * average_block_complexity + loc_weight * logical_lines`
//!
//! Complexity is cyclomatic complexity averaged over function and method
//! blocks, measured on a tree-sitter parse. Lower is healthier. Text that does
//! not parse is charged a fixed penalty so it can never look healthy.

use evolve_core::ScoringConfig;
use std::io::ErrorKind;
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Complexity and size measurements behind a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub average_complexity: f64,
    pub logical_lines: usize,
    /// Number of function and method blocks that were averaged.
    pub blocks: usize,
    pub parsed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ToxicityScorer {
    cfg: ScoringConfig,
}

impl ToxicityScorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn score(&self, source: &str) -> f64 {
        let m = self.metrics(source);
        self.cfg.complexity_weight * m.average_complexity
            + self.cfg.loc_weight * m.logical_lines as f64
    }

    /// Score the file at `path`; `None` when it does not exist.
    pub fn score_file(&self, path: &Path) -> std::io::Result<Option<f64>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(self.score(&String::from_utf8_lossy(&bytes)))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn metrics(&self, source: &str) -> Metrics {
        if source.trim().is_empty() {
            return Metrics {
                average_complexity: 0.0,
                logical_lines: 0,
                blocks: 0,
                parsed: true,
            };
        }

        let Some(tree) = parse_python(source) else {
            return self.penalty(source);
        };
        let root = tree.root_node();
        if root.has_error() {
            return self.penalty(source);
        }

        let mut blocks = Vec::new();
        collect_blocks(root, Scope::Module, &mut blocks);
        let average_complexity = if blocks.is_empty() {
            self.cfg.default_complexity
        } else {
            blocks.iter().sum::<u32>() as f64 / blocks.len() as f64
        };

        Metrics {
            average_complexity,
            logical_lines: logical_lines(root),
            blocks: blocks.len(),
            parsed: true,
        }
    }

    // Unmeasurable text: fixed complexity, and twice the raw line count.
    fn penalty(&self, source: &str) -> Metrics {
        Metrics {
            average_complexity: self.cfg.parse_failure_complexity,
            logical_lines: source.lines().count() * 2,
            blocks: 0,
            parsed: false,
        }
    }
}

fn parse_python(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Module,
    Class,
}

/// Push the complexity of every top-level function and every method of a
/// top-level class. Closures and inner classes are not blocks of their own.
fn collect_blocks(node: Node<'_>, scope: Scope, out: &mut Vec<u32>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => out.push(block_complexity(child)),
            "class_definition" if scope == Scope::Module => {
                if let Some(body) = child.child_by_field_name("body") {
                    collect_blocks(body, Scope::Class, out);
                }
            }
            "class_definition" => {}
            _ => collect_blocks(child, scope, out),
        }
    }
}

fn block_complexity(function: Node<'_>) -> u32 {
    1 + function
        .child_by_field_name("body")
        .map(decision_points)
        .unwrap_or(0)
}

fn decision_points(node: Node<'_>) -> u32 {
    let own = match node.kind() {
        "if_statement" | "elif_clause" | "conditional_expression" | "boolean_operator" => 1,
        "for_statement" | "while_statement" => 1 + u32::from(has_child(node, "else_clause")),
        "try_statement" => {
            count_children(node, &["except_clause", "except_group_clause"])
                + u32::from(has_child(node, "else_clause"))
        }
        "for_in_clause" | "if_clause" | "case_clause" => 1,
        "with_statement" | "assert_statement" => 1,
        _ => 0,
    };

    let mut cursor = node.walk();
    let nested: u32 = node
        .named_children(&mut cursor)
        .filter(|child| !matches!(child.kind(), "function_definition" | "class_definition"))
        .map(decision_points)
        .sum();
    own + nested
}

/// One per statement: simple statements, compound statement headers, their
/// continuation clauses, and decorators.
fn logical_lines(node: Node<'_>) -> usize {
    let own = usize::from(is_logical_line(node.kind()));
    let mut cursor = node.walk();
    let nested: usize = node.named_children(&mut cursor).map(logical_lines).sum();
    own + nested
}

fn is_logical_line(kind: &str) -> bool {
    matches!(
        kind,
        "expression_statement"
            | "return_statement"
            | "pass_statement"
            | "break_statement"
            | "continue_statement"
            | "raise_statement"
            | "assert_statement"
            | "delete_statement"
            | "global_statement"
            | "nonlocal_statement"
            | "import_statement"
            | "import_from_statement"
            | "future_import_statement"
            | "print_statement"
            | "exec_statement"
            | "type_alias_statement"
            | "if_statement"
            | "elif_clause"
            | "else_clause"
            | "for_statement"
            | "while_statement"
            | "try_statement"
            | "except_clause"
            | "except_group_clause"
            | "finally_clause"
            | "with_statement"
            | "match_statement"
            | "case_clause"
            | "function_definition"
            | "class_definition"
            | "decorator"
    )
}

fn has_child(node: Node<'_>, kind: &str) -> bool {
    count_children(node, &[kind]) > 0
}

fn count_children(node: Node<'_>, kinds: &[&str]) -> u32 {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| kinds.contains(&child.kind()))
        .count() as u32
}
