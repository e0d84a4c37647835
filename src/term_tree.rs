//! # Term Match Tree
//!
//! The parse-time AST: leaves are `Unigram`/`Phrase`/`Fact`, connectives are
//! `And`/`Or`/`Not`. [`Builder`] enforces the tree's construction
//! invariants (flattening, double-negation elimination, phrase arity,
//! reserved fact handles) so that anything returned by [`Builder::complete`]
//! is already normalised.
//!
//! Nodes live in an [`Arena`]; `And`/`Or` children are stored in insertion
//! order (see the arena design note in `SPEC_FULL.md` §9 — this rewrite has
//! no reverse-insertion list to undo when printing).

use crate::arena::{Arena, NodeId};
use crate::error::TreeError;

/// Which connective a [`Builder`] is accumulating children for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectiveKind {
    /// Logical AND of all children.
    And,
    /// Logical OR of all children.
    Or,
}

/// A node in the term match tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TermMatchNode {
    /// Variadic AND, children in insertion order.
    And(Vec<NodeId<TermMatchNode>>),
    /// Variadic OR, children in insertion order.
    Or(Vec<NodeId<TermMatchNode>>),
    /// Logical complement of a single child.
    Not(NodeId<TermMatchNode>),
    /// A single-word term in a given stream.
    Unigram {
        /// The literal term text.
        text: String,
        /// Opaque classification/stream tag.
        stream: u32,
    },
    /// An ordered sequence of grams in a given stream, requiring at least
    /// two grams (single-gram phrases are lowered to `Unigram`).
    Phrase {
        /// The ordered grams making up the phrase.
        grams: Vec<String>,
        /// Opaque classification/stream tag.
        stream: u32,
    },
    /// An opaque fact handle. Handle 0 is reserved for match-all and cannot
    /// be constructed explicitly.
    Fact(u64),
}

/// Builder for `And`/`Or`/`Not` nodes. Leaf nodes (`Unigram`, `Phrase`,
/// `Fact`) are constructed directly via the free functions below since they
/// take no children.
pub struct Builder {
    kind: BuilderKind,
}

enum BuilderKind {
    And(Vec<NodeId<TermMatchNode>>),
    Or(Vec<NodeId<TermMatchNode>>),
    Not(Option<NodeId<TermMatchNode>>),
}

impl Builder {
    /// Start building an `And` or `Or` node.
    pub fn new_connective(kind: ConnectiveKind) -> Self {
        Builder {
            kind: match kind {
                ConnectiveKind::And => BuilderKind::And(Vec::new()),
                ConnectiveKind::Or => BuilderKind::Or(Vec::new()),
            },
        }
    }

    /// Start building a `Not` node.
    pub fn new_not() -> Self {
        Builder {
            kind: BuilderKind::Not(None),
        }
    }

    /// Append a child. For `And`/`Or` this always succeeds; for `Not` a
    /// second call fails with [`TreeError::NotChildAlreadySet`].
    pub fn add_child(&mut self, child: NodeId<TermMatchNode>) -> Result<(), TreeError> {
        match &mut self.kind {
            BuilderKind::And(children) | BuilderKind::Or(children) => {
                children.push(child);
                Ok(())
            }
            BuilderKind::Not(slot) => {
                if slot.is_some() {
                    return Err(TreeError::NotChildAlreadySet);
                }
                *slot = Some(child);
                Ok(())
            }
        }
    }

    /// Finish the node.
    ///
    /// - `And`/`Or` with no children returns `None` (the neutral element for
    ///   the caller's context).
    /// - `And`/`Or` with exactly one child returns that child directly
    ///   (flattening).
    /// - `Not` with no child set also returns `None`.
    /// - `Not(Not(x))` collapses to `x` (double-negation elimination).
    /// - Otherwise a fresh node is allocated in `arena`.
    pub fn complete(
        self,
        arena: &mut Arena<TermMatchNode>,
    ) -> Result<Option<NodeId<TermMatchNode>>, crate::error::Error> {
        match self.kind {
            BuilderKind::And(children) => Ok(connective_complete(arena, children, TermMatchNode::And)?),
            BuilderKind::Or(children) => Ok(connective_complete(arena, children, TermMatchNode::Or)?),
            BuilderKind::Not(None) => Ok(None),
            BuilderKind::Not(Some(child)) => {
                if let TermMatchNode::Not(grandchild) = arena.get(child) {
                    Ok(Some(*grandchild))
                } else {
                    Ok(Some(arena.alloc(TermMatchNode::Not(child))?))
                }
            }
        }
    }
}

fn connective_complete(
    arena: &mut Arena<TermMatchNode>,
    children: Vec<NodeId<TermMatchNode>>,
    make: impl FnOnce(Vec<NodeId<TermMatchNode>>) -> TermMatchNode,
) -> Result<Option<NodeId<TermMatchNode>>, crate::error::Error> {
    match children.len() {
        0 => Ok(None),
        1 => Ok(Some(children[0])),
        _ => Ok(Some(arena.alloc(make(children))?)),
    }
}

/// Construct a `Unigram` leaf.
pub fn unigram(
    arena: &mut Arena<TermMatchNode>,
    text: impl Into<String>,
    stream: u32,
) -> Result<NodeId<TermMatchNode>, crate::error::Error> {
    Ok(arena.alloc(TermMatchNode::Unigram {
        text: text.into(),
        stream,
    })?)
}

/// Construct a `Phrase` leaf. Requires at least two grams; a single-gram
/// phrase must be built via [`unigram`] instead.
pub fn phrase(
    arena: &mut Arena<TermMatchNode>,
    grams: Vec<String>,
    stream: u32,
) -> Result<NodeId<TermMatchNode>, crate::error::Error> {
    if grams.len() < 2 {
        return Err(TreeError::SinglePhraseGram(grams.len()).into());
    }
    Ok(arena.alloc(TermMatchNode::Phrase { grams, stream })?)
}

/// Construct a `Fact` leaf. Handle 0 is reserved for match-all and is
/// rejected.
pub fn fact(
    arena: &mut Arena<TermMatchNode>,
    handle: u64,
) -> Result<NodeId<TermMatchNode>, crate::error::Error> {
    if handle == 0 {
        return Err(TreeError::ReservedFactHandle.into());
    }
    Ok(arena.alloc(TermMatchNode::Fact(handle))?)
}

/// Structural equality between two (possibly different) arenas' trees,
/// rooted at `a`/`b` respectively. Used by the idempotence property tests
/// since [`NodeId`] equality alone only makes sense within one arena.
pub fn term_trees_equal(
    arena_a: &Arena<TermMatchNode>,
    a: NodeId<TermMatchNode>,
    arena_b: &Arena<TermMatchNode>,
    b: NodeId<TermMatchNode>,
) -> bool {
    match (arena_a.get(a), arena_b.get(b)) {
        (TermMatchNode::And(xs), TermMatchNode::And(ys))
        | (TermMatchNode::Or(xs), TermMatchNode::Or(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(&x, &y)| term_trees_equal(arena_a, x, arena_b, y))
        }
        (TermMatchNode::Not(x), TermMatchNode::Not(y)) => term_trees_equal(arena_a, *x, arena_b, *y),
        (
            TermMatchNode::Unigram { text: t1, stream: s1 },
            TermMatchNode::Unigram { text: t2, stream: s2 },
        ) => t1 == t2 && s1 == s2,
        (
            TermMatchNode::Phrase { grams: g1, stream: s1 },
            TermMatchNode::Phrase { grams: g2, stream: s2 },
        ) => g1 == g2 && s1 == s2,
        (TermMatchNode::Fact(h1), TermMatchNode::Fact(h2)) => h1 == h2,
        _ => false,
    }
}

/// Render `id` in the textual format documented in `SPEC_FULL.md` §6.
/// Children print in insertion order.
pub fn format_term_tree(arena: &Arena<TermMatchNode>, id: NodeId<TermMatchNode>) -> String {
    match arena.get(id) {
        TermMatchNode::And(children) => format!(
            "And {{ Children: [{}] }}",
            format_child_list(arena, children)
        ),
        TermMatchNode::Or(children) => format!(
            "Or {{ Children: [{}] }}",
            format_child_list(arena, children)
        ),
        TermMatchNode::Not(child) => {
            format!("Not {{ Child: {} }}", format_term_tree(arena, *child))
        }
        TermMatchNode::Unigram { text, stream } => format!("Unigram(\"{text}\", {stream})"),
        TermMatchNode::Phrase { grams, stream } => {
            let gram_list = grams
                .iter()
                .map(|g| format!("\"{g}\""))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Phrase {{ StreamId: {stream}, Grams: [ {gram_list} ] }}")
        }
        TermMatchNode::Fact(handle) => format!("Fact({handle})"),
    }
}

fn format_child_list(arena: &Arena<TermMatchNode>, children: &[NodeId<TermMatchNode>]) -> String {
    if children.is_empty() {
        return String::new();
    }
    let rendered = children
        .iter()
        .map(|&c| format_term_tree(arena, c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" {rendered} ")
}

pub mod parse {
    //! A small recursive-descent parser for the textual format in
    //! `SPEC_FULL.md` §6, used by the test suite to round-trip formatted
    //! trees back into an arena (see `SPEC_FULL.md` §8 item 1, builder
    //! idempotence).

    use super::{fact, phrase, unigram, Builder, ConnectiveKind, TermMatchNode};
    use crate::arena::{Arena, NodeId};

    /// A malformed textual tree.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("parse error at offset {offset}: {message}")]
    pub struct ParseError {
        offset: usize,
        message: String,
    }

    struct Tokenizer<'a> {
        input: &'a str,
        pos: usize,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Token {
        Ident(String),
        Number(u64),
        Str(String),
        Punct(char),
    }

    impl<'a> Tokenizer<'a> {
        fn new(input: &'a str) -> Self {
            Tokenizer { input, pos: 0 }
        }

        fn bytes(&self) -> &[u8] {
            self.input.as_bytes()
        }

        fn skip_ws(&mut self) {
            while self.pos < self.input.len() && self.bytes()[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
        }

        fn err(&self, message: impl Into<String>) -> ParseError {
            ParseError {
                offset: self.pos,
                message: message.into(),
            }
        }

        fn next(&mut self) -> Result<Token, ParseError> {
            self.skip_ws();
            if self.pos >= self.input.len() {
                return Err(self.err("unexpected end of input"));
            }
            let c = self.bytes()[self.pos] as char;
            if c == '"' {
                let start = self.pos + 1;
                let mut end = start;
                while end < self.input.len() && self.bytes()[end] as char != '"' {
                    end += 1;
                }
                if end >= self.input.len() {
                    return Err(self.err("unterminated string"));
                }
                let s = self.input[start..end].to_string();
                self.pos = end + 1;
                return Ok(Token::Str(s));
            }
            if c.is_ascii_digit() {
                let start = self.pos;
                let mut end = start;
                while end < self.input.len() && (self.bytes()[end] as char).is_ascii_digit() {
                    end += 1;
                }
                let n: u64 = self.input[start..end]
                    .parse()
                    .map_err(|_| self.err("invalid number"))?;
                self.pos = end;
                return Ok(Token::Number(n));
            }
            if c.is_alphabetic() || c == '_' {
                let start = self.pos;
                let mut end = start;
                while end < self.input.len()
                    && ((self.bytes()[end] as char).is_alphanumeric()
                        || self.bytes()[end] as char == '_')
                {
                    end += 1;
                }
                let s = self.input[start..end].to_string();
                self.pos = end;
                return Ok(Token::Ident(s));
            }
            if "{}[](),:".contains(c) {
                self.pos += 1;
                return Ok(Token::Punct(c));
            }
            Err(self.err(format!("unexpected character '{c}'")))
        }

        fn peek(&mut self) -> Result<Token, ParseError> {
            let save = self.pos;
            let tok = self.next();
            self.pos = save;
            tok
        }

        fn expect_punct(&mut self, expected: char) -> Result<(), ParseError> {
            match self.next()? {
                Token::Punct(c) if c == expected => Ok(()),
                other => Err(self.err(format!("expected '{expected}', got {other:?}"))),
            }
        }

        fn expect_ident(&mut self, expected: &str) -> Result<(), ParseError> {
            match self.next()? {
                Token::Ident(s) if s == expected => Ok(()),
                other => Err(self.err(format!("expected '{expected}', got {other:?}"))),
            }
        }
    }

    /// Parse a textual term match tree into `arena`, returning the root id.
    pub fn parse_term_tree(
        input: &str,
        arena: &mut Arena<TermMatchNode>,
    ) -> Result<NodeId<TermMatchNode>, ParseError> {
        let mut tokenizer = Tokenizer::new(input);
        let id = parse_node(&mut tokenizer, arena)?;
        Ok(id)
    }

    fn parse_node(
        tokenizer: &mut Tokenizer<'_>,
        arena: &mut Arena<TermMatchNode>,
    ) -> Result<NodeId<TermMatchNode>, ParseError> {
        let head = match tokenizer.next()? {
            Token::Ident(s) => s,
            other => return Err(tokenizer.err(format!("expected node keyword, got {other:?}"))),
        };

        match head.as_str() {
            "Unigram" => {
                tokenizer.expect_punct('(')?;
                let text = match tokenizer.next()? {
                    Token::Str(s) => s,
                    other => return Err(tokenizer.err(format!("expected string, got {other:?}"))),
                };
                tokenizer.expect_punct(',')?;
                let stream = match tokenizer.next()? {
                    Token::Number(n) => n as u32,
                    other => return Err(tokenizer.err(format!("expected number, got {other:?}"))),
                };
                tokenizer.expect_punct(')')?;
                unigram(arena, text, stream).map_err(|e| tokenizer.err(e.to_string()))
            }
            "Fact" => {
                tokenizer.expect_punct('(')?;
                let handle = match tokenizer.next()? {
                    Token::Number(n) => n,
                    other => return Err(tokenizer.err(format!("expected number, got {other:?}"))),
                };
                tokenizer.expect_punct(')')?;
                fact(arena, handle).map_err(|e| tokenizer.err(e.to_string()))
            }
            "Phrase" => {
                tokenizer.expect_punct('{')?;
                tokenizer.expect_ident("StreamId")?;
                tokenizer.expect_punct(':')?;
                let stream = match tokenizer.next()? {
                    Token::Number(n) => n as u32,
                    other => return Err(tokenizer.err(format!("expected number, got {other:?}"))),
                };
                tokenizer.expect_punct(',')?;
                tokenizer.expect_ident("Grams")?;
                tokenizer.expect_punct(':')?;
                tokenizer.expect_punct('[')?;
                let mut grams = Vec::new();
                loop {
                    if let Token::Punct(']') = tokenizer.peek()? {
                        tokenizer.next()?;
                        break;
                    }
                    match tokenizer.next()? {
                        Token::Str(s) => grams.push(s),
                        other => {
                            return Err(tokenizer.err(format!("expected string, got {other:?}")))
                        }
                    }
                    if let Token::Punct(',') = tokenizer.peek()? {
                        tokenizer.next()?;
                    }
                }
                tokenizer.expect_punct('}')?;
                phrase(arena, grams, stream).map_err(|e| tokenizer.err(e.to_string()))
            }
            "Not" => {
                tokenizer.expect_punct('{')?;
                tokenizer.expect_ident("Child")?;
                tokenizer.expect_punct(':')?;
                let child = parse_node(tokenizer, arena)?;
                tokenizer.expect_punct('}')?;
                let mut builder = Builder::new_not();
                builder.add_child(child).map_err(|e| tokenizer.err(e.to_string()))?;
                builder
                    .complete(arena)
                    .map_err(|e| tokenizer.err(e.to_string()))?
                    .ok_or_else(|| tokenizer.err("Not with no child"))
            }
            "And" | "Or" => {
                let kind = if head == "And" {
                    ConnectiveKind::And
                } else {
                    ConnectiveKind::Or
                };
                tokenizer.expect_punct('{')?;
                tokenizer.expect_ident("Children")?;
                tokenizer.expect_punct(':')?;
                tokenizer.expect_punct('[')?;
                let mut builder = Builder::new_connective(kind);
                loop {
                    if let Token::Punct(']') = tokenizer.peek()? {
                        tokenizer.next()?;
                        break;
                    }
                    let child = parse_node(tokenizer, arena)?;
                    builder
                        .add_child(child)
                        .map_err(|e| tokenizer.err(e.to_string()))?;
                    if let Token::Punct(',') = tokenizer.peek()? {
                        tokenizer.next()?;
                    }
                }
                tokenizer.expect_punct('}')?;
                builder
                    .complete(arena)
                    .map_err(|e| tokenizer.err(e.to_string()))?
                    .ok_or_else(|| tokenizer.err(format!("{head} with no children")))
            }
            other => Err(tokenizer.err(format!("unknown node keyword '{other}'"))),
        }
    }
}
