//! A lexeme-preserving S-expression parser for KiCad file formats.
//!
//! KiCad stores everything (`.kicad_pcb`, `.kicad_sch`, `.kicad_mod`,
//! `.kicad_pro`, library tables) as Lisp-style S-expressions. This crate
//! parses those files into a [`Node`] tree that remembers the exact source
//! lexeme of every atom, so numbers like `1.000000` survive a load/save
//! cycle byte-for-byte.
//!
//! ```
//! use viaduct_sexpr::parse;
//!
//! let board = parse(r#"(kicad_pcb (version 20241229) (generator "pcbnew"))"#).unwrap();
//! assert_eq!(board.name(), Some("kicad_pcb"));
//! assert_eq!(board.find("version").and_then(|n| n.first_value()), Some("20241229"));
//! ```

pub mod document;

pub use document::{Document, DocumentError};

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// An atom: a leaf value plus the literal source text that produced it.
///
/// `lexeme` is `None` for atoms constructed in memory; the serializer then
/// quotes the value on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub value: String,
    pub lexeme: Option<String>,
}

/// A list: a head name and insertion-ordered children.
///
/// The head name is the decoded value of the list's first expression when
/// that expression is an atom (the atom itself is not kept as a child). An
/// empty list has name `""`.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub name: String,
    pub children: Vec<Node>,
}

/// A node in an S-expression tree. Every node is exactly one of the two
/// variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Atom(Atom),
    List(List),
}

impl Node {
    /// Create an atom with no recorded lexeme; the serializer quotes the
    /// value only if it needs quoting.
    pub fn atom(value: impl Into<String>) -> Self {
        Node::Atom(Atom {
            value: value.into(),
            lexeme: None,
        })
    }

    /// Create an atom whose lexeme is the value itself, emitted verbatim.
    /// Used for numbers so `5.5` is written exactly as `5.5`.
    pub fn raw_atom(value: impl Into<String>) -> Self {
        let value = value.into();
        Node::Atom(Atom {
            lexeme: Some(value.clone()),
            value,
        })
    }

    /// Create an atom that always serializes as a quoted string.
    pub fn quoted(value: impl Into<String>) -> Self {
        let value = value.into();
        Node::Atom(Atom {
            lexeme: Some(quote_string(&value)),
            value,
        })
    }

    /// Create a list node with the given head name and children.
    pub fn list(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::List(List {
            name: name.into(),
            children,
        })
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Node::Atom(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Node::List(_))
    }

    /// The head name, if this is a list.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::List(l) => Some(&l.name),
            Node::Atom(_) => None,
        }
    }

    /// The decoded value, if this is an atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Node::Atom(a) => Some(&a.value),
            Node::List(_) => None,
        }
    }

    /// Children of a list; atoms have none.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::List(l) => &l.children,
            Node::Atom(_) => &[],
        }
    }

    /// Mutable access to a list's children.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::List(l) => Some(&mut l.children),
            Node::Atom(_) => None,
        }
    }

    /// First direct child list with the given head name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.children().iter().find(|c| c.name() == Some(name))
    }

    /// Mutable variant of [`Node::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Node> {
        match self {
            Node::List(l) => l.children.iter_mut().find(|c| c.name() == Some(name)),
            Node::Atom(_) => None,
        }
    }

    /// Index of the first direct child list with the given head name.
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.children().iter().position(|c| c.name() == Some(name))
    }

    /// All direct children with the given head name.
    pub fn find_all(&self, name: &str) -> Vec<&Node> {
        self.children()
            .iter()
            .filter(|c| c.name() == Some(name))
            .collect()
    }

    /// All descendants (depth-first) with the given head name.
    pub fn find_recursive(&self, name: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        fn walk<'a>(node: &'a Node, name: &str, out: &mut Vec<&'a Node>) {
            for child in node.children() {
                if child.name() == Some(name) {
                    out.push(child);
                }
                walk(child, name, out);
            }
        }
        walk(self, name, &mut out);
        out
    }

    /// Value of the first atom child, e.g. `"20241229"` for
    /// `(version 20241229)`.
    pub fn first_value(&self) -> Option<&str> {
        self.children().iter().find_map(Node::as_atom)
    }

    /// Values of all atom children, in order.
    pub fn atom_values(&self) -> Vec<&str> {
        self.children().iter().filter_map(Node::as_atom).collect()
    }

    /// Serialize back to S-expression text.
    ///
    /// Atoms emit their preserved lexeme. A list with only atom children
    /// stays on one line; a list with any nested list goes multi-line, atom
    /// children inline after the head name and each nested list on its own
    /// line indented two spaces deeper.
    pub fn serialize(&self, indent: usize) -> String {
        match self {
            Node::Atom(a) => match &a.lexeme {
                Some(lexeme) => lexeme.clone(),
                None => quote_if_needed(&a.value),
            },
            Node::List(l) => {
                let has_nested = l.children.iter().any(Node::is_list);
                if !has_nested {
                    let mut parts = vec![l.name.clone()];
                    parts.extend(l.children.iter().map(|c| c.serialize(indent)));
                    return format!("({})", parts.join(" "));
                }

                let prefix = "  ".repeat(indent);
                let child_prefix = "  ".repeat(indent + 1);
                let mut lines = vec![format!("{prefix}({}", l.name)];
                for child in &l.children {
                    let rendered = child.serialize(indent + 1);
                    if child.is_atom() {
                        let head = &mut lines[0];
                        head.push(' ');
                        head.push_str(&rendered);
                    } else {
                        lines.push(format!("{child_prefix}{rendered}"));
                    }
                }
                if let Some(last) = lines.last_mut() {
                    last.push(')');
                }
                let joined = lines.join("\n");
                if indent == 0 {
                    joined
                } else {
                    joined[prefix.len()..].to_string()
                }
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize(0))
    }
}

/// Quote a value only when it contains characters that would break atom
/// tokenization, or when it is empty.
pub fn quote_if_needed(value: &str) -> String {
    if value.is_empty() {
        return "\"\"".to_string();
    }
    let needs_quoting = value
        .chars()
        .any(|ch| matches!(ch, ' ' | '\t' | '\n' | '\r' | '"' | '(' | ')' | '\\'));
    if needs_quoting {
        quote_string(value)
    } else {
        value.to_string()
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Errors raised while parsing, each carrying the byte offset of the
/// offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("unexpected ')' at byte {0}")]
    UnexpectedClose(usize),
    #[error("unterminated string starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unclosed list starting at byte {0}")]
    UnclosedList(usize),
}

/// Parser over a character stream with byte-position tracking.
pub struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            input,
            chars: input.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Parse a single expression from the input.
    pub fn parse(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        if self.at_end() {
            return Err(ParseError::UnexpectedEof(self.pos));
        }
        self.parse_expr()
    }

    /// Parse every top-level expression in the input.
    pub fn parse_all(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        match self.peek_char() {
            None => Err(ParseError::UnexpectedEof(self.pos)),
            Some('(') => self.parse_list(),
            Some(')') => Err(ParseError::UnexpectedClose(self.pos)),
            Some('"') => self.parse_string(),
            Some(_) => Ok(self.parse_atom()),
        }
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.advance(); // consume '('
        self.skip_whitespace();

        if self.peek_char() == Some(')') {
            self.advance();
            return Ok(Node::list("", Vec::new()));
        }
        if self.at_end() {
            return Err(ParseError::UnclosedList(start));
        }

        // The first expression names the list. A leading atom is consumed
        // into the head name; a leading list lends its name and is kept as
        // the first child.
        let first = self.parse_expr()?;
        let (name, mut children) = match first {
            Node::Atom(a) => (a.value, Vec::new()),
            Node::List(l) => (l.name.clone(), vec![Node::List(l)]),
        };

        let mut parsed = 0usize;
        loop {
            self.skip_whitespace();
            if self.at_end() {
                return Err(ParseError::UnclosedList(start));
            }
            if self.peek_char() == Some(')') {
                self.advance();
                break;
            }
            children.push(self.parse_expr()?);
            parsed += 1;
            if parsed % 1000 == 0 {
                log::trace!("parsed {parsed} children in list at byte {start}");
            }
        }

        Ok(Node::List(List { name, children }))
    }

    fn parse_atom(&mut self) -> Node {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if matches!(ch, ' ' | '\t' | '\n' | '\r' | '(' | ')' | '"') {
                break;
            }
            self.advance();
        }
        let raw = &self.input[start..self.pos];
        Node::Atom(Atom {
            value: raw.to_string(),
            lexeme: Some(raw.to_string()),
        })
    }

    fn parse_string(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.advance(); // consume opening quote
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => return Err(ParseError::UnterminatedString(start)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        // A backslash makes the next character literal.
                        Some(ch) => {
                            value.push(ch);
                            self.advance();
                        }
                        None => return Err(ParseError::UnterminatedString(start)),
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
        let lexeme = self.input[start..self.pos].to_string();
        Ok(Node::Atom(Atom {
            value,
            lexeme: Some(lexeme),
        }))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn advance(&mut self) {
        if let Some((idx, ch)) = self.chars.next() {
            self.pos = idx + ch.len_utf8();
        }
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }
}

/// Parse a string into a single S-expression tree.
pub fn parse(input: &str) -> Result<Node, ParseError> {
    log::trace!("parsing S-expression from {} bytes of input", input.len());
    Parser::new(input).parse()
}

/// Parse a string that may contain multiple top-level S-expressions.
pub fn parse_all(input: &str) -> Result<Vec<Node>, ParseError> {
    Parser::new(input).parse_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unquoted_atom() {
        let node = parse("hello").unwrap();
        assert_eq!(node.as_atom(), Some("hello"));
        let node = parse("-1.6e3").unwrap();
        assert_eq!(node.as_atom(), Some("-1.6e3"));
    }

    #[test]
    fn parse_quoted_string_with_escapes() {
        assert_eq!(
            parse(r#""hello world""#).unwrap().as_atom(),
            Some("hello world")
        );
        assert_eq!(
            parse(r#""with\"quotes\"""#).unwrap().as_atom(),
            Some(r#"with"quotes""#)
        );
        // A backslash escapes the next character literally; there are no
        // C-style translations.
        assert_eq!(parse(r#""a\nb""#).unwrap().as_atom(), Some("anb"));
        assert_eq!(parse(r#""back\\slash""#).unwrap().as_atom(), Some("back\\slash"));
    }

    #[test]
    fn parse_list_extracts_head_name() {
        let node = parse("(version 20241229)").unwrap();
        assert_eq!(node.name(), Some("version"));
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.first_value(), Some("20241229"));
    }

    #[test]
    fn parse_empty_list() {
        let node = parse("()").unwrap();
        assert_eq!(node.name(), Some(""));
        assert!(node.children().is_empty());
    }

    #[test]
    fn parse_list_headed_by_list_keeps_inner_as_child() {
        let node = parse("((at 1 2) extra)").unwrap();
        assert_eq!(node.name(), Some("at"));
        assert_eq!(node.children().len(), 2);
        assert!(node.children()[0].is_list());
        assert_eq!(node.children()[1].as_atom(), Some("extra"));
    }

    #[test]
    fn queries() {
        let board = parse(
            r#"(kicad_pcb (version 20241229) (net 1 "VCC") (net 2 "GND")
               (footprint "R" (pad "1" (net 1 "VCC"))))"#,
        )
        .unwrap();
        assert_eq!(
            board.find("version").and_then(|n| n.first_value()),
            Some("20241229")
        );
        assert_eq!(board.find_all("net").len(), 2);
        // find_recursive also sees the pad's net child.
        assert_eq!(board.find_recursive("net").len(), 3);
        let net = board.find("net").unwrap();
        assert_eq!(net.atom_values(), vec!["1", "VCC"]);
    }

    #[test]
    fn lexeme_preserved_for_numbers() {
        let node = parse("(thickness 1.600000)").unwrap();
        assert_eq!(node.serialize(0), "(thickness 1.600000)");
        let node = parse("(at 014 5.50)").unwrap();
        assert_eq!(node.serialize(0), "(at 014 5.50)");
    }

    #[test]
    fn serialize_flat_list_single_line() {
        let node = parse("(at   1.0    2.5   90)").unwrap();
        assert_eq!(node.serialize(0), "(at 1.0 2.5 90)");
    }

    #[test]
    fn serialize_nested_list_multi_line() {
        let node =
            parse(r#"(footprint "R" (at 1.0 2.5 90) (pad "1" smd rect (size 0.6 0.3)))"#).unwrap();
        assert_eq!(
            node.serialize(0),
            "(footprint \"R\"\n  (at 1.0 2.5 90)\n  (pad \"1\" smd rect\n    (size 0.6 0.3)))"
        );
    }

    #[test]
    fn serializer_output_round_trips_exactly() {
        let inputs = [
            "(simple list)",
            "(nested (list with) (multiple levels))",
            r#"(with "quoted string" and atoms)"#,
            r#"(pin passive line (at 0 0 0) (length 2.54) (name "1") (number "1"))"#,
            r#"(kicad_pcb (version 20241229) (general (thickness 1.6)) (net 0 ""))"#,
        ];
        for input in inputs {
            let once = parse(input).unwrap().serialize(0);
            let twice = parse(&once).unwrap().serialize(0);
            assert_eq!(once, twice, "round trip failed for: {input}");
        }
    }

    #[test]
    fn reparse_preserves_logical_tree() {
        let input = r#"(footprint "R" (at 1 2) (pad "1" smd (size 1 1)))"#;
        let first = parse(input).unwrap();
        let second = parse(&first.serialize(0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn quote_only_when_needed() {
        assert_eq!(Node::atom("F.Cu").serialize(0), "F.Cu");
        assert_eq!(Node::atom("").serialize(0), "\"\"");
        assert_eq!(Node::atom("has space").serialize(0), "\"has space\"");
        assert_eq!(Node::atom("a\"b").serialize(0), "\"a\\\"b\"");
        assert_eq!(Node::quoted("GND").serialize(0), "\"GND\"");
        assert_eq!(Node::raw_atom("5.50").serialize(0), "5.50");
    }

    #[test]
    fn parse_errors_carry_position() {
        assert_eq!(parse(""), Err(ParseError::UnexpectedEof(0)));
        assert_eq!(parse("   "), Err(ParseError::UnexpectedEof(3)));
        assert_eq!(parse(")"), Err(ParseError::UnexpectedClose(0)));
        assert_eq!(parse("(a b"), Err(ParseError::UnclosedList(0)));
        assert_eq!(parse(r#"(a "unterminated)"#), Err(ParseError::UnterminatedString(3)));
    }

    #[test]
    fn parse_all_top_level() {
        let nodes = parse_all("(a 1)\n(b 2)\n").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name(), Some("a"));
        assert_eq!(nodes[1].name(), Some("b"));
    }

    #[test]
    fn utf8_content() {
        let node = parse(r#"(property "Désignation" "日本語")"#).unwrap();
        assert_eq!(node.atom_values(), vec!["Désignation", "日本語"]);
        assert_eq!(node.serialize(0), r#"(property "Désignation" "日本語")"#);
    }

    #[test]
    fn find_mut_allows_in_place_edit() {
        let mut node = parse(r#"(footprint "C" (at 14 5.5))"#).unwrap();
        let at = node.find_mut("at").unwrap();
        let children = at.children_mut().unwrap();
        children[0] = Node::raw_atom("20");
        children[1] = Node::raw_atom("10");
        assert_eq!(node.serialize(0), r#"(footprint "C" (at 20 10))"#);
    }
}
