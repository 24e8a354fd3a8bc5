//! Tokenizer for variable references embedded in symbol field values.
//!
//! Field text is plain text interleaved with `!(namespace.name)` tokens.
//! A token may carry a scope (`!(bind.fileVersion.MainExe)`) and a default
//! value (`!(wix.Flavor=retail)`). `!!(` is an escape for a literal `!(`.

use logos::Logos;
use std::fmt;

/// Span in field text (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Variable namespaces understood by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Localized strings from `.wxl`-style localization data
    Loc,
    /// Variables supplied on the command line or declared in the program
    Wix,
    /// Values only known while binding; always deferred
    Bind,
    /// Named search roots
    BindPath,
}

impl Namespace {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "loc" => Some(Namespace::Loc),
            "wix" => Some(Namespace::Wix),
            "bind" => Some(Namespace::Bind),
            "bindpath" => Some(Namespace::BindPath),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Loc => write!(f, "loc"),
            Namespace::Wix => write!(f, "wix"),
            Namespace::Bind => write!(f, "bind"),
            Namespace::BindPath => write!(f, "bindpath"),
        }
    }
}

/// A parsed `!(namespace.name.scope=default)` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub namespace: Namespace,
    /// First segment after the namespace
    pub name: String,
    /// Remaining dotted segments, if any
    pub scope: Option<String>,
    /// Text after `=`, if any
    pub default: Option<String>,
}

impl VariableRef {
    /// `name.scope`, the key used for lookups
    pub fn full_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}.{}", self.name, scope),
            None => self.name.clone(),
        }
    }

    /// Parse the raw token text, including the `!(` and `)` delimiters
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix("!(")?.strip_suffix(')')?;
        let (head, default) = match body.split_once('=') {
            Some((head, default)) => (head, Some(default.to_string())),
            None => (body, None),
        };
        let (ns, rest) = match head.split_once('.') {
            Some((ns, rest)) => (ns, rest),
            None => (head, ""),
        };
        let namespace = Namespace::parse(ns)?;
        let (name, scope) = match namespace {
            // bind path names are taken whole
            Namespace::BindPath => (rest.to_string(), None),
            _ => match rest.split_once('.') {
                Some((name, scope)) => (name.to_string(), Some(scope.to_string())),
                None => (rest.to_string(), None),
            },
        };
        Some(VariableRef { namespace, name, scope, default })
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!({}.{}", self.namespace, self.full_name())?;
        if let Some(default) = &self.default {
            write!(f, "={}", default)?;
        }
        write!(f, ")")
    }
}

fn variable(lex: &mut logos::Lexer<Token>) -> Option<VariableRef> {
    VariableRef::parse(lex.slice())
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[token("!!(")]
    EscapedOpen,
    #[regex(r"!\((loc|wix|bind|bindpath)(\.[A-Za-z0-9_.]*)?(=[^)]*)?\)", variable)]
    Variable(VariableRef),
    #[token("!")]
    Bang,
    #[regex(r"[^!]+")]
    Text,
    Eof,
}

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer wrapper that produces SpannedTokens
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Token>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: Token::lexer(source),
            finished: false,
        }
    }

    /// Tokenize the entire text into a Vec, ending with `Eof`
    pub fn tokenize(source: &str) -> Vec<SpannedToken> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let spanned = lexer.next_token();
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }

        tokens
    }

    pub fn next_token(&mut self) -> SpannedToken {
        if self.finished {
            return SpannedToken {
                token: Token::Eof,
                span: Span::new(0, 0),
            };
        }

        match self.inner.next() {
            Some(Ok(token)) => {
                let span = self.inner.span();
                SpannedToken {
                    token,
                    span: Span::new(span.start, span.end),
                }
            }
            // Anything the grammar rejects is plain text
            Some(Err(())) => {
                let span = self.inner.span();
                SpannedToken {
                    token: Token::Text,
                    span: Span::new(span.start, span.end),
                }
            }
            None => {
                self.finished = true;
                let len = self.inner.source().len();
                SpannedToken {
                    token: Token::Eof,
                    span: Span::new(len, len),
                }
            }
        }
    }
}

/// A piece of field text: either literal text or a variable reference
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Variable { var: VariableRef, raw: String },
}

/// Split text into literal runs and variable references.
///
/// Adjacent literal tokens are merged and `!!(` is unescaped to `!(`.
pub fn segments(text: &str) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    let mut literal = String::new();

    for spanned in Lexer::tokenize(text) {
        let slice = &text[spanned.span.start..spanned.span.end];
        match spanned.token {
            Token::EscapedOpen => literal.push_str("!("),
            Token::Bang | Token::Text => literal.push_str(slice),
            Token::Variable(var) => {
                // `!(wix)` and friends have no name to look up
                if var.name.is_empty() && var.namespace != Namespace::BindPath {
                    literal.push_str(slice);
                    continue;
                }
                if !literal.is_empty() {
                    out.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                out.push(Segment::Variable { var, raw: slice.to_string() });
            }
            Token::Eof => break,
        }
    }

    if !literal.is_empty() {
        out.push(Segment::Literal(literal));
    }
    out
}

/// Whether the text contains anything the resolver would touch
pub fn has_variables(text: &str) -> bool {
    text.contains("!(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let tokens = Lexer::tokenize("v!(wix.ProductVersion)!x");

        assert!(matches!(tokens[0].token, Token::Text));
        assert!(matches!(tokens[1].token, Token::Variable(ref v) if v.name == "ProductVersion"));
        assert!(matches!(tokens[2].token, Token::Bang));
        assert!(matches!(tokens[3].token, Token::Text));
        assert!(matches!(tokens[4].token, Token::Eof));
    }

    #[test]
    fn test_scope_and_default() {
        let var = VariableRef::parse("!(bind.fileVersion.MainExe)").unwrap();
        assert_eq!(var.namespace, Namespace::Bind);
        assert_eq!(var.name, "fileVersion");
        assert_eq!(var.scope.as_deref(), Some("MainExe"));
        assert_eq!(var.full_name(), "fileVersion.MainExe");

        let var = VariableRef::parse("!(wix.Flavor=retail build)").unwrap();
        assert_eq!(var.default.as_deref(), Some("retail build"));
        assert_eq!(var.to_string(), "!(wix.Flavor=retail build)");
    }

    #[test]
    fn test_escape_is_literal() {
        let segs = segments("a !!(wix.X) b");
        assert_eq!(segs, vec![Segment::Literal("a !(wix.X) b".to_string())]);
    }

    #[test]
    fn test_unknown_namespace_is_literal() {
        let segs = segments("!(var.Foo) and !(loc)");
        assert_eq!(segs, vec![Segment::Literal("!(var.Foo) and !(loc)".to_string())]);
    }

    #[test]
    fn test_bindpath_keeps_dotted_name() {
        let segs = segments("!(bindpath.out.x64)\\bin");
        match &segs[0] {
            Segment::Variable { var, .. } => assert_eq!(var.name, "out.x64"),
            other => panic!("expected variable, got {:?}", other),
        }
        assert_eq!(segs[1], Segment::Literal("\\bin".to_string()));
    }
}
