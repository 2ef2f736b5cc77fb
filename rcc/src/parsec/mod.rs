//! Minimal parser combinator kernel
//!
//! A `Parser<R, T>` consumes a `ParseContext<T>` (immutable token slice plus
//! a mutable position) and either succeeds with an `R` or fails with a
//! `ParseError`, restoring the position it started at. Alternatives are
//! expressed with `or_else`; the error that travelled furthest wins, and
//! expected labels are unioned when two alternatives fail at the same
//! position.

mod pratt;

pub use pratt::PrattBuilder;

use std::cell::RefCell;
use std::rc::Rc;

/// Parsing state over a borrowed token slice. The furthest failure seen
/// anywhere during the parse is kept so the top-level error points at the
/// most advanced position even when alternatives backtracked past it.
pub struct ParseContext<'a, T> {
    pub tokens: &'a [T],
    pub position: usize,
    furthest: Option<ParseError>,
}

impl<'a, T> ParseContext<'a, T> {
    pub fn new(tokens: &'a [T]) -> Self {
        Self {
            tokens,
            position: 0,
            furthest: None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&'a T> {
        self.tokens.get(self.position)
    }

    fn record_failure(&mut self, err: &ParseError) {
        self.furthest = Some(match self.furthest.take() {
            Some(existing) => existing.merge(err.clone()),
            None => err.clone(),
        });
    }
}

/// Failure description: the furthest position reached, what was expected
/// there, and the grammar context stack active at the failure site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub expected: Vec<String>,
    pub context: Vec<&'static str>,
}

impl ParseError {
    pub fn expecting(position: usize, label: impl Into<String>) -> Self {
        Self {
            position,
            expected: vec![label.into()],
            context: Vec::new(),
        }
    }

    /// Combine two failures: the one that reached further wins; at equal
    /// positions the expected sets are unioned.
    pub fn merge(mut self, other: ParseError) -> ParseError {
        use std::cmp::Ordering;
        match self.position.cmp(&other.position) {
            Ordering::Greater => self,
            Ordering::Less => other,
            Ordering::Equal => {
                for label in other.expected {
                    if !self.expected.contains(&label) {
                        self.expected.push(label);
                    }
                }
                if self.context.is_empty() {
                    self.context = other.context;
                }
                self
            }
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}", self.expected.join(" or "))?;
        if !self.context.is_empty() {
            write!(f, " while parsing {}", self.context.join(" in "))?;
        }
        Ok(())
    }
}

type ParseFn<R, T> = dyn Fn(&mut ParseContext<'_, T>) -> Result<R, ParseError>;

/// A composable parser producing `R` from a stream of `T`
pub struct Parser<R, T> {
    f: Rc<ParseFn<R, T>>,
}

impl<R, T> Clone for Parser<R, T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<R: 'static, T: 'static> Parser<R, T> {
    pub fn new(f: impl Fn(&mut ParseContext<'_, T>) -> Result<R, ParseError> + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Run this parser. On failure the position is restored to where the
    /// parser began.
    pub fn parse(&self, ctx: &mut ParseContext<'_, T>) -> Result<R, ParseError> {
        let start = ctx.position;
        match (self.f)(ctx) {
            Ok(value) => Ok(value),
            Err(err) => {
                ctx.position = start;
                Err(err)
            }
        }
    }

    /// Transform the parsed value
    pub fn map<U: 'static>(&self, f: impl Fn(R) -> U + 'static) -> Parser<U, T> {
        let inner = self.clone();
        Parser::new(move |ctx| inner.parse(ctx).map(&f))
    }

    /// Try this parser; if it fails, try `other`
    pub fn or_else(&self, other: &Parser<R, T>) -> Parser<R, T> {
        let first = self.clone();
        let second = other.clone();
        Parser::new(move |ctx| match first.parse(ctx) {
            Ok(value) => Ok(value),
            Err(e1) => match second.parse(ctx) {
                Ok(value) => Ok(value),
                Err(e2) => Err(e1.merge(e2)),
            },
        })
    }

    /// Run this parser, then `other`, pairing the results
    pub fn and_then<U: 'static>(&self, other: &Parser<U, T>) -> Parser<(R, U), T> {
        let first = self.clone();
        let second = other.clone();
        Parser::new(move |ctx| {
            let left = first.parse(ctx)?;
            let right = second.parse(ctx)?;
            Ok((left, right))
        })
    }

    /// Sequence with `other`, keeping this parser's result
    pub fn keep_left<U: 'static>(&self, other: &Parser<U, T>) -> Parser<R, T> {
        self.and_then(other).map(|(left, _)| left)
    }

    /// Sequence with `other`, keeping the other parser's result
    pub fn keep_right<U: 'static>(&self, other: &Parser<U, T>) -> Parser<U, T> {
        let first = self.clone();
        let second = other.clone();
        Parser::new(move |ctx| {
            first.parse(ctx)?;
            second.parse(ctx)
        })
    }

    /// Zero or more repetitions; never fails. Stops if a repetition
    /// succeeds without consuming input.
    pub fn many(&self) -> Parser<Vec<R>, T> {
        let inner = self.clone();
        Parser::new(move |ctx| {
            let mut results = Vec::new();
            loop {
                let before = ctx.position;
                match inner.parse(ctx) {
                    Ok(value) => {
                        results.push(value);
                        if ctx.position == before {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            Ok(results)
        })
    }

    /// One or more repetitions
    pub fn many1(&self) -> Parser<Vec<R>, T> {
        let inner = self.clone();
        let rest = self.many();
        Parser::new(move |ctx| {
            let first = inner.parse(ctx)?;
            let mut results = rest.parse(ctx)?;
            results.insert(0, first);
            Ok(results)
        })
    }

    /// Convert failure into `None`; always succeeds
    pub fn optional(&self) -> Parser<Option<R>, T> {
        let inner = self.clone();
        Parser::new(move |ctx| Ok(inner.parse(ctx).ok()))
    }

    /// One or more occurrences separated by `sep`
    pub fn sep_by1<S: 'static>(&self, sep: &Parser<S, T>) -> Parser<Vec<R>, T> {
        let head = self.clone();
        let tail = sep.keep_right(self).many();
        Parser::new(move |ctx| {
            let first = head.parse(ctx)?;
            let mut rest = tail.parse(ctx)?;
            rest.insert(0, first);
            Ok(rest)
        })
    }

    /// Zero or more occurrences separated by `sep`
    pub fn sep_by<S: 'static>(&self, sep: &Parser<S, T>) -> Parser<Vec<R>, T> {
        let list = self.sep_by1(sep);
        Parser::new(move |ctx| match list.parse(ctx) {
            Ok(items) => Ok(items),
            Err(_) => Ok(Vec::new()),
        })
    }

    /// Like `sep_by`, but permits a trailing separator
    pub fn sep_by_trailing<S: 'static>(&self, sep: &Parser<S, T>) -> Parser<Vec<R>, T> {
        let item = self.clone();
        let sep = sep.clone();
        Parser::new(move |ctx| {
            let mut results = Vec::new();
            loop {
                match item.parse(ctx) {
                    Ok(value) => results.push(value),
                    Err(_) => break,
                }
                if sep.parse(ctx).is_err() {
                    break;
                }
            }
            Ok(results)
        })
    }

    /// Attach a human-readable expectation to this parser. When the parser
    /// fails without consuming input, the error reports `name` instead of
    /// the internal expectations.
    pub fn label(&self, name: &'static str) -> Parser<R, T> {
        let inner = self.clone();
        Parser::new(move |ctx| {
            let start = ctx.position;
            inner.parse(ctx).map_err(|err| {
                if err.position == start {
                    ParseError::expecting(start, name)
                } else {
                    err
                }
            })
        })
    }

    /// Push a grammar context name onto errors escaping this parser
    pub fn context(&self, name: &'static str) -> Parser<R, T> {
        let inner = self.clone();
        Parser::new(move |ctx| {
            inner.parse(ctx).map_err(|mut err| {
                err.context.push(name);
                err
            })
        })
    }
}

/// Consume one token satisfying `pred`
pub fn satisfy<T: Clone + 'static>(
    pred: impl Fn(&T) -> bool + 'static,
    label: &'static str,
) -> Parser<T, T> {
    Parser::new(move |ctx| match ctx.peek() {
        Some(tok) if pred(tok) => {
            let tok = tok.clone();
            ctx.position += 1;
            Ok(tok)
        }
        _ => {
            let err = ParseError::expecting(ctx.position, label);
            ctx.record_failure(&err);
            Err(err)
        }
    })
}

/// A parser that always succeeds with a value
pub fn pure<R: Clone + 'static, T: 'static>(value: R) -> Parser<R, T> {
    Parser::new(move |_| Ok(value.clone()))
}

/// Deferred-definition handle for building recursive grammars
pub struct LazySetter<R, T> {
    cell: Rc<RefCell<Option<Parser<R, T>>>>,
}

impl<R: 'static, T: 'static> LazySetter<R, T> {
    /// Install the parser body. Installing twice is a programmer error.
    pub fn set(self, parser: Parser<R, T>) {
        let mut slot = self.cell.borrow_mut();
        if slot.is_some() {
            panic!("lazy parser body installed twice");
        }
        *slot = Some(parser);
    }
}

/// Create a `(parser, setter)` pair. The parser delegates to whatever the
/// setter installs; parsing before installation is a programmer error.
pub fn lazy<R: 'static, T: 'static>() -> (Parser<R, T>, LazySetter<R, T>) {
    let cell: Rc<RefCell<Option<Parser<R, T>>>> = Rc::new(RefCell::new(None));
    let slot = cell.clone();
    let parser = Parser::new(move |ctx| {
        let inner = slot
            .borrow()
            .as_ref()
            .expect("lazy parser used before its body was installed")
            .clone();
        inner.parse(ctx)
    });
    (parser, LazySetter { cell })
}

/// Run a parser over a full token slice, requiring every token (including
/// any explicit EOF marker the grammar consumes) to be used. On failure
/// the error reports the furthest position reached anywhere in the parse.
pub fn run<R: 'static, T: 'static>(parser: &Parser<R, T>, tokens: &[T]) -> Result<R, ParseError> {
    let mut ctx = ParseContext::new(tokens);
    match parser.parse(&mut ctx) {
        Ok(result) => {
            if ctx.position < ctx.tokens.len() {
                let err = ParseError::expecting(ctx.position, "end of input");
                return Err(match ctx.furthest.take() {
                    Some(furthest) => furthest.merge(err),
                    None => err,
                });
            }
            Ok(result)
        }
        Err(err) => Err(match ctx.furthest.take() {
            Some(furthest) => furthest.merge(err),
            None => err,
        }),
    }
}
