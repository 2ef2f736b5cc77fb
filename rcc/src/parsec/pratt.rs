//! Pratt (precedence-climbing) parser builder layered on the combinator kernel

use super::{ParseContext, ParseError, Parser};
use std::rc::Rc;

type CombineFn<R> = Rc<dyn Fn(R, R) -> R>;
type OpMatcher<T> = Rc<dyn Fn(&T) -> bool>;

struct OpInfo<R, T> {
    matches: OpMatcher<T>,
    precedence: u32,
    is_left_assoc: bool,
    combine: CombineFn<R>,
}

struct PrattTable<R, T> {
    atom: Parser<R, T>,
    ops: Vec<OpInfo<R, T>>,
}

/// Builds an infix-expression parser from an atom parser and a table of
/// binary operators with precedence and associativity.
pub struct PrattBuilder<R, T> {
    atom: Option<Parser<R, T>>,
    ops: Vec<OpInfo<R, T>>,
}

impl<R, T> Default for PrattBuilder<R, T> {
    fn default() -> Self {
        Self {
            atom: None,
            ops: Vec::new(),
        }
    }
}

impl<R: 'static, T: 'static> PrattBuilder<R, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_atom_parser(mut self, atom: Parser<R, T>) -> Self {
        self.atom = Some(atom);
        self
    }

    pub fn add_infix_left(
        mut self,
        matches: impl Fn(&T) -> bool + 'static,
        precedence: u32,
        combine: impl Fn(R, R) -> R + 'static,
    ) -> Self {
        self.ops.push(OpInfo {
            matches: Rc::new(matches),
            precedence,
            is_left_assoc: true,
            combine: Rc::new(combine),
        });
        self
    }

    pub fn add_infix_right(
        mut self,
        matches: impl Fn(&T) -> bool + 'static,
        precedence: u32,
        combine: impl Fn(R, R) -> R + 'static,
    ) -> Self {
        self.ops.push(OpInfo {
            matches: Rc::new(matches),
            precedence,
            is_left_assoc: false,
            combine: Rc::new(combine),
        });
        self
    }

    /// Build the expression parser. Building without an atom parser is a
    /// programmer error.
    pub fn build(self) -> Parser<R, T> {
        let atom = self
            .atom
            .expect("Pratt parser cannot be built without an atom parser");
        let table = Rc::new(PrattTable {
            atom,
            ops: self.ops,
        });
        Parser::new(move |ctx| parse_expression(&table, ctx, 0))
    }
}

fn parse_expression<R: 'static, T: 'static>(
    table: &Rc<PrattTable<R, T>>,
    ctx: &mut ParseContext<'_, T>,
    min_precedence: u32,
) -> Result<R, ParseError> {
    let mut left = table.atom.parse(ctx)?;

    loop {
        let loop_start = ctx.position;
        let Some(token) = ctx.peek() else {
            break;
        };
        let Some(op) = table
            .ops
            .iter()
            .find(|op| (op.matches)(token) && op.precedence >= min_precedence)
        else {
            break;
        };

        ctx.position += 1;

        let next_min = if op.is_left_assoc {
            op.precedence + 1
        } else {
            op.precedence
        };

        match parse_expression(table, ctx, next_min) {
            Ok(right) => left = (op.combine)(left, right),
            Err(_) => {
                // Do not consume the operator when its right-hand side
                // fails; the caller may have a use for it.
                ctx.position = loop_start;
                break;
            }
        }
    }

    Ok(left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsec::satisfy;

    // Tiny token language: integers and one-char operators
    #[derive(Debug, Clone, PartialEq)]
    enum Tok {
        Int(i64),
        Op(char),
    }

    fn int_atom() -> Parser<i64, Tok> {
        satisfy(|t: &Tok| matches!(t, Tok::Int(_)), "integer").map(|t| match t {
            Tok::Int(v) => v,
            _ => unreachable!(),
        })
    }

    fn op(c: char) -> impl Fn(&Tok) -> bool {
        move |t: &Tok| matches!(t, Tok::Op(x) if *x == c)
    }

    fn arith() -> Parser<i64, Tok> {
        PrattBuilder::new()
            .with_atom_parser(int_atom())
            .add_infix_left(op('+'), 10, |a, b| a + b)
            .add_infix_left(op('-'), 10, |a, b| a - b)
            .add_infix_left(op('*'), 20, |a, b| a * b)
            .add_infix_right(op('^'), 30, |a, b| a.pow(b as u32))
            .build()
    }

    fn toks(items: &[(&str, i64)]) -> Vec<Tok> {
        items.iter()
            .map(|(s, v)| {
                if s.is_empty() {
                    Tok::Int(*v)
                } else {
                    Tok::Op(s.chars().next().unwrap())
                }
            })
            .collect()
    }

    fn i(v: i64) -> (&'static str, i64) {
        ("", v)
    }

    #[test]
    fn test_single_atom() {
        let tokens = toks(&[i(42)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(42));
    }

    #[test]
    fn test_left_associative_precedence() {
        // 2 + 3 * 4 = 14
        let tokens = toks(&[i(2), ("+", 0), i(3), ("*", 0), i(4)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(14));
    }

    #[test]
    fn test_left_associativity() {
        // 10 - 3 - 2 = (10 - 3) - 2 = 5
        let tokens = toks(&[i(10), ("-", 0), i(3), ("-", 0), i(2)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(5));
    }

    #[test]
    fn test_right_associativity() {
        // 2 ^ 3 ^ 2 = 2 ^ (3 ^ 2) = 512
        let tokens = toks(&[i(2), ("^", 0), i(3), ("^", 0), i(2)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(512));
    }

    #[test]
    fn test_rhs_failure_leaves_operator_unconsumed() {
        // `1 +` — the dangling operator must not be consumed
        let tokens = toks(&[i(1), ("+", 0)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(1));
        assert_eq!(ctx.position, 1);
    }

    #[test]
    fn test_atom_failure_propagates() {
        let tokens = toks(&[("+", 0)]);
        let mut ctx = ParseContext::new(&tokens);
        assert!(arith().parse(&mut ctx).is_err());
        assert_eq!(ctx.position, 0);
    }

    #[test]
    #[should_panic(expected = "Pratt parser cannot be built without an atom parser")]
    fn test_build_without_atom_panics() {
        let _ = PrattBuilder::<i64, Tok>::new().build();
    }

    #[test]
    fn test_mixed_expression() {
        // 1 + 2 * 3 - 4 = 3
        let tokens = toks(&[i(1), ("+", 0), i(2), ("*", 0), i(3), ("-", 0), i(4)]);
        let mut ctx = ParseContext::new(&tokens);
        assert_eq!(arith().parse(&mut ctx), Ok(3));
    }
}
