//! Dice notation adapter.
//!
//! Accepts notation such as `3d6+2`, `4d6kh3`, `2d10!`, `1d20adv+5cs>=19`
//! or `4d6r<2kh3`. Input is case-insensitive. Whitespace is ignored between
//! tokens and inside the comparisons `r <`, `cs >=` and `cf <=`, but not
//! inside words such as `kh` or `adv`.
//!
//! ```text
//! expr     := [count] 'd' sides modifier*
//! modifier := ('+'|'-') int | '*' ['-'] int | 'kh' int | 'kl' int | 'k' int
//!           | '!' [int] | 'r<' int | 'adv' | 'dis' | 'cs>=' int | 'cf<=' int
//! ```
//!
//! A bare `!` explodes on the highest face and `k` is short for `kh`.
//! Errors carry the byte span of the offending input so callers can render
//! them against the original text.

use std::ops::Range;

use logos::Logos;

use crate::error::{DiceError, DiceResult};
use crate::expression::{DiceExpression, Modifier};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tok {
    #[regex(r"[0-9]+")]
    Int,

    #[token("d")]
    D,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("kh")]
    KeepHighest,

    #[token("kl")]
    KeepLowest,

    #[token("k")]
    Keep,

    #[token("!")]
    Bang,

    #[regex(r"r[ \t\r\n]*<")]
    RerollBelow,

    #[token("adv")]
    Advantage,

    #[token("dis")]
    Disadvantage,

    #[regex(r"cs[ \t\r\n]*>=")]
    CritSuccess,

    #[regex(r"cf[ \t\r\n]*<=")]
    CritFailure,
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Tok::Int => "a number",
            Tok::D => "'d'",
            Tok::Plus => "'+'",
            Tok::Minus => "'-'",
            Tok::Star => "'*'",
            Tok::KeepHighest => "'kh'",
            Tok::KeepLowest => "'kl'",
            Tok::Keep => "'k'",
            Tok::Bang => "'!'",
            Tok::RerollBelow => "'r<'",
            Tok::Advantage => "'adv'",
            Tok::Disadvantage => "'dis'",
            Tok::CritSuccess => "'cs>='",
            Tok::CritFailure => "'cf<='",
        };
        f.write_str(text)
    }
}

struct Lexeme<'a> {
    tok: Tok,
    span: Range<usize>,
    text: &'a str,
}

fn parse_error(span: Range<usize>, message: impl Into<String>) -> DiceError {
    DiceError::Parse {
        span,
        message: message.into(),
    }
}

/// Attach a span to a validation failure.
fn located(span: Range<usize>, err: DiceError) -> DiceError {
    match err {
        DiceError::InvalidExpression(message) => DiceError::Parse { span, message },
        other => other,
    }
}

fn lex(source: &str) -> DiceResult<Vec<Lexeme<'_>>> {
    Tok::lexer(source)
        .spanned()
        .map(|(result, span)| match result {
            Ok(tok) => Ok(Lexeme {
                tok,
                text: &source[span.clone()],
                span,
            }),
            Err(()) => Err(parse_error(
                span.clone(),
                format!("unexpected input {:?}", &source[span]),
            )),
        })
        .collect()
}

struct Parser<'a> {
    tokens: Vec<Lexeme<'a>>,
    pos: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Tok> {
        self.tokens.get(self.pos).map(|l| l.tok)
    }

    fn span_here(&self) -> Range<usize> {
        self.tokens
            .get(self.pos)
            .map_or(self.end..self.end, |l| l.span.clone())
    }

    fn start_of(&self, pos: usize) -> usize {
        self.tokens.get(pos).map_or(self.end, |l| l.span.start)
    }

    fn end_of_previous(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map_or(0, |l| l.span.end)
    }

    fn expect(&mut self, tok: Tok, what: &str) -> DiceResult<()> {
        match self.peek() {
            Some(found) if found == tok => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(parse_error(
                self.span_here(),
                format!("expected {what}, found {found}"),
            )),
            None => Err(parse_error(self.span_here(), format!("expected {what}"))),
        }
    }

    fn int(&mut self, what: &str) -> DiceResult<(u64, Range<usize>)> {
        let span = self.span_here();
        match self.tokens.get(self.pos) {
            Some(lexeme) if lexeme.tok == Tok::Int => {
                let value = lexeme
                    .text
                    .parse::<u64>()
                    .map_err(|_| parse_error(span.clone(), format!("{what} is too large")))?;
                self.pos += 1;
                Ok((value, span))
            }
            Some(lexeme) => Err(parse_error(
                span,
                format!("expected {what}, found {}", lexeme.tok),
            )),
            None => Err(parse_error(span, format!("expected {what}"))),
        }
    }

    fn small_int(&mut self, what: &str) -> DiceResult<u32> {
        let (value, span) = self.int(what)?;
        u32::try_from(value).map_err(|_| parse_error(span, format!("{what} is too large")))
    }

    fn signed_int(&mut self, negative: bool, what: &str) -> DiceResult<i64> {
        let (value, span) = self.int(what)?;
        let signed = if negative {
            -i128::from(value)
        } else {
            i128::from(value)
        };
        i64::try_from(signed).map_err(|_| parse_error(span, format!("{what} is out of range")))
    }

    fn expression(&mut self) -> DiceResult<DiceExpression> {
        if self.tokens.is_empty() {
            return Err(parse_error(0..self.end, "expected dice notation"));
        }
        let count = match self.peek() {
            Some(Tok::Int) => self.small_int("dice count")?,
            _ => 1,
        };
        self.expect(Tok::D, "'d'")?;
        let sides = self.small_int("number of sides")?;
        let mut expr = DiceExpression::new(count, sides)
            .map_err(|e| located(0..self.end_of_previous(), e))?;

        while let Some(tok) = self.peek() {
            let start_pos = self.pos;
            self.pos += 1;
            let step = match tok {
                Tok::Plus => Step::Modifier(Modifier::Add(self.signed_int(false, "a number")?)),
                Tok::Minus => Step::Modifier(Modifier::Add(self.signed_int(true, "a number")?)),
                Tok::Star => {
                    let negative = self.peek() == Some(Tok::Minus);
                    if negative {
                        self.pos += 1;
                    }
                    Step::Modifier(Modifier::Multiply(self.signed_int(negative, "a multiplier")?))
                }
                Tok::KeepHighest | Tok::Keep => {
                    Step::Modifier(Modifier::KeepHighest(self.small_int("a keep count")?))
                }
                Tok::KeepLowest => {
                    Step::Modifier(Modifier::KeepLowest(self.small_int("a keep count")?))
                }
                Tok::Bang => {
                    let threshold = match self.peek() {
                        Some(Tok::Int) => self.small_int("an explode threshold")?,
                        _ => expr.sides(),
                    };
                    Step::Modifier(Modifier::ExplodeOn(threshold))
                }
                Tok::RerollBelow => {
                    Step::Modifier(Modifier::RerollBelow(self.small_int("a reroll threshold")?))
                }
                Tok::Advantage => Step::Modifier(Modifier::Advantage),
                Tok::Disadvantage => Step::Modifier(Modifier::Disadvantage),
                Tok::CritSuccess => Step::CritSuccess(self.small_int("a critical threshold")?),
                Tok::CritFailure => Step::CritFailure(self.small_int("a critical threshold")?),
                Tok::Int | Tok::D => {
                    self.pos = start_pos;
                    return Err(parse_error(
                        self.span_here(),
                        format!("unexpected {tok}, expected a modifier"),
                    ));
                }
            };
            let span = self.start_of(start_pos)..self.end_of_previous();
            expr = match step {
                Step::Modifier(m) => expr.with_modifier(m),
                Step::CritSuccess(at) => expr.with_crit_success(at),
                Step::CritFailure(at) => expr.with_crit_failure(at),
            }
            .map_err(|e| located(span, e))?;
        }
        Ok(expr)
    }
}

enum Step {
    Modifier(Modifier),
    CritSuccess(u32),
    CritFailure(u32),
}

/// Parse dice notation into a validated [`DiceExpression`].
pub fn parse(input: &str) -> DiceResult<DiceExpression> {
    // ASCII lowercasing keeps byte offsets aligned with the input.
    let source = input.to_ascii_lowercase();
    let tokens = lex(&source)?;
    Parser {
        tokens,
        pos: 0,
        end: source.len(),
    }
    .expression()
}
