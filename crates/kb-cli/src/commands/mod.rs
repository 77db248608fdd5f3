pub mod check;
pub mod roll;
pub mod simulate;
pub mod verify;

use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};
use kb_dice::{DiceError, DiceExpression};

/// Parse dice notation, printing a report to stderr when it is invalid.
fn parse_notation(input: &str) -> Result<DiceExpression, String> {
    kb_dice::parse(input).map_err(|e| {
        if let DiceError::Parse { span, message } = &e {
            eprint!("{}", render_parse_error(input, span.clone(), message));
        }
        e.to_string()
    })
}

/// Render a notation error with ariadne, pointing at `span`.
fn render_parse_error(input: &str, span: Range<usize>, message: &str) -> String {
    const NAME: &str = "notation";
    let span = clamp(span, input.len());
    let mut output = Vec::new();
    Report::build(ReportKind::Error, (NAME, span.clone()))
        .with_message("invalid dice notation")
        .with_label(
            Label::new((NAME, span))
                .with_message(message)
                .with_color(Color::Red),
        )
        .finish()
        .write((NAME, Source::from(input)), &mut output)
        .ok();
    String::from_utf8(output).unwrap_or_default()
}

/// Errors at the end of input point at the last character.
fn clamp(span: Range<usize>, len: usize) -> Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let start = span.start.min(len - 1);
    let end = span.end.clamp(start + 1, len);
    start..end
}
