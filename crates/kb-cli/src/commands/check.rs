use colored::Colorize;
use kb_dice::{Modifier, SetSelection};

pub fn run(notation: &str) -> Result<(), String> {
    let expr = super::parse_notation(notation)?;

    println!("  {} {}", "✓".green().bold(), expr.notation().bold());
    println!("    {} × d{}", expr.count(), expr.sides());
    for step in expr.modifiers().iter().filter_map(describe) {
        println!("    {}", step.dimmed());
    }
    match expr.selection() {
        SetSelection::Single => {}
        SetSelection::Advantage => println!("    {}", "roll twice, keep the higher total".dimmed()),
        SetSelection::Disadvantage => println!("    {}", "roll twice, keep the lower total".dimmed()),
    }
    let crit = expr.crit();
    if let Some(at) = crit.success_at {
        println!("    {}", format!("critical success on a natural {at}+").dimmed());
    }
    if let Some(at) = crit.failure_at {
        println!("    {}", format!("critical failure on a natural {at} or less").dimmed());
    }
    Ok(())
}

/// One line per dice or arithmetic step; set selection is reported
/// separately.
fn describe(modifier: &Modifier) -> Option<String> {
    let step = match modifier {
        Modifier::Add(n) if *n < 0 => format!("subtract {}", n.unsigned_abs()),
        Modifier::Add(n) => format!("add {n}"),
        Modifier::Multiply(n) => format!("multiply by {n}"),
        Modifier::RerollBelow(t) => format!("reroll dice below {t}"),
        Modifier::ExplodeOn(t) => format!("explode on {t}+"),
        Modifier::KeepHighest(k) => format!("keep highest {k}"),
        Modifier::KeepLowest(k) => format!("keep lowest {k}"),
        Modifier::Advantage | Modifier::Disadvantage => return None,
    };
    Some(step)
}
