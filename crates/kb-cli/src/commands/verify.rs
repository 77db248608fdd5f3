use colored::Colorize;
use kb_dice::verify_integrity;

pub fn run(json: bool) -> Result<(), String> {
    let report = verify_integrity();

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| format!("JSON error: {e}"))?;
        println!("{text}");
    } else {
        for check in &report.checks {
            let mark = if check.passed {
                "✓".green().bold()
            } else {
                "✗".red().bold()
            };
            println!("  {mark} {:<20} {}", check.name, check.detail.dimmed());
        }
        println!();
        println!("  {} {}", "Status".bold(), report.status);
    }

    let failed = report.failures().count();
    if failed > 0 {
        return Err(format!("{failed} integrity check(s) failed"));
    }
    Ok(())
}
