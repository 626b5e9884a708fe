use colored::Colorize;
use std::io::{self, Write};

/// Format lamports as SOL string with color
pub fn format_sol(lamports: u64) -> String {
    crate::solana::rent::RentCalculator::format_sol(lamports)
        .yellow()
        .to_string()
}

/// Format pubkey truncated for display
pub fn format_pubkey(pubkey: &str) -> String {
    if pubkey.len() <= 12 || !pubkey.is_ascii() {
        pubkey.to_string()
    } else {
        format!("{}...{}", &pubkey[..6], &pubkey[pubkey.len() - 6..])
    }
}

/// Format timestamp in human-readable format
pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Prompt user for yes/no confirmation. Anything unreadable counts as "no".
pub fn confirm_action(prompt: &str) -> bool {
    print!("{} (y/N): ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    is_affirmative(&input)
}

fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    println!("{}", table_row(columns, widths));
}

fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::new();
    for (col, width) in columns.iter().zip(widths) {
        row.push_str(&format!("{:<width$}  ", col, width = width));
    }
    row.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pubkey_truncates_long_keys() {
        assert_eq!(
            format_pubkey("11111111111111111111111111111111"),
            "111111...111111"
        );
        assert_eq!(format_pubkey("short"), "short");
    }

    #[test]
    fn test_confirmation_parsing() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("nope"));
    }

    #[test]
    fn test_table_row_pads_columns() {
        assert_eq!(table_row(&["a", "bb"], &[3, 4]), "a    bb");
    }
}
