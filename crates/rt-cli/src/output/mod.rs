//! Output formatting utilities for the CLI
//!
//! Tables for host profiles, usage and screen summaries, and the colored
//! status lines every command prints.

use rt_agent::UsageTotals;
use rt_core::config::HostProfile;
use rt_terminal::ScreenSnapshot;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

/// Format host profiles as an ASCII table
///
/// The detailed view adds device metadata, tags and notes.
pub fn format_hosts(hosts: &[HostProfile], detailed: bool) -> String {
    if hosts.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ADDRESSES")]
        addresses: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "DEVICE")]
        device: String,
    }

    #[derive(Tabled)]
    struct HostRowDetailed {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ADDRESSES")]
        addresses: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "DEVICE")]
        device: String,
        #[tabled(rename = "VENDOR/OS")]
        vendor_os: String,
        #[tabled(rename = "TAGS")]
        tags: String,
        #[tabled(rename = "PASSWORD")]
        password: String,
        #[tabled(rename = "NOTES")]
        notes: String,
    }

    let dash = || "-".to_string();
    let device = |h: &HostProfile| {
        h.device_type
            .as_ref()
            .map(|d| d.name().to_string())
            .unwrap_or_else(dash)
    };
    let user = |h: &HostProfile| h.effective_username().unwrap_or_else(dash);

    if detailed {
        let rows: Vec<HostRowDetailed> = hosts
            .iter()
            .map(|h| HostRowDetailed {
                name: h.name.clone(),
                addresses: h.addresses.join(", "),
                port: h.port,
                user: user(h),
                device: device(h),
                vendor_os: format!(
                    "{}/{}",
                    h.manufacturer.as_deref().unwrap_or("-"),
                    h.os_version.as_deref().unwrap_or("-")
                ),
                tags: if h.tags.is_empty() {
                    dash()
                } else {
                    h.tags.join(", ")
                },
                password: if h.password.is_some() { "sealed" } else { "-" }.to_string(),
                notes: h
                    .notes
                    .as_deref()
                    .map(|n| truncate(n, 40))
                    .unwrap_or_else(dash),
            })
            .collect();

        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(120))
            .to_string()
    } else {
        let rows: Vec<HostRow> = hosts
            .iter()
            .map(|h| HostRow {
                name: h.name.clone(),
                addresses: h.addresses.join(", "),
                port: h.port,
                user: user(h),
                device: device(h),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

/// One-line usage summary printed after an agent run
pub fn format_usage(usage: &UsageTotals) -> String {
    format!(
        "{} calls, {} tokens ({} prompt + {} completion), cost {:.6}",
        usage.calls,
        usage.total_tokens(),
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.cost
    )
}

/// Visible screen lines with trailing blank rows removed
pub fn format_screen(snapshot: &ScreenSnapshot) -> String {
    let lines: Vec<&str> = snapshot.lines.iter().map(|l| l.trim_end()).collect();
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(0, |i| i + 1);
    lines[..end].join("\n")
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print agent reasoning text, dimmed
pub fn print_thought(msg: &str) {
    use crossterm::style::{Attribute, Print, SetAttribute};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetAttribute(Attribute::Dim),
        Print(msg),
        SetAttribute(Attribute::Reset),
        Print("\n")
    );
}
