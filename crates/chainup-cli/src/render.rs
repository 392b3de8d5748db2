use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", colorized_badge(status)),
    }
}

pub fn print_status(status: &str, message: &str) {
    println!(
        "{}",
        render_status_line(current_output_style(), status, message)
    );
}

fn colorized_badge(status: &str) -> String {
    let (badge, style) = match status {
        "ok" => ("[OK]", badge_style(AnsiColor::BrightGreen)),
        "err" => ("[ERR]", badge_style(AnsiColor::BrightRed)),
        "warn" => ("[WARN]", badge_style(AnsiColor::BrightYellow)),
        "pending" => ("[..]", badge_style(AnsiColor::BrightCyan)),
        _ => ("[--]", badge_style(AnsiColor::BrightBlue)),
    };
    format!("{}{}{}", style.render(), badge, style.render_reset())
}

fn badge_style(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

pub fn start_wait_spinner(label: &str) -> Option<ProgressBar> {
    if current_output_style() != OutputStyle::Rich {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

pub fn finish_wait_spinner(spinner: Option<ProgressBar>) {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}
