use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(icon: &str, text: &str) {
    println!("{} {}", icon, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

/// Indented label/value line
pub fn kv(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// How a search center was obtained, styled for inline use
pub fn provenance(text: &str) -> String {
    text.style(theme().provenance.clone()).to_string()
}
