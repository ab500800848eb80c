use crate::ui::{theme, Icons};
use owo_colors::{OwoColorize, Style};

fn styled(text: &str, style: &Style) -> String {
    text.style(style.clone()).to_string()
}

pub fn header(text: &str) {
    println!("{} {}", Icons::PACKAGE, styled(text, &theme().header));
}

pub fn success(message: &str) {
    println!("{} {}", Icons::CHECK, styled(message, &theme().success));
}

/// Written to stderr, like `warn`
pub fn error(message: &str) {
    eprintln!("{} {}", Icons::CROSS, styled(message, &theme().error));
}

pub fn warn(message: &str) {
    eprintln!("{} {}", Icons::WARN, styled(message, &theme().warn));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", styled(Icons::INFO, &theme().info), styled(label, &theme().dim), value);
}

pub fn section(title: &str) {
    println!("\n━{}━", styled(title, &theme().header));
}
