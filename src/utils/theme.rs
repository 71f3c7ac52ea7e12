use colored::Colorize;

pub struct Theme {
    pub error_symbol: String,
    pub error_style: Box<dyn Fn(String) -> String>,
    pub notice_style: Box<dyn Fn(String) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            error_symbol: "✗".red().to_string(),
            error_style: Box::new(|s| s.bright_red().to_string()),
            notice_style: Box::new(|s| s.bright_blue().to_string()),
        }
    }
}

impl Theme {
    pub fn plain() -> Self {
        Theme {
            error_symbol: "psh:".to_string(),
            error_style: Box::new(|s| s),
            notice_style: Box::new(|s| s),
        }
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        format!("{} {}", self.error_symbol, (self.error_style)(message.into()))
    }

    pub fn notice(&self, message: impl Into<String>) -> String {
        (self.notice_style)(message.into())
    }
}

pub fn load_theme(theme_name: &str) -> Theme {
    match theme_name {
        "plain" => Theme::plain(),
        _ => Theme::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_theme_has_no_escapes() {
        let theme = load_theme("plain");
        assert_eq!(theme.error("Invalid command: |"), "psh: Invalid command: |");
        assert_eq!(theme.notice("[1]+ done sleep 1"), "[1]+ done sleep 1");
    }
}
