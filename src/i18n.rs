use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Global localization state
static LOCALIZER: OnceLock<Localizer> = OnceLock::new();

/// Initialize the global localizer
pub fn init() {
    localizer();
}

fn localizer() -> &'static Localizer {
    LOCALIZER.get_or_init(Localizer::new)
}

/// Get a localized message by key
pub fn t(key: &str) -> String {
    localizer().get(key)
}

/// Get a localized message by key with arguments (simplified)
pub fn t_with_args(key: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
    localizer().get_with_args(key, args)
}

/// Localization manager
#[derive(Debug)]
pub struct Localizer {
    messages: HashMap<String, String>,
}

impl Localizer {
    fn new() -> Self {
        let current_language = Self::detect_language();
        let messages = Self::load_messages(&current_language);

        Self { messages }
    }

    fn detect_language() -> String {
        // Check environment variables in order of preference
        let lang_vars = ["LC_ALL", "LC_MESSAGES", "LANG"];

        for var in &lang_vars {
            if let Ok(value) = std::env::var(var) {
                // "nb_NO.UTF-8" -> "nb"
                let locale_without_encoding = value.split('.').next().unwrap_or(&value);
                let lang_code = locale_without_encoding
                    .split(['_', '-'])
                    .next()
                    .unwrap_or(locale_without_encoding)
                    .to_lowercase();

                match lang_code.as_str() {
                    "nn" | "nno" => return "nn".to_string(),
                    "nb" | "no" | "nor" => return "nb".to_string(),
                    "en" => return "en".to_string(),
                    _ => continue,
                }
            }
        }

        // Default to English
        "en".to_string()
    }

    fn load_messages(language: &str) -> HashMap<String, String> {
        // English is always loaded so a key missing from a translation
        // still has a readable fallback.
        let mut messages = Self::parse(include_str!("../locales/en.ftl"));
        let translated = match language {
            "nn" => Some(include_str!("../locales/nn.ftl")),
            "nb" => Some(include_str!("../locales/nb.ftl")),
            _ => None,
        };
        if let Some(content) = translated {
            messages.extend(Self::parse(content));
        }
        messages
    }

    // Simple `key = value` format
    fn parse(content: &str) -> HashMap<String, String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(" = "))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect()
    }

    fn get(&self, key: &str) -> String {
        self.messages.get(key).cloned().unwrap_or_else(|| {
            warn!("Missing translation key: {key}");
            format!("MISSING: {key}")
        })
    }

    fn get_with_args(&self, key: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
        let mut message = self.get(key);

        // Simple string replacement for {$var} patterns
        for (var_name, value) in args {
            let placeholder = format!("{{${var_name}}}");
            message = message.replace(&placeholder, &format!("{value}"));
        }

        message
    }
}

// Convenience macros for common usage patterns
#[macro_export]
macro_rules! t {
    ($key:expr) => {
        $crate::i18n::t($key)
    };
}

#[macro_export]
macro_rules! t_args {
    ($key:expr, $($name:expr => $value:expr),*) => {{
        let args: &[(&str, &dyn std::fmt::Display)] = &[
            $(
                ($name, &$value),
            )*
        ];
        $crate::i18n::t_with_args($key, args)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_translation_key_exists_in_english() {
        let en = Localizer::parse(include_str!("../locales/en.ftl"));
        for content in [
            include_str!("../locales/nb.ftl"),
            include_str!("../locales/nn.ftl"),
        ] {
            for key in Localizer::parse(content).keys() {
                assert!(en.contains_key(key), "{key} is not in en.ftl");
            }
        }
    }

    #[test]
    fn arguments_are_substituted() {
        let localizer = Localizer {
            messages: Localizer::parse("greet = Hello {$name}, {$name}!"),
        };
        let name = "Ada";
        let args: &[(&str, &dyn std::fmt::Display)] = &[("name", &name)];
        assert_eq!(localizer.get_with_args("greet", args), "Hello Ada, Ada!");
        assert_eq!(localizer.get("nope"), "MISSING: nope");
    }

    #[test]
    fn init_twice_keeps_one_localizer() {
        init();
        let first = localizer() as *const Localizer;
        init();
        assert_eq!(first, localizer() as *const Localizer);
        assert_eq!(t("report-got"), localizer().get("report-got"));
    }

    #[test]
    fn test_language_detection() {
        // Test that language detection doesn't panic
        let _lang = Localizer::detect_language();
    }
}
