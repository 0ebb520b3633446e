use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{bail, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use tracing::warn;
use unic_langid::LanguageIdentifier;

/// Bundled message catalogs, keyed by primary language subtag
const LOCALES: [(&str, &str); 2] = [
    ("id", include_str!("../locales/id/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

const FALLBACK_LANGUAGE: &str = "id";

type Bundle = FluentBundle<FluentResource>;

/// Localization manager for the order bot
pub struct LocalizationManager {
    bundles: HashMap<&'static str, Bundle>,
    default_language: &'static str,
}

impl LocalizationManager {
    /// Create a manager with every bundled language. Fails if
    /// `default_language` has no bundle.
    pub fn new(default_language: &str) -> Result<Self> {
        let Some(&(default_language, _)) =
            LOCALES.iter().find(|(code, _)| *code == default_language)
        else {
            bail!("unsupported default language: {default_language}");
        };

        let mut bundles = HashMap::new();
        for (code, source) in LOCALES {
            bundles.insert(code, Self::create_bundle(code, source)?);
        }

        Ok(Self {
            bundles,
            default_language,
        })
    }

    fn create_bundle(code: &str, source: &str) -> Result<Bundle> {
        let locale: LanguageIdentifier = code.parse()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram renders the isolation marks as garbage
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language = code, errors = ?errors, "Locale file has syntax errors");
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language = code, errors = ?errors, "Duplicate messages in locale file");
        }
        Ok(bundle)
    }

    /// Bundle for a Telegram language code such as `en` or `en-US`, falling
    /// back to the default language.
    fn bundle_for(&self, language: Option<&str>) -> Option<&Bundle> {
        language
            .and_then(|code| code.split(|c: char| c == '-' || c == '_').next())
            .map(str::to_lowercase)
            .and_then(|primary| self.bundles.get(primary.as_str()))
            .or_else(|| self.bundles.get(self.default_language))
    }

    /// Get a localized message in the given language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: Option<&str>,
        args: Option<&FluentArgs>,
    ) -> String {
        let Some(bundle) = self.bundle_for(language) else {
            return format!("Missing translation: {key}");
        };
        let Some(pattern) = bundle.get_message(key).and_then(|message| message.value()) else {
            return format!("Missing translation: {key}");
        };

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key, errors = ?errors, "Failed to format message");
        }
        value.into_owned()
    }

    pub fn default_language(&self) -> &str {
        self.default_language
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager with the configured default language
pub fn init_localization(default_language: &str) -> Result<()> {
    let manager = LocalizationManager::new(default_language)?;
    if LOCALIZATION_MANAGER.set(manager).is_err() {
        warn!("Localization already initialized, keeping the existing manager");
    }
    Ok(())
}

/// Global localization manager; initialized with the fallback language on first use
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| {
        let mut bundles = HashMap::new();
        for (code, source) in LOCALES {
            match LocalizationManager::create_bundle(code, source) {
                Ok(bundle) => {
                    bundles.insert(code, bundle);
                }
                Err(err) => warn!(language = code, error = %err, "Failed to load locale"),
            }
        }
        LocalizationManager {
            bundles,
            default_language: FALLBACK_LANGUAGE,
        }
    })
}

/// Localized message in the user's language
pub fn t_lang(key: &str, language: Option<&str>) -> String {
    get_localization_manager().get_message_in_language(key, language, None)
}

/// Localized message with string arguments in the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language: Option<&str>) -> String {
    let mut fluent_args = FluentArgs::new();
    for (name, value) in args {
        fluent_args.set(*name, FluentValue::from(*value));
    }
    get_localization_manager().get_message_in_language(key, language, Some(&fluent_args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_exists_in_both_languages() {
        let manager = LocalizationManager::new("id").unwrap();
        let keys: Vec<&str> = LOCALES[0]
            .1
            .lines()
            .filter(|line| !line.starts_with(' ') && !line.starts_with('#'))
            .filter_map(|line| line.split_once(" ="))
            .map(|(key, _)| key.trim())
            .collect();
        assert!(!keys.is_empty());
        for key in keys {
            let english = manager.get_message_in_language(key, Some("en"), None);
            assert!(!english.starts_with("Missing translation"), "{key} missing in en");
        }
    }

    #[test]
    fn test_language_fallback() {
        let manager = LocalizationManager::new("id").unwrap();
        let indonesian = manager.get_message_in_language("cart-empty", None, None);
        assert_eq!(
            manager.get_message_in_language("cart-empty", Some("fr"), None),
            indonesian
        );
        assert_eq!(
            manager.get_message_in_language("cart-empty", Some("en-US"), None),
            manager.get_message_in_language("cart-empty", Some("en"), None)
        );
    }

    #[test]
    fn test_missing_key() {
        let manager = LocalizationManager::new("en").unwrap();
        assert_eq!(
            manager.get_message_in_language("no-such-key", None, None),
            "Missing translation: no-such-key"
        );
    }

    #[test]
    fn test_unsupported_default_language() {
        assert!(LocalizationManager::new("fr").is_err());
    }

    #[test]
    fn test_arguments_are_substituted() {
        let text = t_args_lang("invoice-created", &[("url", "https://pay.example/1")], Some("en"));
        assert!(text.contains("[Invoice](https://pay.example/1)"));
    }
}
