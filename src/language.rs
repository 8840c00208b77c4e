//! Supported languages and the container profile each one runs under.
//!
//! The language set is closed. Profiles start from built-in defaults and
//! may have individual fields replaced by configuration at startup; after
//! that the table is read-only.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProfileOverride;

/// A language tag accepted by the execution endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Js,
    Python,
}

/// Returned when a request names a language outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: '{0}'")]
pub struct UnknownLanguage(pub String);

impl Language {
    /// Every supported language, in table order.
    pub const ALL: [Self; 4] = [Self::Cpp, Self::Java, Self::Js, Self::Python];

    /// Wire tag, as sent by the editor.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::Js => "js",
            Self::Python => "python",
        }
    }

    /// Name of the single source file the container expects.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Cpp => "main.cpp",
            Self::Java => "Main.java",
            Self::Js => "main.js",
            Self::Python => "main.py",
        }
    }

    const fn default_image(self) -> &'static str {
        match self {
            Self::Cpp => "gcc:latest",
            Self::Java => "eclipse-temurin:21",
            Self::Js => "node:20-alpine",
            Self::Python => "python:3.12-alpine",
        }
    }

    const fn default_command(self) -> &'static str {
        match self {
            Self::Cpp => "g++ main.cpp -o main.out && ./main.out",
            Self::Java => "javac Main.java && java Main",
            Self::Js => "node main.js",
            Self::Python => "python3 main.py",
        }
    }

    /// Compose service name, e.g. `python_executor`.
    pub fn service_name(self) -> String {
        format!("{}_executor", self.tag())
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.tag() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How one language is materialized and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProfile {
    pub language: Language,

    /// File the source is written to inside the workspace.
    pub file_name: String,

    /// Compose service that runs the file (compose runtime).
    pub service: String,

    /// Image the disposable container is started from (docker runtime).
    pub image: String,

    /// Shell command run inside the container's working directory.
    pub command: String,
}

impl ContainerProfile {
    /// Built-in profile for a language.
    pub fn default_for(language: Language) -> Self {
        Self {
            language,
            file_name: language.file_name().to_string(),
            service: language.service_name(),
            image: language.default_image().to_string(),
            command: language.default_command().to_string(),
        }
    }

    fn apply(&mut self, overrides: &ProfileOverride) {
        if let Some(file_name) = &overrides.file_name {
            self.file_name.clone_from(file_name);
        }
        if let Some(service) = &overrides.service {
            self.service.clone_from(service);
        }
        if let Some(image) = &overrides.image {
            self.image.clone_from(image);
        }
        if let Some(command) = &overrides.command {
            self.command.clone_from(command);
        }
    }
}

/// Language → profile mapping, fixed at startup.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: Vec<ContainerProfile>,
}

impl ProfileTable {
    /// Build the table from defaults, replacing any overridden fields.
    pub fn from_overrides(overrides: &HashMap<Language, ProfileOverride>) -> Self {
        let profiles = Language::ALL
            .into_iter()
            .map(|language| {
                let mut profile = ContainerProfile::default_for(language);
                if let Some(o) = overrides.get(&language) {
                    info!(language = %language, "Applying profile override");
                    profile.apply(o);
                }
                profile
            })
            .collect();
        Self { profiles }
    }

    pub fn get(&self, language: Language) -> &ContainerProfile {
        &self.profiles[language.index()]
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.profiles.iter().map(|p| p.language)
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::from_overrides(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_tags() {
        assert_eq!("cpp".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("java".parse::<Language>().unwrap(), Language::Java);
        assert_eq!("js".parse::<Language>().unwrap(), Language::Js);
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
    }

    #[test]
    fn parse_rejects_unknown_and_miscased_tags() {
        assert_eq!(
            "ruby".parse::<Language>(),
            Err(UnknownLanguage("ruby".to_string()))
        );
        assert!("Python".parse::<Language>().is_err());
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn default_profiles_match_file_table() {
        let table = ProfileTable::default();
        let cpp = table.get(Language::Cpp);
        assert_eq!(cpp.file_name, "main.cpp");
        assert_eq!(cpp.service, "cpp_executor");

        let java = table.get(Language::Java);
        assert_eq!(java.file_name, "Main.java");
        assert_eq!(java.command, "javac Main.java && java Main");

        assert_eq!(table.get(Language::Js).file_name, "main.js");
        assert_eq!(table.get(Language::Python).service, "python_executor");
    }

    #[test]
    fn table_order_matches_index() {
        let table = ProfileTable::default();
        for language in Language::ALL {
            assert_eq!(table.get(language).language, language);
        }
        assert_eq!(table.languages().count(), 4);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = HashMap::from([(
            Language::Python,
            ProfileOverride {
                image: Some("python:3.11-slim".to_string()),
                ..ProfileOverride::default()
            },
        )]);

        let table = ProfileTable::from_overrides(&overrides);
        let python = table.get(Language::Python);
        assert_eq!(python.image, "python:3.11-slim");
        assert_eq!(python.file_name, "main.py");
        assert_eq!(python.command, "python3 main.py");

        // Untouched languages keep their defaults
        assert_eq!(table.get(Language::Cpp).image, "gcc:latest");
    }

    #[test]
    fn serde_uses_lowercase_tags() {
        let json = serde_json::to_string(&Language::Cpp).unwrap();
        assert_eq!(json, "\"cpp\"");
        let lang: Language = serde_json::from_str("\"js\"").unwrap();
        assert_eq!(lang, Language::Js);
    }
}
