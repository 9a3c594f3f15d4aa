use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Editor language mode stored with a project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    #[display("javascript")]
    Javascript,
    #[display("typescript")]
    Typescript,
    #[display("python")]
    Python,
    #[display("html")]
    Html,
    #[display("css")]
    Css,
    #[display("json")]
    Json,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Javascript,
        Language::Typescript,
        Language::Python,
        Language::Html,
        Language::Css,
        Language::Json,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.to_string() == name)
    }
}

/// Editor colour theme stored with a project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub enum Theme {
    #[default]
    #[display("vs-dark")]
    #[serde(rename = "vs-dark")]
    VsDark,
    #[display("light")]
    #[serde(rename = "light")]
    Light,
    #[display("hc-black")]
    #[serde(rename = "hc-black")]
    HcBlack,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::VsDark, Theme::Light, Theme::HcBlack];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|theme| theme.to_string() == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSettings {
    pub language: Language,
    pub theme: Theme,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_a_fresh_editor() {
        let settings = EditorSettings::default();
        assert_eq!(settings.language, Language::Javascript);
        assert_eq!(settings.theme, Theme::VsDark);
    }

    #[rstest]
    #[case("typescript", Some(Language::Typescript))]
    #[case("json", Some(Language::Json))]
    #[case("rust", None)]
    #[case("JavaScript", None)]
    fn languages_are_looked_up_by_wire_name(
        #[case] name: &str,
        #[case] expected: Option<Language>,
    ) {
        assert_eq!(Language::from_name(name), expected);
    }

    #[test]
    fn wire_names_match_display() {
        for theme in Theme::ALL {
            let json = serde_json::to_string(&theme).unwrap();
            assert_eq!(json, format!("\"{theme}\""));
        }
        for language in Language::ALL {
            let json = serde_json::to_string(&language).unwrap();
            assert_eq!(json, format!("\"{language}\""));
        }
    }
}
