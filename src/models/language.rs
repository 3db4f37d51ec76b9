//! Analyzed languages and the analyzer plugins that provide them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A language the mirror can synchronize findings and plugins for.
///
/// Variants are declared in the alphabetical order of their keys so that a
/// `BTreeSet<Language>` iterates in key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Abap,
    Apex,
    C,
    Cobol,
    Cpp,
    Cs,
    Css,
    Go,
    Ipynb,
    Java,
    Js,
    Kotlin,
    Php,
    Plsql,
    Py,
    Ruby,
    Scala,
    Secrets,
    Swift,
    Ts,
    Tsql,
    Web,
    Xml,
}

impl Language {
    /// Every known language, in key order.
    pub const ALL: [Language; 23] = [
        Language::Abap,
        Language::Apex,
        Language::C,
        Language::Cobol,
        Language::Cpp,
        Language::Cs,
        Language::Css,
        Language::Go,
        Language::Ipynb,
        Language::Java,
        Language::Js,
        Language::Kotlin,
        Language::Php,
        Language::Plsql,
        Language::Py,
        Language::Ruby,
        Language::Scala,
        Language::Secrets,
        Language::Swift,
        Language::Ts,
        Language::Tsql,
        Language::Web,
        Language::Xml,
    ];

    /// Language key as the server knows it (used in `languages=` query parameters).
    pub fn key(&self) -> &'static str {
        match self {
            Language::Abap => "abap",
            Language::Apex => "apex",
            Language::C => "c",
            Language::Cobol => "cobol",
            Language::Cpp => "cpp",
            Language::Cs => "cs",
            Language::Css => "css",
            Language::Go => "go",
            Language::Ipynb => "ipynb",
            Language::Java => "java",
            Language::Js => "js",
            Language::Kotlin => "kotlin",
            Language::Php => "php",
            Language::Plsql => "plsql",
            Language::Py => "py",
            Language::Ruby => "ruby",
            Language::Scala => "scala",
            Language::Secrets => "secrets",
            Language::Swift => "swift",
            Language::Ts => "ts",
            Language::Tsql => "tsql",
            Language::Web => "web",
            Language::Xml => "xml",
        }
    }

    /// Keys of the plugins that can analyze this language.
    ///
    /// The first key is the current plugin; later keys are historical plugins
    /// that some servers still host (e.g. the standalone `typescript` plugin).
    pub fn plugin_keys(&self) -> &'static [&'static str] {
        match self {
            Language::Abap => &["abap"],
            Language::Apex => &["sonarapex"],
            Language::C | Language::Cpp => &["cpp"],
            Language::Cobol => &["cobol"],
            Language::Cs => &["csharp"],
            Language::Css => &["javascript", "css"],
            Language::Go => &["go"],
            Language::Ipynb | Language::Py => &["python"],
            Language::Java => &["java"],
            Language::Js => &["javascript"],
            Language::Kotlin => &["kotlin"],
            Language::Php => &["php"],
            Language::Plsql => &["plsql"],
            Language::Ruby => &["ruby"],
            Language::Scala => &["sonarscala"],
            Language::Secrets => &["text"],
            Language::Swift => &["swift"],
            Language::Ts => &["javascript", "typescript"],
            Language::Tsql => &["tsql"],
            Language::Web => &["web"],
            Language::Xml => &["xml"],
        }
    }

    /// Minimal plugin version able to run in the local analysis engine.
    pub fn min_plugin_version(&self) -> Option<&'static str> {
        match self {
            Language::Java => Some("5.13.1.18282"),
            Language::Js | Language::Ts | Language::Css => Some("2.0"),
            Language::Py | Language::Ipynb => Some("1.9"),
            Language::Php => Some("2.13"),
            Language::C | Language::Cpp => Some("6.0"),
            Language::Kotlin => Some("1.5"),
            Language::Xml => Some("1.4"),
            _ => None,
        }
    }

    /// Look a language up by its server key.
    pub fn from_key(key: &str) -> Option<Language> {
        Language::ALL.iter().copied().find(|lang| lang.key() == key)
    }

    /// Languages served by the plugin with the given key.
    pub fn for_plugin_key(plugin_key: &str) -> Vec<Language> {
        Language::ALL
            .iter()
            .copied()
            .filter(|lang| lang.plugin_keys().contains(&plugin_key))
            .collect()
    }

    /// Comma-separated keys of a language set, in key order.
    pub fn join_keys(languages: &BTreeSet<Language>) -> String {
        languages.iter().map(|l| l.key()).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_key(&s.to_lowercase()).ok_or_else(|| {
            let valid: Vec<&str> = Language::ALL.iter().map(|l| l.key()).collect();
            format!("Unknown language '{}'. Valid languages: {}", s, valid.join(", "))
        })
    }
}
