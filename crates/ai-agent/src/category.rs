use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Intent domains that partition the tool registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "GREETING")]
    Greeting,
    #[serde(rename = "TODO")]
    Todo,
    #[serde(rename = "SYSTEM")]
    System,
    #[serde(rename = "BROWSER")]
    Browser,
    #[serde(rename = "DESKTOP")]
    Desktop,
    #[serde(rename = "WEB_SEARCH")]
    WebSearch,
    #[serde(rename = "ALL")]
    All,
}

impl Category {
    /// Every category, in the order they are presented to the classifier.
    pub const ALL: [Category; 7] = [
        Category::Greeting,
        Category::Todo,
        Category::System,
        Category::Browser,
        Category::Desktop,
        Category::WebSearch,
        Category::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::Todo => "TODO",
            Self::System => "SYSTEM",
            Self::Browser => "BROWSER",
            Self::Desktop => "DESKTOP",
            Self::WebSearch => "WEB_SEARCH",
            Self::All => "ALL",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Greeting => "Simple conversation, greetings, or small talk. No tools needed.",
            Self::Todo => "Tasks related to managing todo lists (adding, listing).",
            Self::System => {
                "System-level operations like opening applications (notepad, chrome), listing \
                 files, reading/writing files, system status, volume control, and media control."
            }
            Self::Browser => {
                "Web browser automation (navigating, clicking, typing on web pages)."
            }
            Self::Desktop => {
                "Desktop automation (interacting with windows, mouse movements, keyboard typing)."
            }
            Self::WebSearch => "Searching the internet for information.",
            Self::All => {
                "General fallback when multiple tools from different categories might be needed."
            }
        }
    }

    /// Exact match against the canonical upper-case labels.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GREETING" => Some(Self::Greeting),
            "TODO" => Some(Self::Todo),
            "SYSTEM" => Some(Self::System),
            "BROWSER" => Some(Self::Browser),
            "DESKTOP" => Some(Self::Desktop),
            "WEB_SEARCH" => Some(Self::WebSearch),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }

    /// The catch-all category binds the union of every other category's tools.
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Categories that never bind any tool.
    pub fn binds_no_tools(&self) -> bool {
        matches!(self, Self::Greeting)
    }

    /// Whether a tool descriptor may be filed under this category.
    pub fn accepts_tools(&self) -> bool {
        !self.is_catch_all() && !self.binds_no_tools()
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
