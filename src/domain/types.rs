//! Shared domain enumerations aligned with the values stored remotely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Closed set of post categories. Stored remotely as the literal label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "Yazı")]
    Yazi,
    #[serde(rename = "Şiir")]
    Siir,
    #[serde(rename = "Anı")]
    Ani,
    #[serde(rename = "Deneme")]
    Deneme,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Yazi,
        Category::Siir,
        Category::Ani,
        Category::Deneme,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Yazi => "Yazı",
            Category::Siir => "Şiir",
            Category::Ani => "Anı",
            Category::Deneme => "Deneme",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim())
            .ok_or_else(|| {
                DomainError::validation("category", format!("unknown category `{value}`"))
            })
    }
}

impl TryFrom<&str> for Category {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Publish-date ordering applied by the filter engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest",
            SortOrder::OldestFirst => "oldest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_labels() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = "Roman".parse::<Category>().expect_err("not in the closed set");
        assert!(matches!(
            err,
            DomainError::Validation {
                field: "category",
                ..
            }
        ));
    }

    #[test]
    fn category_serializes_as_label() {
        let encoded = serde_json::to_string(&Category::Siir).expect("encode");
        assert_eq!(encoded, "\"Şiir\"");
        let decoded: Category = serde_json::from_str("\"Anı\"").expect("decode");
        assert_eq!(decoded, Category::Ani);
    }
}
