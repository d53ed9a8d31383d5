use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "electronique")]
    Electronics,
    #[serde(rename = "jewelery")]
    Jewelery,
    #[serde(rename = "men's clothing")]
    MensClothing,
    #[serde(rename = "women's clothing")]
    WomensClothing,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Electronics,
        Category::Jewelery,
        Category::MensClothing,
        Category::WomensClothing,
    ];

    /// Slug used in catalog URLs and product records.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Electronics => "electronique",
            Self::Jewelery => "jewelery",
            Self::MensClothing => "men's clothing",
            Self::WomensClothing => "women's clothing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

const ALIASES: &[(&str, Category)] = &[
    ("electronique", Category::Electronics),
    ("electronics", Category::Electronics),
    ("jewelery", Category::Jewelery),
    ("jewelry", Category::Jewelery),
    ("bijoux", Category::Jewelery),
    ("men's clothing", Category::MensClothing),
    ("mens clothing", Category::MensClothing),
    ("vetements homme", Category::MensClothing),
    ("vetement homme", Category::MensClothing),
    ("homme", Category::MensClothing),
    ("women's clothing", Category::WomensClothing),
    ("womens clothing", Category::WomensClothing),
    ("vetements femme", Category::WomensClothing),
    ("vetement femme", Category::WomensClothing),
    ("femme", Category::WomensClothing),
];

/// Lowercase, trim, decode `%27`/`%20`, fold typographic apostrophes and
/// strip diacritics.
pub fn slugify(raw: &str) -> String {
    let decoded = raw
        .replace("%27", "'")
        .replace("%20", " ")
        .replace(['\u{2019}', '\u{2018}'], "'");
    decoded
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

pub fn normalize_category(raw: &str) -> Option<Category> {
    let slug = slugify(raw);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == slug)
        .map(|(_, category)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_and_english_names_map_to_slugs() {
        assert_eq!(normalize_category("Électronique"), Some(Category::Electronics));
        assert_eq!(normalize_category("electronics"), Some(Category::Electronics));
        assert_eq!(normalize_category(" Bijoux "), Some(Category::Jewelery));
        assert_eq!(normalize_category("Vêtements Femme"), Some(Category::WomensClothing));
        assert_eq!(normalize_category("HOMME"), Some(Category::MensClothing));
    }

    #[test]
    fn url_encoded_apostrophes_are_decoded() {
        assert_eq!(normalize_category("men%27s clothing"), Some(Category::MensClothing));
        assert_eq!(normalize_category("women%27s%20clothing"), Some(Category::WomensClothing));
        assert_eq!(normalize_category("women\u{2019}s clothing"), Some(Category::WomensClothing));
    }

    #[test]
    fn unknown_categories_are_none() {
        assert_eq!(normalize_category("gaming"), None);
        assert_eq!(normalize_category(""), None);
        assert_eq!(slugify("Beauté"), "beaute");
    }

    #[test]
    fn slug_round_trips_through_serde() -> anyhow::Result<()> {
        for category in Category::ALL {
            let json = serde_json::to_string(&category)?;
            assert_eq!(json, format!("\"{}\"", category.slug()));
            assert_eq!(normalize_category(category.slug()), Some(category));
        }
        Ok(())
    }
}
