//! Template records and the marketplace filter.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Landing Pages")]
    LandingPage,
    Blogging,
    #[serde(rename = "E-commerce")]
    Ecommerce,
    Portfolio,
    Dashboard,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::LandingPage,
        Self::Blogging,
        Self::Ecommerce,
        Self::Portfolio,
        Self::Dashboard,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::LandingPage => "Landing Pages",
            Self::Blogging => "Blogging",
            Self::Ecommerce => "E-commerce",
            Self::Portfolio => "Portfolio",
            Self::Dashboard => "Dashboard",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.label().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tech {
    React,
    #[serde(rename = "Tailwind CSS")]
    Tailwind,
    #[serde(rename = "Next.js")]
    NextJs,
    #[serde(rename = "HTML/CSS")]
    HtmlCss,
    Figma,
    Supabase,
}

impl Tech {
    pub fn label(&self) -> &'static str {
        match self {
            Self::React => "React",
            Self::Tailwind => "Tailwind CSS",
            Self::NextJs => "Next.js",
            Self::HtmlCss => "HTML/CSS",
            Self::Figma => "Figma",
            Self::Supabase => "Supabase",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Style {
    Minimal,
    Modern,
    Corporate,
    Creative,
}

impl Style {
    pub const ALL: [Style; 4] = [Self::Minimal, Self::Modern, Self::Corporate, Self::Creative];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Minimal => "Minimal",
            Self::Modern => "Modern",
            Self::Corporate => "Corporate",
            Self::Creative => "Creative",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|st| st.label().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown style: {s}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub tech_stack: Vec<Tech>,
    pub thumbnail: String,
    pub live_preview_url: String,
    pub download_url: String,
    pub style: Style,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl Template {
    pub fn tech_labels(&self) -> Vec<String> {
        self.tech_stack.iter().map(|t| t.label().to_string()).collect()
    }
}

/// Every criterion must hold for a template to match. `None` means "All".
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateFilter {
    pub search: String,
    pub category: Option<Category>,
    /// Inclusive.
    pub price_range: (f64, f64),
    pub style: Option<Style>,
}

impl Default for TemplateFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: None,
            price_range: (0.0, 100.0),
            style: None,
        }
    }
}

impl TemplateFilter {
    pub fn matches(&self, t: &Template) -> bool {
        let needle = self.search.to_lowercase();
        let (min, max) = self.price_range;

        (needle.is_empty() || t.title.to_lowercase().contains(&needle))
            && self.category.is_none_or(|c| c == t.category)
            && t.price >= min
            && t.price <= max
            && self.style.is_none_or(|s| s == t.style)
    }
}

/// Matching templates, in catalog order.
pub fn filter_templates<'a>(templates: &'a [Template], filter: &TemplateFilter) -> Vec<&'a Template> {
    templates.iter().filter(|t| filter.matches(t)).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Load a catalog from a JSON array of templates.
pub fn load_templates(path: &Path) -> Result<Vec<Template>, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, title: &str, price: f64, category: Category, style: Style) -> Template {
        Template {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            price,
            category,
            tech_stack: vec![Tech::React],
            thumbnail: String::new(),
            live_preview_url: "#".to_string(),
            download_url: "#".to_string(),
            style,
            created_at: 0,
        }
    }

    fn catalog() -> Vec<Template> {
        vec![
            template("1", "Nexus SaaS Landing Page", 29.0, Category::LandingPage, Style::Modern),
            template("2", "Inkwell Blog Theme", 0.0, Category::Blogging, Style::Minimal),
            template("3", "Vogue E-Commerce", 49.0, Category::Ecommerce, Style::Corporate),
            template("4", "Zenfolio Creative Portfolio", 15.0, Category::Portfolio, Style::Creative),
            template("5", "AdminPro Dashboard", 59.0, Category::Dashboard, Style::Modern),
        ]
    }

    fn ids(found: &[&Template]) -> Vec<String> {
        found.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn default_filter_keeps_everything_in_order() {
        let all = catalog();
        assert_eq!(
            ids(&filter_templates(&all, &TemplateFilter::default())),
            ["1", "2", "3", "4", "5"]
        );
    }

    #[test]
    fn search_is_case_insensitive_title_match() {
        let all = catalog();
        let filter = TemplateFilter {
            search: "PORTF".to_string(),
            ..TemplateFilter::default()
        };
        assert_eq!(ids(&filter_templates(&all, &filter)), ["4"]);
    }

    #[test]
    fn criteria_combine_with_and() {
        let all = catalog();
        let filter = TemplateFilter {
            search: String::new(),
            category: None,
            price_range: (20.0, 60.0),
            style: Some(Style::Modern),
        };
        assert_eq!(ids(&filter_templates(&all, &filter)), ["1", "5"]);

        let narrower = TemplateFilter {
            category: Some(Category::Dashboard),
            ..filter
        };
        assert_eq!(ids(&filter_templates(&all, &narrower)), ["5"]);
    }

    #[test]
    fn price_range_is_inclusive() {
        let all = catalog();
        let filter = TemplateFilter {
            price_range: (0.0, 0.0),
            ..TemplateFilter::default()
        };
        assert_eq!(ids(&filter_templates(&all, &filter)), ["2"]);
    }

    #[test]
    fn style_label_round_trips_through_parse() {
        for style in Style::ALL {
            assert_eq!(style.to_string().parse::<Style>(), Ok(style));
        }
        assert_eq!(Style::Corporate.to_string(), "Corporate");
        assert!("Brutalist".parse::<Style>().is_err());
    }

    #[test]
    fn category_parses_from_label() {
        assert_eq!("e-commerce".parse::<Category>(), Ok(Category::Ecommerce));
        assert_eq!("Landing Pages".parse::<Category>(), Ok(Category::LandingPage));
        assert!("Games".parse::<Category>().is_err());
    }

    #[test]
    fn templates_deserialize_from_camel_case_json() {
        let json = r##"[{
            "id": "9", "title": "T", "description": "d", "price": 12,
            "category": "E-commerce", "techStack": ["Next.js", "Tailwind CSS"],
            "thumbnail": "t", "livePreviewUrl": "#", "downloadUrl": "#",
            "style": "Corporate", "createdAt": 1700000000000
        }]"##;
        let parsed: Vec<Template> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].category, Category::Ecommerce);
        assert_eq!(parsed[0].tech_labels(), ["Next.js", "Tailwind CSS"]);
    }
}
