//! Resource kinds and their static configuration

use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical database holding the support-engagement tables.
pub const SUPPORT_ENGAGEMENT_DB: &str = "support_engagement";
/// Logical database holding device registration and mapping tables.
pub const DEVICE_MANAGEMENT_DB: &str = "devicemanagement";

/// Every resource the suite knows how to create, fetch and verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Device,
    FaqCategory,
    FaqSubcategory,
    Faq,
    FaqResource,
    Issue,
    Resource,
    Banner,
    Quote,
    MarketingCarousel,
}

/// Static, read-only description of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceConfig {
    pub display_name: &'static str,
    pub plural_name: &'static str,
    /// Environment variable holding the collection endpoint template.
    pub endpoint_var: &'static str,
    pub id_field: &'static str,
    /// Key of the create template in the fixture file.
    pub fixture_key: &'static str,
    pub database: &'static str,
    pub table: &'static str,
    /// Kind whose id is injected into create bodies of this kind.
    pub parent: Option<ResourceKind>,
    /// Kind of the records returned after the primary one on create.
    pub dependent: Option<ResourceKind>,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Device,
        ResourceKind::FaqCategory,
        ResourceKind::FaqSubcategory,
        ResourceKind::Faq,
        ResourceKind::FaqResource,
        ResourceKind::Issue,
        ResourceKind::Resource,
        ResourceKind::Banner,
        ResourceKind::Quote,
        ResourceKind::MarketingCarousel,
    ];

    pub const fn config(self) -> ResourceConfig {
        match self {
            ResourceKind::Device => ResourceConfig {
                display_name: "Device",
                plural_name: "Devices",
                endpoint_var: "DEVICE_REGISTER_ENDPOINT",
                id_field: "device_id",
                fixture_key: "saveDevice",
                database: DEVICE_MANAGEMENT_DB,
                table: "device_registration",
                parent: None,
                dependent: None,
            },
            ResourceKind::FaqCategory => ResourceConfig {
                display_name: "FAQ Category",
                plural_name: "FAQ Categories",
                endpoint_var: "CATEGORIES_ENDPOINT",
                id_field: "category_id",
                fixture_key: "categories",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "faq_categories",
                parent: None,
                dependent: None,
            },
            ResourceKind::FaqSubcategory => ResourceConfig {
                display_name: "FAQ Subcategory",
                plural_name: "FAQ Subcategories",
                endpoint_var: "SUB_CATEGORIES_ENDPOINT",
                id_field: "sub_category_id",
                fixture_key: "sub-category",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "faq_subcategories",
                parent: Some(ResourceKind::FaqCategory),
                dependent: None,
            },
            ResourceKind::Faq => ResourceConfig {
                display_name: "FAQ",
                plural_name: "FAQs",
                endpoint_var: "FAQ_ENDPOINT",
                id_field: "faq_id",
                fixture_key: "faq",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "faqs",
                parent: Some(ResourceKind::FaqSubcategory),
                dependent: Some(ResourceKind::FaqResource),
            },
            ResourceKind::FaqResource => ResourceConfig {
                display_name: "FAQ Resource",
                plural_name: "FAQ Resources",
                endpoint_var: "RESOURCES_ENDPOINT",
                id_field: "resource_id",
                fixture_key: "resource",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "faq_resources",
                parent: None,
                dependent: None,
            },
            ResourceKind::Issue => ResourceConfig {
                display_name: "Issue",
                plural_name: "Issues",
                endpoint_var: "ISSUES_ENDPOINT",
                id_field: "issue_id",
                fixture_key: "issue",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "issues",
                parent: None,
                dependent: None,
            },
            ResourceKind::Resource => ResourceConfig {
                display_name: "Resource",
                plural_name: "Resources",
                endpoint_var: "RESOURCES_ENDPOINT",
                id_field: "resource_id",
                fixture_key: "resource",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "resources",
                parent: None,
                dependent: None,
            },
            ResourceKind::Banner => ResourceConfig {
                display_name: "Banner",
                plural_name: "Banners",
                endpoint_var: "BANNER_ENDPOINT",
                id_field: "banner_id",
                fixture_key: "banner",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "banners",
                parent: None,
                dependent: None,
            },
            ResourceKind::Quote => ResourceConfig {
                display_name: "Quote",
                plural_name: "Quotes",
                endpoint_var: "QUOTE_OF_THE_DAY_ENDPOINT",
                id_field: "quote_id",
                fixture_key: "quote",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "quote_of_the_day",
                parent: None,
                dependent: None,
            },
            ResourceKind::MarketingCarousel => ResourceConfig {
                display_name: "Marketing Carousel",
                plural_name: "Marketing Carousels",
                endpoint_var: "MARKETING_CAROUSEL_ENDPOINT",
                id_field: "carousel_item_id",
                fixture_key: "marketing-carousel",
                database: SUPPORT_ENGAGEMENT_DB,
                table: "marketing_carousel",
                parent: None,
                dependent: None,
            },
        }
    }

    pub fn id_field(self) -> &'static str {
        self.config().id_field
    }

    /// Normalized name used as the registry key, e.g. `FAQ_CATEGORY`.
    pub fn registry_key(self) -> String {
        normalize_type_name(self.config().display_name)
    }

    /// Fixture key of the update template, e.g. `categories-update`.
    pub fn update_fixture_key(self) -> String {
        format!("{}-update", self.config().fixture_key)
    }

    /// Kind whose id field is `field`. Shared id fields resolve to the first
    /// kind in declaration order.
    pub fn from_id_field(field: &str) -> Option<ResourceKind> {
        Self::ALL.into_iter().find(|kind| kind.id_field() == field)
    }

    /// Parses a singular or plural display name and reports whether it was plural.
    pub fn parse_with_plurality(name: &str) -> Result<(ResourceKind, bool)> {
        let normalized = normalize_type_name(name);
        for kind in Self::ALL {
            let config = kind.config();
            if normalize_type_name(config.display_name) == normalized {
                return Ok((kind, false));
            }
            if normalize_type_name(config.plural_name) == normalized {
                return Ok((kind, true));
            }
        }
        Err(ProbeError::UnknownResource {
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().display_name)
    }
}

impl FromStr for ResourceKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_plurality(s).map(|(kind, _)| kind)
    }
}

/// Uppercases a resource-type name and joins its words with underscores.
pub fn normalize_type_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}
