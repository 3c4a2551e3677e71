//! Product data models

use crate::core::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use url::Url;

/// Catalog item as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "productname", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
    #[serde(default, alias = "imageUrls")]
    pub images: Vec<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Price with two fraction digits, e.g. `$19.99`
    pub fn display_price(&self) -> String {
        format_price(&self.price)
    }

    /// First image reference, if any
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Format a price with a currency sign and two fraction digits
pub fn format_price(price: &Decimal) -> String {
    let rounded = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${:.2}", rounded)
}

/// Create/edit payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(rename = "productname")]
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, price: Decimal, stock: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            stock,
            images: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Pre-fill an edit form from an existing product
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            stock: product.stock,
            images: product.images.clone(),
        }
    }

    /// Field-level checks run before anything is sent
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation("Product name is required".to_string()));
        }

        if self.price < Decimal::ZERO {
            return Err(CatalogError::Validation("Price cannot be negative".to_string()));
        }

        if self.images.iter().any(|image| image.trim().is_empty()) {
            return Err(CatalogError::Validation("Image references cannot be blank".to_string()));
        }

        Ok(())
    }
}

/// Resolves product image references against the server base URL
#[derive(Debug, Clone)]
pub struct ImageResolver {
    base_url: String,
    fallback: String,
}

impl ImageResolver {
    pub fn new(base_url: &str, fallback: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback: fallback.into(),
        }
    }

    /// Absolute URLs pass through; relative paths are joined onto the base URL.
    /// A missing or blank reference resolves to the fallback image.
    pub fn resolve(&self, path: Option<&str>) -> String {
        let path = match path.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => self.fallback.as_str(),
        };

        if let Ok(url) = Url::parse(path) {
            if url.scheme() == "http" || url.scheme() == "https" {
                return path.to_string();
            }
        }

        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of the image shown for a product
    pub fn primary_image_url(&self, product: &Product) -> String {
        self.resolve(product.primary_image())
    }

    /// URLs of every image of a product, in order
    pub fn image_urls(&self, product: &Product) -> Vec<String> {
        if product.images.is_empty() {
            return vec![self.resolve(None)];
        }
        product
            .images
            .iter()
            .map(|image| self.resolve(Some(image)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lamp() -> Product {
        Product {
            id: "p1".to_string(),
            name: "Lamp".to_string(),
            description: String::new(),
            price: Decimal::new(1999, 2),
            stock: 5,
            images: vec![],
            created_at: None,
        }
    }

    #[test]
    fn test_deserialize_server_shape() {
        let product: Product = serde_json::from_value(json!({
            "_id": "65a1",
            "productname": "Desk",
            "description": "Oak",
            "price": 120.5,
            "stock": 3,
            "imageUrls": ["uploads/desk.png"],
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(product.id, "65a1");
        assert_eq!(product.name, "Desk");
        assert_eq!(product.price, Decimal::new(1205, 1));
        assert_eq!(product.images, vec!["uploads/desk.png".to_string()]);
        assert!(product.created_at.is_some());
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let product: Product = serde_json::from_value(json!({
            "_id": "1",
            "productname": "Mug",
            "price": 4,
            "stock": 0
        }))
        .unwrap();
        assert!(product.images.is_empty());
        assert_eq!(product.description, "");
    }

    #[test]
    fn test_display_price() {
        assert_eq!(lamp().display_price(), "$19.99");
        assert_eq!(format_price(&Decimal::new(5, 0)), "$5.00");
        assert_eq!(format_price(&Decimal::new(12345, 3)), "$12.35");
    }

    #[test]
    fn test_draft_validation() {
        let draft = ProductDraft::new("Lamp", Decimal::new(1999, 2), 5);
        assert!(draft.validate().is_ok());

        let blank = ProductDraft::new("   ", Decimal::ONE, 1);
        assert!(matches!(blank.validate(), Err(CatalogError::Validation(_))));

        let negative = ProductDraft::new("Lamp", Decimal::new(-1, 0), 1);
        assert!(matches!(negative.validate(), Err(CatalogError::Validation(_))));

        let free = ProductDraft::new("Sticker", Decimal::ZERO, 1);
        assert!(free.validate().is_ok());

        let bad_image = ProductDraft::new("Lamp", Decimal::ONE, 1).with_images(vec![" ".into()]);
        assert!(bad_image.validate().is_err());
    }

    #[test]
    fn test_draft_serializes_wire_names() {
        let draft = ProductDraft::new("Lamp", Decimal::new(1999, 2), 5).with_description("Desk lamp");
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["productname"], "Lamp");
        assert_eq!(value["price"], 19.99);
        assert_eq!(value["stock"], 5);
    }

    #[test]
    fn test_draft_from_product() {
        let mut product = lamp();
        product.images = vec!["a.png".into()];
        let draft = ProductDraft::from_product(&product);
        assert_eq!(draft.name, "Lamp");
        assert_eq!(draft.images, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_image_resolution() {
        let resolver = ImageResolver::new("http://localhost:5000/", "default-image.png");

        assert_eq!(
            resolver.resolve(Some("/uploads//lamp.png")),
            "http://localhost:5000/uploads//lamp.png"
        );
        assert_eq!(
            resolver.resolve(Some("https://cdn.example.com/lamp.png")),
            "https://cdn.example.com/lamp.png"
        );
        assert_eq!(resolver.resolve(None), "http://localhost:5000/default-image.png");
        assert_eq!(resolver.resolve(Some("")), "http://localhost:5000/default-image.png");
        assert_eq!(
            resolver.primary_image_url(&lamp()),
            "http://localhost:5000/default-image.png"
        );
        assert_eq!(resolver.image_urls(&lamp()).len(), 1);
    }
}
