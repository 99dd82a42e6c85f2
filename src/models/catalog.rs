//! Owning entities. Only the fields this service reasons about are modelled:
//! the slug and the managed image fields.

use crate::storage::PublicUrlScheme;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use std::collections::HashSet;
use uuid::Uuid;

/// Document collections that carry a unique slug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Products,
    Categories,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Categories => "categories",
        }
    }

    /// Slug used when a name normalizes to nothing.
    pub fn default_slug(&self) -> &'static str {
        match self {
            Collection::Products => "product",
            Collection::Categories => "category",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub sku: String,
    pub name: String,
    pub image: String,
    pub gallery_images: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Managed URLs referenced by this product: the cover image followed by
    /// the de-duplicated gallery.
    pub fn managed_urls(&self, scheme: &PublicUrlScheme) -> Vec<String> {
        product_managed_urls(&self.image, &self.gallery_images, scheme)
    }
}

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub card_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn managed_urls(&self, scheme: &PublicUrlScheme) -> Vec<String> {
        category_managed_urls(&self.card_image, scheme)
    }
}

/// Fields of a product write.
#[derive(Clone, Debug, Default)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    pub image: String,
    pub gallery_images: Vec<String>,
}

/// Fields of a category write.
#[derive(Clone, Debug, Default)]
pub struct CategoryDraft {
    pub name: String,
    pub card_image: String,
}

fn product_managed_urls(
    image: &str,
    gallery: &[String],
    scheme: &PublicUrlScheme,
) -> Vec<String> {
    let image = image.trim();
    let mut all: Vec<&str> = Vec::with_capacity(gallery.len() + 1);
    if !image.is_empty() {
        all.push(image);
    }
    all.extend(gallery.iter().map(|url| url.as_str()));
    normalize_url_list(all)
        .into_iter()
        .filter(|url| scheme.is_managed(url))
        .collect()
}

fn category_managed_urls(card_image: &str, scheme: &PublicUrlScheme) -> Vec<String> {
    let card_image = card_image.trim();
    if card_image.is_empty() || !scheme.is_managed(card_image) {
        return Vec::new();
    }
    vec![card_image.to_string()]
}

/// Trim, drop empties and de-duplicate while keeping first-seen order.
pub fn normalize_url_list<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(|url| url.as_ref().trim().to_string())
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
