//! Document-store access for the owning entities.
//!
//! Besides plain reads and writes this answers the two questions the rest of
//! the service asks of the catalog: "is this slug taken?" and "does anything
//! still point at this URL?".

use crate::models::catalog::{Category, CategoryDraft, Collection, Product, ProductDraft};
use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "id, slug, sku, name, image, gallery_images, created_at, updated_at";
const CATEGORY_COLUMNS: &str = "id, slug, name, card_image, created_at, updated_at";

#[derive(Clone)]
pub struct CatalogRepo {
    db: SqlitePool,
}

impl CatalogRepo {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Whether `slug` is used in `collection` by any row other than `exclude_id`.
    pub async fn slug_exists(
        &self,
        collection: Collection,
        slug: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        let sql = match exclude_id {
            Some(_) => format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ? AND id != ?)",
                collection.table()
            ),
            None => format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?)",
                collection.table()
            ),
        };
        let mut query = sqlx::query_scalar::<_, bool>(&sql).bind(slug);
        if let Some(id) = exclude_id {
            query = query.bind(id);
        }
        query.fetch_one(&self.db).await
    }

    /// Live references to `url` across every owning collection:
    /// `products.image`, `products.gallery_images` and `categories.card_image`.
    pub async fn count_references(&self, url: &str) -> Result<i64, sqlx::Error> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(0);
        }

        let products = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products
             WHERE image = ?
                OR EXISTS (
                    SELECT 1 FROM json_each(products.gallery_images)
                     WHERE json_each.value = ?
                )",
        )
        .bind(url)
        .bind(url)
        .fetch_one(&self.db);
        let categories = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM categories WHERE card_image = ?",
        )
        .bind(url)
        .fetch_one(&self.db);

        let (products, categories) = futures::try_join!(products, categories)?;
        Ok(products + categories)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn insert_product(
        &self,
        slug: &str,
        draft: &ProductDraft,
    ) -> Result<Product, sqlx::Error> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(Uuid::new_v4())
            .bind(slug)
            .bind(draft.sku.trim())
            .bind(draft.name.trim())
            .bind(draft.image.trim())
            .bind(Json(trimmed(&draft.gallery_images)))
            .bind(now)
            .bind(now)
            .fetch_one(&self.db)
            .await
    }

    pub async fn update_product(
        &self,
        id: Uuid,
        slug: &str,
        draft: &ProductDraft,
    ) -> Result<Option<Product>, sqlx::Error> {
        let sql = format!(
            "UPDATE products
             SET slug = ?, sku = ?, name = ?, image = ?, gallery_images = ?, updated_at = ?
             WHERE id = ?
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(slug)
            .bind(draft.sku.trim())
            .bind(draft.name.trim())
            .bind(draft.image.trim())
            .bind(Json(trimmed(&draft.gallery_images)))
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        let sql = format!("DELETE FROM products WHERE id = ? RETURNING {PRODUCT_COLUMNS}");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Option<Category>, sqlx::Error> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?");
        sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn insert_category(
        &self,
        slug: &str,
        draft: &CategoryDraft,
    ) -> Result<Category, sqlx::Error> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {CATEGORY_COLUMNS}"
        );
        sqlx::query_as::<_, Category>(&sql)
            .bind(Uuid::new_v4())
            .bind(slug)
            .bind(draft.name.trim())
            .bind(draft.card_image.trim())
            .bind(now)
            .bind(now)
            .fetch_one(&self.db)
            .await
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        slug: &str,
        draft: &CategoryDraft,
    ) -> Result<Option<Category>, sqlx::Error> {
        let sql = format!(
            "UPDATE categories SET slug = ?, name = ?, card_image = ?, updated_at = ?
             WHERE id = ?
             RETURNING {CATEGORY_COLUMNS}"
        );
        sqlx::query_as::<_, Category>(&sql)
            .bind(slug)
            .bind(draft.name.trim())
            .bind(draft.card_image.trim())
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn delete_category(&self, id: Uuid) -> Result<Option<Category>, sqlx::Error> {
        let sql = format!("DELETE FROM categories WHERE id = ? RETURNING {CATEGORY_COLUMNS}");
        sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }
}

fn trimmed(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const URL: &str = "https://cdn.example.com/dev/products/2026/10/a.png";

    async fn repo() -> CatalogRepo {
        CatalogRepo::new(db::memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn references_are_counted_across_collections() {
        let repo = repo().await;
        assert_eq!(repo.count_references(URL).await.unwrap(), 0);

        repo.insert_product(
            "hook",
            &ProductDraft {
                name: "Hook".into(),
                sku: "H-1".into(),
                image: "https://elsewhere.test/cover.png".into(),
                gallery_images: vec![URL.into()],
            },
        )
        .await
        .unwrap();
        repo.insert_product(
            "strap",
            &ProductDraft {
                name: "Strap".into(),
                sku: "S-1".into(),
                image: URL.into(),
                gallery_images: vec![],
            },
        )
        .await
        .unwrap();
        repo.insert_category(
            "towing",
            &CategoryDraft {
                name: "Towing".into(),
                card_image: URL.into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(repo.count_references(URL).await.unwrap(), 3);
        assert_eq!(repo.count_references("").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slug_exists_honours_exclusion() {
        let repo = repo().await;
        let category = repo
            .insert_category(
                "chains",
                &CategoryDraft {
                    name: "Chains".into(),
                    card_image: String::new(),
                },
            )
            .await
            .unwrap();

        assert!(repo.slug_exists(Collection::Categories, "chains", None).await.unwrap());
        assert!(
            !repo
                .slug_exists(Collection::Categories, "chains", Some(category.id))
                .await
                .unwrap()
        );
        assert!(!repo.slug_exists(Collection::Products, "chains", None).await.unwrap());
    }

    #[tokio::test]
    async fn gallery_round_trips_as_json() {
        let repo = repo().await;
        let product = repo
            .insert_product(
                "hook",
                &ProductDraft {
                    name: "Hook".into(),
                    sku: "H-1".into(),
                    image: URL.into(),
                    gallery_images: vec![" b ".into(), "".into(), "c".into()],
                },
            )
            .await
            .unwrap();
        let loaded = repo.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(loaded.gallery_images.0, vec!["b".to_string(), "c".to_string()]);

        let removed = repo.delete_product(product.id).await.unwrap();
        assert!(removed.is_some());
        assert!(repo.get_product(product.id).await.unwrap().is_none());
    }
}
