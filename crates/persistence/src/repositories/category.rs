//! Category and installed-app repositories of the usage store.

use sqlx::SqlitePool;

use crate::entities::{AppInfoEntity, CategoryEntity};
use crate::metrics::QueryTimer;

/// Repository for usage categories.
#[derive(Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All categories in display order.
    pub async fn list(&self) -> Result<Vec<CategoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_categories");
        let result = sqlx::query_as::<_, CategoryEntity>(
            "SELECT id, name, sort_order, is_default FROM categories ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<CategoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_category_by_id");
        let result = sqlx::query_as::<_, CategoryEntity>(
            "SELECT id, name, sort_order, is_default FROM categories WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<CategoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_category_by_name");
        let result = sqlx::query_as::<_, CategoryEntity>(
            "SELECT id, name, sort_order, is_default FROM categories WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Add a user category after the existing ones.
    pub async fn create(&self, name: &str) -> Result<CategoryEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_category");
        let result = sqlx::query_as::<_, CategoryEntity>(
            r#"
            INSERT INTO categories (name, sort_order, is_default)
            VALUES (?1, (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM categories), 0)
            RETURNING id, name, sort_order, is_default
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete a user category. Seeded categories are kept.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_category");
        let result = sqlx::query("DELETE FROM categories WHERE id = ?1 AND is_default = 0")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

/// Repository for installed apps.
#[derive(Clone)]
pub struct AppInfoRepository {
    pool: SqlitePool,
}

impl AppInfoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh an app. Category and exclusion choices survive.
    pub async fn upsert(&self, app: &domain::models::AppInfo) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_app_info");
        let result = sqlx::query(
            r#"
            INSERT INTO app_info (package_name, app_name, version_name, category_id,
                                  is_system, is_enabled, is_excluded)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (package_name) DO UPDATE SET
                app_name = excluded.app_name,
                version_name = excluded.version_name,
                is_system = excluded.is_system,
                is_enabled = excluded.is_enabled
            "#,
        )
        .bind(&app.package_name)
        .bind(&app.app_name)
        .bind(&app.version_name)
        .bind(app.category_id)
        .bind(app.is_system)
        .bind(app.is_enabled)
        .bind(app.is_excluded)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn find(&self, package_name: &str) -> Result<Option<AppInfoEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_app_info");
        let result = sqlx::query_as::<_, AppInfoEntity>(
            r#"
            SELECT package_name, app_name, version_name, category_id, is_system, is_enabled, is_excluded
            FROM app_info
            WHERE package_name = ?1
            "#,
        )
        .bind(package_name)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list(&self) -> Result<Vec<AppInfoEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_app_info");
        let result = sqlx::query_as::<_, AppInfoEntity>(
            r#"
            SELECT package_name, app_name, version_name, category_id, is_system, is_enabled, is_excluded
            FROM app_info
            ORDER BY app_name
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Move an app to another category, including its recorded sessions.
    pub async fn set_category(&self, package_name: &str, category_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("set_app_category");
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE app_info SET category_id = ?1 WHERE package_name = ?2")
            .bind(category_id)
            .bind(package_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("UPDATE app_sessions SET category_id = ?1 WHERE package_name = ?2")
            .bind(category_id)
            .bind(package_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        timer.record();
        Ok(updated > 0)
    }

    pub async fn set_excluded(&self, package_name: &str, excluded: bool) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("set_app_excluded");
        let result = sqlx::query("UPDATE app_info SET is_excluded = ?1 WHERE package_name = ?2")
            .bind(excluded)
            .bind(package_name)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, run_tracker_migrations};
    use domain::models::AppInfo;

    async fn pool() -> SqlitePool {
        let pool = create_memory_pool().await.unwrap();
        run_tracker_migrations(&pool).await.unwrap();
        pool
    }

    fn app(category_id: i64) -> AppInfo {
        AppInfo {
            package_name: "com.example.video".to_string(),
            app_name: "Video".to_string(),
            version_name: Some("1.0".to_string()),
            category_id,
            is_system: false,
            is_enabled: true,
            is_excluded: false,
        }
    }

    #[tokio::test]
    async fn test_seeded_categories_in_order() {
        let repo = CategoryRepository::new(pool().await);
        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Entertainment", "Study", "Fitness", "Work", "Other"]);
    }

    #[tokio::test]
    async fn test_create_and_delete_user_category() {
        let repo = CategoryRepository::new(pool().await);
        let reading = repo.create("Reading").await.unwrap();
        assert_eq!(reading.sort_order, 5);
        assert!(!reading.is_default);
        assert!(repo.delete(reading.id).await.unwrap());

        let seeded = repo.find_by_name("Study").await.unwrap().unwrap();
        assert!(!repo.delete(seeded.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_keeps_user_choices() {
        let pool = pool().await;
        let apps = AppInfoRepository::new(pool.clone());
        apps.upsert(&app(1)).await.unwrap();
        apps.set_category("com.example.video", 2).await.unwrap();
        apps.set_excluded("com.example.video", true).await.unwrap();

        let mut refreshed = app(1);
        refreshed.version_name = Some("2.0".to_string());
        apps.upsert(&refreshed).await.unwrap();

        let stored = apps.find("com.example.video").await.unwrap().unwrap();
        assert_eq!(stored.category_id, 2);
        assert!(stored.is_excluded);
        assert_eq!(stored.version_name.as_deref(), Some("2.0"));
    }
}
