//! Multisite installs: one `blogs` table, one table set per blog.

use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};

use crate::errors::AppError;
use crate::models::BlogInfo;

use super::{Loader, LoaderOptions};

#[derive(Debug, Clone)]
pub struct Multisite {
    pool: AnyPool,
    prefix: String,
    options: LoaderOptions,
}

impl Multisite {
    /// `prefix` is the network prefix (`wp`, or `database.wp`).
    pub fn new(pool: AnyPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            options: LoaderOptions::default(),
        }
    }

    /// Options handed to every loader created by [`Multisite::loader_for`].
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Every blog except the network root, ordered by id.
    pub async fn blogs(&self) -> Result<Vec<BlogInfo>, AppError> {
        let sql = format!(
            "SELECT CAST(blog_id AS SIGNED) AS blog_id, CAST(site_id AS SIGNED) AS site_id, \
                    path, CAST(public AS SIGNED) AS public \
             FROM {}_blogs WHERE path <> '/' ORDER BY blog_id",
            self.prefix
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let blogs = rows
            .iter()
            .map(blog_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Found {} blogs under {}", blogs.len(), self.prefix);
        Ok(blogs)
    }

    /// One blog by id.
    pub async fn blog(&self, id: i64) -> Result<BlogInfo, AppError> {
        self.blogs()
            .await?
            .into_iter()
            .find(|blog| blog.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Blog {} not found under {}", id, self.prefix)))
    }

    /// Loader for one blog's tables; users stay on the network table.
    pub fn loader_for(&self, blog: &BlogInfo) -> Loader {
        Loader::new(self.pool.clone(), format!("{}_{}", self.prefix, blog.id))
            .with_users_table(format!("{}_users", self.prefix))
            .with_options(self.options.clone())
    }
}

fn blog_from_row(row: &AnyRow) -> Result<BlogInfo, sqlx::Error> {
    let path: String = row.try_get("path")?;
    let public: Option<i64> = row.try_get("public")?;
    Ok(BlogInfo {
        id: row.try_get("blog_id")?,
        site: row.try_get("site_id")?,
        name: path.replace('/', ""),
        public: public.unwrap_or(1) != 0,
    })
}
