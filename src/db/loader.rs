//! Loader: reads one blog's options, terms, posts and users.
//!
//! Every query is a single statement with `?` placeholders. Integer columns
//! are selected through `CAST(.. AS SIGNED)` and dates through
//! `CAST(.. AS CHAR)` so both MySQL and SQLite hand back plain integers and
//! strings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, Offset, SubsecRound, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};

use crate::config::Config;
use crate::errors::AppError;
use crate::metadata::{ArchiveIndex, MetadataStore, Options};
use crate::models::{
    format_gmt_date, gallery_ids, parse_dimensions, parse_gmt_date, Image, Post, PostId,
    PostStatus, RawTerm, Taxonomy, TermId, TermSnapshot, User, UserId,
};

use super::placeholders;

/// What the loader reads besides the fixed columns.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Option names to load; every option when `None`
    pub option_keys: Option<Vec<String>>,
    /// Post meta keys attached to each post
    pub postmeta_keys: Vec<String>,
    /// Offset the archive buckets posts by
    pub archive_offset: FixedOffset,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            option_keys: None,
            postmeta_keys: Vec::new(),
            archive_offset: Utc.fix(),
        }
    }
}

/// Selects posts for [`Loader::load_posts`].
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    /// A single post by id, regardless of status
    pub id: Option<PostId>,
    /// Only published posts modified at or after this second...
    pub since: Option<DateTime<Utc>>,
    /// ...or whose id is in this set
    pub scheduled: Vec<PostId>,
}

impl PostQuery {
    pub fn by_id(id: PostId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn modified_since(since: DateTime<Utc>, scheduled: Vec<PostId>) -> Self {
        Self {
            id: None,
            since: Some(since),
            scheduled,
        }
    }
}

/// Result of a full blog load.
#[derive(Debug)]
pub struct LoadedBlog {
    /// Published posts, newest first
    pub posts: Vec<Post>,
    pub store: MetadataStore,
    pub options: Options,
    pub users: HashMap<UserId, User>,
}

/// Database reader for one blog.
#[derive(Debug, Clone)]
pub struct Loader {
    pool: AnyPool,
    prefix: String,
    users_table: String,
    options: LoaderOptions,
}

impl Loader {
    /// Loader for tables named `<prefix>_<table>`, users included.
    pub fn new(pool: AnyPool, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            pool,
            users_table: format!("{}_users", prefix),
            prefix,
            options: LoaderOptions::default(),
        }
    }

    /// Loader for the blog selected by the configuration.
    pub fn from_config(pool: AnyPool, config: &Config) -> Self {
        Self::new(pool, config.qualified_prefix())
            .with_users_table(format!("{}_users", config.network_prefix()))
            .with_options(LoaderOptions {
                option_keys: config.option_keys.clone(),
                postmeta_keys: config.postmeta_keys.clone(),
                archive_offset: config.archive_offset,
            })
    }

    pub fn with_users_table(mut self, table: impl Into<String>) -> Self {
        self.users_table = table.into();
        self
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    fn table(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// Empty archive using the configured offset.
    pub fn empty_archive(&self) -> ArchiveIndex {
        ArchiveIndex::with_offset(self.options.archive_offset)
    }

    // ==================== OPTIONS ====================

    /// Blog options, restricted to `keys` when given.
    pub async fn load_metadata(&self, keys: Option<&[String]>) -> Result<Options, AppError> {
        let mut sql = format!(
            "SELECT option_name, option_value FROM {}",
            self.table("options")
        );
        if let Some(keys) = keys {
            if keys.is_empty() {
                return Ok(Options::new());
            }
            sql.push_str(&format!(" WHERE option_name IN ({})", placeholders(keys.len())));
        }

        let mut query = sqlx::query(&sql);
        for key in keys.unwrap_or_default() {
            query = query.bind(key.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut options = Options::new();
        for row in &rows {
            let name: String = row.try_get("option_name")?;
            let value: Option<String> = row.try_get("option_value")?;
            options.insert(name, value.unwrap_or_default());
        }
        Ok(options)
    }

    /// Options named by the loader configuration.
    pub async fn load_configured_metadata(&self) -> Result<Options, AppError> {
        self.load_metadata(self.options.option_keys.as_deref()).await
    }

    /// Insert or overwrite one option.
    pub async fn set_option(&self, key: &str, value: &str) -> Result<(), AppError> {
        let sql = format!(
            "REPLACE INTO {} (option_name, option_value) VALUES (?, ?)",
            self.table("options")
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Set option {}", key);
        Ok(())
    }

    // ==================== TERMS ====================

    /// Every term with its taxonomy and parent.
    ///
    /// Parents are resolved through a self-join on the same taxonomy, so a
    /// term can only hang below a term of its own taxonomy and tags never get
    /// a parent.
    pub async fn load_terms(&self) -> Result<TermSnapshot, AppError> {
        let sql = format!(
            "SELECT CAST(taxonomy.term_taxonomy_id AS SIGNED) AS id, \
                    terms.name AS name, \
                    terms.slug AS slug, \
                    taxonomy.taxonomy AS taxonomy, \
                    CAST(parent.term_taxonomy_id AS SIGNED) AS parent_id \
             FROM {tt} taxonomy \
             INNER JOIN {t} terms ON terms.term_id = taxonomy.term_id \
             LEFT JOIN {tt} parent ON parent.term_id = taxonomy.parent \
                  AND parent.taxonomy = taxonomy.taxonomy \
                  AND taxonomy.taxonomy <> 'post_tag' \
             ORDER BY taxonomy.term_taxonomy_id",
            tt = self.table("term_taxonomy"),
            t = self.table("terms"),
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut snapshot = TermSnapshot::new();
        for row in &rows {
            snapshot.insert(raw_term_from_row(row)?)?;
        }

        tracing::debug!("Loaded {} terms", snapshot.len());
        Ok(snapshot)
    }

    /// Term ids related to each post, for all posts or only `post_ids`.
    pub async fn load_term_relationships(
        &self,
        post_ids: Option<&[PostId]>,
    ) -> Result<HashMap<PostId, Vec<TermId>>, AppError> {
        let mut sql = format!(
            "SELECT CAST(object_id AS SIGNED) AS object_id, \
                    CAST(term_taxonomy_id AS SIGNED) AS term_id \
             FROM {}",
            self.table("term_relationships")
        );
        if let Some(ids) = post_ids {
            if ids.is_empty() {
                return Ok(HashMap::new());
            }
            sql.push_str(&format!(" WHERE object_id IN ({})", placeholders(ids.len())));
        }
        sql.push_str(" ORDER BY object_id, term_taxonomy_id");

        let mut query = sqlx::query(&sql);
        for id in post_ids.unwrap_or_default() {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut relationships: HashMap<PostId, Vec<TermId>> = HashMap::new();
        for row in &rows {
            let post_id: i64 = row.try_get("object_id")?;
            let term_id: i64 = row.try_get("term_id")?;
            relationships.entry(post_id).or_default().push(term_id);
        }
        Ok(relationships)
    }

    // ==================== POSTS ====================

    /// Meta values with one of `keys`, grouped by post, for all posts or only
    /// `post_ids`. The first row wins when a post repeats a key.
    pub async fn load_post_meta(
        &self,
        keys: &[String],
        post_ids: Option<&[PostId]>,
    ) -> Result<HashMap<PostId, BTreeMap<String, String>>, AppError> {
        if keys.is_empty() || post_ids.is_some_and(|ids| ids.is_empty()) {
            return Ok(HashMap::new());
        }
        let mut sql = format!(
            "SELECT CAST(post_id AS SIGNED) AS post_id, meta_key, meta_value \
             FROM {} WHERE meta_key IN ({})",
            self.table("postmeta"),
            placeholders(keys.len())
        );
        if let Some(ids) = post_ids {
            sql.push_str(&format!(" AND post_id IN ({})", placeholders(ids.len())));
        }
        sql.push_str(" ORDER BY meta_id");

        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(key.as_str());
        }
        for id in post_ids.unwrap_or_default() {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut meta: HashMap<PostId, BTreeMap<String, String>> = HashMap::new();
        for row in &rows {
            let post_id: i64 = row.try_get("post_id")?;
            let key: String = row.try_get("meta_key")?;
            let value: Option<String> = row.try_get("meta_value")?;
            meta.entry(post_id)
                .or_default()
                .entry(key)
                .or_insert_with(|| value.unwrap_or_default());
        }
        Ok(meta)
    }

    /// Published posts newest first, with thumbnail, gallery and configured meta.
    ///
    /// Terms and authors are not bound here; see [`Loader::attach`].
    pub async fn load_posts(&self, query: &PostQuery) -> Result<Vec<Post>, AppError> {
        let mut sql = format!(
            "SELECT CAST(post.ID AS SIGNED) AS id, \
                    post.post_title AS title, \
                    post.post_content AS content, \
                    post.post_excerpt AS excerpt, \
                    CAST(post.post_date_gmt AS CHAR) AS date_gmt, \
                    CAST(post.post_modified_gmt AS CHAR) AS modified_gmt, \
                    post.post_name AS name, \
                    CAST(post.post_author AS SIGNED) AS author, \
                    thumb.guid AS thumbnail, \
                    thumb_crop.meta_value AS thumbnail_crop, \
                    thumb_meta.meta_value AS thumbnail_metadata \
             FROM {posts} post \
             LEFT JOIN {meta} thumb_id ON thumb_id.post_id = post.ID \
                  AND thumb_id.meta_key = '_thumbnail_id' \
             LEFT JOIN {posts} thumb ON thumb.ID = thumb_id.meta_value \
             LEFT JOIN {meta} thumb_crop ON thumb_crop.post_id = thumb.ID \
                  AND thumb_crop.meta_key = 'crop' \
             LEFT JOIN {meta} thumb_meta ON thumb_meta.post_id = thumb.ID \
                  AND thumb_meta.meta_key = '_wp_attachment_metadata'",
            posts = self.table("posts"),
            meta = self.table("postmeta"),
        );

        if query.id.is_some() {
            sql.push_str(" WHERE post.ID = ?");
        } else {
            sql.push_str(" WHERE post.post_status = 'publish' AND post.post_type = 'post'");
            if query.since.is_some() {
                if query.scheduled.is_empty() {
                    sql.push_str(" AND post.post_modified_gmt >= ?");
                } else {
                    sql.push_str(&format!(
                        " AND (post.post_modified_gmt >= ? OR post.ID IN ({}))",
                        placeholders(query.scheduled.len())
                    ));
                }
            }
        }
        sql.push_str(" ORDER BY post.post_date_gmt DESC, post.ID DESC");

        // The column has whole-second precision: round down so a post saved
        // within the window's first second is still included
        let since = query.since.map(|since| format_gmt_date(since.trunc_subsecs(0)));
        let mut statement = sqlx::query(&sql);
        if let Some(id) = query.id {
            statement = statement.bind(id);
        } else if let Some(since) = &since {
            statement = statement.bind(since.as_str());
            for id in &query.scheduled {
                statement = statement.bind(*id);
            }
        }

        let rows = statement.fetch_all(&self.pool).await?;

        let mut posts: Vec<Post> = Vec::with_capacity(rows.len());
        for row in &rows {
            let post = post_from_row(row)?;
            // A post whose thumbnail has repeated meta rows joins more than once
            if posts.last().is_some_and(|last| last.id == post.id) {
                continue;
            }
            posts.push(post);
        }

        let ids: Vec<PostId> = posts.iter().map(|post| post.id).collect();
        let image_ids: Vec<PostId> = posts
            .iter()
            .flat_map(|post| post.gallery.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // A full load reads every post's meta in one pass
        let meta_filter = if query.id.is_none() && query.since.is_none() {
            None
        } else {
            Some(ids.as_slice())
        };
        let (mut meta, images) = tokio::try_join!(
            self.load_post_meta(&self.options.postmeta_keys, meta_filter),
            self.load_images(&image_ids),
        )?;

        for post in &mut posts {
            if let Some(values) = meta.remove(&post.id) {
                post.meta = values;
            }
            for (id, image) in post.gallery.iter_mut() {
                *image = images.get(id).cloned();
            }
        }
        Ok(posts)
    }

    /// Attachments by id with their url, caption and dimensions.
    pub async fn load_images(&self, ids: &[PostId]) -> Result<HashMap<PostId, Image>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT CAST(image.ID AS SIGNED) AS id, image.guid AS url, \
                    image.post_excerpt AS caption, meta.meta_value AS metadata \
             FROM {posts} image \
             LEFT JOIN {meta} meta ON meta.post_id = image.ID \
                  AND meta.meta_key = '_wp_attachment_metadata' \
             WHERE image.ID IN ({ids})",
            posts = self.table("posts"),
            meta = self.table("postmeta"),
            ids = placeholders(ids.len()),
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut images = HashMap::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            if images.contains_key(&id) {
                continue;
            }
            images.insert(id, image_from_row(row)?);
        }
        Ok(images)
    }

    /// One post by id, whatever its status.
    pub async fn load_post(&self, id: PostId) -> Result<Option<Post>, AppError> {
        let mut posts = self.load_posts(&PostQuery::by_id(id)).await?;
        Ok(posts.pop())
    }

    /// Posts that are scheduled, drafted or trashed.
    pub async fn load_unpublished_posts(&self) -> Result<BTreeMap<PostId, PostStatus>, AppError> {
        let sql = format!(
            "SELECT CAST(ID AS SIGNED) AS id, post_status FROM {} \
             WHERE post_type = 'post' AND post_status IN ('future', 'draft', 'trash')",
            self.table("posts")
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut statuses = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let status: String = row.try_get("post_status")?;
            if let Some(status) = PostStatus::parse(&status) {
                statuses.insert(id, status);
            }
        }
        Ok(statuses)
    }

    /// Replace every value of `key` on a post with `value`.
    pub async fn set_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<(), AppError> {
        let table = self.table("postmeta");
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {} WHERE post_id = ? AND meta_key = ?", table))
            .bind(post_id)
            .bind(key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "INSERT INTO {} (post_id, meta_key, meta_value) VALUES (?, ?, ?)",
            table
        ))
        .bind(post_id)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Set meta {} on post {}", key, post_id);
        Ok(())
    }

    // ==================== USERS ====================

    pub async fn load_users(&self) -> Result<HashMap<UserId, User>, AppError> {
        let sql = format!(
            "SELECT CAST(ID AS SIGNED) AS id, user_login, user_email, display_name FROM {}",
            self.users_table
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut users = HashMap::new();
        for row in &rows {
            let user = user_from_row(row)?;
            users.insert(user.id, user);
        }
        Ok(users)
    }

    // ==================== FULL LOAD ====================

    /// Load everything a live blog needs and build its metadata store.
    pub async fn load(&self) -> Result<LoadedBlog, AppError> {
        let (options, snapshot, relationships, users) = tokio::try_join!(
            self.load_configured_metadata(),
            self.load_terms(),
            self.load_term_relationships(None),
            self.load_users(),
        )?;

        let mut store = MetadataStore::from_snapshot(&snapshot, self.empty_archive())?;
        let mut posts = self.load_posts(&PostQuery::default()).await?;
        Self::attach(&store, &mut posts, &relationships, &users);
        for post in &posts {
            store.add_post(post);
        }

        tracing::info!(
            "Loaded blog {}: {} posts, {} terms, {} options, {} users",
            self.prefix,
            posts.len(),
            store.terms().len(),
            options.len(),
            users.len()
        );

        Ok(LoadedBlog {
            posts,
            store,
            options,
            users,
        })
    }

    /// Bind terms and authors to freshly loaded posts.
    pub fn attach(
        store: &MetadataStore,
        posts: &mut [Post],
        relationships: &HashMap<PostId, Vec<TermId>>,
        users: &HashMap<UserId, User>,
    ) {
        for post in posts.iter_mut() {
            let related = relationships
                .get(&post.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            store.bind_post_terms(post, related);
            post.author = post.author_id.and_then(|id| users.get(&id).cloned());
        }
    }
}

// ==================== ROW CONVERSION ====================

fn raw_term_from_row(row: &AnyRow) -> Result<RawTerm, sqlx::Error> {
    let taxonomy: String = row.try_get("taxonomy")?;
    Ok(RawTerm {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        taxonomy: Taxonomy::parse(&taxonomy),
        parent: row.try_get("parent_id")?,
    })
}

fn post_from_row(row: &AnyRow) -> Result<Post, sqlx::Error> {
    let title: String = row.try_get("title")?;
    let name: Option<String> = row.try_get("name")?;
    let date_gmt: Option<String> = row.try_get("date_gmt")?;
    let modified_gmt: Option<String> = row.try_get("modified_gmt")?;
    let excerpt: Option<String> = row.try_get("excerpt")?;
    let author: Option<i64> = row.try_get("author")?;
    let thumbnail: Option<String> = row.try_get("thumbnail")?;
    let thumbnail_crop: Option<String> = row.try_get("thumbnail_crop")?;
    let thumbnail_metadata: Option<String> = row.try_get("thumbnail_metadata")?;

    let mut post = Post::new(
        row.try_get("id")?,
        &title,
        parse_gmt_date(date_gmt.as_deref()),
        name.as_deref(),
    );
    post.content = row.try_get::<Option<String>, _>("content")?.unwrap_or_default();
    post.excerpt = excerpt.filter(|e| !e.is_empty());
    post.modified = parse_gmt_date(modified_gmt.as_deref());
    post.author_id = author.filter(|id| *id > 0);
    post.thumbnail = thumbnail.filter(|t| !t.is_empty());
    post.thumbnail_crop = thumbnail_crop.filter(|c| !c.is_empty());
    post.thumbnail_size = thumbnail_metadata.as_deref().and_then(parse_dimensions);
    post.gallery = gallery_ids(&post.content)
        .into_iter()
        .map(|id| (id, None))
        .collect();
    Ok(post)
}

fn image_from_row(row: &AnyRow) -> Result<Image, sqlx::Error> {
    let caption: Option<String> = row.try_get("caption")?;
    let metadata: Option<String> = row.try_get("metadata")?;
    Ok(Image {
        url: row.try_get::<Option<String>, _>("url")?.unwrap_or_default(),
        caption: caption.filter(|c| !c.is_empty()),
        size: metadata.as_deref().and_then(parse_dimensions),
    })
}

fn user_from_row(row: &AnyRow) -> Result<User, sqlx::Error> {
    let email: Option<String> = row.try_get("user_email")?;
    Ok(User {
        id: row.try_get("id")?,
        login: row.try_get("user_login")?,
        email: email.filter(|e| !e.is_empty()),
        name: row.try_get::<Option<String>, _>("display_name")?.unwrap_or_default(),
    })
}
