use knowledge_base_schemas::{
    Article, ArticleDetail, ArticleFilter, ArticleId, CategoryId, NewArticle, TagCount, TagId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::database::{now_rfc3339, row_exists, Database};
use crate::error::{StoreError, StoreResult};

const ARTICLE_DETAIL_SELECT: &str = "SELECT a.id, a.title, a.content, a.category_id,
        a.created_at, a.updated_at, c.name,
        (SELECT GROUP_CONCAT(t.name, char(31))
         FROM article_tags at JOIN tags t ON t.id = at.tag_id
         WHERE at.article_id = a.id) AS tag_names
 FROM articles a
 LEFT JOIN categories c ON c.id = a.category_id";

/// Separator for GROUP_CONCAT; tag names are user text and may contain commas.
const TAG_SEPARATOR: char = '\u{1f}';

impl Database {
    /// Insert an article and link its tags, creating tags on first use
    pub fn create_article(&mut self, article: &NewArticle) -> StoreResult<ArticleId> {
        validate_article(article)?;

        let tx = self.write_transaction()?;
        if !row_exists(&tx, "categories", article.category_id.0)? {
            return Err(StoreError::category_not_found(article.category_id));
        }

        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO articles (title, content, category_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                article.title.trim(),
                article.content,
                article.category_id.0,
                now,
                now
            ],
        )?;
        let id = ArticleId(tx.last_insert_rowid());

        let linked = link_tags(&tx, id, &article.tags)?;
        tx.commit()?;

        info!(
            "Created article {} in category {} ({} tags)",
            id, article.category_id, linked
        );
        Ok(id)
    }

    /// Replace an article's fields and its whole tag set
    pub fn update_article(&mut self, id: ArticleId, article: &NewArticle) -> StoreResult<()> {
        validate_article(article)?;

        let tx = self.write_transaction()?;
        if !row_exists(&tx, "articles", id.0)? {
            return Err(StoreError::NotFound {
                entity: "article",
                id: id.0,
            });
        }
        if !row_exists(&tx, "categories", article.category_id.0)? {
            return Err(StoreError::category_not_found(article.category_id));
        }

        tx.execute(
            "UPDATE articles
             SET title = ?1, content = ?2, category_id = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                article.title.trim(),
                article.content,
                article.category_id.0,
                now_rfc3339(),
                id.0
            ],
        )?;

        tx.execute("DELETE FROM article_tags WHERE article_id = ?1", params![id.0])?;
        let linked = link_tags(&tx, id, &article.tags)?;
        tx.commit()?;

        info!("Updated article {} ({} tags)", id, linked);
        Ok(())
    }

    /// Get a single article with its category name and tags
    pub fn get_article(&self, id: ArticleId) -> StoreResult<Option<ArticleDetail>> {
        let article = self
            .conn
            .query_row(
                &format!("{} WHERE a.id = ?1", ARTICLE_DETAIL_SELECT),
                params![id.0],
                row_to_article_detail,
            )
            .optional()?;

        Ok(article)
    }

    /// List articles, newest first, optionally narrowed to a category and/or tag
    pub fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<ArticleDetail>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = filter.category_id {
            conditions.push("a.category_id = ?");
            values.push(Value::Integer(category.0));
        }

        if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            conditions.push(
                "EXISTS (SELECT 1 FROM article_tags at JOIN tags t ON t.id = at.tag_id
                         WHERE at.article_id = a.id AND t.name = ?)",
            );
            values.push(Value::Text(tag.to_string()));
        }

        let mut query = ARTICLE_DETAIL_SELECT.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY a.created_at DESC, a.id DESC");

        let mut stmt = self.conn.prepare(&query)?;
        let articles = stmt
            .query_map(params_from_iter(values), row_to_article_detail)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Listed {} articles", articles.len());
        Ok(articles)
    }

    /// Tags with the number of articles using them, most used first
    pub fn list_tags(&self) -> StoreResult<Vec<TagCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, COUNT(at.article_id) AS count
             FROM tags t
             LEFT JOIN article_tags at ON at.tag_id = t.id
             GROUP BY t.id, t.name
             ORDER BY count DESC, t.name",
        )?;

        let tags = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    id: TagId(row.get(0)?),
                    name: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tags)
    }
}

fn validate_article(article: &NewArticle) -> StoreResult<()> {
    if article.title.trim().is_empty() {
        return Err(StoreError::validation("article title must not be empty"));
    }
    if article.content.trim().is_empty() {
        return Err(StoreError::validation("article content must not be empty"));
    }
    Ok(())
}

/// Get or create a tag by name, returning its ID
fn get_or_create_tag(conn: &Connection, name: &str) -> StoreResult<TagId> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;

    if let Some(id) = existing {
        return Ok(TagId(id));
    }

    conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
    let id = TagId(conn.last_insert_rowid());

    debug!("Created tag: {} ({})", name, id);
    Ok(id)
}

/// Link trimmed, non-blank tag names to an article. Returns the number of new links.
fn link_tags(conn: &Connection, article: ArticleId, tags: &[String]) -> StoreResult<usize> {
    let mut linked = 0;
    for name in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let tag = get_or_create_tag(conn, name)?;
        linked += conn.execute(
            "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
            params![article.0, tag.0],
        )?;
    }
    Ok(linked)
}

pub(crate) fn row_to_article(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: ArticleId(row.get(0)?),
        title: row.get(1)?,
        content: row.get(2)?,
        category_id: CategoryId(row.get(3)?),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_article_detail(row: &Row) -> rusqlite::Result<ArticleDetail> {
    let tag_names: Option<String> = row.get(7)?;
    let mut tags: Vec<String> = tag_names
        .map(|joined| joined.split(TAG_SEPARATOR).map(str::to_string).collect())
        .unwrap_or_default();
    tags.sort();

    Ok(ArticleDetail {
        article: row_to_article(row)?,
        category_name: row.get(6)?,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_base_schemas::NewCategory;

    fn setup() -> (Database, CategoryId) {
        let mut db = Database::open_in_memory().unwrap();
        let category = db
            .create_category(&NewCategory {
                name: "Rust".to_string(),
                parent_id: None,
                sort_order: None,
            })
            .unwrap();
        (db, category)
    }

    fn new_article(category_id: CategoryId, title: &str, tags: &[&str]) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            content: format!("Notes about {}", title),
            category_id,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_article_insert_and_retrieve() {
        let (mut db, rust) = setup();
        let id = db
            .create_article(&new_article(rust, "Borrowing", &["memory", " basics ", ""]))
            .unwrap();

        let detail = db.get_article(id).unwrap().unwrap();
        assert_eq!(detail.article.title, "Borrowing");
        assert_eq!(detail.category_name.as_deref(), Some("Rust"));
        assert_eq!(detail.tags, vec!["basics".to_string(), "memory".to_string()]);
        assert_eq!(db.count_tags().unwrap(), 2);
    }

    #[test]
    fn test_article_validation() {
        let (mut db, rust) = setup();

        let mut blank_title = new_article(rust, " ", &[]);
        blank_title.content = "body".to_string();
        assert!(matches!(db.create_article(&blank_title), Err(StoreError::Validation(_))));

        let mut blank_body = new_article(rust, "Title", &[]);
        blank_body.content = "\n".to_string();
        assert!(matches!(db.create_article(&blank_body), Err(StoreError::Validation(_))));

        assert!(matches!(
            db.create_article(&new_article(CategoryId(31337), "Lost", &[])),
            Err(StoreError::NotFound { entity: "category", .. })
        ));
        assert_eq!(db.count_articles().unwrap(), 0);
    }

    #[test]
    fn test_tags_are_shared_and_deduplicated() {
        let (mut db, rust) = setup();
        db.create_article(&new_article(rust, "One", &["shared", "shared"]))
            .unwrap();
        db.create_article(&new_article(rust, "Two", &["shared", "solo"]))
            .unwrap();

        assert_eq!(db.count_tags().unwrap(), 2);
        assert_eq!(db.count_article_tags().unwrap(), 3);

        let tags = db.list_tags().unwrap();
        assert_eq!(tags[0].name, "shared");
        assert_eq!(tags[0].count, 2);
        assert_eq!(tags[1].name, "solo");
        assert_eq!(tags[1].count, 1);
    }

    #[test]
    fn test_update_replaces_tags() {
        let (mut db, rust) = setup();
        let id = db
            .create_article(&new_article(rust, "Draft", &["old", "keep"]))
            .unwrap();

        db.update_article(id, &new_article(rust, "Final", &["keep", "new"]))
            .unwrap();

        let detail = db.get_article(id).unwrap().unwrap();
        assert_eq!(detail.article.title, "Final");
        assert_eq!(detail.tags, vec!["keep".to_string(), "new".to_string()]);
        // "old" is orphaned but not pruned
        assert_eq!(db.count_tags().unwrap(), 3);
    }

    #[test]
    fn test_update_missing_article() {
        let (mut db, rust) = setup();
        assert!(matches!(
            db.update_article(ArticleId(5), &new_article(rust, "Ghost", &[])),
            Err(StoreError::NotFound { entity: "article", id: 5 })
        ));
    }

    #[test]
    fn test_list_filters() {
        let (mut db, rust) = setup();
        let go = db
            .create_category(&NewCategory {
                name: "Go".to_string(),
                parent_id: None,
                sort_order: None,
            })
            .unwrap();

        db.create_article(&new_article(rust, "Traits", &["types"]))
            .unwrap();
        db.create_article(&new_article(rust, "Macros", &["meta"]))
            .unwrap();
        db.create_article(&new_article(go, "Interfaces", &["types", "go"]))
            .unwrap();

        assert_eq!(db.list_articles(&ArticleFilter::default()).unwrap().len(), 3);

        let in_rust = db
            .list_articles(&ArticleFilter {
                category_id: Some(rust),
                tag: None,
            })
            .unwrap();
        assert_eq!(in_rust.len(), 2);
        // Newest first
        assert_eq!(in_rust[0].article.title, "Macros");

        let typed = db
            .list_articles(&ArticleFilter {
                category_id: None,
                tag: Some("types".to_string()),
            })
            .unwrap();
        assert_eq!(typed.len(), 2);

        let both = db
            .list_articles(&ArticleFilter {
                category_id: Some(go),
                tag: Some("types".to_string()),
            })
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].article.title, "Interfaces");
        // Tag filter does not hide the article's other tags
        assert_eq!(both[0].tags, vec!["go".to_string(), "types".to_string()]);
    }
}
