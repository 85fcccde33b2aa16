use knowledge_base_schemas::{
    ArticleId, ArticleTag, CategoryId, ExportBundle, ImportStats, Tag, TagId, MAX_CATEGORY_DEPTH,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::articles::row_to_article;
use crate::categories::{load_cycle_guard, row_to_category};
use crate::database::{now_rfc3339, Database};
use crate::error::{StoreError, StoreResult};

impl Database {
    /// Dump every category, article, tag and tag link
    pub fn export(&self) -> StoreResult<ExportBundle> {
        let categories = self
            .conn
            .prepare("SELECT id, name, parent_id, sort_order FROM categories ORDER BY id")?
            .query_map([], row_to_category)?
            .collect::<Result<Vec<_>, _>>()?;

        let articles = self
            .conn
            .prepare(
                "SELECT id, title, content, category_id, created_at, updated_at
                 FROM articles ORDER BY id",
            )?
            .query_map([], row_to_article)?
            .collect::<Result<Vec<_>, _>>()?;

        let tags = self
            .conn
            .prepare("SELECT id, name FROM tags ORDER BY id")?
            .query_map([], |row| {
                Ok(Tag {
                    id: TagId(row.get(0)?),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let article_tags = self
            .conn
            .prepare("SELECT article_id, tag_id FROM article_tags ORDER BY article_id, tag_id")?
            .query_map([], |row| {
                Ok(ArticleTag {
                    article_id: ArticleId(row.get(0)?),
                    tag_id: TagId(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Exported {} categories, {} articles, {} tags",
            categories.len(),
            articles.len(),
            tags.len()
        );

        Ok(ExportBundle {
            categories,
            articles,
            tags,
            article_tags,
            exported_at: Some(now_rfc3339()),
        })
    }

    /// Load an export bundle, keeping ids where they are free.
    ///
    /// Categories and articles whose id already exists are skipped, along with
    /// the tag links of skipped articles. Tags are matched by name; a bundle
    /// tag whose id is taken by another name gets a fresh id. The whole import
    /// is one transaction: if the merged data would leave a dangling
    /// reference, a parent cycle or a chain deeper than `MAX_CATEGORY_DEPTH`,
    /// nothing is written.
    pub fn import(&mut self, bundle: &ExportBundle) -> StoreResult<ImportStats> {
        let tx = self.write_transaction()?;
        // Rows may arrive in any order; references are checked before commit.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;

        let mut stats = ImportStats::default();
        let now = now_rfc3339();

        for category in &bundle.categories {
            if category.name.trim().is_empty() {
                return Err(StoreError::validation(format!(
                    "imported category {} has an empty name",
                    category.id
                )));
            }
            stats.categories += tx.execute(
                "INSERT OR IGNORE INTO categories (id, name, parent_id, sort_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    category.id.0,
                    category.name.trim(),
                    category.parent_id.map(|p| p.0),
                    category.sort_order,
                    now
                ],
            )?;
        }

        // Bundle tag id -> id of the stored tag with the same name
        let mut tag_ids: HashMap<TagId, TagId> = HashMap::with_capacity(bundle.tags.len());
        for tag in &bundle.tags {
            let name = tag.name.trim();
            if name.is_empty() {
                return Err(StoreError::validation(format!(
                    "imported tag {} has an empty name",
                    tag.id
                )));
            }

            let stored = match find_tag(&tx, name)? {
                Some(existing) => existing,
                None => {
                    let kept_id = tx.execute(
                        "INSERT OR IGNORE INTO tags (id, name) VALUES (?1, ?2)",
                        params![tag.id.0, name],
                    )?;
                    if kept_id == 0 {
                        tx.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
                    }
                    stats.tags += 1;
                    TagId(tx.last_insert_rowid())
                }
            };
            tag_ids.insert(tag.id, stored);
        }

        let bundled_articles: HashSet<ArticleId> = bundle.articles.iter().map(|a| a.id).collect();
        let mut inserted_articles: HashSet<ArticleId> = HashSet::new();
        for article in &bundle.articles {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO articles (id, title, content, category_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    article.id.0,
                    article.title,
                    article.content,
                    article.category_id.0,
                    article.created_at,
                    article.updated_at
                ],
            )?;
            if inserted > 0 {
                inserted_articles.insert(article.id);
            }
        }
        stats.articles = inserted_articles.len();

        let mut skipped_links = 0usize;
        for link in &bundle.article_tags {
            let tag = tag_ids.get(&link.tag_id).copied().ok_or_else(|| {
                StoreError::validation(format!(
                    "tag link ({}, {}) references a tag missing from the import",
                    link.article_id, link.tag_id
                ))
            })?;
            if !bundled_articles.contains(&link.article_id) {
                return Err(StoreError::validation(format!(
                    "tag link ({}, {}) references an article missing from the import",
                    link.article_id, link.tag_id
                )));
            }
            // The stored article with this id is not the imported one.
            if !inserted_articles.contains(&link.article_id) {
                skipped_links += 1;
                continue;
            }

            stats.article_tags += tx.execute(
                "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
                params![link.article_id.0, tag.0],
            )?;
        }
        if skipped_links > 0 {
            debug!("Skipped {} tag links of articles that already existed", skipped_links);
        }

        check_references(&tx)?;

        let guard = load_cycle_guard(&tx)?;
        if let Some(category) = guard.find_cycle() {
            warn!("Import rejected: category {} sits on a parent cycle", category);
            return Err(StoreError::Cycle {
                category,
                parent: guard.parent_of(category).unwrap_or(category),
            });
        }
        if let Some(category) = guard.first_deeper_than(MAX_CATEGORY_DEPTH) {
            warn!("Import rejected: category {} is nested too deep", category);
            return Err(StoreError::validation(format!(
                "category {} is nested deeper than {} levels",
                category, MAX_CATEGORY_DEPTH
            )));
        }

        tx.commit()?;

        info!(
            "Imported {} categories, {} articles, {} tags, {} tag links",
            stats.categories, stats.articles, stats.tags, stats.article_tags
        );
        Ok(stats)
    }
}

fn find_tag(conn: &Connection, name: &str) -> StoreResult<Option<TagId>> {
    let id: Option<i64> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id.map(TagId))
}

/// Reject the first dangling reference left by an import
fn check_references(conn: &Connection) -> StoreResult<()> {
    let dangling_parent: Option<(i64, i64)> = conn
        .query_row(
            "SELECT c.id, c.parent_id FROM categories c
             WHERE c.parent_id IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM categories p WHERE p.id = c.parent_id)
             LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((id, parent)) = dangling_parent {
        return Err(StoreError::validation(format!(
            "category {} references missing parent {}",
            CategoryId(id),
            CategoryId(parent)
        )));
    }

    let dangling_article: Option<(i64, i64)> = conn
        .query_row(
            "SELECT a.id, a.category_id FROM articles a
             WHERE NOT EXISTS (SELECT 1 FROM categories c WHERE c.id = a.category_id)
             LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((id, category)) = dangling_article {
        return Err(StoreError::validation(format!(
            "article {} references missing category {}",
            id, category
        )));
    }

    Ok(())
}
