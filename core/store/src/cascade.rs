use knowledge_base_schemas::{ArticleId, ArticleTag, CategoryId, TagId};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

use crate::error::StoreResult;

/// Everything that has to disappear together with a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSet {
    pub article_ids: BTreeSet<ArticleId>,
    pub tag_links: BTreeSet<ArticleTag>,
}

/// Collect the articles filed under `category` and every tag link pointing at them.
///
/// Read-only. Callers pass the open transaction so the set matches the rows
/// they are about to delete.
pub fn compute_cascade_set(conn: &Connection, category: CategoryId) -> StoreResult<CascadeSet> {
    let mut articles = conn.prepare("SELECT id FROM articles WHERE category_id = ?1")?;
    let article_ids = articles
        .query_map(params![category.0], |row| Ok(ArticleId(row.get(0)?)))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    let mut links = conn.prepare(
        "SELECT at.article_id, at.tag_id
         FROM article_tags at
         JOIN articles a ON a.id = at.article_id
         WHERE a.category_id = ?1",
    )?;
    let tag_links = links
        .query_map(params![category.0], |row| {
            Ok(ArticleTag {
                article_id: ArticleId(row.get(0)?),
                tag_id: TagId(row.get(1)?),
            })
        })?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(CascadeSet {
        article_ids,
        tag_links,
    })
}
