use knowledge_base_schemas::{
    Category, CategoryId, CategoryNode, CategoryUpdate, CategoryWithCount, DeleteOutcome,
    NewCategory, MAX_CATEGORY_DEPTH,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::cascade::compute_cascade_set;
use crate::cycle::CycleGuard;
use crate::database::{now_rfc3339, row_exists, Database};
use crate::error::{StoreError, StoreResult};
use crate::tree::build_forest;

impl Database {
    /// Create a category, returning its generated id
    pub fn create_category(&mut self, request: &NewCategory) -> StoreResult<CategoryId> {
        let name = validated_name(&request.name)?;

        let tx = self.write_transaction()?;

        if let Some(parent) = request.parent_id {
            if !row_exists(&tx, "categories", parent.0)? {
                return Err(StoreError::category_not_found(parent));
            }

            let guard = load_cycle_guard(&tx)?;
            if guard.depth_capped(parent, MAX_CATEGORY_DEPTH) >= MAX_CATEGORY_DEPTH {
                return Err(too_deep(parent));
            }
        }

        tx.execute(
            "INSERT INTO categories (name, parent_id, sort_order, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                request.parent_id.map(|p| p.0),
                request.sort_order.unwrap_or(0),
                now_rfc3339(),
            ],
        )?;
        let id = CategoryId(tx.last_insert_rowid());
        tx.commit()?;

        info!("Created category: {} ({})", name, id);
        Ok(id)
    }

    /// Rename and/or re-parent a category. Returns the number of rows changed.
    pub fn update_category(&mut self, id: CategoryId, update: &CategoryUpdate) -> StoreResult<usize> {
        let tx = self.write_transaction()?;

        if !row_exists(&tx, "categories", id.0)? {
            return Err(StoreError::category_not_found(id));
        }

        let name = validated_name(&update.name)?;

        if let Some(parent) = update.parent_id {
            if parent == id {
                return Err(StoreError::SelfParent(id));
            }
            if !row_exists(&tx, "categories", parent.0)? {
                return Err(StoreError::category_not_found(parent));
            }

            let guard = load_cycle_guard(&tx)?;
            if guard.would_create_cycle(id, parent) {
                warn!("Rejected move of category {} under {}: cycle", id, parent);
                return Err(StoreError::Cycle {
                    category: id,
                    parent,
                });
            }

            // The whole subtree moves, so its height counts against the limit.
            let depth = guard.depth_capped(parent, MAX_CATEGORY_DEPTH) + guard.subtree_height(id);
            if depth > MAX_CATEGORY_DEPTH {
                return Err(too_deep(parent));
            }
        }

        let changes = tx.execute(
            "UPDATE categories
             SET name = ?1, parent_id = ?2, sort_order = COALESCE(?3, sort_order)
             WHERE id = ?4",
            params![name, update.parent_id.map(|p| p.0), update.sort_order, id.0],
        )?;
        tx.commit()?;

        info!(
            "Updated category {}: name='{}', parent={:?}",
            id, name, update.parent_id
        );
        Ok(changes)
    }

    /// Delete a childless category together with its articles and their tag links.
    ///
    /// Everything happens in one transaction; any failure leaves every row as it was.
    pub fn delete_category(&mut self, id: CategoryId) -> StoreResult<DeleteOutcome> {
        let tx = self.write_transaction()?;

        if !row_exists(&tx, "categories", id.0)? {
            return Err(StoreError::category_not_found(id));
        }

        let children: i64 = tx.query_row(
            "SELECT COUNT(*) FROM categories WHERE parent_id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        if children > 0 {
            return Err(StoreError::HasChildren(id));
        }

        let cascade = compute_cascade_set(&tx, id)?;

        let mut outcome = DeleteOutcome::default();
        {
            let mut unlink =
                tx.prepare("DELETE FROM article_tags WHERE article_id = ?1 AND tag_id = ?2")?;
            for link in &cascade.tag_links {
                outcome.deleted_tag_links += unlink.execute(params![link.article_id.0, link.tag_id.0])?;
            }

            let mut remove = tx.prepare("DELETE FROM articles WHERE id = ?1")?;
            for article in &cascade.article_ids {
                outcome.deleted_articles += remove.execute(params![article.0])?;
            }
        }

        tx.execute("DELETE FROM categories WHERE id = ?1", params![id.0])?;
        tx.commit()?;

        info!(
            "Deleted category {} ({} articles, {} tag links)",
            id, outcome.deleted_articles, outcome.deleted_tag_links
        );
        Ok(outcome)
    }

    /// All categories with their direct article counts, ordered by (sort_order, name)
    pub fn list_categories(&self) -> StoreResult<Vec<CategoryWithCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.parent_id, c.sort_order, COUNT(a.id)
             FROM categories c
             LEFT JOIN articles a ON a.category_id = c.id
             GROUP BY c.id, c.name, c.parent_id, c.sort_order
             ORDER BY c.sort_order, c.name, c.id",
        )?;

        let categories = stmt
            .query_map([], |row| {
                Ok(CategoryWithCount {
                    category: row_to_category(row)?,
                    article_count: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Listed {} categories", categories.len());
        Ok(categories)
    }

    /// Materialize the category forest
    pub fn category_forest(&self) -> StoreResult<Vec<CategoryNode>> {
        let flat = self.list_categories()?;
        Ok(build_forest(&flat)?)
    }

    /// Get a category by ID
    pub fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, parent_id, sort_order FROM categories WHERE id = ?1",
                params![id.0],
                row_to_category,
            )
            .optional()?;

        Ok(category)
    }
}

fn validated_name(raw: &str) -> StoreResult<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StoreError::validation("category name must not be empty"));
    }
    Ok(name)
}

fn too_deep(parent: CategoryId) -> StoreError {
    StoreError::validation(format!(
        "category {} cannot take children: paths are limited to {} levels",
        parent, MAX_CATEGORY_DEPTH
    ))
}

pub(crate) fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        parent_id: row.get::<_, Option<i64>>(2)?.map(CategoryId),
        sort_order: row.get(3)?,
    })
}

/// Snapshot every parent link for cycle checks
pub(crate) fn load_cycle_guard(conn: &Connection) -> StoreResult<CycleGuard> {
    let mut stmt = conn.prepare("SELECT id, parent_id FROM categories")?;
    let links = stmt
        .query_map([], |row| {
            Ok((
                CategoryId(row.get(0)?),
                row.get::<_, Option<i64>>(1)?.map(CategoryId),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CycleGuard::new(links))
}
