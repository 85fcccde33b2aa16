use knowledge_base_schemas::{CategoryId, CategoryNode, CategoryWithCount, MAX_CATEGORY_DEPTH};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Reasons a flat category list cannot be turned into a forest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForestError {
    #[error("category {0} appears more than once")]
    DuplicateId(CategoryId),

    #[error("category {0} is part of a parent cycle")]
    Cycle(CategoryId),

    #[error("category {category} references missing parent {parent}")]
    DanglingParent {
        category: CategoryId,
        parent: CategoryId,
    },

    #[error("category {0} is nested deeper than {max} levels", max = MAX_CATEGORY_DEPTH)]
    TooDeep(CategoryId),
}

/// Sibling ordering used at every level of the forest.
pub(crate) fn sibling_order(a: &CategoryWithCount, b: &CategoryWithCount) -> Ordering {
    a.category
        .sort_order
        .cmp(&b.category.sort_order)
        .then_with(|| a.category.name.cmp(&b.category.name))
        .then_with(|| a.category.id.cmp(&b.category.id))
}

/// Rebuild the category forest from flat rows.
///
/// Rows are indexed once into an arena plus a parent -> children adjacency
/// map, then walked with an explicit stack. Every row must be reachable from a
/// root; rows stranded on a cycle or under a missing parent are reported
/// instead of dropped. Chains deeper than `MAX_CATEGORY_DEPTH` are rejected,
/// since the resulting nested nodes are cloned and serialized recursively.
pub fn build_forest(flat: &[CategoryWithCount]) -> Result<Vec<CategoryNode>, ForestError> {
    let mut index: HashMap<CategoryId, usize> = HashMap::with_capacity(flat.len());
    for (slot, entry) in flat.iter().enumerate() {
        if index.insert(entry.id(), slot).is_some() {
            return Err(ForestError::DuplicateId(entry.id()));
        }
    }

    let mut roots: Vec<usize> = Vec::new();
    let mut children: HashMap<CategoryId, Vec<usize>> = HashMap::new();
    for (slot, entry) in flat.iter().enumerate() {
        match entry.parent_id() {
            None => roots.push(slot),
            Some(parent) => children.entry(parent).or_default().push(slot),
        }
    }

    let by_order = |a: &usize, b: &usize| sibling_order(&flat[*a], &flat[*b]);
    roots.sort_by(by_order);
    for siblings in children.values_mut() {
        siblings.sort_by(by_order);
    }

    // Pre-order walk: a parent is always recorded before its descendants.
    let mut order: Vec<usize> = Vec::with_capacity(flat.len());
    let mut visited = vec![false; flat.len()];
    let mut stack: Vec<(usize, usize)> = roots.iter().rev().map(|slot| (*slot, 1)).collect();
    while let Some((slot, depth)) = stack.pop() {
        if visited[slot] {
            return Err(ForestError::Cycle(flat[slot].id()));
        }
        if depth > MAX_CATEGORY_DEPTH {
            return Err(ForestError::TooDeep(flat[slot].id()));
        }
        visited[slot] = true;
        order.push(slot);

        if let Some(kids) = children.get(&flat[slot].id()) {
            stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1)));
        }
    }

    if let Some(stranded) = visited.iter().position(|seen| !seen) {
        return Err(classify_stranded(flat, &index, stranded));
    }

    // Reverse pre-order builds every child before its parent.
    let mut built: Vec<Option<CategoryNode>> = (0..flat.len()).map(|_| None).collect();
    for &slot in order.iter().rev() {
        let entry = &flat[slot];
        let kids: Vec<CategoryNode> = match children.get(&entry.id()) {
            Some(kids) => kids.iter().filter_map(|kid| built[*kid].take()).collect(),
            None => Vec::new(),
        };

        built[slot] = Some(CategoryNode {
            category: entry.category.clone(),
            article_count: entry.article_count,
            children: kids,
        });
    }

    Ok(roots.iter().filter_map(|slot| built[*slot].take()).collect())
}

/// Explain why a row was not reached from any root.
fn classify_stranded(
    flat: &[CategoryWithCount],
    index: &HashMap<CategoryId, usize>,
    start: usize,
) -> ForestError {
    let mut seen: HashSet<CategoryId> = HashSet::new();
    let mut slot = start;

    loop {
        let entry = &flat[slot];
        if !seen.insert(entry.id()) {
            return ForestError::Cycle(entry.id());
        }

        match entry.parent_id() {
            Some(parent) => match index.get(&parent) {
                Some(next) => slot = *next,
                None => {
                    return ForestError::DanglingParent {
                        category: entry.id(),
                        parent,
                    }
                }
            },
            // Roots are always reached by the walk, so a stranded chain cannot end at one.
            None => return ForestError::Cycle(flat[start].id()),
        }
    }
}
