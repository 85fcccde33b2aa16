use knowledge_base_schemas::CategoryId;
use std::collections::{HashMap, HashSet};

/// Ancestor-walk validation for proposed parent edges.
///
/// Holds a snapshot of every category's parent link. The snapshot is taken
/// inside the same transaction that applies the edge, so the walk sees the
/// graph that is committed against.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    parents: HashMap<CategoryId, Option<CategoryId>>,
}

impl CycleGuard {
    pub fn new<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (CategoryId, Option<CategoryId>)>,
    {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    pub fn parent_of(&self, category: CategoryId) -> Option<CategoryId> {
        self.parents.get(&category).copied().flatten()
    }

    /// Would making `proposed_parent` the parent of `category` close a loop?
    ///
    /// Walks upward from `proposed_parent`. Hitting `category`, revisiting a
    /// node, or taking more steps than there are categories all count as a
    /// cycle. Reaching a root, or a parent this guard does not know, does not.
    pub fn would_create_cycle(&self, category: CategoryId, proposed_parent: CategoryId) -> bool {
        if category == proposed_parent {
            return true;
        }

        let mut seen: HashSet<CategoryId> = HashSet::new();
        let mut current = Some(proposed_parent);
        let mut steps = 0usize;

        while let Some(node) = current {
            if node == category || !seen.insert(node) {
                return true;
            }

            steps += 1;
            if steps > self.parents.len() {
                return true;
            }

            current = self.parent_of(node);
        }

        false
    }

    /// Depth of `category`, counting a root as 1.
    ///
    /// The walk stops at a parent this guard does not know, and after `cap`
    /// levels, so the result never exceeds `cap`.
    pub fn depth_capped(&self, category: CategoryId, cap: usize) -> usize {
        let mut depth = 1;
        let mut current = self.parent_of(category);
        while let Some(node) = current {
            if depth >= cap {
                break;
            }
            depth += 1;
            current = self.parent_of(node);
        }
        depth
    }

    /// Levels in the subtree rooted at `category`, the category itself included.
    pub fn subtree_height(&self, category: CategoryId) -> usize {
        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        for (child, parent) in &self.parents {
            if let Some(parent) = parent {
                children.entry(*parent).or_default().push(*child);
            }
        }

        let mut seen: HashSet<CategoryId> = HashSet::from([category]);
        let mut level = vec![category];
        let mut height = 0;
        while !level.is_empty() {
            height += 1;
            let mut next = Vec::new();
            for node in level {
                for kid in children.get(&node).into_iter().flatten() {
                    if seen.insert(*kid) {
                        next.push(*kid);
                    }
                }
            }
            level = next;
        }
        height
    }

    /// First category (by id) sitting more than `max` levels deep.
    pub fn first_deeper_than(&self, max: usize) -> Option<CategoryId> {
        let mut ids: Vec<CategoryId> = self.parents.keys().copied().collect();
        ids.sort();

        ids.into_iter()
            .find(|id| self.depth_capped(*id, max + 1) > max)
    }

    /// First category (by id) whose ancestor chain loops back on itself.
    pub fn find_cycle(&self) -> Option<CategoryId> {
        let mut ids: Vec<CategoryId> = self.parents.keys().copied().collect();
        ids.sort();

        ids.into_iter().find(|id| match self.parent_of(*id) {
            Some(parent) => self.would_create_cycle(*id, parent),
            None => false,
        })
    }
}
