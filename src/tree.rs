use crate::models::Item;

pub fn count_items_recursive(items: &[Item]) -> usize {
    items
        .iter()
        .map(|item| 1 + count_items_recursive(&item.children))
        .sum()
}

pub fn count_completed_recursive(items: &[Item]) -> usize {
    items
        .iter()
        .map(|item| usize::from(item.is_completed()) + count_completed_recursive(&item.children))
        .sum()
}

pub fn count_by_status_recursive(items: &[Item], status: &str) -> usize {
    items
        .iter()
        .map(|item| {
            usize::from(item.status.as_deref() == Some(status))
                + count_by_status_recursive(&item.children, status)
        })
        .sum()
}

/// Percentage rounded to one decimal; 0 for an empty list.
pub fn completion_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = completed as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlatItem<'a> {
    pub path: String,
    pub depth: usize,
    pub item: &'a Item,
}

/// Pre-order walk over an item tree, parent before its subtree. Clones walk
/// independently, so a clone taken before consuming restarts the sequence.
#[derive(Clone, Debug)]
pub struct FlattenedItems<'a> {
    // Each frame is a sibling slice, the index of the next sibling and the
    // parent's path prefix.
    stack: Vec<(&'a [Item], usize, String)>,
}

pub fn flatten_items(items: &[Item]) -> FlattenedItems<'_> {
    FlattenedItems {
        stack: vec![(items, 0, String::new())],
    }
}

impl<'a> Iterator for FlattenedItems<'a> {
    type Item = FlatItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let (siblings, index, prefix) = self.stack.last_mut()?;
            let siblings: &'a [Item] = *siblings;
            let Some(item) = siblings.get(*index) else {
                self.stack.pop();
                continue;
            };
            let path = if prefix.is_empty() {
                index.to_string()
            } else {
                format!("{prefix}.{index}")
            };
            *index += 1;

            if !item.children.is_empty() {
                self.stack.push((item.children.as_slice(), 0, path.clone()));
            }
            return Some(FlatItem { path, depth, item });
        }
    }
}

/// Finds the item an index path such as `"2.0.1"` points at.
pub fn resolve_path<'a>(items: &'a [Item], path: &str) -> Option<&'a Item> {
    let mut siblings = items;
    let mut found = None;
    for part in path.trim().split('.') {
        let index: usize = part.parse().ok()?;
        let item = siblings.get(index)?;
        siblings = &item.children;
        found = Some(item);
    }
    found
}
