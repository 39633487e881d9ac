//! How page results combine and when a paginated sequence ends.

use serde_json::Value;

/// Default aggregation and end-detection for paginated values.
///
/// Sequences concatenate pages and count their items. Anything else is
/// replaced by each new page and has no item count, so the default
/// end-of-data check never fires for it; supply a `reached_end` predicate
/// on the builder instead.
pub trait PageData: Sized {
    /// Items in one page result, if the value is a sequence.
    fn item_count(&self) -> Option<usize>;

    /// Combine the value so far with the next page.
    fn merge_page(self, next: Self) -> Self;
}

impl<T> PageData for Vec<T> {
    fn item_count(&self) -> Option<usize> {
        Some(self.len())
    }

    fn merge_page(mut self, next: Self) -> Self {
        self.extend(next);
        self
    }
}

impl PageData for Value {
    fn item_count(&self) -> Option<usize> {
        self.as_array().map(Vec::len)
    }

    fn merge_page(self, next: Self) -> Self {
        match (self, next) {
            (Value::Array(mut items), Value::Array(more)) => {
                items.extend(more);
                Value::Array(items)
            }
            (_, next) => next,
        }
    }
}

/// `true` when a page came back shorter than the page size.
pub fn short_page<T: PageData>(page: &T, page_size: u32) -> bool {
    match page.item_count() {
        Some(count) => count < page_size as usize,
        None => false,
    }
}
