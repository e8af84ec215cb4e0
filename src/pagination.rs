use crate::document::LineItem;
use crate::error::{FolioError, Result};

pub const FIRST_PAGE_CAPACITY: usize = 8;
pub const CONTINUATION_PAGE_CAPACITY: usize = 14;

/// How many table rows fit on the first page (which also carries the title,
/// customer and metadata blocks) and on every page after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCapacity {
    pub first: usize,
    pub continuation: usize,
}

impl Default for PageCapacity {
    fn default() -> Self {
        Self {
            first: FIRST_PAGE_CAPACITY,
            continuation: CONTINUATION_PAGE_CAPACITY,
        }
    }
}

impl PageCapacity {
    pub fn new(first: usize, continuation: usize) -> Result<Self> {
        let capacity = Self {
            first,
            continuation,
        };
        capacity.validate()?;
        Ok(capacity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.first == 0 || self.continuation == 0 {
            return Err(FolioError::InvalidConfiguration(format!(
                "page capacities must be >= 1 (first={}, continuation={})",
                self.first, self.continuation
            )));
        }
        Ok(())
    }

    /// Pages needed for `item_count` rows. Never zero.
    pub fn page_count(&self, item_count: usize) -> usize {
        if item_count <= self.first {
            return 1;
        }
        let rest = item_count - self.first;
        1 + rest.div_ceil(self.continuation.max(1))
    }
}

/// Position of one page inside the item list, without borrowing the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
    pub page_number: usize,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

impl PageSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn bind<'a>(&self, items: &'a [LineItem]) -> Page<'a> {
        Page {
            items: &items[self.start..self.end],
            span: *self,
        }
    }
}

/// One physical page worth of line items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page<'a> {
    pub items: &'a [LineItem],
    span: PageSpan,
}

impl<'a> Page<'a> {
    pub fn page_number(&self) -> usize {
        self.span.page_number
    }

    pub fn is_first_page(&self) -> bool {
        self.span.is_first_page
    }

    pub fn is_last_page(&self) -> bool {
        self.span.is_last_page
    }

    pub fn span(&self) -> PageSpan {
        self.span
    }

    /// Index of this page's first row within the whole document.
    pub fn first_row_index(&self) -> usize {
        self.span.start
    }
}

/// Splits `item_count` rows into contiguous page spans. Always yields at least
/// one page; a count that exactly fills the last page never adds a trailing
/// empty page.
pub fn plan_pages(item_count: usize, capacity: PageCapacity) -> Vec<PageSpan> {
    let first = capacity.first.max(1);
    let continuation = capacity.continuation.max(1);
    let mut spans = Vec::with_capacity(capacity.page_count(item_count));

    let first_end = item_count.min(first);
    spans.push(PageSpan {
        start: 0,
        end: first_end,
        page_number: 1,
        is_first_page: true,
        is_last_page: false,
    });

    let mut start = first_end;
    while start < item_count {
        let end = (start + continuation).min(item_count);
        spans.push(PageSpan {
            start,
            end,
            page_number: spans.len() + 1,
            is_first_page: false,
            is_last_page: false,
        });
        start = end;
    }

    if let Some(last) = spans.last_mut() {
        last.is_last_page = true;
    }
    spans
}

pub fn paginate(items: &[LineItem], capacity: PageCapacity) -> Vec<Page<'_>> {
    let spans = plan_pages(items.len(), capacity);
    log::debug!(
        "paginated {} items into {} page(s) (first={}, continuation={})",
        items.len(),
        spans.len(),
        capacity.first,
        capacity.continuation
    );
    spans.iter().map(|span| span.bind(items)).collect()
}
