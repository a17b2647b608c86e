//! Paginated Collector
//!
//! Every AWS listing call used by the auditor returns a bounded page plus an
//! opaque continuation token. [`pages`] turns such a call into a lazy,
//! finite stream of pages and [`drain`] collects that stream into one
//! ordered `Vec`.
//!
//! The collector never retries, sorts, deduplicates, or filters. Retries
//! belong to the SDK's transport policy; filtering belongs to the caller.

use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::future::Future;

/// One page returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation cursor. Absent or empty means this is the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// A page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// The cursor to send with the next request, if any
    pub fn continuation(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A page failed; everything collected before it is kept
#[derive(Debug)]
pub struct DrainError<T, E> {
    /// Items from the pages that succeeded, in provider order
    pub partial: Vec<T>,
    /// Number of pages that succeeded
    pub pages: usize,
    pub source: E,
}

impl<T, E: fmt::Display> fmt::Display for DrainError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listing aborted after {} page(s) ({} items): {}",
            self.pages,
            self.partial.len(),
            self.source
        )
    }
}

impl<T, E> std::error::Error for DrainError<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily fetch pages by calling `list_fn` with the previous page's cursor
///
/// The first call receives `None`. The stream ends after the first page
/// without a continuation, or right after yielding an error.
pub fn pages<T, E, F, Fut>(list_fn: F) -> impl Stream<Item = Result<Page<T>, E>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    stream::unfold((list_fn, Cursor::Start), |(mut list_fn, cursor)| async move {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return None,
        };

        match list_fn(token).await {
            Ok(page) => {
                let next = match page.continuation() {
                    Some(token) => Cursor::Next(token.to_string()),
                    None => Cursor::Done,
                };
                Some((Ok(page), (list_fn, next)))
            }
            Err(e) => Some((Err(e), (list_fn, Cursor::Done))),
        }
    })
}

/// Drain a paged listing into a single ordered sequence
pub async fn drain<T, E, F, Fut>(list_fn: F) -> Result<Vec<T>, DrainError<T, E>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let stream = pages(list_fn);
    futures::pin_mut!(stream);

    let mut items = Vec::new();
    let mut fetched = 0;

    while let Some(page) = stream.next().await {
        match page {
            Ok(page) => {
                fetched += 1;
                items.extend(page.items);
            }
            Err(source) => {
                return Err(DrainError {
                    partial: items,
                    pages: fetched,
                    source,
                })
            }
        }
    }

    Ok(items)
}
