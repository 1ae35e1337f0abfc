//! Lazy pagination over a [`StarSource`].
//!
//! [`paginate`] turns a page-fetching function into a stream of items that
//! pulls one page at a time and stops as soon as the cap is reached or the
//! source reports the last page. Failures are yielded as-is and end the
//! stream; retrying is the governor's business.

use std::collections::VecDeque;
use std::future::Future;

use futures::{Stream, TryStreamExt, stream};

use crate::model::{Activity, RepoId, StargazerRef};
use crate::source::{Cursor, FetchResult, Page, PageRequest, StarSource};

struct PageState<T, F> {
    fetch_page: F,
    per_page: usize,
    next: Option<Cursor>,
    remaining: Option<usize>,
    buffered: VecDeque<T>,
}

/// Stream the items of a paginated collection.
///
/// `cap` bounds the number of items yielded (`None` = the whole collection).
/// The page size is `min(max_page_size, cap)` and stays fixed for the whole
/// traversal, so cursor offsets remain consistent.
pub fn paginate<T, F, Fut>(
    cap: Option<usize>,
    max_page_size: usize,
    fetch_page: F,
) -> impl Stream<Item = FetchResult<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = FetchResult<Page<T>>>,
{
    let max_page_size = max_page_size.max(1);
    let per_page = cap.map_or(max_page_size, |cap| cap.clamp(1, max_page_size));
    let state = PageState {
        fetch_page,
        per_page,
        next: Some(Cursor::FIRST),
        remaining: cap,
        buffered: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.remaining == Some(0) {
                return None;
            }
            if let Some(item) = state.buffered.pop_front() {
                if let Some(remaining) = state.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some((Ok(item), state));
            }

            let cursor = state.next.take()?;
            let request = PageRequest {
                cursor,
                per_page: state.per_page,
            };
            match (state.fetch_page)(request).await {
                Ok(page) => {
                    // An empty page ends the collection even if the source
                    // claims there is more.
                    if !page.items.is_empty() {
                        state.next = page.next;
                    }
                    state.buffered.extend(page.items);
                }
                Err(err) => return Some((Err(err), state)),
            }
        }
    })
}

/// Collect a paginated stream, failing on the first error.
///
/// # Errors
///
/// Returns the first error yielded by the stream.
pub async fn collect<T>(items: impl Stream<Item = FetchResult<T>>) -> FetchResult<Vec<T>> {
    items.try_collect().await
}

/// Typed pagination over the collections of a [`StarSource`].
#[derive(Debug)]
pub struct Fetcher<'a, S: ?Sized> {
    source: &'a S,
}

impl<S: ?Sized> Clone for Fetcher<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Fetcher<'_, S> {}

impl<'a, S: StarSource + ?Sized> Fetcher<'a, S> {
    /// Paginate over `source`.
    #[must_use]
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Repositories starred by `login`.
    pub fn starred<'b>(
        self,
        login: &'b str,
        cap: Option<usize>,
    ) -> impl Stream<Item = FetchResult<Activity>> + 'b
    where
        'a: 'b,
    {
        let source = self.source;
        paginate(cap, source.max_page_size(), move |page| {
            source.starred(login, page)
        })
    }

    /// Second-hop activity of `login`.
    pub fn activity<'b>(
        self,
        login: &'b str,
        cap: Option<usize>,
    ) -> impl Stream<Item = FetchResult<Activity>> + 'b
    where
        'a: 'b,
    {
        let source = self.source;
        paginate(cap, source.max_page_size(), move |page| {
            source.activity(login, page)
        })
    }

    /// Users who starred `repo`.
    pub fn stargazers<'b>(
        self,
        repo: &'b RepoId,
        cap: Option<usize>,
    ) -> impl Stream<Item = FetchResult<StargazerRef>> + 'b
    where
        'a: 'b,
    {
        let source = self.source;
        paginate(cap, source.max_page_size(), move |page| {
            source.stargazers(repo, page)
        })
    }
}
