//! Offset pagination.
//!
//! Two queries per page: a COUNT over the caller's conditions, then
//! the page itself via LIMIT/OFFSET. The page number is 1-based.

use crate::error::{OrmError, OrmResult};
use crate::model::{Db, Model};
use crate::query::DbQuery;

/// One page of results, with the arithmetic already done. Serializes
/// as-is for API payloads when the items do.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub current_page: u32,
    pub per_page: u32,
    pub page_count: u32,
    pub next_page: Option<u32>,
    pub previous_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Fetch one page of models for the given query.
pub async fn paginate<M: Model>(
    db: &Db,
    query: DbQuery,
    page: u32,
    per_page: u32,
) -> OrmResult<Page<M>> {
    if page == 0 || per_page == 0 {
        return Err(OrmError::Configuration(
            "pagination requires page >= 1 and per_page >= 1".to_string(),
        ));
    }

    let total_items = db.count_query(query.clone()).await?;

    let offset = u64::from(page - 1) * u64::from(per_page);
    let page_query = ensure_columns(query)
        .limit(u64::from(per_page))
        .offset(offset);

    let items = db
        .fetch_rows_for::<M>(&page_query)
        .await?
        .iter()
        .map(M::from_record)
        .collect::<OrmResult<Vec<M>>>()?;

    Ok(build_page(items, total_items, page, per_page))
}

fn build_page<T>(items: Vec<T>, total_items: u64, page: u32, per_page: u32) -> Page<T> {
    let per = u64::from(per_page);
    let page_count = ((total_items + per - 1) / per) as u32;
    let seen = u64::from(page - 1) * per + per;

    Page {
        items,
        total_items,
        current_page: page,
        per_page,
        page_count,
        next_page: (seen < total_items).then(|| page + 1),
        previous_page: (page > 1).then(|| page - 1),
    }
}

fn ensure_columns(query: DbQuery) -> DbQuery {
    if query.selected_columns().is_none() {
        query.columns("*")
    } else {
        query
    }
}
