//! Page-draining loop shared by every paginated source call.

use crate::Page;

/// Call `fetch` with `None`, then with each returned cursor, until a page comes back
/// without one. Items are concatenated in page order. Any error discards what was
/// gathered so far.
pub fn drain_pages<T, E, F>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<&str>) -> Result<Page<T>, E>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(cursor.as_deref())?;
        items.extend(page.items);
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(items)
}
