use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMarker {
    Page(u32),
    Gap,
}

impl fmt::Display for PageMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageMarker::Page(page) => write!(f, "{page}"),
            PageMarker::Gap => write!(f, "…"),
        }
    }
}

/// Markers for a pagination widget: first and last page always, a window
/// of one page around the current one (widened by one at either boundary
/// so the widget never shrinks below three middle slots), and hidden
/// ranges collapsed to a single gap marker. A hidden range of exactly one
/// page shows the page number itself, since a gap standing in for a
/// single page would take the same space. Empty when there is at most
/// one page.
pub fn page_markers(current_page: u32, total_pages: u32) -> Vec<PageMarker> {
    if total_pages <= 1 {
        return Vec::new();
    }
    let current = current_page.clamp(1, total_pages);

    let mut start = current.saturating_sub(1).max(2);
    let mut end = current.saturating_add(1).min(total_pages - 1);
    if current == 1 {
        end = end.saturating_add(1).min(total_pages - 1);
    }
    if current == total_pages {
        start = start.saturating_sub(1).max(2);
    }

    let mut markers = vec![PageMarker::Page(1)];
    match start {
        0..=2 => {}
        3 => markers.push(PageMarker::Page(2)),
        _ => markers.push(PageMarker::Gap),
    }
    for page in start..=end {
        markers.push(PageMarker::Page(page));
    }
    match total_pages - 1 - end {
        0 => {}
        1 => markers.push(PageMarker::Page(total_pages - 1)),
        _ => markers.push(PageMarker::Gap),
    }
    markers.push(PageMarker::Page(total_pages));
    markers
}

#[cfg(test)]
#[path = "tests/pager_tests.rs"]
mod tests;
