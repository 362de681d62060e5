use super::*;
use super::PageMarker::{Gap, Page};

#[test]
fn single_page_needs_no_widget() {
    assert!(page_markers(1, 0).is_empty());
    assert!(page_markers(1, 1).is_empty());
}

#[test]
fn first_page_of_ten() {
    assert_eq!(
        page_markers(1, 10),
        vec![Page(1), Page(2), Page(3), Gap, Page(10)]
    );
}

#[test]
fn last_page_of_ten() {
    assert_eq!(
        page_markers(10, 10),
        vec![Page(1), Gap, Page(8), Page(9), Page(10)]
    );
}

#[test]
fn middle_page_gets_gaps_on_both_sides() {
    assert_eq!(
        page_markers(5, 10),
        vec![Page(1), Gap, Page(4), Page(5), Page(6), Gap, Page(10)]
    );
}

#[test]
fn short_ranges_list_every_page() {
    assert_eq!(page_markers(1, 2), vec![Page(1), Page(2)]);
    assert_eq!(page_markers(2, 3), vec![Page(1), Page(2), Page(3)]);
    assert_eq!(
        page_markers(1, 4),
        vec![Page(1), Page(2), Page(3), Page(4)]
    );
}

#[test]
fn a_gap_of_one_page_shows_the_page_itself() {
    // Hiding page 4 behind an ellipsis would save nothing.
    assert_eq!(
        page_markers(1, 5),
        vec![Page(1), Page(2), Page(3), Page(4), Page(5)]
    );
    assert_eq!(
        page_markers(4, 7),
        vec![
            Page(1),
            Page(2),
            Page(3),
            Page(4),
            Page(5),
            Page(6),
            Page(7)
        ]
    );
}

#[test]
fn out_of_range_current_is_clamped() {
    assert_eq!(
        page_markers(99, 10),
        vec![Page(1), Gap, Page(8), Page(9), Page(10)]
    );
}

#[test]
fn markers_render_for_display() {
    let rendered: Vec<String> = page_markers(10, 10)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(rendered, vec!["1", "…", "8", "9", "10"]);
}
