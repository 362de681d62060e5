use super::*;

#[test]
fn qualifying_changes_snap_back_to_page_one() {
    let mut query = ListQuery::new();
    query.set_page(5);
    query.set_search("ibuprofen");
    assert_eq!(query.page(), 1);

    query.set_page(5);
    query.toggle_sort("name");
    assert_eq!(query.page(), 1);

    query.set_page(5);
    query.set_filter("category_id", "3");
    assert_eq!(query.page(), 1);

    query.set_page(5);
    query.set_limit(25);
    assert_eq!(query.page(), 1);
}

#[test]
fn page_navigation_touches_nothing_else() {
    let mut query = ListQuery::new();
    query.set_search("ada");
    query.toggle_sort("name");
    query.set_filter("gender", "female");
    let before = query.clone();

    query.set_page(7);
    assert_eq!(query.page(), 7);
    assert_eq!(query.search(), before.search());
    assert_eq!(query.sort_by(), before.sort_by());
    assert_eq!(query.sort_order(), before.sort_order());
    assert_eq!(query.filter("gender"), before.filter("gender"));
    assert_eq!(query.limit(), before.limit());
}

#[test]
fn same_column_toggles_direction() {
    let mut query = ListQuery::new();
    query.toggle_sort("name");
    assert_eq!(query.sort_by(), Some("name"));
    assert_eq!(query.sort_order(), SortOrder::Asc);

    query.toggle_sort("name");
    assert_eq!(query.sort_order(), SortOrder::Desc);

    query.toggle_sort("name");
    assert_eq!(query.sort_order(), SortOrder::Asc);

    query.toggle_sort("hired_at");
    assert_eq!(query.sort_by(), Some("hired_at"));
    assert_eq!(query.sort_order(), SortOrder::Asc);
}

#[test]
fn sentinel_filters_stay_readable_but_never_leave() {
    let mut query = ListQuery::new();
    query.set_filter("status", FILTER_ALL);
    query.set_filter("doctor_id", "4");
    query.set_filter("ward", "");

    assert_eq!(query.filter("status"), Some(FILTER_ALL));

    let request = query.request();
    assert!(request.filter("status").is_none());
    assert!(request.filter("ward").is_none());
    assert_eq!(request.filter("doctor_id"), Some("4"));

    let pairs = query.query_pairs();
    assert!(!pairs.iter().any(|(key, _)| key == "status" || key == "ward"));
    assert!(pairs.contains(&("doctor_id".to_string(), "4".to_string())));

    // Overwriting the sentinel works like any other value.
    query.set_filter("status", "scheduled");
    assert_eq!(query.request().filter("status"), Some("scheduled"));
}

#[test]
fn empty_search_is_absent_from_the_request() {
    let mut query = ListQuery::new();
    query.set_search("");
    assert!(query.request().search.is_none());

    query.set_search("amox");
    assert_eq!(query.request().search.as_deref(), Some("amox"));
}

#[test]
fn limits_are_clamped_and_page_floors_at_one() {
    let mut query = ListQuery::new();
    query.set_limit(0);
    assert_eq!(query.limit(), 1);
    query.set_limit(10_000);
    assert_eq!(query.limit(), MAX_PAGE_SIZE);
    query.set_page(0);
    assert_eq!(query.page(), 1);
}
