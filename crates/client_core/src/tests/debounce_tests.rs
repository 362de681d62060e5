use super::*;
use std::time::Duration;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn raw_value_is_visible_immediately() {
    let mut debouncer = SearchDebouncer::new(Duration::from_millis(400));
    debouncer.input("ibu");
    assert_eq!(debouncer.raw(), "ibu");
    assert_eq!(debouncer.settled(), "");
}

#[tokio::test(start_paused = true)]
async fn a_burst_of_keystrokes_settles_to_the_last_value() {
    let mut debouncer = SearchDebouncer::new(Duration::from_millis(400));
    let mut settled = debouncer.subscribe();

    debouncer.input("i");
    advance(Duration::from_millis(200)).await;
    debouncer.input("ib");
    advance(Duration::from_millis(200)).await;
    debouncer.input("ibu");

    // 400ms have passed since the first keystroke, but not since the last.
    assert_eq!(debouncer.settled(), "");

    advance(Duration::from_millis(500)).await;
    settled.changed().await.expect("settled update");
    assert_eq!(settled.borrow().as_str(), "ibu");
    assert_eq!(debouncer.settled(), "ibu");
}

#[tokio::test(start_paused = true)]
async fn quiet_input_settles_after_the_delay() {
    let mut debouncer = SearchDebouncer::new(Duration::from_millis(400));
    let mut settled = debouncer.subscribe();

    debouncer.input("ada");
    advance(Duration::from_millis(450)).await;
    settled.changed().await.expect("settled update");
    assert_eq!(settled.borrow().as_str(), "ada");
}

#[tokio::test(start_paused = true)]
async fn flush_publishes_without_waiting() {
    let mut debouncer = SearchDebouncer::new(Duration::from_millis(400));
    debouncer.input("ada");
    debouncer.flush();
    assert_eq!(debouncer.settled(), "ada");

    // The aborted timer never re-publishes an older value.
    debouncer.input("adae");
    debouncer.flush();
    advance(Duration::from_millis(1_000)).await;
    assert_eq!(debouncer.settled(), "adae");
}
