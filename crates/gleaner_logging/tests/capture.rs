use gleaner_logging::{capture_warnings, glean_error, glean_info, glean_warn, initialize_for_tests};
use pretty_assertions::assert_eq;

#[test]
fn warnings_logged_inside_the_closure_are_returned() {
    initialize_for_tests();
    glean_warn!("before the capture");

    let (value, warnings) = capture_warnings(|| {
        glean_info!("not a warning");
        glean_warn!("first {}", 1);
        glean_error!("second");
        42
    });

    assert_eq!(value, 42);
    assert_eq!(warnings, vec!["first 1".to_string(), "second".to_string()]);
}

#[test]
fn nothing_is_captured_on_other_threads() {
    initialize_for_tests();

    let ((), warnings) = capture_warnings(|| {
        std::thread::spawn(|| glean_warn!("elsewhere"))
            .join()
            .unwrap();
    });

    assert!(warnings.is_empty());
}
