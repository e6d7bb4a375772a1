use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

use gleaner_retry::{by_serialized, replay, ReplayError, Retry, RetryError, RetrySettings};
use pretty_assertions::assert_eq;
use serde::Serialize;
use thiserror::Error;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(gleaner_logging::initialize_for_tests);
}

#[derive(Debug, Clone, PartialEq, Error)]
enum SiteError {
    #[error("site hiccup")]
    Transient,
    #[error("site is down for good")]
    Fatal,
}

type Script = Vec<Result<char, SiteError>>;

fn retry(tries: u32) -> Retry<SiteError> {
    Retry::new(&RetrySettings { tries }, |err: &SiteError| *err == SiteError::Transient)
}

/// A fetch callable replaying one script per call; the last script repeats.
fn scripted(
    scripts: Vec<Script>,
    calls: Rc<Cell<u32>>,
) -> impl FnMut() -> Result<std::vec::IntoIter<Result<char, SiteError>>, SiteError> {
    let mut scripts = VecDeque::from(scripts);
    move || {
        calls.set(calls.get() + 1);
        let script = if scripts.len() > 1 {
            scripts.pop_front().unwrap_or_default()
        } else {
            scripts.front().cloned().unwrap_or_default()
        };
        Ok(script.into_iter())
    }
}

#[test]
fn restart_replays_and_continues() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(
        vec![
            vec![Ok('A'), Ok('B'), Err(SiteError::Transient)],
            vec![Ok('A'), Ok('B'), Ok('C')],
        ],
        calls.clone(),
    );

    let delivered = retry(4)
        .iter(fetch)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(delivered, vec!['A', 'B', 'C']);
    assert_eq!(calls.get(), 2);
}

#[test]
fn inconsistent_replay_is_a_hard_failure() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(
        vec![
            vec![Ok('A'), Ok('B'), Err(SiteError::Transient)],
            vec![Ok('A'), Ok('X')],
        ],
        calls,
    );

    let results: Vec<_> = retry(4).iter(fetch).unwrap().collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().ok(), Some(&'A'));
    assert_eq!(results[1].as_ref().ok(), Some(&'B'));
    match &results[2] {
        Err(RetryError::Inconsistent { index, expected, found }) => {
            assert_eq!(*index, 1);
            assert_eq!(expected, "'B'");
            assert_eq!(found, "'X'");
        }
        other => panic!("expected an inconsistency, got {other:?}"),
    }
}

#[test]
fn shorter_replay_is_a_hard_failure() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(
        vec![
            vec![Ok('A'), Ok('B'), Err(SiteError::Transient)],
            vec![Ok('A')],
        ],
        calls,
    );

    let results: Vec<_> = retry(4).iter(fetch).unwrap().collect();

    assert!(matches!(
        results.last(),
        Some(Err(RetryError::Fewer {
            replayed: 1,
            expected: 2
        }))
    ));
    assert_eq!(results.len(), 3);
}

#[test]
fn failure_during_replay_restarts_again() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(
        vec![
            vec![Ok('A'), Ok('B'), Err(SiteError::Transient)],
            vec![Ok('A'), Err(SiteError::Transient)],
            vec![Ok('A'), Ok('B'), Ok('C')],
        ],
        calls.clone(),
    );

    let delivered = retry(4)
        .iter(fetch)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(delivered, vec!['A', 'B', 'C']);
    assert_eq!(calls.get(), 3);
}

#[test]
fn never_replies_means_unavailable_after_every_try() {
    init_logging();
    for tries in [1, 2, 4, 5] {
        let calls = Rc::new(Cell::new(0));
        let counted = calls.clone();
        let outcome = retry(tries).call(|| -> Result<(), SiteError> {
            counted.set(counted.get() + 1);
            Err(SiteError::Transient)
        });

        assert!(matches!(outcome, Err(RetryError::Unavailable { tries: t }) if t == tries));
        assert_eq!(calls.get(), tries);
    }
}

#[test]
fn sequence_failing_on_every_restart_exhausts_the_budget() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(vec![vec![Ok('A'), Err(SiteError::Transient)]], calls.clone());

    let results: Vec<_> = retry(4).iter(fetch).unwrap().collect();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().ok(), Some(&'A'));
    assert!(matches!(results[1], Err(RetryError::Unavailable { tries: 4 })));
    assert_eq!(calls.get(), 4);
}

#[test]
fn budget_is_shared_with_the_initial_call() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let counted = calls.clone();
    let mut first_calls = 0;
    let fetch = move || {
        counted.set(counted.get() + 1);
        first_calls += 1;
        if first_calls <= 2 {
            return Err(SiteError::Transient);
        }
        Ok(vec![Ok('A'), Err(SiteError::Transient)].into_iter())
    };

    let mut iter = retry(4).iter(fetch).unwrap();

    assert_eq!(iter.remaining(), 2);
    assert_eq!(iter.next().unwrap().unwrap(), 'A');
    assert!(matches!(iter.next(), Some(Err(RetryError::Unavailable { tries: 4 }))));
    assert!(iter.next().is_none());
    assert_eq!(calls.get(), 4);
}

#[test]
fn non_retryable_errors_pass_through() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetch = scripted(vec![vec![Ok('A'), Err(SiteError::Fatal)]], calls.clone());

    let results: Vec<_> = retry(4).iter(fetch).unwrap().collect();

    assert!(matches!(results[1], Err(RetryError::Source(SiteError::Fatal))));
    assert_eq!(calls.get(), 1);

    let immediate = retry(4).call(|| -> Result<(), SiteError> { Err(SiteError::Fatal) });
    assert_eq!(immediate.unwrap_err().source_error(), Some(&SiteError::Fatal));
}

#[test]
fn plain_values_are_returned_after_a_retry() {
    init_logging();
    let mut attempts = 0;

    let value = retry(4)
        .call(|| {
            attempts += 1;
            if attempts == 1 {
                Err(SiteError::Transient)
            } else {
                Ok("balance")
            }
        })
        .unwrap();

    assert_eq!(value, "balance");
    assert_eq!(attempts, 2);
}

#[test]
fn structured_items_compare_by_their_fields() {
    #[derive(Debug, Clone, Serialize)]
    struct Transaction {
        label: String,
        amount: i64,
    }

    init_logging();
    let tx = |label: &str, amount| Ok(Transaction {
        label: label.to_string(),
        amount,
    });
    let mut scripts = VecDeque::from(vec![
        vec![tx("coffee", -3), Err(SiteError::Transient)],
        vec![tx("coffee", -3), tx("salary", 2000)],
    ]);
    let fetch = move || Ok(scripts.pop_front().unwrap_or_default().into_iter());

    let delivered = retry(4)
        .iter_with(fetch, by_serialized)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let labels: Vec<_> = delivered.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["coffee", "salary"]);
}

#[test]
fn replay_interrupted_by_a_retryable_error() {
    let mut fresh = vec![Ok('A'), Err(SiteError::Transient)].into_iter();

    let outcome = replay(&mut fresh, &['A', 'B'], |a, b| a == b, |e| *e == SiteError::Transient);

    assert!(matches!(outcome, Err(ReplayError::Interrupted(SiteError::Transient))));
}
