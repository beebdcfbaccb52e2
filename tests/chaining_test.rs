use crossbeam_channel::{unbounded, Sender};
use promise_cell::typed::{Typed, TypedOutcome};
use promise_cell::{
    Dispatcher, DispatcherRef, Job, Outcome, Promise, Rejection, State, WaitError,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A dispatcher backed by one worker thread; jobs run in submission order.
struct Worker {
    jobs: Sender<Job>,
}

impl Dispatcher for Worker {
    fn dispatch(&self, job: Job) {
        self.jobs.send(job).expect("the worker thread is gone");
    }
}

fn worker() -> (DispatcherRef, thread::JoinHandle<()>) {
    let (jobs, backlog) = unbounded::<Job>();
    let handle = thread::spawn(move || {
        for job in backlog {
            job();
        }
    });
    (Arc::new(Worker { jobs }), handle)
}

#[test]
fn test_chain_through_worker_dispatcher() {
    let (dispatcher, handle) = worker();
    let (promise, settler) = Promise::pending();

    let done = promise
        .then(
            Some(dispatcher.clone()),
            Some(Box::new(|value| {
                let n = *value.downcast::<i32>().unwrap();
                Ok(Outcome::value(n * 10))
            })),
            None,
        )
        .then(
            Some(dispatcher.clone()),
            Some(Box::new(|value| {
                let n = *value.downcast::<i32>().unwrap();
                Ok(Outcome::value(n + 1))
            })),
            None,
        );

    let producer = thread::spawn(move || settler.fulfill(4i32));
    let value = done.wait().unwrap();
    assert_eq!(*value.downcast::<i32>().unwrap(), 41);

    producer.join().expect("The producer thread has panicked");
    drop(dispatcher);
    handle.join().expect("The worker thread has panicked");
}

#[test]
fn test_settled_source_submits_to_dispatcher() {
    let (dispatcher, handle) = worker();
    let done = Promise::fulfilled(6i32).then(
        Some(dispatcher.clone()),
        Some(Box::new(|value| {
            let n = *value.downcast::<i32>().unwrap();
            Ok(Outcome::value(n * 7))
        })),
        None,
    );
    assert_eq!(*done.wait().unwrap().downcast::<i32>().unwrap(), 42);

    drop(dispatcher);
    handle.join().expect("The worker thread has panicked");
}

#[test]
fn test_forever_pending_is_terminal_for_the_whole_chain() {
    let source = Promise::forever_pending();
    let downstream = source.then(
        None,
        Some(Box::new(|_value| -> Result<Outcome, promise_cell::Fault> {
            panic!("must never run")
        })),
        Some(Box::new(
            |_rejection| -> Result<Outcome, promise_cell::Fault> { panic!("must never run") },
        )),
    );
    assert_eq!(downstream.state(), State::ForeverPending);
    assert!(matches!(
        downstream.wait_timeout(Duration::from_millis(100)),
        Err(WaitError::Timeout)
    ));
}

#[test]
fn test_marking_forever_pending_reaches_queued_continuations() {
    let (promise, settler) = Promise::pending();
    let downstream = promise.on_fulfilled(|value| Ok(Outcome::from_payload(value)));
    settler.forever_pending();
    assert_eq!(downstream.state(), State::ForeverPending);
}

#[test]
fn test_cross_view_delegation() {
    let (typed, typed_settler) = Typed::<i32>::pending();
    let (erased, erased_settler) = Promise::pending();

    // The erased promise resolves by delegating to the typed one.
    erased_settler.resolve(Outcome::typed(&typed));
    assert_eq!(erased.state(), State::Pending);

    typed_settler.fulfill(27);
    assert_eq!(*erased.value().unwrap().downcast::<i32>().unwrap(), 27);
}

#[test]
fn test_typed_chain_across_threads() {
    let (promise, settler) = Typed::<i32>::pending();
    let squared = promise.on_fulfilled(|n| Ok(TypedOutcome::of(*n * *n)));

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        settler.fulfill(9);
    });
    assert_eq!(*squared.wait().unwrap(), 81);
    producer.join().expect("The producer thread has panicked");
}

#[test]
fn test_rejection_reaches_the_end_of_a_mixed_chain() {
    let (promise, settler) = Promise::pending();
    let tail = promise
        .on_fulfilled(|value| Ok(Outcome::from_payload(value)))
        .then(None, None, None)
        .on_fulfilled(|value| Ok(Outcome::from_payload(value)));

    settler.reject(Rejection::from_reason("root cause"));
    match tail.wait() {
        Err(WaitError::Rejected(rejection)) => {
            let reason = rejection.reason().unwrap().clone();
            assert_eq!(*reason.downcast::<&str>().unwrap(), "root cause");
        }
        other => panic!("expected a rejection, got {:?}", other.map(|_| "payload")),
    }
}

#[test]
fn test_waiter_timeout_does_not_stop_settlement() {
    let (promise, settler) = Promise::pending();
    assert!(matches!(
        promise.wait_timeout(Duration::from_millis(10)),
        Err(WaitError::Timeout)
    ));
    settler.fulfill(1i32);
    assert_eq!(*promise.wait().unwrap().downcast::<i32>().unwrap(), 1);
}
