use async_trait::async_trait;
use crawlq_queue::{BoxError, HandlerPanicked, PartialSubscriber, Queue, Subscriber};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::Notify;

/// Records everything the queue hands to it.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<u32>>,
    errors: Mutex<Vec<(String, u32)>>,
    completed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    done: Notify,
    work: Duration,
    fail_on: Option<u32>,
}

impl Recorder {
    fn with_work(work: Duration) -> Self {
        Self {
            work,
            ..Default::default()
        }
    }

    fn failing_on(value: u32) -> Self {
        Self {
            fail_on: Some(value),
            ..Default::default()
        }
    }

    fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<(String, u32)> {
        self.errors.lock().unwrap().clone()
    }

    async fn wait_complete(&self) {
        self.done.notified().await;
    }
}

#[async_trait]
impl Subscriber<u32> for Recorder {
    async fn next(&self, payload: u32) -> Result<(), BoxError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.seen.lock().unwrap().push(payload);

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on == Some(payload) {
            return Err(format!("failed on {payload}").into());
        }
        Ok(())
    }

    fn error(&self, error: BoxError, payload: &u32) {
        self.errors
            .lock()
            .unwrap()
            .push((error.to_string(), *payload));
    }

    async fn complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.done.notify_one();
    }
}

#[tokio::test]
async fn processes_in_order_and_completes_once() {
    let queue = Queue::default();
    queue.enqueue(1);
    queue.enqueue(2);
    queue.enqueue(3);

    let recorder = Arc::new(Recorder::default());
    queue.subscribe(recorder.clone());
    recorder.wait_complete().await;

    assert_eq!(recorder.seen(), vec![1, 2, 3]);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
    assert_eq!(queue.running(), 0);
    assert!(queue.is_empty());
    // retired after completion
    assert_eq!(queue.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_parallel_limit() {
    let queue = Queue::with_parallel_limit(5).unwrap();
    let items: Vec<u32> = (0..20).collect();
    for item in &items {
        queue.enqueue(*item);
    }

    let recorder = Arc::new(Recorder::with_work(Duration::from_millis(10)));
    queue.subscribe(recorder.clone());
    recorder.wait_complete().await;

    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 5);
    assert_eq!(recorder.seen(), items);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn parallel_limit_one_is_sequential() {
    let queue = Queue::default();
    let items: Vec<u32> = (0..20).collect();
    for item in &items {
        queue.enqueue(*item);
    }

    let recorder = Arc::new(Recorder::with_work(Duration::from_millis(1)));
    queue.subscribe(recorder.clone());
    recorder.wait_complete().await;

    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.seen(), items);
}

#[tokio::test]
async fn subscribe_to_empty_queue_completes_immediately() {
    let queue = Queue::<u32>::default();
    let recorder = Arc::new(Recorder::default());
    queue.subscribe(recorder.clone());
    recorder.wait_complete().await;

    assert!(recorder.seen().is_empty());
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_subscriber_receives_every_item() {
    let queue = Queue::with_parallel_limit(2).unwrap();
    for item in 0..4 {
        queue.enqueue(item);
    }

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    // Register both before the runtime gets a chance to run dispatches.
    queue.subscribe(first.clone());
    queue.subscribe(second.clone());
    first.wait_complete().await;
    second.wait_complete().await;

    let mut first_seen = first.seen();
    first_seen.sort_unstable();
    assert_eq!(second.seen(), vec![2, 3]);
    assert_eq!(first_seen, vec![0, 1, 2, 3]);
    assert_eq!(first.completed.load(Ordering::SeqCst), 1);
    assert_eq!(second.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_goes_to_error_with_original_payload() {
    let queue = Queue::default();
    for item in [1, 2, 3] {
        queue.enqueue(item);
    }

    let recorder = Arc::new(Recorder::failing_on(2));
    queue.subscribe(recorder.clone());
    recorder.wait_complete().await;

    assert_eq!(recorder.seen(), vec![1, 2, 3]);
    assert_eq!(recorder.errors(), vec![("failed on 2".to_string(), 2)]);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failing_subscriber_does_not_affect_another() {
    let queue = Queue::default();
    queue.enqueue(7);

    let failing = Arc::new(Recorder::failing_on(7));
    let healthy = Arc::new(Recorder::default());
    queue.subscribe(failing.clone());
    queue.subscribe(healthy.clone());
    failing.wait_complete().await;
    healthy.wait_complete().await;

    assert_eq!(failing.errors().len(), 1);
    assert!(healthy.errors().is_empty());
}

#[tokio::test]
async fn panicking_error_handler_does_not_cancel_other_subscribers() {
    let queue = Queue::default();
    queue.enqueue(1);
    queue.enqueue(2);

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let broken = PartialSubscriber::<u32>::new()
        .on_next(|value: u32| async move { Err::<(), BoxError>(format!("failed on {value}").into()) })
        .on_error(move |_error: BoxError, _value: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("error handler blew up");
        });
    let finished = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Notify::new());
    let sink = finished.clone();
    let done_ref = done.clone();
    let healthy = PartialSubscriber::<u32>::new()
        .on_next(move |value: u32| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                sink.lock().unwrap().push(value);
                Ok::<(), BoxError>(())
            }
        })
        .on_complete(move || done_ref.notify_one());
    queue.subscribe(broken);
    queue.subscribe(healthy);
    done.notified().await;

    // both items ran to the end despite the sibling's handler panicking
    assert_eq!(*finished.lock().unwrap(), vec![1, 2]);
    assert_eq!(reported.load(Ordering::SeqCst), 2);
    assert_eq!(queue.running(), 0);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn items_enqueued_while_running_delay_completion() {
    let queue = Queue::default();
    queue.enqueue(1u32);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Notify::new());

    let handle = queue.clone();
    let seen_ref = seen.clone();
    let done_ref = done.clone();
    queue.subscribe(
        PartialSubscriber::new()
            .on_next(move |value: u32| {
                let handle = handle.clone();
                let seen = seen_ref.clone();
                async move {
                    seen.lock().unwrap().push(value);
                    if value < 3 {
                        handle.enqueue(value + 1);
                    }
                    Ok::<(), BoxError>(())
                }
            })
            .on_complete(move || done_ref.notify_one()),
    );
    done.notified().await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn resubscribing_after_drain_only_notifies_new_subscriber() {
    let queue = Queue::default();
    queue.enqueue(1);

    let first = Arc::new(Recorder::default());
    queue.subscribe(first.clone());
    first.wait_complete().await;

    // Items enqueued after the drain wait for the next registration.
    queue.enqueue(2);
    tokio::task::yield_now().await;
    assert_eq!(queue.get_queue(), vec![2]);

    let second = Arc::new(Recorder::default());
    queue.subscribe(second.clone());
    second.wait_complete().await;

    assert_eq!(first.seen(), vec![1]);
    assert_eq!(second.seen(), vec![2]);
    assert_eq!(first.completed.load(Ordering::SeqCst), 1);
    assert_eq!(second.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_handler_is_reported_and_queue_keeps_going() {
    let queue = Queue::default();
    queue.enqueue(1u32);
    queue.enqueue(2u32);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Notify::new());

    let errors_ref = errors.clone();
    let seen_ref = seen.clone();
    let done_ref = done.clone();
    queue.subscribe(
        PartialSubscriber::new()
            .on_next(move |value: u32| {
                let seen = seen_ref.clone();
                async move {
                    if value == 1 {
                        panic!("handler exploded");
                    }
                    seen.lock().unwrap().push(value);
                    Ok::<(), BoxError>(())
                }
            })
            .on_error(move |err: BoxError, payload: &u32| {
                let panicked = err.downcast_ref::<HandlerPanicked>().is_some();
                errors_ref.lock().unwrap().push((*payload, panicked));
            })
            .on_complete(move || done_ref.notify_one()),
    );
    done.notified().await;

    assert_eq!(*errors.lock().unwrap(), vec![(1, true)]);
    assert_eq!(*seen.lock().unwrap(), vec![2]);
    assert_eq!(queue.running(), 0);
}
