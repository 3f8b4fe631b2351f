//! Burst coalescing and pause handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::event::MonitorEvent;
use crate::translate::Translator;

/// Receives monitor events on the coalescing thread.
pub type Sink = Box<dyn FnMut(MonitorEvent) + Send>;

/// Input to the coalescing thread.
pub(crate) enum Message {
    Raw(notify::Result<notify::Event>),
    /// Replay events queued while paused.
    Resume,
    Stop,
}

/// Flags shared between a monitor handle and its thread.
#[derive(Debug, Default)]
pub(crate) struct Flags {
    pub(crate) paused: AtomicBool,
    pub(crate) cancelled: AtomicBool,
}

/// Turns raw change notifications into bracketed bursts.
///
/// Each translated change pushes the burst deadline out by the idle
/// window; once the window elapses with no further change the burst is
/// closed with `EventsEnd`.
pub(crate) struct Coalescer {
    translator: Translator,
    idle: Duration,
    flags: Arc<Flags>,
    held: Vec<MonitorEvent>,
    sink: Sink,
}

impl Coalescer {
    pub(crate) fn new(translator: Translator, idle: Duration, flags: Arc<Flags>, sink: Sink) -> Self {
        Self {
            translator,
            idle,
            flags,
            held: Vec::new(),
            sink,
        }
    }

    pub(crate) fn run(mut self, rx: Receiver<Message>) {
        let mut deadline: Option<Instant> = None;

        loop {
            let message = match deadline {
                Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        self.end_burst();
                        deadline = None;
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            match message {
                Message::Raw(result) => {
                    let events = match result {
                        Ok(event) => self.translator.translate(event),
                        Err(err) => {
                            warn!(error = %err, "watch backend error, forcing re-read");
                            vec![MonitorEvent::DirModified]
                        }
                    };
                    // a held rename source still opens a burst so the
                    // deadline can flush it as a deletion
                    if events.is_empty() && !self.translator.has_pending() {
                        continue;
                    }
                    if deadline.is_none() {
                        self.emit(MonitorEvent::EventsBegin);
                    }
                    for event in events {
                        self.emit(event);
                    }
                    deadline = Some(Instant::now() + self.idle);
                }
                Message::Resume => self.replay(),
                Message::Stop => break,
            }
        }

        trace!("monitor thread exiting");
    }

    fn end_burst(&mut self) {
        for event in self.translator.flush() {
            self.emit(event);
        }
        self.emit(MonitorEvent::EventsEnd);
    }

    fn emit(&mut self, event: MonitorEvent) {
        if self.flags.cancelled.load(Ordering::Acquire) {
            return;
        }
        if self.flags.paused.load(Ordering::Acquire) {
            self.held.push(event);
            return;
        }
        trace!(?event, "monitor event");
        (self.sink)(event);
    }

    fn replay(&mut self) {
        if self.flags.paused.load(Ordering::Acquire) {
            return;
        }
        let held = std::mem::take(&mut self.held);
        for event in held {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, EventKind, ModifyKind, RemoveKind, RenameMode};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Sender};
    use std::thread;

    const IDLE: Duration = Duration::from_millis(50);

    fn raw(kind: EventKind, path: &str) -> Message {
        Message::Raw(Ok(notify::Event::new(kind).add_path(PathBuf::from(path))))
    }

    fn start(flags: Arc<Flags>) -> (Sender<Message>, Arc<Mutex<Vec<MonitorEvent>>>, thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let coalescer = Coalescer::new(
            Translator::new("/watched", true),
            IDLE,
            flags,
            Box::new(move |e| sink_seen.lock().unwrap().push(e)),
        );
        let handle = thread::spawn(move || coalescer.run(rx));
        (tx, seen, handle)
    }

    #[test]
    fn test_burst_is_bracketed() {
        let (tx, seen, handle) = start(Arc::new(Flags::default()));

        tx.send(raw(EventKind::Create(CreateKind::File), "/watched/a")).unwrap();
        tx.send(raw(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "/watched/a"))
            .unwrap();
        tx.send(raw(EventKind::Remove(RemoveKind::File), "/watched/b")).unwrap();
        thread::sleep(IDLE * 4);
        tx.send(Message::Stop).unwrap();
        handle.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                MonitorEvent::EventsBegin,
                MonitorEvent::FileCreated("a".into()),
                MonitorEvent::FileModified("a".into()),
                MonitorEvent::FileDeleted("b".into()),
                MonitorEvent::EventsEnd,
            ]
        );
    }

    #[test]
    fn test_paused_events_replay_in_order() {
        let flags = Arc::new(Flags::default());
        flags.paused.store(true, Ordering::Release);
        let (tx, seen, handle) = start(Arc::clone(&flags));

        tx.send(raw(EventKind::Create(CreateKind::File), "/watched/x")).unwrap();
        thread::sleep(IDLE * 4);
        assert!(seen.lock().unwrap().is_empty());

        flags.paused.store(false, Ordering::Release);
        tx.send(Message::Resume).unwrap();
        tx.send(Message::Stop).unwrap();
        handle.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                MonitorEvent::EventsBegin,
                MonitorEvent::FileCreated("x".into()),
                MonitorEvent::EventsEnd,
            ]
        );
    }

    #[test]
    fn test_lone_rename_source_closes_as_deletion() {
        let (tx, seen, handle) = start(Arc::new(Flags::default()));

        let moved_out = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/watched/gone"))
            .set_tracker(9);
        tx.send(Message::Raw(Ok(moved_out))).unwrap();
        thread::sleep(IDLE * 8);
        tx.send(Message::Stop).unwrap();
        handle.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                MonitorEvent::EventsBegin,
                MonitorEvent::FileDeleted("gone".into()),
                MonitorEvent::EventsEnd,
            ]
        );
    }

    #[test]
    fn test_cancelled_delivers_nothing() {
        let flags = Arc::new(Flags::default());
        let (tx, seen, handle) = start(Arc::clone(&flags));

        flags.cancelled.store(true, Ordering::Release);
        tx.send(raw(EventKind::Create(CreateKind::File), "/watched/x")).unwrap();
        thread::sleep(IDLE * 2);
        tx.send(Message::Stop).unwrap();
        handle.join().unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }
}
