//! Guaranteed note-off scheduling (spec.md §4.5): every `NoteEvent` that
//! isn't a rest gets its note-on fired immediately and its note-off queued
//! for `duration_seconds` later. `shutdown` drains every pending note-off
//! synchronously, so a process exit never leaves a stuck note sounding.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genloop_types::{MidiOutSink, NoteEvent};

#[derive(Debug, Clone, Copy)]
struct PendingOff {
    at: Instant,
    note: u8,
    channel: u8,
    voice_index: u32,
}

impl PartialEq for PendingOff {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl Eq for PendingOff {}
impl PartialOrd for PendingOff {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingOff {
    // Reversed so `BinaryHeap` (a max-heap) pops the earliest `at` first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

enum Msg {
    Wake,
    Stop,
}

const IDLE_POLL: Duration = Duration::from_secs(1);

pub struct NoteScheduler {
    sink: Arc<dyn MidiOutSink>,
    heap: Mutex<BinaryHeap<PendingOff>>,
    running: AtomicBool,
    tx: Mutex<Option<Sender<Msg>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NoteScheduler {
    pub fn new(sink: Arc<dyn MidiOutSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            heap: Mutex::new(BinaryHeap::new()),
            running: AtomicBool::new(false),
            tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.tx.lock().unwrap() = Some(tx);
        let sched = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("genloop-note-scheduler".into())
            .spawn(move || sched.run(rx))
            .expect("failed to spawn genloop-note-scheduler thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Fire the note-on now and queue the guaranteed note-off. No-op for
    /// rests.
    pub fn schedule(&self, event: &NoteEvent) {
        if event.is_rest {
            return;
        }
        self.sink.note_on(event.note, event.velocity, event.channel);
        let at = Instant::now() + Duration::from_secs_f64(event.duration_seconds);
        self.heap.lock().unwrap().push(PendingOff {
            at,
            note: event.note,
            channel: event.channel,
            voice_index: event.voice_index,
        });
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(Msg::Wake);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// Stop the thread. Every pending note-off fires synchronously before
    /// the call returns, regardless of its originally scheduled time.
    pub fn shutdown(&self) {
        if !self.running.swap(false, AtomicOrdering::SeqCst) {
            self.drain_all();
            return;
        }
        if let Some(tx) = self.tx.lock().unwrap().take() {
            let _ = tx.send(Msg::Stop);
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!(target: "genloop_engine::scheduler", "scheduler thread join failed: {e:?}");
            }
        }
    }

    fn run(&self, rx: mpsc::Receiver<Msg>) {
        loop {
            let wait = self.next_wait();
            match rx.recv_timeout(wait) {
                Ok(Msg::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    self.drain_all();
                    break;
                }
                Ok(Msg::Wake) => continue,
                Err(RecvTimeoutError::Timeout) => self.fire_due(),
            }
        }
    }

    fn next_wait(&self) -> Duration {
        let heap = self.heap.lock().unwrap();
        match heap.peek() {
            Some(p) => p.at.saturating_duration_since(Instant::now()),
            None => IDLE_POLL,
        }
    }

    fn fire_due(&self) {
        let now = Instant::now();
        let mut heap = self.heap.lock().unwrap();
        while let Some(top) = heap.peek() {
            if top.at > now {
                break;
            }
            let due = heap.pop().unwrap();
            self.sink.note_off(due.note, due.channel);
        }
    }

    fn drain_all(&self) {
        let mut heap = self.heap.lock().unwrap();
        while let Some(pending) = heap.pop() {
            self.sink.note_off(pending.note, pending.channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloop_types::ControlChangeEvent;
    use std::sync::atomic::{AtomicUsize, Ordering as AO};

    struct RecordingSink {
        ons: AtomicUsize,
        offs: AtomicUsize,
    }
    impl MidiOutSink for RecordingSink {
        fn note_on(&self, _note: u8, _velocity: u8, _channel: u8) {
            self.ons.fetch_add(1, AO::SeqCst);
        }
        fn note_off(&self, _note: u8, _channel: u8) {
            self.offs.fetch_add(1, AO::SeqCst);
        }
        fn control_change(&self, _cc: ControlChangeEvent) {}
    }

    #[test]
    fn rest_triggers_nothing() {
        let sink = Arc::new(RecordingSink {
            ons: AtomicUsize::new(0),
            offs: AtomicUsize::new(0),
        });
        let scheduler = NoteScheduler::new(sink.clone());
        scheduler.schedule(&NoteEvent::rest(0, 0));
        assert_eq!(sink.ons.load(AO::SeqCst), 0);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn note_on_fires_immediately_and_queues_off() {
        let sink = Arc::new(RecordingSink {
            ons: AtomicUsize::new(0),
            offs: AtomicUsize::new(0),
        });
        let scheduler = NoteScheduler::new(sink.clone());
        scheduler.schedule(&NoteEvent::note_on(60, 100, 5.0, 0, 0, 1));
        assert_eq!(sink.ons.load(AO::SeqCst), 1);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn shutdown_drains_in_flight_notes_synchronously() {
        let sink = Arc::new(RecordingSink {
            ons: AtomicUsize::new(0),
            offs: AtomicUsize::new(0),
        });
        let scheduler = NoteScheduler::new(sink.clone());
        scheduler.start();
        scheduler.schedule(&NoteEvent::note_on(60, 100, 30.0, 0, 0, 1));
        scheduler.schedule(&NoteEvent::note_on(64, 100, 30.0, 1, 0, 1));
        scheduler.shutdown();
        assert_eq!(sink.offs.load(AO::SeqCst), 2);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn due_offs_fire_without_waiting_for_shutdown() {
        let sink = Arc::new(RecordingSink {
            ons: AtomicUsize::new(0),
            offs: AtomicUsize::new(0),
        });
        let scheduler = NoteScheduler::new(sink.clone());
        scheduler.start();
        scheduler.schedule(&NoteEvent::note_on(60, 100, 0.01, 0, 0, 1));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.offs.load(AO::SeqCst), 1);
        scheduler.shutdown();
    }
}
