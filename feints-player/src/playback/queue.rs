//! Pending-track queue
//!
//! Plain FIFO. The engine is the only writer in practice, but the queue carries its own
//! lock so snapshots can be taken from anywhere without going through the actor.

use crate::playback::types::Track;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Concurrency-safe FIFO of tracks waiting to play
#[derive(Debug, Default)]
pub struct SongQueue {
    tracks: Mutex<VecDeque<Track>>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a VecDeque half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Track>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a track at the tail
    pub fn push(&self, track: Track) {
        self.lock().push_back(track);
    }

    /// Remove and return the head, if any
    pub fn pop(&self) -> Option<Track> {
        self.lock().pop_front()
    }

    /// Clone of the head without removing it
    pub fn peek(&self) -> Option<Track> {
        self.lock().front().cloned()
    }

    /// Independent copy of the queue, head first
    pub fn list(&self) -> Vec<Track> {
        self.lock().iter().cloned().collect()
    }

    /// Remove every pending track; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut tracks = self.lock();
        let dropped = tracks.len();
        tracks.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn track(n: usize) -> Track {
        Track::new(format!("/music/{}.flac", n), format!("track {}", n)).expect("track")
    }

    #[test]
    fn test_fifo_order() {
        let queue = SongQueue::new();
        for n in 0..10 {
            queue.push(track(n));
        }

        for n in 0..10 {
            assert_eq!(queue.pop(), Some(track(n)));
        }
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_list_is_independent_copy() {
        let queue = SongQueue::new();
        queue.push(track(1));
        queue.push(track(2));

        let listed = queue.list();
        queue.pop();

        assert_eq!(listed, vec![track(1), track(2)]);
        assert_eq!(queue.list(), vec![track(2)]);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = SongQueue::new();
        assert_eq!(queue.peek(), None);

        queue.push(track(5));
        assert_eq!(queue.peek(), Some(track(5)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_returns_count() {
        let queue = SongQueue::new();
        queue.push(track(1));
        queue.push(track(2));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_concurrent_push_and_list() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 250;

        let queue = Arc::new(SongQueue::new());

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_WRITER {
                        queue.push(track(w * PER_WRITER + i));
                    }
                })
            })
            .collect();

        let reader = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    // Every snapshot must be made of whole, valid tracks in per-writer order
                    let snapshot = queue.list();
                    let mut last_seen = vec![None; WRITERS];
                    for t in &snapshot {
                        let n: usize = t
                            .locator()
                            .trim_start_matches("/music/")
                            .trim_end_matches(".flac")
                            .parse()
                            .expect("untorn locator");
                        let writer = n / PER_WRITER;
                        if let Some(prev) = last_seen[writer] {
                            assert!(n > prev, "per-writer order violated");
                        }
                        last_seen[writer] = Some(n);
                    }
                }
            })
        };

        for handle in writers {
            handle.join().expect("writer");
        }
        reader.join().expect("reader");

        let mut all: Vec<usize> = queue
            .list()
            .iter()
            .map(|t| {
                t.locator()
                    .trim_start_matches("/music/")
                    .trim_end_matches(".flac")
                    .parse()
                    .expect("number")
            })
            .collect();
        assert_eq!(all.len(), WRITERS * PER_WRITER);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), WRITERS * PER_WRITER, "no entry lost or duplicated");
    }
}
