//! Control command handling
//!
//! Commands that make no sense in the current state are no-ops (logged at debug level), never
//! errors: the caller already got its acknowledgment when the command entered the mailbox.

use super::core::EngineActor;
use crate::playback::types::{Command, Track};
use feints_common::events::{PlaybackState, QueueChangeTrigger};
use tracing::debug;

impl EngineActor {
    pub(super) fn handle_command(&mut self, command: Command) {
        debug!(
            session = %self.key,
            command = command.name(),
            state = %self.state,
            "Handling command"
        );

        match command {
            Command::Enqueue(track) => self.enqueue(track),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Stop => self.stop(),
            Command::Skip => self.skip(),
            Command::Clear => self.clear(),
            Command::Query(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn enqueue(&mut self, track: Track) {
        self.queue.push(track);
        self.emit_queue_changed(QueueChangeTrigger::Enqueue);

        if self.state == PlaybackState::Idle {
            self.start_from_queue();
        }
    }

    fn play(&mut self) {
        if self.state != PlaybackState::Idle || self.queue.is_empty() {
            self.ignore("play");
            return;
        }
        self.start_from_queue();
    }

    fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            self.ignore("pause");
            return;
        }
        // No active worker means the next one is still waiting on teardown; it starts paused
        if let Some(worker) = &self.active {
            worker.pause();
        }
        self.set_state(PlaybackState::Paused);
    }

    fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            self.ignore("resume");
            return;
        }
        if let Some(worker) = &self.active {
            worker.resume();
        }
        self.set_state(PlaybackState::Playing);
    }

    fn skip(&mut self) {
        if !self.state.has_current_track() {
            self.ignore("skip");
            return;
        }

        self.drop_unstarted_current();
        self.retire_active();

        match self.queue.pop() {
            Some(next) => {
                self.emit_queue_changed(QueueChangeTrigger::Skip);
                self.begin(next, PlaybackState::Playing);
            }
            None => {
                self.current = None;
                self.set_state(PlaybackState::Idle);
            }
        }
    }

    fn stop(&mut self) {
        self.drop_unstarted_current();
        self.retire_active();

        if self.queue.clear() > 0 {
            self.emit_queue_changed(QueueChangeTrigger::Stop);
        }
        self.current = None;
        self.set_state(PlaybackState::Idle);
    }

    fn clear(&mut self) {
        if self.queue.clear() > 0 {
            self.emit_queue_changed(QueueChangeTrigger::Clear);
        }
    }

    fn start_from_queue(&mut self) {
        if let Some(track) = self.queue.pop() {
            self.emit_queue_changed(QueueChangeTrigger::Advance);
            self.begin(track, PlaybackState::Playing);
        }
    }

    fn ignore(&self, command: &str) {
        debug!(
            session = %self.key,
            command,
            state = %self.state,
            "Command not valid in current state, ignoring"
        );
    }
}
