//! Typed, non-blocking command channels connecting the decoder context to
//! the things that need to reach into it without sharing writable state: the
//! TSM's retune requests flowing out to the capture front end, and UI-issued
//! control requests flowing in to be drained at safe points between frames.
//!
//! Built on `crossbeam::channel` rather than `std::sync::mpsc` for the
//! bounded, non-blocking `try_send`/`try_recv` pair the retune path needs —
//! a full channel must drop the command rather than block the decoder
//! thread, since a stale retune is better discarded than backed up.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::tsm::RetuneCommand;

/// Control requests a UI or operator console can issue into the running
/// decoder context; drained at safe points between frame decodes, never
/// applied mid-frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    SetTgHold(u32),
    ForceRelease,
    SetLcwRetune(bool),
    Shutdown,
}

/// One side of a bounded, non-blocking command channel. `send` drops the
/// command (incrementing `dropped`) rather than blocking when the channel
/// is full, since commands describe current intent and a backlog of stale
/// ones is never useful.
pub struct CommandSender<T> {
    tx: Sender<T>,
    dropped: u64,
}

/// Clones share the underlying `crossbeam` sender (a genuine multi-producer
/// channel under the hood) but start their own `dropped` count — each handle
/// reports only the drops it personally caused.
impl<T> Clone for CommandSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), dropped: 0 }
    }
}

impl<T> CommandSender<T> {
    /// Attempts to enqueue `command`; returns `true` if it was accepted.
    pub fn send(&mut self, command: T) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Drains all currently-queued commands without blocking.
pub struct CommandReceiver<T> {
    rx: Receiver<T>,
}

/// `crossbeam::channel::Receiver` is a genuine MPMC receiver under the hood,
/// so fanning the same command stream out to several threads (e.g. a retune
/// command reaching both the capture and DSP threads) is just a clone.
impl<T> Clone for CommandReceiver<T> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

impl<T> CommandReceiver<T> {
    /// Returns every command queued since the last drain, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

/// Builds a bounded, non-blocking command channel of capacity `capacity`.
pub fn channel<T>(capacity: usize) -> (CommandSender<T>, CommandReceiver<T>) {
    let (tx, rx) = channel::bounded(capacity);
    (CommandSender { tx, dropped: 0 }, CommandReceiver { rx })
}

/// Convenience alias for the TSM → capture-front-end retune command channel.
pub type RetuneSender = CommandSender<RetuneCommand>;
pub type RetuneReceiver = CommandReceiver<RetuneCommand>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_all_queued_commands_in_order() {
        let (mut tx, rx) = channel::<UiCommand>(4);
        tx.send(UiCommand::SetTgHold(5));
        tx.send(UiCommand::ForceRelease);
        let drained = rx.drain();
        assert_eq!(drained, vec![UiCommand::SetTgHold(5), UiCommand::ForceRelease]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn send_past_capacity_drops_and_counts() {
        let (mut tx, _rx) = channel::<UiCommand>(1);
        assert!(tx.send(UiCommand::Shutdown));
        assert!(!tx.send(UiCommand::Shutdown));
        assert_eq!(tx.dropped(), 1);
    }

    #[test]
    fn retune_commands_flow_through_the_same_channel_shape() {
        let (mut tx, rx) = channel::<RetuneCommand>(2);
        assert!(tx.send(RetuneCommand::ToControl { freq_hz: 851_000_000 }));
        assert_eq!(rx.drain(), vec![RetuneCommand::ToControl { freq_hz: 851_000_000 }]);
    }

    #[test]
    fn cloned_receiver_sees_the_same_stream() {
        let (mut tx, rx) = channel::<UiCommand>(4);
        let rx2 = rx.clone();
        tx.send(UiCommand::ForceRelease);
        // Either handle may observe the single queued item, never both.
        let total = rx.drain().len() + rx2.drain().len();
        assert_eq!(total, 1);
    }

    #[test]
    fn cloned_sender_tracks_its_own_drops() {
        let (mut tx, _rx) = channel::<UiCommand>(0);
        let mut tx2 = tx.clone();
        tx.send(UiCommand::ForceRelease);
        tx2.send(UiCommand::ForceRelease);
        assert_eq!(tx.dropped(), 1);
        assert_eq!(tx2.dropped(), 1);
    }
}
