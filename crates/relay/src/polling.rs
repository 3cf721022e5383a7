//! Long-poll receive loop.

use std::sync::Arc;
use std::time::Duration;

use lmgram_core::transport::UpdateSource;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dispatcher::UpdateDispatcher;

/// Pause after a failed poll before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Poll `source` until `stop` becomes `true` (or its sender is dropped).
///
/// Each event is dispatched on its own task; the loop never waits for them,
/// and stopping does not wait for in-flight tasks either.
pub async fn run_long_polling(
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<UpdateDispatcher>,
    timeout_secs: u64,
    mut stop: watch::Receiver<bool>,
) {
    info!(timeout_secs, "Long polling started");
    let mut offset: i64 = 0;

    loop {
        if *stop.borrow() {
            break;
        }

        let result = tokio::select! {
            _ = stop.changed() => break,
            result = source.poll(offset, timeout_secs) => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(event) = update.event else {
                        debug!(update_id = update.update_id, "Skipping non-message update");
                        continue;
                    };
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        let chat_id = event.chat_id;
                        let outcome = dispatcher.dispatch(event).await;
                        debug!(chat_id, ?outcome, "Update handled");
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "Polling for updates failed");
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }
    }

    info!("Stop long polling");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        RecordingTransport, ScriptedInference, ScriptedSource, command_event, update,
    };
    use lmgram_config::Translations;
    use lmgram_context::ConversationStore;
    use lmgram_core::error::TransportError;
    use lmgram_security::UserStore;

    fn dispatcher(transport: Arc<RecordingTransport>) -> (Arc<UpdateDispatcher>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let users = Arc::new(UserStore::empty(dir.path().join("users.json")));
        users.set_allowed(1, true);
        let d = UpdateDispatcher::new(
            transport,
            Arc::new(ScriptedInference::new()),
            Arc::new(ConversationStore::default()),
            users,
            Arc::new(Translations::default()),
            "m",
        );
        (Arc::new(d), dir)
    }

    async fn wait_for_sends(transport: &RecordingTransport, n: usize) {
        for _ in 0..200 {
            if transport.sent_texts().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} sends, got {:?}", transport.sent_texts());
    }

    #[tokio::test]
    async fn offset_advances_and_events_are_dispatched() {
        let transport = Arc::new(RecordingTransport::new());
        let (d, _dir) = dispatcher(transport.clone());
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![
                update(5, Some(command_event(10, 1, "start"))),
                update(6, None),
            ]),
            Ok(vec![update(7, Some(command_event(11, 1, "start")))]),
        ]));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_long_polling(source.clone(), d, 30, stop_rx));
        wait_for_sends(&transport, 2).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        // Third poll is pending forever until the stop signal.
        assert_eq!(source.offsets(), vec![0, 7, 8]);
    }

    #[tokio::test]
    async fn stop_signal_interrupts_pending_poll() {
        let transport = Arc::new(RecordingTransport::new());
        let (d, _dir) = dispatcher(transport);
        let source = Arc::new(ScriptedSource::new(vec![]));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_long_polling(source, d, 60, stop_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn already_stopped_loop_never_polls() {
        let transport = Arc::new(RecordingTransport::new());
        let (d, _dir) = dispatcher(transport);
        let source = Arc::new(ScriptedSource::new(vec![]));
        let (_stop_tx, stop_rx) = watch::channel(true);

        run_long_polling(source.clone(), d, 60, stop_rx).await;
        assert!(source.offsets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off_and_keep_offset() {
        let transport = Arc::new(RecordingTransport::new());
        let (d, _dir) = dispatcher(transport.clone());
        let source = Arc::new(ScriptedSource::new(vec![
            Err(TransportError::Network("timeout".into())),
            Ok(vec![update(40, Some(command_event(3, 1, "start")))]),
        ]));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_long_polling(source.clone(), d, 30, stop_rx));
        wait_for_sends(&transport, 1).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(source.offsets(), vec![0, 0, 41]);
    }

    #[tokio::test]
    async fn dropped_stop_sender_ends_loop() {
        let transport = Arc::new(RecordingTransport::new());
        let (d, _dir) = dispatcher(transport);
        let source = Arc::new(ScriptedSource::new(vec![]));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_long_polling(source, d, 60, stop_rx));
        drop(stop_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
