//! Firmware upload state machine.
//!
//! Owns the single update session: image selection, the chunked transfer,
//! the reboot confirmation and the reconnect phase that follows it. All
//! state lives behind one lock that is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard};

use pendant_transfer::{
    ChunkJob, ChunkScheduler, FirmwareImage, ScheduleError, TransferProgress, TransferRequest,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::device::{DeviceLink, LinkError};
use crate::error::ActionError;
use crate::messages::{MessageCatalog, MessageKey};
use crate::reconnect::{ReconnectOutcome, supervise};
use crate::types::{UpdateEvent, UpdateSnapshot, UpdateState, UpdaterConfig};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives one firmware update at a time.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct FirmwareUpdater {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<dyn DeviceLink>,
    catalog: Arc<dyn MessageCatalog>,
    config: UpdaterConfig,
    scheduler: ChunkScheduler,
    session: Mutex<Session>,
    events_tx: mpsc::Sender<UpdateEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UpdateEvent>>>,
}

#[derive(Default)]
struct Session {
    state: UpdateState,
    progress_percent: u8,
    error_message: Option<String>,
    image: Option<Arc<FirmwareImage>>,
    request: Option<TransferRequest>,
    current_version: Option<String>,
    upload_cancel: Option<CancellationToken>,
    /// Bumped by every upload; a finishing upload only touches the
    /// session it started.
    upload_seq: u64,
    recovery_cancel: Option<CancellationToken>,
}

impl Session {
    fn owns_upload(&self, seq: u64) -> bool {
        self.state == UpdateState::Uploading && self.upload_seq == seq
    }
}

impl FirmwareUpdater {
    /// Creates an idle updater talking to `link`.
    pub fn new(
        link: Arc<dyn DeviceLink>,
        catalog: Arc<dyn MessageCatalog>,
        config: UpdaterConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                link,
                catalog,
                config,
                scheduler: ChunkScheduler::default(),
                session: Mutex::new(Session::default()),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UpdateEvent>> {
        self.inner
            .events_rx
            .lock()
            .ok()
            .and_then(|mut rx| rx.take())
    }

    /// Current state, progress and messages.
    pub fn snapshot(&self) -> UpdateSnapshot {
        let s = self.inner.session();
        UpdateSnapshot {
            state: s.state,
            progress_percent: s.progress_percent,
            error_message: s.error_message.clone(),
            selected_image: s.image.as_ref().map(|i| i.name().to_string()),
            current_version: s.current_version.clone(),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.inner.session().state
    }

    /// Selects the image for the next upload. Only allowed while idle.
    ///
    /// An invalid image clears the selection and sets an error message.
    pub fn select_file(&self, image: FirmwareImage) -> Result<(), ActionError> {
        let mut s = self.inner.session();
        if s.state.is_busy() {
            return Err(ActionError::Busy(s.state));
        }

        match TransferRequest::new(self.inner.config.target, &image) {
            Ok(request) => {
                info!(
                    name = %request.name,
                    size = request.total_size,
                    sha256 = %image.digest(),
                    "firmware image selected"
                );
                s.image = Some(Arc::new(image));
                s.request = Some(request);
                s.error_message = None;
                s.progress_percent = 0;
                Ok(())
            }
            Err(e) => {
                warn!(name = %image.name(), error = %e, "firmware image rejected");
                s.image = None;
                s.request = None;
                let message = self.inner.catalog.text(MessageKey::InvalidImage);
                self.inner.fail_locked(&mut s, message, None);
                Err(e.into())
            }
        }
    }

    /// Uploads the selected image.
    ///
    /// The transfer runs on a spawned task; this resolves once it has
    /// finished. On success the updater is in `Success`; on failure or
    /// cancellation it is back in `Idle`, with an error message for
    /// failures. Device failures are not returned as errors; only refused
    /// actions are. Dropping the returned future leaves the transfer
    /// running; use [`cancel_upload`](Self::cancel_upload) or
    /// [`teardown`](Self::teardown) to stop it.
    pub async fn start_upload(&self) -> Result<(), ActionError> {
        let (image, request, cancel, seq) = {
            let mut s = self.inner.session();
            if s.state.is_busy() {
                return Err(ActionError::Busy(s.state));
            }
            let (Some(image), Some(request)) = (s.image.clone(), s.request.clone()) else {
                let message = self.inner.catalog.text(MessageKey::NoImageSelected);
                self.inner.fail_locked(&mut s, message, None);
                return Err(ActionError::NoImage);
            };

            let cancel = CancellationToken::new();
            s.upload_cancel = Some(cancel.clone());
            s.upload_seq = s.upload_seq.wrapping_add(1);
            s.error_message = None;
            s.progress_percent = 0;
            self.inner.transition(&mut s, UpdateState::Uploading);
            (image, request, cancel, s.upload_seq)
        };

        let inner = Arc::clone(&self.inner);
        let span = info_span!("firmware_upload", session = %Uuid::new_v4(), name = %request.name);
        let task = tokio::spawn(
            async move { inner.upload(seq, image, request, cancel).await }.instrument(span),
        );
        if let Err(e) = task.await {
            warn!(error = %e, "firmware upload task ended abnormally");
            let mut s = self.inner.session();
            if s.owns_upload(seq) {
                s.upload_cancel = None;
                let message = self.inner.catalog.text(MessageKey::UnknownError);
                self.inner.fail_locked(&mut s, message, None);
            }
        }
        Ok(())
    }

    /// Stops the running upload before its next chunk.
    pub fn cancel_upload(&self) -> Result<(), ActionError> {
        let s = self.inner.session();
        match (&s.state, &s.upload_cancel) {
            (UpdateState::Uploading, Some(token)) => {
                info!("upload cancel requested");
                token.cancel();
                Ok(())
            }
            _ => Err(ActionError::NotUploading),
        }
    }

    /// Confirms the reboot after a successful upload.
    ///
    /// Enters `Rebooting` and returns; the reboot request, settle delay and
    /// reconnect polling run on a spawned task. Must be called from within
    /// a Tokio runtime.
    pub fn confirm_reboot(&self) -> Result<(), ActionError> {
        let cancel = {
            let mut s = self.inner.session();
            if s.state != UpdateState::Success {
                return Err(ActionError::NotReady(s.state));
            }
            let cancel = CancellationToken::new();
            s.recovery_cancel = Some(cancel.clone());
            s.error_message = None;
            self.inner.transition(&mut s, UpdateState::Rebooting);
            cancel
        };

        let inner = Arc::clone(&self.inner);
        let span = info_span!("firmware_recovery", session = %Uuid::new_v4());
        tokio::spawn(async move { inner.recover(cancel).await }.instrument(span));
        Ok(())
    }

    /// Stops any pending work when the owner goes away.
    ///
    /// The session returns to `Idle` at once. A running upload stops before
    /// its next chunk; a pending reboot or reconnect phase stops at once.
    /// Neither reports anything further.
    pub fn teardown(&self) {
        let mut s = self.inner.session();
        let upload = s.upload_cancel.take();
        let recovery = s.recovery_cancel.take();
        if upload.is_none() && recovery.is_none() {
            return;
        }
        for token in upload.iter().chain(recovery.iter()) {
            token.cancel();
        }
        debug!(state = %s.state, "update torn down");
        s.progress_percent = 0;
        if matches!(
            s.state,
            UpdateState::Uploading | UpdateState::Rebooting | UpdateState::Reconnecting
        ) {
            self.inner.transition(&mut s, UpdateState::Idle);
        }
    }

    /// Reads the running firmware version from the device.
    ///
    /// Failures are logged and leave the last known version in place.
    pub async fn refresh_current_version(&self) -> Option<String> {
        match self.inner.link.current_version().await {
            Ok(version) => {
                debug!(%version, "current firmware version");
                let mut s = self.inner.session();
                s.current_version = Some(version.clone());
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "could not read firmware version");
                self.inner.session().current_version.clone()
            }
        }
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: UpdateEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            warn!("failed to emit update event: {e}");
        }
    }

    fn transition(&self, s: &mut Session, state: UpdateState) {
        debug!(from = %s.state, to = %state, "update state changed");
        s.state = state;
        self.emit(UpdateEvent::StateChanged { state });
    }

    /// Returns to `Idle` with `message` as the visible error.
    fn fail_locked(&self, s: &mut Session, message: String, offset: Option<u64>) {
        s.error_message = Some(message.clone());
        s.progress_percent = 0;
        if s.state != UpdateState::Idle {
            self.transition(s, UpdateState::Idle);
        }
        self.emit(UpdateEvent::Failed { message, offset });
    }

    fn link_error_message(&self, err: &LinkError) -> String {
        match err {
            LinkError::Rejected(api) => self
                .catalog
                .error_message(Some(api.code), Some(&api.message)),
            LinkError::Unauthorized => self.catalog.text(MessageKey::Unauthorized),
            LinkError::Unreachable(_) => self.catalog.text(MessageKey::NetworkError),
            LinkError::Other(msg) => self.catalog.error_message(None, Some(msg)),
        }
    }

    fn record_progress(&self, seq: u64, progress: TransferProgress) {
        let mut s = self.session();
        if !s.owns_upload(seq) || s.progress_percent == progress.percent {
            return;
        }
        s.progress_percent = progress.percent;
        self.emit(UpdateEvent::Progress(progress));
    }

    async fn upload(
        self: Arc<Self>,
        seq: u64,
        image: Arc<FirmwareImage>,
        request: TransferRequest,
        cancel: CancellationToken,
    ) {
        info!(size = request.total_size, target_id = %request.target, "firmware upload starting");

        if let Err(e) = self.link.begin_transfer(&request).await {
            warn!(error = %e, "firmware begin rejected");
            let message = self.link_error_message(&e);
            let mut s = self.session();
            if !s.owns_upload(seq) {
                return;
            }
            s.upload_cancel = None;
            self.fail_locked(&mut s, message, None);
            return;
        }

        let link = Arc::clone(&self.link);
        let result = self
            .scheduler
            .run(
                image.data(),
                &cancel,
                |job: ChunkJob| {
                    let link = Arc::clone(&link);
                    async move {
                        let ChunkJob { offset, payload } = job;
                        let len = payload.len() as u64;
                        let ack = link.upload_chunk(offset, payload).await?;
                        if ack.offset != offset || ack.written != len {
                            warn!(
                                offset,
                                len,
                                ack_offset = ack.offset,
                                ack_written = ack.written,
                                "device acknowledged a different range"
                            );
                        }
                        Ok::<_, LinkError>(())
                    }
                },
                |progress| self.record_progress(seq, progress),
            )
            .await;

        let mut s = self.session();
        if !s.owns_upload(seq) {
            debug!("upload finished after teardown, session untouched");
            return;
        }
        s.upload_cancel = None;
        match result {
            Ok(progress) => {
                info!(bytes = progress.bytes_sent, "firmware written, awaiting reboot confirmation");
                s.progress_percent = 100;
                s.image = None;
                s.request = None;
                self.transition(&mut s, UpdateState::Success);
            }
            Err(ScheduleError::Chunk { offset, source }) => {
                warn!(offset, error = %source, "firmware chunk failed");
                let message = self.link_error_message(&source);
                self.fail_locked(&mut s, message, Some(offset));
            }
            Err(ScheduleError::Cancelled { offset }) => {
                info!(offset, "firmware upload cancelled");
                s.progress_percent = 0;
                self.transition(&mut s, UpdateState::Idle);
                self.emit(UpdateEvent::Cancelled);
            }
        }
    }

    async fn recover(self: Arc<Self>, cancel: CancellationToken) {
        // The device may drop the connection while going down, so the
        // outcome of the reboot call does not matter.
        let reboot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.link.request_reboot() => result,
        };
        match reboot {
            Ok(()) => info!("reboot requested"),
            Err(e) => debug!(error = %e, "reboot request failed, continuing"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        {
            let mut s = self.session();
            if cancel.is_cancelled() {
                return;
            }
            self.transition(&mut s, UpdateState::Reconnecting);
        }

        let outcome = supervise(
            &self.config.reconnect,
            &cancel,
            || self.link.probe_liveness(),
            |attempt, max_attempts| {
                self.emit(UpdateEvent::ReconnectAttempt {
                    attempt,
                    max_attempts,
                })
            },
        )
        .await;

        let mut s = self.session();
        if cancel.is_cancelled() {
            return;
        }
        s.recovery_cancel = None;
        match outcome {
            ReconnectOutcome::Reconnected { attempts } => {
                info!(attempts, "device back online, resetting session");
                s.error_message = None;
                self.transition(&mut s, UpdateState::Idle);
                self.emit(UpdateEvent::SessionReset);
            }
            ReconnectOutcome::Exhausted { attempts } => {
                warn!(attempts, "device did not come back after reboot");
                let message = self.catalog.text(MessageKey::ReconnectFailed);
                self.fail_locked(&mut s, message, None);
            }
            ReconnectOutcome::Cancelled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LinkFuture;
    use crate::messages::{Catalog, Language};
    use pendant_protocol::{ApiError, UploadAck};
    use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    #[derive(Default)]
    struct MockLink {
        begin_calls: AtomicU32,
        begin_error: Mutex<Option<LinkError>>,
        chunks: Mutex<Vec<(u64, usize)>>,
        fail_chunk_at: Mutex<Option<(u64, LinkError)>>,
        /// The chunk at this offset signals `reached`, then waits for `release`.
        hold_chunk_at: Option<u64>,
        reached: Notify,
        release: Notify,
        reboot_calls: AtomicU32,
        reboot_error: Option<LinkError>,
        /// First probe attempt that gets an answer.
        answer_from_probe: Option<u32>,
        probes: AtomicU32,
        version: Option<String>,
    }

    impl MockLink {
        fn offsets(&self) -> Vec<u64> {
            self.chunks.lock().unwrap().iter().map(|(o, _)| *o).collect()
        }
    }

    impl DeviceLink for MockLink {
        fn begin_transfer(&self, _request: &TransferRequest) -> LinkFuture<'_, ()> {
            Box::pin(async move {
                self.begin_calls.fetch_add(1, SeqCst);
                let err = self.begin_error.lock().unwrap().take();
                match err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            })
        }

        fn upload_chunk(&self, offset: u64, data: Vec<u8>) -> LinkFuture<'_, UploadAck> {
            Box::pin(async move {
                self.chunks.lock().unwrap().push((offset, data.len()));
                if self.hold_chunk_at == Some(offset) {
                    self.reached.notify_one();
                    self.release.notified().await;
                }
                let fail = {
                    let mut f = self.fail_chunk_at.lock().unwrap();
                    if f.as_ref().is_some_and(|(o, _)| *o == offset) {
                        f.take().map(|(_, e)| e)
                    } else {
                        None
                    }
                };
                match fail {
                    Some(e) => Err(e),
                    None => Ok(UploadAck {
                        offset,
                        written: data.len() as u64,
                    }),
                }
            })
        }

        fn request_reboot(&self) -> LinkFuture<'_, ()> {
            Box::pin(async move {
                self.reboot_calls.fetch_add(1, SeqCst);
                match &self.reboot_error {
                    Some(e) => Err(e.clone()),
                    None => Ok(()),
                }
            })
        }

        fn probe_liveness(&self) -> LinkFuture<'_, ()> {
            Box::pin(async move {
                let n = self.probes.fetch_add(1, SeqCst) + 1;
                if self.answer_from_probe.is_some_and(|first| n >= first) {
                    Ok(())
                } else {
                    Err(LinkError::Unreachable("connection refused".into()))
                }
            })
        }

        fn current_version(&self) -> LinkFuture<'_, String> {
            Box::pin(async move {
                self.version
                    .clone()
                    .ok_or_else(|| LinkError::Other("no version block".into()))
            })
        }
    }

    fn updater(link: Arc<MockLink>) -> FirmwareUpdater {
        FirmwareUpdater::new(
            link,
            Arc::new(Catalog::new(Language::En)),
            UpdaterConfig::default(),
        )
    }

    fn image(len: usize) -> FirmwareImage {
        FirmwareImage::new("pendant_v2.rbl", (0..len).map(|i| (i % 251) as u8).collect())
    }

    fn drain(rx: &mut mpsc::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn states(events: &[UpdateEvent]) -> Vec<UpdateState> {
        events
            .iter()
            .filter_map(|e| match e {
                UpdateEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn rejected(code: i32, message: &str) -> LinkError {
        LinkError::Rejected(ApiError {
            code,
            message: message.into(),
        })
    }

    /// Runs a 10,000-byte upload to `Success` and drains its events.
    async fn uploaded(link: Arc<MockLink>) -> (FirmwareUpdater, mpsc::Receiver<UpdateEvent>) {
        let up = updater(link);
        let mut rx = up.take_events().unwrap();
        up.select_file(image(10_000)).unwrap();
        up.start_upload().await.unwrap();
        assert_eq!(up.state(), UpdateState::Success);
        drain(&mut rx);
        (up, rx)
    }

    #[tokio::test]
    async fn upload_sends_chunks_in_order() {
        let link = Arc::new(MockLink::default());
        let up = updater(link.clone());
        let mut rx = up.take_events().unwrap();

        up.select_file(image(10_000)).unwrap();
        assert_eq!(up.snapshot().selected_image.as_deref(), Some("pendant_v2.rbl"));
        up.start_upload().await.unwrap();

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Success);
        assert_eq!(snap.progress_percent, 100);
        assert_eq!(snap.error_message, None);
        assert_eq!(snap.selected_image, None);

        assert_eq!(link.begin_calls.load(SeqCst), 1);
        assert_eq!(
            *link.chunks.lock().unwrap(),
            vec![(0, 4096), (4096, 4096), (8192, 1808)]
        );

        let events = drain(&mut rx);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                UpdateEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![33, 67, 100]);
        assert_eq!(
            states(&events),
            vec![UpdateState::Uploading, UpdateState::Success]
        );
    }

    #[test]
    fn events_can_be_taken_once() {
        let up = updater(Arc::new(MockLink::default()));
        assert!(up.take_events().is_some());
        assert!(up.take_events().is_none());
    }

    #[tokio::test]
    async fn begin_rejection_returns_to_idle() {
        let link = Arc::new(MockLink {
            begin_error: Mutex::new(Some(rejected(1001, "unsupported target"))),
            ..Default::default()
        });
        let up = updater(link.clone());
        let mut rx = up.take_events().unwrap();

        up.select_file(image(10_000)).unwrap();
        up.start_upload().await.unwrap();

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.error_message.as_deref(), Some("Invalid parameter"));
        assert_eq!(snap.selected_image.as_deref(), Some("pendant_v2.rbl"));
        assert!(link.chunks.lock().unwrap().is_empty());

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![UpdateState::Uploading, UpdateState::Idle]
        );
        assert!(events.contains(&UpdateEvent::Failed {
            message: "Invalid parameter".into(),
            offset: None,
        }));
    }

    #[tokio::test]
    async fn chunk_failure_stops_transfer_and_retry_restarts() {
        let link = Arc::new(MockLink {
            fail_chunk_at: Mutex::new(Some((4096, rejected(2001, "flash write error")))),
            ..Default::default()
        });
        let up = updater(link.clone());
        let mut rx = up.take_events().unwrap();

        up.select_file(image(10_000)).unwrap();
        up.start_upload().await.unwrap();

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.error_message.as_deref(), Some("Firmware write failed"));
        assert_eq!(link.offsets(), vec![0, 4096]);
        assert!(drain(&mut rx).contains(&UpdateEvent::Failed {
            message: "Firmware write failed".into(),
            offset: Some(4096),
        }));

        // Retry re-begins and starts over from offset 0.
        up.start_upload().await.unwrap();
        assert_eq!(up.state(), UpdateState::Success);
        assert_eq!(up.snapshot().error_message, None);
        assert_eq!(link.begin_calls.load(SeqCst), 2);
        assert_eq!(link.offsets(), vec![0, 4096, 0, 4096, 8192]);
    }

    #[tokio::test]
    async fn transport_failure_reports_network_error() {
        let link = Arc::new(MockLink {
            fail_chunk_at: Mutex::new(Some((0, LinkError::Unreachable("reset".into())))),
            ..Default::default()
        });
        let up = updater(link);
        up.select_file(image(5000)).unwrap();
        up.start_upload().await.unwrap();

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(
            snap.error_message.as_deref(),
            Some("Network connection failed")
        );
    }

    #[tokio::test]
    async fn unknown_code_shows_device_message() {
        let link = Arc::new(MockLink {
            begin_error: Mutex::new(Some(rejected(3000, "flash busy"))),
            ..Default::default()
        });
        let up = updater(link);
        up.select_file(image(5000)).unwrap();
        up.start_upload().await.unwrap();
        assert_eq!(up.snapshot().error_message.as_deref(), Some("flash busy"));
    }

    #[tokio::test]
    async fn start_without_image_is_refused() {
        let up = updater(Arc::new(MockLink::default()));
        let mut rx = up.take_events().unwrap();

        let err = up.start_upload().await.unwrap_err();
        assert!(matches!(err, ActionError::NoImage));

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(
            snap.error_message.as_deref(),
            Some("Please select a firmware file")
        );
        assert!(states(&drain(&mut rx)).is_empty());
    }

    #[test]
    fn invalid_images_are_rejected() {
        let up = updater(Arc::new(MockLink::default()));

        let err = up
            .select_file(FirmwareImage::new("fw/pendant.rbl", vec![1]))
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidImage(_)));
        assert_eq!(
            up.snapshot().error_message.as_deref(),
            Some("Invalid firmware file")
        );

        up.select_file(image(10)).unwrap();
        assert_eq!(up.snapshot().error_message, None);

        // A rejected image clears the previous selection.
        assert!(up.select_file(FirmwareImage::new("empty.rbl", Vec::new())).is_err());
        assert_eq!(up.snapshot().selected_image, None);
    }

    #[tokio::test]
    async fn actions_refused_outside_their_state() {
        let (up, _rx) = uploaded(Arc::new(MockLink::default())).await;

        assert!(matches!(
            up.select_file(image(10)),
            Err(ActionError::Busy(UpdateState::Success))
        ));
        assert!(matches!(
            up.start_upload().await,
            Err(ActionError::Busy(UpdateState::Success))
        ));
        assert!(matches!(up.cancel_upload(), Err(ActionError::NotUploading)));

        let idle = updater(Arc::new(MockLink::default()));
        assert!(matches!(
            idle.confirm_reboot(),
            Err(ActionError::NotReady(UpdateState::Idle))
        ));
    }

    #[tokio::test]
    async fn second_upload_refused_while_uploading() {
        let link = Arc::new(MockLink {
            hold_chunk_at: Some(4096),
            ..Default::default()
        });
        let up = updater(link.clone());
        up.select_file(image(10_000)).unwrap();

        let task = {
            let up = up.clone();
            tokio::spawn(async move { up.start_upload().await })
        };
        link.reached.notified().await;

        assert_eq!(up.state(), UpdateState::Uploading);
        assert!(matches!(
            up.start_upload().await,
            Err(ActionError::Busy(UpdateState::Uploading))
        ));
        assert!(matches!(
            up.select_file(image(10)),
            Err(ActionError::Busy(UpdateState::Uploading))
        ));
        assert!(matches!(
            up.confirm_reboot(),
            Err(ActionError::NotReady(UpdateState::Uploading))
        ));

        link.release.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(up.state(), UpdateState::Success);
        assert_eq!(link.begin_calls.load(SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_upload_stops_before_next_chunk() {
        let link = Arc::new(MockLink {
            hold_chunk_at: Some(4096),
            ..Default::default()
        });
        let up = updater(link.clone());
        let mut rx = up.take_events().unwrap();
        up.select_file(image(10_000)).unwrap();

        let task = {
            let up = up.clone();
            tokio::spawn(async move { up.start_upload().await })
        };
        link.reached.notified().await;
        up.cancel_upload().unwrap();
        link.release.notify_one();
        task.await.unwrap().unwrap();

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.error_message, None);
        assert_eq!(snap.selected_image.as_deref(), Some("pendant_v2.rbl"));
        assert_eq!(link.offsets(), vec![0, 4096]);

        let events = drain(&mut rx);
        assert!(events.contains(&UpdateEvent::Cancelled));
        assert!(!events.iter().any(|e| matches!(e, UpdateEvent::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_after_caller_dropped_upload_frees_session() {
        let link = Arc::new(MockLink {
            hold_chunk_at: Some(4096),
            ..Default::default()
        });
        let up = updater(link.clone());
        let mut rx = up.take_events().unwrap();
        up.select_file(image(10_000)).unwrap();

        let task = {
            let up = up.clone();
            tokio::spawn(async move { up.start_upload().await })
        };
        link.reached.notified().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        up.teardown();
        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.progress_percent, 0);

        up.select_file(image(10)).unwrap();
        up.start_upload().await.unwrap();
        assert_eq!(up.state(), UpdateState::Success);

        // The abandoned transfer finishes its chunk and stops without
        // touching the new session.
        link.release.notify_one();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(up.state(), UpdateState::Success);
        assert_eq!(link.offsets(), vec![0, 4096, 0]);
        assert_eq!(link.begin_calls.load(SeqCst), 2);

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![
                UpdateState::Uploading,
                UpdateState::Idle,
                UpdateState::Uploading,
                UpdateState::Success
            ]
        );
        assert!(!events.iter().any(|e| matches!(
            e,
            UpdateEvent::Cancelled | UpdateEvent::Failed { .. }
        )));
    }

    #[tokio::test]
    async fn unauthorized_chunk_shows_localized_message() {
        let link = Arc::new(MockLink {
            fail_chunk_at: Mutex::new(Some((0, LinkError::Unauthorized))),
            ..Default::default()
        });
        let up = FirmwareUpdater::new(
            link,
            Arc::new(Catalog::new(Language::Zh)),
            UpdaterConfig::default(),
        );
        up.select_file(image(5000)).unwrap();
        up.start_upload().await.unwrap();
        assert_eq!(
            up.snapshot().error_message.as_deref(),
            Some("登录已失效，请重新登录")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_then_reconnect_resets_session() {
        let link = Arc::new(MockLink {
            // The device usually drops the connection mid-reboot.
            reboot_error: Some(LinkError::Unreachable("connection reset".into())),
            answer_from_probe: Some(1),
            ..Default::default()
        });
        let (up, mut rx) = uploaded(link.clone()).await;

        let start = Instant::now();
        up.confirm_reboot().unwrap();
        assert_eq!(up.state(), UpdateState::Rebooting);
        assert!(matches!(
            up.confirm_reboot(),
            Err(ActionError::NotReady(UpdateState::Rebooting))
        ));

        let mut seen = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                UpdateEvent::SessionReset => break,
                e => seen.push(e),
            }
        }

        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(
            states(&seen),
            vec![
                UpdateState::Rebooting,
                UpdateState::Reconnecting,
                UpdateState::Idle
            ]
        );
        assert_eq!(link.reboot_calls.load(SeqCst), 1);
        assert_eq!(link.probes.load(SeqCst), 1);

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.error_message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_some_failed_probes() {
        let link = Arc::new(MockLink {
            answer_from_probe: Some(4),
            ..Default::default()
        });
        let (up, mut rx) = uploaded(link.clone()).await;

        let start = Instant::now();
        up.confirm_reboot().unwrap();
        while rx.recv().await.unwrap() != UpdateEvent::SessionReset {}

        // 3 s settle, then probes at +0, +2, +4, +6 s.
        assert_eq!(start.elapsed(), Duration::from_secs(9));
        assert_eq!(link.probes.load(SeqCst), 4);
        assert_eq!(up.state(), UpdateState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_exhaustion_reports_failure() {
        let link = Arc::new(MockLink::default());
        let (up, mut rx) = uploaded(link.clone()).await;

        let start = Instant::now();
        up.confirm_reboot().unwrap();

        let mut attempts = 0;
        let message = loop {
            match rx.recv().await.unwrap() {
                UpdateEvent::ReconnectAttempt { max_attempts, .. } => {
                    assert_eq!(max_attempts, 60);
                    attempts += 1;
                }
                UpdateEvent::Failed { message, offset } => {
                    assert_eq!(offset, None);
                    break message;
                }
                UpdateEvent::SessionReset => panic!("device never answered"),
                _ => {}
            }
        };

        assert_eq!(
            message,
            "Unable to connect to device, please refresh manually"
        );
        assert_eq!(attempts, 60);
        assert_eq!(link.probes.load(SeqCst), 60);
        assert_eq!(start.elapsed(), Duration::from_secs(3 + 118));

        let snap = up.snapshot();
        assert_eq!(snap.state, UpdateState::Idle);
        assert_eq!(snap.error_message.as_deref(), Some(message.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_reconnect_stops_probing() {
        let link = Arc::new(MockLink::default());
        let (up, mut rx) = uploaded(link.clone()).await;
        up.confirm_reboot().unwrap();

        loop {
            if let UpdateEvent::ReconnectAttempt { attempt: 3, .. } = rx.recv().await.unwrap() {
                break;
            }
        }
        up.teardown();
        assert_eq!(up.state(), UpdateState::Idle);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(link.probes.load(SeqCst), 3);

        let late = drain(&mut rx);
        assert_eq!(states(&late), vec![UpdateState::Idle]);
        assert!(!late.iter().any(|e| matches!(
            e,
            UpdateEvent::SessionReset | UpdateEvent::Failed { .. } | UpdateEvent::ReconnectAttempt { .. }
        )));
        let snap = up.snapshot();
        assert_eq!(snap.error_message, None);
        assert_eq!(snap.progress_percent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_settle_delay_never_probes() {
        let link = Arc::new(MockLink {
            answer_from_probe: Some(1),
            ..Default::default()
        });
        let (up, mut rx) = uploaded(link.clone()).await;
        up.confirm_reboot().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        up.teardown();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(link.probes.load(SeqCst), 0);
        assert_eq!(up.state(), UpdateState::Idle);
        let events = drain(&mut rx);
        assert!(!events.contains(&UpdateEvent::SessionReset));
        assert!(!states(&events).contains(&UpdateState::Reconnecting));
    }

    #[tokio::test]
    async fn refresh_current_version() {
        let link = Arc::new(MockLink {
            version: Some("V1.2.0".into()),
            ..Default::default()
        });
        let up = updater(link);
        assert_eq!(up.refresh_current_version().await.as_deref(), Some("V1.2.0"));
        assert_eq!(up.snapshot().current_version.as_deref(), Some("V1.2.0"));

        let up = updater(Arc::new(MockLink::default()));
        assert_eq!(up.refresh_current_version().await, None);
        assert_eq!(up.snapshot().current_version, None);
    }
}
