//! Capture reconciliation: point a capture source at a broadcast.
//!
//! Each playback capture source advertises the dolphin instance it shows in
//! its window title. Assigning a broadcast to a source asks the spectate
//! service for that broadcast, preferring the instance the source already
//! shows. When the service picks a different instance, the source that was
//! labeled with it (the donor) takes over the target's old instance, and both
//! titles are rewritten in one atomic batch so no two sources ever carry the
//! same id.

use std::sync::Arc;

use async_trait::async_trait;
use spectate_client::SpectateClient;
use spectate_core::SpectateError;
use tracing::{debug, info};

use crate::control::{CaptureControl, CaptureInput, CaptureOperation};
use crate::errors::ReconcileError;

/// The spectate operation reconciliation depends on.
#[async_trait]
pub trait Spectator: Send + Sync {
    /// Spectate `broadcast_id`, preferring `preferred_dolphin_id`, and return
    /// the dolphin id actually assigned.
    async fn spectate_broadcast(
        &self,
        broadcast_id: &str,
        preferred_dolphin_id: Option<&str>,
    ) -> Result<String, SpectateError>;
}

#[async_trait]
impl Spectator for SpectateClient {
    async fn spectate_broadcast(
        &self,
        broadcast_id: &str,
        preferred_dolphin_id: Option<&str>,
    ) -> Result<String, SpectateError> {
        SpectateClient::spectate_broadcast(self, broadcast_id, preferred_dolphin_id).await
    }
}

/// Outcome of [`ReconciliationEngine::assign`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// Dolphin id now showing the broadcast.
    pub dolphin_id: String,
    /// Title rewrites applied, donor first. Empty when nothing changed.
    pub rewrites: Vec<CaptureOperation>,
}

impl Assignment {
    /// Whether any title was rewritten.
    pub fn changed(&self) -> bool {
        !self.rewrites.is_empty()
    }
}

/// Keeps capture-source titles in step with spectate assignments.
pub struct ReconciliationEngine {
    spectator: Arc<dyn Spectator>,
    control: Arc<dyn CaptureControl>,
}

impl ReconciliationEngine {
    /// Create an engine over the given spectate and capture-control seams.
    pub fn new(spectator: Arc<dyn Spectator>, control: Arc<dyn CaptureControl>) -> Self {
        Self { spectator, control }
    }

    /// Make capture source `target_uuid` display `broadcast_id`.
    ///
    /// `inputs` is the caller's mirror of the capture sources. On success the
    /// rewritten entries are updated in place; on failure it is left as it
    /// was and the caller should re-query the sources.
    pub async fn assign(
        &self,
        inputs: &mut [CaptureInput],
        target_uuid: &str,
        broadcast_id: &str,
    ) -> Result<Assignment, ReconcileError> {
        let target = inputs
            .iter()
            .position(|input| input.uuid == target_uuid)
            .ok_or_else(|| ReconcileError::NotFound {
                uuid: target_uuid.to_string(),
            })?;

        let target_title = inputs[target].title();
        if !target_title.is_playback() {
            return Err(ReconcileError::InvalidTitle {
                uuid: target_uuid.to_string(),
                window: inputs[target].window.clone(),
            });
        }
        let preferred = target_title.dolphin_id().map(str::to_string);

        let actual = self
            .spectator
            .spectate_broadcast(broadcast_id, preferred.as_deref())
            .await?;

        if preferred.as_deref() == Some(actual.as_str()) {
            debug!(uuid = target_uuid, broadcast_id, dolphin_id = %actual, "title already current");
            return Ok(Assignment {
                dolphin_id: actual,
                rewrites: Vec::new(),
            });
        }

        let donor = inputs.iter().position(|input| {
            input.uuid != target_uuid && input.title().dolphin_id() == Some(actual.as_str())
        });

        let mut rewrites = Vec::with_capacity(2);
        let mut updates = Vec::with_capacity(2);
        if let Some(donor) = donor {
            let window = inputs[donor]
                .title()
                .with_dolphin_id(preferred.as_deref())
                .encode();
            rewrites.push(CaptureOperation::SetInputSettings {
                uuid: inputs[donor].uuid.clone(),
                window: window.clone(),
            });
            updates.push((donor, window));
        }
        let window = target_title.with_dolphin_id(Some(&actual)).encode();
        rewrites.push(CaptureOperation::SetInputSettings {
            uuid: target_uuid.to_string(),
            window: window.clone(),
        });
        updates.push((target, window));

        self.control.batch_apply(rewrites.clone()).await?;

        for (index, window) in updates {
            inputs[index].window = window;
        }
        info!(
            uuid = target_uuid,
            broadcast_id,
            dolphin_id = %actual,
            donor = donor.map(|d| inputs[d].uuid.as_str()),
            "capture source reassigned"
        );
        Ok(Assignment {
            dolphin_id: actual,
            rewrites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    use crate::control::{InputSettings, InputSummary};
    use crate::errors::CaptureError;

    const LABEL: &str = "Faster Melee - Slippi (3.4.1) - Playback";

    fn window(id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{LABEL} | {id}:wxWindowNR:Slippi Dolphin.exe"),
            None => format!("{LABEL}:wxWindowNR:Slippi Dolphin.exe"),
        }
    }

    /// Answers every spectate call with a fixed id and records the calls.
    struct FakeSpectator {
        answer: Result<String, SpectateError>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeSpectator {
        fn answering(answer: Result<String, SpectateError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Spectator for FakeSpectator {
        async fn spectate_broadcast(
            &self,
            broadcast_id: &str,
            preferred_dolphin_id: Option<&str>,
        ) -> Result<String, SpectateError> {
            self.calls.lock().push((
                broadcast_id.to_string(),
                preferred_dolphin_id.map(str::to_string),
            ));
            self.answer.clone()
        }
    }

    #[derive(Default)]
    struct FakeControl {
        fail_batches: bool,
        batches: Mutex<Vec<Vec<CaptureOperation>>>,
    }

    #[async_trait]
    impl CaptureControl for FakeControl {
        async fn list_inputs(&self, _kind: &str) -> Result<Vec<InputSummary>, CaptureError> {
            Ok(Vec::new())
        }

        async fn get_input_settings(&self, _uuid: &str) -> Result<InputSettings, CaptureError> {
            Ok(InputSettings::default())
        }

        async fn set_input_settings(&self, _uuid: &str, _window: &str) -> Result<(), CaptureError> {
            panic!("reconciliation must only write through batches");
        }

        async fn batch_apply(&self, operations: Vec<CaptureOperation>) -> Result<(), CaptureError> {
            if self.fail_batches {
                return Err(CaptureError::BatchFailed {
                    message: "capture app went away".into(),
                });
            }
            self.batches.lock().push(operations);
            Ok(())
        }
    }

    fn engine(spectator: &Arc<FakeSpectator>, control: &Arc<FakeControl>) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::clone(spectator) as Arc<dyn Spectator>,
            Arc::clone(control) as Arc<dyn CaptureControl>,
        )
    }

    fn set(uuid: &str, id: Option<&str>) -> CaptureOperation {
        CaptureOperation::SetInputSettings {
            uuid: uuid.into(),
            window: window(id),
        }
    }

    #[tokio::test]
    async fn donor_swap_rewrites_both_in_one_batch() {
        let spectator = FakeSpectator::answering(Ok("A2".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![
            CaptureInput::new("U", "Left", window(Some("A1"))),
            CaptureInput::new("V", "Right", window(Some("A2"))),
        ];

        let assignment = engine(&spectator, &control)
            .assign(&mut inputs, "U", "b")
            .await
            .unwrap();

        assert_eq!(
            spectator.calls.lock().as_slice(),
            [("b".to_string(), Some("A1".to_string()))]
        );
        assert_eq!(assignment.dolphin_id, "A2");
        assert_eq!(assignment.rewrites, vec![set("V", Some("A1")), set("U", Some("A2"))]);
        assert_eq!(control.batches.lock().as_slice(), [assignment.rewrites.clone()]);
        assert_eq!(inputs[0].window, window(Some("A2")));
        assert_eq!(inputs[1].window, window(Some("A1")));
    }

    #[tokio::test]
    async fn matching_id_issues_no_rewrite() {
        let spectator = FakeSpectator::answering(Ok("A1".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![CaptureInput::new("U", "Left", window(Some("A1")))];

        let assignment = engine(&spectator, &control)
            .assign(&mut inputs, "U", "b")
            .await
            .unwrap();

        assert!(!assignment.changed());
        assert!(control.batches.lock().is_empty());
        assert_eq!(inputs[0].window, window(Some("A1")));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let spectator = FakeSpectator::answering(Ok("A1".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![CaptureInput::new("U", "Left", window(None))];

        let result = engine(&spectator, &control)
            .assign(&mut inputs, "missing", "b")
            .await;

        assert_matches!(result, Err(ReconcileError::NotFound { uuid }) if uuid == "missing");
        assert!(spectator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn non_playback_target_is_rejected() {
        let spectator = FakeSpectator::answering(Ok("A1".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![CaptureInput::new("U", "Left", "Notepad:Notepad:notepad.exe")];

        let result = engine(&spectator, &control).assign(&mut inputs, "U", "b").await;
        assert_matches!(result, Err(ReconcileError::InvalidTitle { .. }));
        assert!(spectator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn fresh_target_without_donor_gets_single_rewrite() {
        let spectator = FakeSpectator::answering(Ok("spectate-manager-0".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![
            CaptureInput::new("U", "Left", window(None)),
            CaptureInput::new("V", "Right", window(Some("A2"))),
        ];

        let assignment = engine(&spectator, &control)
            .assign(&mut inputs, "U", "b")
            .await
            .unwrap();

        assert_eq!(spectator.calls.lock()[0].1, None);
        assert_eq!(assignment.rewrites, vec![set("U", Some("spectate-manager-0"))]);
        assert_eq!(inputs[1].window, window(Some("A2")));
    }

    #[tokio::test]
    async fn donor_of_fresh_target_falls_back_to_bare_label() {
        let spectator = FakeSpectator::answering(Ok("A2".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![
            CaptureInput::new("U", "Left", window(None)),
            CaptureInput::new("V", "Right", window(Some("A2"))),
        ];

        let assignment = engine(&spectator, &control)
            .assign(&mut inputs, "U", "b")
            .await
            .unwrap();

        assert_eq!(assignment.rewrites, vec![set("V", None), set("U", Some("A2"))]);
        assert_eq!(inputs[1].window, window(None));
    }

    #[tokio::test]
    async fn failed_batch_leaves_titles_untouched() {
        let spectator = FakeSpectator::answering(Ok("A2".into()));
        let control = Arc::new(FakeControl {
            fail_batches: true,
            ..FakeControl::default()
        });
        let mut inputs = vec![
            CaptureInput::new("U", "Left", window(Some("A1"))),
            CaptureInput::new("V", "Right", window(Some("A2"))),
        ];
        let before = inputs.clone();

        let result = engine(&spectator, &control).assign(&mut inputs, "U", "b").await;

        assert_matches!(
            result,
            Err(ReconcileError::Capture(CaptureError::BatchFailed { .. }))
        );
        assert_eq!(inputs, before);
    }

    #[tokio::test]
    async fn spectate_failure_is_surfaced() {
        let spectator = FakeSpectator::answering(Err(SpectateError::RemoteError("nope".into())));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![CaptureInput::new("U", "Left", window(Some("A1")))];

        let result = engine(&spectator, &control).assign(&mut inputs, "U", "b").await;

        assert_matches!(
            result,
            Err(ReconcileError::Spectate(SpectateError::RemoteError(m))) if m == "nope"
        );
        assert!(control.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn second_assign_sees_updated_titles() {
        let spectator = FakeSpectator::answering(Ok("A2".into()));
        let control = Arc::new(FakeControl::default());
        let mut inputs = vec![
            CaptureInput::new("U", "Left", window(Some("A1"))),
            CaptureInput::new("V", "Right", window(Some("A2"))),
        ];
        let engine = engine(&spectator, &control);

        let _ = engine.assign(&mut inputs, "U", "b").await.unwrap();
        let again = engine.assign(&mut inputs, "U", "b").await.unwrap();

        assert!(!again.changed());
        assert_eq!(
            spectator.calls.lock()[1],
            ("b".to_string(), Some("A2".to_string()))
        );
        assert_eq!(control.batches.lock().len(), 1);
    }
}
