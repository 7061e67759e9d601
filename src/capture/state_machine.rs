//! Focus/exposure negotiation for a still capture
//!
//! Autofocus and auto-exposure converge asynchronously and at different
//! rates. The machine below is fed every partial and final result the device
//! reports and decides, from those alone, when the still frame is requested.
//! It performs no I/O: each transition returns the [`Action`] the caller must
//! submit to the device.
//!
//! ```text
//! Preview ──begin──▶ WaitingFocusLock ──AF locked, AE settled──▶ PictureTaken
//!                          │                                       ▲   │
//!                 AF locked, AE not converged                      │   │ still completed
//!                          ▼                                       │   ▼
//!                 WaitingPreCapture ──▶ WaitingNonPreCapture ──────┘ Preview
//! ```
//!
//! A missing AF or AE field always counts as "already satisfied".

use super::request::{AeState, FrameResult, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Steady preview, no capture in flight
    #[default]
    Preview,
    /// Focus trigger submitted, waiting for AF to lock
    WaitingFocusLock,
    /// Precapture trigger submitted, waiting for AE to start metering
    WaitingPreCapture,
    /// Waiting for AE to leave the precapture state
    WaitingNonPreCapture,
    /// Still request issued, waiting for it to complete
    PictureTaken,
}

/// Device work requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Submit the AF trigger on the preview request
    LockFocus,
    /// Submit the AE precapture trigger on the preview request
    RunPrecapture,
    /// Stop preview and request the still frame
    CaptureStill,
    /// Cancel the AF trigger and resume the repeating preview
    UnlockFocus,
}

#[derive(Debug, Default)]
pub struct FocusExposureStateMachine {
    state: CaptureState,
    /// Focus or precapture trigger the waiting states depend on
    trigger_request: Option<RequestId>,
    still_request: Option<RequestId>,
}

impl FocusExposureStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CaptureState::Preview
    }

    /// Start a cycle. Refused unless the machine is in `Preview`.
    pub fn begin_capture(&mut self) -> Option<Action> {
        if self.state != CaptureState::Preview {
            log::debug!("Capture requested while {:?}, ignoring", self.state);
            return None;
        }
        self.state = CaptureState::WaitingFocusLock;
        Some(Action::LockFocus)
    }

    /// Feed a partial or final result of any request on the live session.
    pub fn on_result(&mut self, result: &FrameResult) -> Option<Action> {
        match self.state {
            CaptureState::Preview | CaptureState::PictureTaken => None,
            CaptureState::WaitingFocusLock => match result.af_state {
                None => self.take_picture(),
                Some(af) if af.is_locked() => match result.ae_state {
                    None | Some(AeState::Converged) => self.take_picture(),
                    Some(_) => {
                        self.state = CaptureState::WaitingPreCapture;
                        Some(Action::RunPrecapture)
                    }
                },
                Some(_) => None,
            },
            CaptureState::WaitingPreCapture => {
                if matches!(
                    result.ae_state,
                    None | Some(AeState::Precapture) | Some(AeState::FlashRequired)
                ) {
                    self.state = CaptureState::WaitingNonPreCapture;
                }
                None
            }
            CaptureState::WaitingNonPreCapture => {
                if result.ae_state != Some(AeState::Precapture) {
                    self.take_picture()
                } else {
                    None
                }
            }
        }
    }

    /// Record which request carries the current focus or precapture trigger.
    pub fn trigger_submitted(&mut self, request: RequestId) {
        if self.is_waiting() {
            self.trigger_request = Some(request);
        }
    }

    /// A focus or precapture trigger failed. Returns true when the cycle
    /// depended on it and must be abandoned; failures of triggers the machine
    /// has moved past (aborted by the still request, or left over from an
    /// abandoned cycle) are ignored.
    pub fn on_trigger_failed(&self, request: RequestId) -> bool {
        if !self.is_waiting() || self.trigger_request != Some(request) {
            log::debug!("Ignoring failure of {} in {:?}", request, self.state);
            return false;
        }
        true
    }

    /// A still request was submitted and has not completed yet.
    pub fn still_outstanding(&self) -> bool {
        self.state == CaptureState::PictureTaken && self.still_request.is_some()
    }

    /// Record which request carries the still frame.
    pub fn still_submitted(&mut self, request: RequestId) {
        if self.state == CaptureState::PictureTaken {
            self.still_request = Some(request);
        }
    }

    /// The still request finished (successfully or not).
    pub fn on_still_completed(&mut self, request: RequestId) -> Option<Action> {
        if self.state != CaptureState::PictureTaken || self.still_request != Some(request) {
            log::debug!("Ignoring completion of {} in {:?}", request, self.state);
            return None;
        }
        self.state = CaptureState::Preview;
        self.still_request = None;
        Some(Action::UnlockFocus)
    }

    /// Drop any in-flight cycle.
    pub fn reset(&mut self) {
        self.state = CaptureState::Preview;
        self.trigger_request = None;
        self.still_request = None;
    }

    fn is_waiting(&self) -> bool {
        matches!(
            self.state,
            CaptureState::WaitingFocusLock
                | CaptureState::WaitingPreCapture
                | CaptureState::WaitingNonPreCapture
        )
    }

    fn take_picture(&mut self) -> Option<Action> {
        self.state = CaptureState::PictureTaken;
        self.trigger_request = None;
        Some(Action::CaptureStill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::request::AfState;

    fn result(af: Option<AfState>, ae: Option<AeState>) -> FrameResult {
        FrameResult::new(af, ae)
    }

    fn waiting_lock() -> FocusExposureStateMachine {
        let mut machine = FocusExposureStateMachine::new();
        assert_eq!(machine.begin_capture(), Some(Action::LockFocus));
        machine
    }

    #[test]
    fn test_begin_only_from_preview() {
        let mut machine = waiting_lock();
        assert_eq!(machine.state(), CaptureState::WaitingFocusLock);
        assert_eq!(machine.begin_capture(), None);
        assert_eq!(machine.state(), CaptureState::WaitingFocusLock);
    }

    #[test]
    fn test_locked_and_converged_skips_precapture() {
        let mut machine = waiting_lock();
        let action = machine.on_result(&result(
            Some(AfState::FocusedLocked),
            Some(AeState::Converged),
        ));
        assert_eq!(action, Some(Action::CaptureStill));
        assert_eq!(machine.state(), CaptureState::PictureTaken);
    }

    #[test]
    fn test_not_converged_runs_precapture() {
        let mut machine = waiting_lock();
        let action = machine.on_result(&result(
            Some(AfState::FocusedLocked),
            Some(AeState::Searching),
        ));
        assert_eq!(action, Some(Action::RunPrecapture));
        assert_eq!(machine.state(), CaptureState::WaitingPreCapture);
    }

    #[test]
    fn test_missing_fields_proceed() {
        let mut machine = waiting_lock();
        assert_eq!(machine.on_result(&result(None, None)), Some(Action::CaptureStill));

        let mut machine = waiting_lock();
        assert_eq!(
            machine.on_result(&result(Some(AfState::NotFocusedLocked), None)),
            Some(Action::CaptureStill)
        );
    }

    #[test]
    fn test_scanning_focus_keeps_waiting() {
        let mut machine = waiting_lock();
        assert_eq!(
            machine.on_result(&result(Some(AfState::ActiveScan), Some(AeState::Converged))),
            None
        );
        assert_eq!(machine.state(), CaptureState::WaitingFocusLock);
    }

    #[test]
    fn test_precapture_detour() {
        let mut machine = waiting_lock();
        machine.on_result(&result(Some(AfState::FocusedLocked), Some(AeState::Searching)));

        // Still searching: AE has not entered precapture yet.
        assert_eq!(machine.on_result(&result(None, Some(AeState::Searching))), None);
        assert_eq!(machine.state(), CaptureState::WaitingPreCapture);

        assert_eq!(machine.on_result(&result(None, Some(AeState::Precapture))), None);
        assert_eq!(machine.state(), CaptureState::WaitingNonPreCapture);

        assert_eq!(machine.on_result(&result(None, Some(AeState::Precapture))), None);
        assert_eq!(
            machine.on_result(&result(None, Some(AeState::Converged))),
            Some(Action::CaptureStill)
        );
        assert_eq!(machine.state(), CaptureState::PictureTaken);
    }

    #[test]
    fn test_flash_required_enters_non_precapture() {
        let mut machine = waiting_lock();
        machine.on_result(&result(Some(AfState::FocusedLocked), Some(AeState::FlashRequired)));
        assert_eq!(machine.state(), CaptureState::WaitingPreCapture);
        machine.on_result(&result(None, Some(AeState::FlashRequired)));
        assert_eq!(machine.state(), CaptureState::WaitingNonPreCapture);
        assert_eq!(machine.on_result(&result(None, None)), Some(Action::CaptureStill));
    }

    #[test]
    fn test_still_completion_correlated() {
        let mut machine = waiting_lock();
        machine.on_result(&result(None, None));
        machine.still_submitted(RequestId(7));

        assert_eq!(machine.on_still_completed(RequestId(6)), None);
        assert_eq!(machine.state(), CaptureState::PictureTaken);

        assert_eq!(machine.on_still_completed(RequestId(7)), Some(Action::UnlockFocus));
        assert_eq!(machine.state(), CaptureState::Preview);
        assert_eq!(machine.on_still_completed(RequestId(7)), None);
    }

    #[test]
    fn test_results_ignored_outside_waiting_states() {
        let mut machine = FocusExposureStateMachine::new();
        assert_eq!(machine.on_result(&result(None, None)), None);
        assert_eq!(machine.state(), CaptureState::Preview);

        let mut machine = waiting_lock();
        machine.on_result(&result(None, None));
        assert_eq!(machine.on_result(&result(None, None)), None);
        assert_eq!(machine.state(), CaptureState::PictureTaken);
    }

    #[test]
    fn test_every_reachable_state_returns_to_preview() {
        // Liveness: from each state, a settled result followed by the still
        // completion brings the machine back to Preview within a few steps.
        let settled = result(Some(AfState::FocusedLocked), Some(AeState::Converged));
        let setups: Vec<Vec<FrameResult>> = vec![
            vec![],
            vec![result(Some(AfState::FocusedLocked), Some(AeState::Searching))],
            vec![
                result(Some(AfState::FocusedLocked), Some(AeState::Searching)),
                result(None, Some(AeState::Precapture)),
            ],
        ];

        for setup in setups {
            let mut machine = waiting_lock();
            for r in &setup {
                machine.on_result(r);
            }

            let mut steps = 0;
            while machine.state() != CaptureState::PictureTaken {
                machine.on_result(&settled);
                // WaitingPreCapture needs AE to report precapture or nothing.
                machine.on_result(&result(None, None));
                steps += 1;
                assert!(steps < 4, "stuck in {:?}", machine.state());
            }
            machine.still_submitted(RequestId(1));
            assert_eq!(machine.on_still_completed(RequestId(1)), Some(Action::UnlockFocus));
            assert!(machine.is_idle());
        }
    }

    #[test]
    fn test_reset_abandons_cycle() {
        let mut machine = waiting_lock();
        machine.on_result(&result(None, None));
        machine.still_submitted(RequestId(3));
        machine.reset();
        assert!(machine.is_idle());
        assert_eq!(machine.on_still_completed(RequestId(3)), None);
    }

    #[test]
    fn test_trigger_failure_only_matters_while_waiting_on_it() {
        let mut machine = waiting_lock();
        machine.trigger_submitted(RequestId(4));
        assert!(!machine.on_trigger_failed(RequestId(3)));
        assert!(machine.on_trigger_failed(RequestId(4)));

        // Precapture replaces the focus trigger as the one being waited on.
        machine.on_result(&result(Some(AfState::FocusedLocked), Some(AeState::Searching)));
        machine.trigger_submitted(RequestId(5));
        assert!(!machine.on_trigger_failed(RequestId(4)));
        machine.on_result(&result(None, Some(AeState::Precapture)));
        assert_eq!(machine.state(), CaptureState::WaitingNonPreCapture);
        assert!(machine.on_trigger_failed(RequestId(5)));
    }

    #[test]
    fn test_trigger_failure_after_still_requested_is_ignored() {
        let mut machine = waiting_lock();
        machine.trigger_submitted(RequestId(1));
        machine.on_result(&result(Some(AfState::FocusedLocked), Some(AeState::Converged)));
        machine.still_submitted(RequestId(2));

        // Aborting in-flight captures for the still fails the focus trigger.
        assert!(!machine.on_trigger_failed(RequestId(1)));
        assert_eq!(machine.state(), CaptureState::PictureTaken);
        assert!(machine.still_outstanding());
        assert_eq!(machine.on_still_completed(RequestId(2)), Some(Action::UnlockFocus));
        assert!(!machine.still_outstanding());
    }

    #[test]
    fn test_still_outstanding_only_after_submission() {
        let mut machine = waiting_lock();
        assert!(!machine.still_outstanding());
        machine.on_result(&result(None, None));
        assert!(!machine.still_outstanding());
        machine.still_submitted(RequestId(9));
        assert!(machine.still_outstanding());
        machine.reset();
        assert!(!machine.still_outstanding());
    }
}
