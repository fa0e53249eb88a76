//! Interactive grading session.
//!
//! Screen flow `KeyEntry -> Scanning -> Results -> History`, independent of
//! how the screens are drawn. At most one recognition call is outstanding;
//! a reply that arrives after the user navigated away is discarded.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RecognitionError;
use crate::grading::{grade, GradeSummary};
use crate::model::{AnswerKey, RecognizedAnswers, SheetLayout};
use crate::parser::{validate_answer_key, KeyWarning};
use crate::report::{GradedResult, ResultLabels};
use crate::store::ResultStore;

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    KeyEntry,
    Scanning,
    Results,
    History,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no answer key has been set")]
    NoAnswerKey,
    #[error("a capture is already being processed")]
    CaptureInFlight,
    #[error("there is no graded sheet to save")]
    NothingToSave,
}

/// Proof that a capture was started; redeemed when the reply arrives.
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureTicket {
    generation: u64,
}

/// What happened to a capture reply.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureDisposition {
    /// The sheet was graded and the session moved to `Results`.
    Graded(GradeSummary),
    /// The recognition call failed; the user may capture again.
    Failed { message: String, retryable: bool },
    /// The reply belonged to an abandoned capture and was dropped.
    Discarded,
}

/// The latest graded sheet, waiting to be saved or dismissed.
#[derive(Debug, Clone)]
pub struct LastScan {
    pub recognized: RecognizedAnswers,
    pub summary: GradeSummary,
}

/// One user's grading session.
#[derive(Debug)]
pub struct GradingSession {
    layout: SheetLayout,
    key: Option<AnswerKey>,
    page: Page,
    generation: u64,
    in_flight: Option<u64>,
    last_scan: Option<LastScan>,
    error: Option<String>,
}

impl GradingSession {
    pub fn new(layout: SheetLayout) -> Self {
        Self {
            layout,
            key: None,
            page: Page::KeyEntry,
            generation: 0,
            in_flight: None,
            last_scan: None,
            error: None,
        }
    }

    /// Start a session with a key loaded from storage.
    pub fn with_key(layout: SheetLayout, key: AnswerKey) -> Self {
        let mut session = Self::new(layout);
        session.key = Some(key);
        session.page = Page::Scanning;
        session
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn key(&self) -> Option<&AnswerKey> {
        self.key.as_ref()
    }

    pub fn last_scan(&self) -> Option<&LastScan> {
        self.last_scan.as_ref()
    }

    /// Message from the last failed capture, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn capture_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Install a new key, replacing the previous one, and move to scanning.
    /// Returns advisories (e.g. an incomplete key) the caller may show.
    pub fn submit_key(&mut self, key: AnswerKey) -> Vec<KeyWarning> {
        let warnings = validate_answer_key(&key, &self.layout);
        self.abandon_capture();
        self.key = Some(key);
        self.last_scan = None;
        self.error = None;
        self.page = Page::Scanning;
        warnings
    }

    /// Go back to key entry. The current key stays available for editing.
    pub fn edit_key(&mut self) {
        self.abandon_capture();
        self.last_scan = None;
        self.error = None;
        self.page = Page::KeyEntry;
    }

    /// Start a recognition call.
    pub fn begin_capture(&mut self) -> Result<CaptureTicket, SessionError> {
        if self.key.is_none() {
            return Err(SessionError::NoAnswerKey);
        }
        if self.in_flight.is_some() {
            return Err(SessionError::CaptureInFlight);
        }
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.error = None;
        self.page = Page::Scanning;
        Ok(CaptureTicket {
            generation: self.generation,
        })
    }

    /// Deliver recognized answers for a capture.
    pub fn complete_capture(
        &mut self,
        ticket: CaptureTicket,
        recognized: RecognizedAnswers,
    ) -> CaptureDisposition {
        if !self.redeem(&ticket) {
            tracing::debug!("discarding stale capture #{}", ticket.generation);
            return CaptureDisposition::Discarded;
        }
        let Some(key) = &self.key else {
            return CaptureDisposition::Discarded;
        };
        let summary = grade(key, &recognized, self.layout.total_questions);
        self.last_scan = Some(LastScan {
            recognized,
            summary: summary.clone(),
        });
        self.page = Page::Results;
        CaptureDisposition::Graded(summary)
    }

    /// Deliver a recognition failure for a capture.
    pub fn fail_capture(
        &mut self,
        ticket: CaptureTicket,
        error: &RecognitionError,
    ) -> CaptureDisposition {
        if !self.redeem(&ticket) {
            return CaptureDisposition::Discarded;
        }
        let message = error.user_message();
        self.error = Some(message.clone());
        self.page = Page::Scanning;
        CaptureDisposition::Failed {
            message,
            retryable: error.is_retryable(),
        }
    }

    /// Save the latest graded sheet and go back to scanning.
    pub fn save_result(
        &mut self,
        labels: ResultLabels,
        store: &mut ResultStore,
    ) -> Result<GradedResult> {
        let (Some(scan), Some(key)) = (&self.last_scan, &self.key) else {
            return Err(SessionError::NothingToSave.into());
        };
        let result = GradedResult::new(
            &scan.summary,
            key,
            &scan.recognized,
            self.layout.total_questions,
            labels,
        );
        store.append(result.clone())?;
        self.last_scan = None;
        self.page = Page::Scanning;
        Ok(result)
    }

    /// Dismiss the current result and capture another sheet.
    pub fn scan_new(&mut self) {
        self.abandon_capture();
        self.last_scan = None;
        self.error = None;
        self.page = if self.key.is_some() {
            Page::Scanning
        } else {
            Page::KeyEntry
        };
    }

    /// Switch screens. Leaving abandons any capture in progress.
    pub fn navigate(&mut self, page: Page) {
        if page != self.page {
            self.abandon_capture();
        }
        self.error = None;
        self.page = match page {
            Page::Scanning | Page::Results if self.key.is_none() => Page::KeyEntry,
            Page::Results if self.last_scan.is_none() => Page::Scanning,
            other => other,
        };
    }

    fn abandon_capture(&mut self) {
        if self.in_flight.take().is_some() {
            tracing::debug!("abandoned capture #{}", self.generation);
        }
    }

    fn redeem(&mut self, ticket: &CaptureTicket) -> bool {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, Choice};
    use crate::store::Storage;

    fn answers(seq: &[(u32, Choice)]) -> RecognizedAnswers {
        seq.iter()
            .map(|(q, c)| (*q, AnswerValue::Choice(*c)))
            .collect()
    }

    fn session() -> GradingSession {
        let mut session = GradingSession::new(SheetLayout::new(4, 2));
        session.submit_key(AnswerKey::from_sequence("ABCD").unwrap());
        session
    }

    #[test]
    fn capture_requires_key() {
        let mut session = GradingSession::new(SheetLayout::default());
        assert_eq!(session.begin_capture(), Err(SessionError::NoAnswerKey));
    }

    #[test]
    fn incomplete_key_warns_but_proceeds() {
        let mut session = GradingSession::new(SheetLayout::new(4, 2));
        let warnings = session.submit_key(AnswerKey::from_sequence("AB").unwrap());
        assert!(matches!(warnings[0], KeyWarning::Incomplete { .. }));
        assert_eq!(session.page(), Page::Scanning);
    }

    #[test]
    fn single_capture_in_flight() {
        let mut session = session();
        let _ticket = session.begin_capture().unwrap();
        assert_eq!(session.begin_capture(), Err(SessionError::CaptureInFlight));
    }

    #[test]
    fn completed_capture_is_graded() {
        let mut session = session();
        let ticket = session.begin_capture().unwrap();
        let disposition =
            session.complete_capture(ticket, answers(&[(1, Choice::A), (2, Choice::B)]));
        match disposition {
            CaptureDisposition::Graded(summary) => {
                assert_eq!(summary.correct_count, 2);
                assert_eq!(summary.total_graded, 4);
                assert_eq!(summary.percentage, 50.0);
            }
            other => panic!("expected graded, got {other:?}"),
        }
        assert_eq!(session.page(), Page::Results);
        assert!(!session.capture_in_flight());
    }

    #[test]
    fn reply_after_navigation_is_discarded() {
        let mut session = session();
        let ticket = session.begin_capture().unwrap();
        session.navigate(Page::History);
        let disposition = session.complete_capture(ticket, answers(&[(1, Choice::A)]));
        assert_eq!(disposition, CaptureDisposition::Discarded);
        assert_eq!(session.page(), Page::History);
        assert!(session.last_scan().is_none());
    }

    #[test]
    fn stale_ticket_does_not_hijack_new_capture() {
        let mut session = session();
        let stale = session.begin_capture().unwrap();
        session.scan_new();
        let fresh = session.begin_capture().unwrap();
        assert_eq!(
            session.complete_capture(stale, RecognizedAnswers::new()),
            CaptureDisposition::Discarded
        );
        assert!(session.capture_in_flight());
        assert!(matches!(
            session.complete_capture(fresh, RecognizedAnswers::new()),
            CaptureDisposition::Graded(_)
        ));
    }

    #[test]
    fn failure_is_retryable_and_keeps_key() {
        let mut session = session();
        let ticket = session.begin_capture().unwrap();
        let disposition =
            session.fail_capture(ticket, &RecognitionError::NetworkError("reset".into()));
        assert!(matches!(
            disposition,
            CaptureDisposition::Failed {
                retryable: true,
                ..
            }
        ));
        assert_eq!(session.page(), Page::Scanning);
        assert!(session.error().is_some());
        assert!(session.key().is_some());
        assert!(session.begin_capture().is_ok());
    }

    #[test]
    fn save_snapshots_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::load(Storage::open(dir.path()).unwrap()).unwrap();
        let mut session = session();

        assert!(session
            .save_result(ResultLabels::default(), &mut store)
            .is_err());

        let ticket = session.begin_capture().unwrap();
        session.complete_capture(ticket, answers(&[(1, Choice::A)]));
        let saved = session
            .save_result(
                ResultLabels {
                    student: Some("Lin".into()),
                    ..Default::default()
                },
                &mut store,
            )
            .unwrap();
        assert_eq!(session.page(), Page::Scanning);

        session.submit_key(AnswerKey::from_sequence("EEEE").unwrap());
        assert_eq!(store.list_all()[0].answer_key.get(1), Some(Choice::A));
        assert_eq!(saved.correct_count, 1);
        assert_eq!(store.list_all()[0].summary().correct_count, 1);
    }

    #[test]
    fn navigation_guards() {
        let mut session = GradingSession::new(SheetLayout::default());
        session.navigate(Page::Scanning);
        assert_eq!(session.page(), Page::KeyEntry);
        session.submit_key(AnswerKey::from_sequence("A").unwrap());
        session.navigate(Page::Results);
        assert_eq!(session.page(), Page::Scanning);
        session.edit_key();
        assert_eq!(session.page(), Page::KeyEntry);
        assert!(session.key().is_some());
    }
}
