use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{letter::CHILD_NAME_REQUIRED, ErrorBody, LetterRequest, LetterResponse};

pub mod session;
pub mod transport;

pub use session::{MemorySessionStore, SessionStore};
pub use transport::{LetterClient, LetterTransport};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    /// Non-2xx from the server; `error` is what the server said.
    #[error("{error}")]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Letter stream ended before the letter was finished")]
    IncompleteStream,

    #[error("No letter content received")]
    EmptyLetter,

    #[error("Malformed letter event: {0}")]
    MalformedEvent(String),
}

impl ClientError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }

    /// What the form shows the user.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            ClientError::Api { error, details, .. } => ErrorBody {
                error: error.clone(),
                details: details.clone(),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Editing,
    Submitting,
    ShowingResult(LetterResponse),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Generated(LetterResponse),
    /// A request was already in flight, or a letter is on screen.
    Ignored,
}

struct FormInner {
    draft: LetterRequest,
    state: FormState,
}

/// Client-side owner of the letter draft and of the editing/submitting/
/// showing-result/error cycle.
///
/// At most one request is in flight per controller: `submit` flips the state
/// to `Submitting` under the lock before the transport is called, so a second
/// `submit` racing the first sees it and backs off.
pub struct FormController<T, S> {
    transport: T,
    store: S,
    inner: Mutex<FormInner>,
}

impl<T: LetterTransport, S: SessionStore> FormController<T, S> {
    /// Starts in `ShowingResult` when the store holds a letter from earlier in
    /// the session, otherwise in `Editing` with an empty draft.
    pub fn new(transport: T, store: S) -> Self {
        let (draft, state) = match session::load_letter(&store) {
            Some(saved) => {
                info!("restored letter from session storage");
                (saved.form_data.clone(), FormState::ShowingResult(saved))
            }
            None => (LetterRequest::default(), FormState::Editing),
        };

        Self {
            transport,
            store,
            inner: Mutex::new(FormInner { draft, state }),
        }
    }

    pub fn state(&self) -> FormState {
        self.lock().state.clone()
    }

    pub fn draft(&self) -> LetterRequest {
        self.lock().draft.clone()
    }

    pub fn letter(&self) -> Option<LetterResponse> {
        match &self.lock().state {
            FormState::ShowingResult(letter) => Some(letter.clone()),
            _ => None,
        }
    }

    /// Applies an edit to the draft. Only possible while the form is shown
    /// (editing or error); editing clears a surfaced error.
    pub fn edit(&self, apply: impl FnOnce(&mut LetterRequest)) -> bool {
        let mut inner = self.lock();
        match inner.state {
            FormState::Editing | FormState::Error(_) => {
                apply(&mut inner.draft);
                inner.state = FormState::Editing;
                true
            }
            FormState::Submitting | FormState::ShowingResult(_) => false,
        }
    }

    pub async fn submit(&self) -> Result<SubmitOutcome, ClientError> {
        let snapshot = {
            let mut inner = self.lock();
            match inner.state {
                FormState::Editing | FormState::Error(_) => {}
                FormState::Submitting | FormState::ShowingResult(_) => {
                    debug!("submit ignored, form is busy");
                    return Ok(SubmitOutcome::Ignored);
                }
            }

            if !inner.draft.has_child_name() {
                let err = ClientError::Validation(CHILD_NAME_REQUIRED.to_string());
                inner.state = FormState::Error(err.to_body());
                return Err(err);
            }

            inner.state = FormState::Submitting;
            inner.draft.clone()
        };

        let in_flight = InFlight::arm(&self.inner);
        let generated = self.transport.generate(&snapshot).await;
        in_flight.disarm();

        let result = generated.and_then(|letter| {
            let response = LetterResponse {
                letter,
                form_data: snapshot,
            };
            if response.is_valid() {
                Ok(response)
            } else {
                Err(ClientError::EmptyLetter)
            }
        });

        let mut inner = self.lock();
        match result {
            Ok(response) => {
                if let Err(err) = session::save_letter(&self.store, &response) {
                    warn!("could not mirror letter to session storage: {err}");
                }
                inner.state = FormState::ShowingResult(response.clone());
                Ok(SubmitOutcome::Generated(response))
            }
            Err(err) => {
                warn!("letter generation failed: {err}");
                inner.state = FormState::Error(err.to_body());
                Err(err)
            }
        }
    }

    /// Back to the form for another letter. The stored letter is dropped but
    /// the draft is kept, so the same details can be tweaked and regenerated
    /// instead of starting from a blank form.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, FormState::Submitting) {
            return;
        }
        session::clear_letter(&self.store);
        inner.state = FormState::Editing;
    }

    fn lock(&self) -> MutexGuard<'_, FormInner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<FormInner>) -> MutexGuard<'_, FormInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held across the transport call. If the `submit` future is dropped before
/// the call settles (timeout, Ctrl-C), the form goes back to `Editing`.
struct InFlight<'a> {
    inner: &'a Mutex<FormInner>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn arm(inner: &'a Mutex<FormInner>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock_inner(self.inner);
        if matches!(inner.state, FormState::Submitting) {
            info!("letter request cancelled, back to editing");
            inner.state = FormState::Editing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    struct FakeTransport {
        calls: AtomicUsize,
        delay: Duration,
        reply: Result<String, (u16, String)>,
    }

    impl FakeTransport {
        fn replying(letter: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                reply: Ok(letter.to_string()),
            }
        }

        fn failing(status: u16, error: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                reply: Err((status, error.to_string())),
            }
        }

        fn slow(self, delay: Duration) -> Self {
            Self { delay, ..self }
        }
    }

    impl LetterTransport for FakeTransport {
        async fn generate(&self, _req: &LetterRequest) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(letter) => Ok(letter.clone()),
                Err((status, error)) => Err(ClientError::Api {
                    status: *status,
                    error: error.clone(),
                    details: None,
                }),
            }
        }
    }

    fn controller(
        transport: FakeTransport,
    ) -> FormController<FakeTransport, Arc<MemorySessionStore>> {
        FormController::new(transport, Arc::new(MemorySessionStore::new()))
    }

    #[tokio::test]
    async fn successful_submit_shows_and_stores_letter() {
        let store = Arc::new(MemorySessionStore::new());
        let form = FormController::new(FakeTransport::replying("Ho Ho Ho, Mia!"), store.clone());
        form.edit(|d| d.child_name = "Mia".into());

        let outcome = form.submit().await.unwrap();
        let SubmitOutcome::Generated(letter) = outcome else {
            panic!("expected a letter");
        };
        assert_eq!(letter.letter, "Ho Ho Ho, Mia!");
        assert_eq!(letter.form_data.child_name, "Mia");
        assert_eq!(form.state(), FormState::ShowingResult(letter.clone()));
        assert_eq!(session::load_letter(&store), Some(letter));
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_ignored() {
        let form = controller(FakeTransport::replying("Dear Leo"));
        form.edit(|d| d.child_name = "Leo".into());

        let (first, second) = tokio::join!(form.submit(), form.submit());

        assert!(matches!(first.unwrap(), SubmitOutcome::Generated(_)));
        assert_eq!(second.unwrap(), SubmitOutcome::Ignored);
        assert_eq!(form.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_submit_returns_to_editing() {
        let form = controller(FakeTransport::replying("Dear Zoe").slow(Duration::from_secs(5)));
        form.edit(|d| d.child_name = "Zoe".into());

        let cancelled = tokio::time::timeout(Duration::from_millis(20), form.submit()).await;
        assert!(cancelled.is_err());
        assert_eq!(form.state(), FormState::Editing);
        assert_eq!(form.draft().child_name, "Zoe");

        assert!(form.edit(|d| d.age = Some("6".into())));
        form.reset();
        assert_eq!(form.state(), FormState::Editing);

        // a fresh submit goes out again instead of being ignored
        let retried = tokio::time::timeout(Duration::from_millis(20), form.submit()).await;
        assert!(retried.is_err());
        assert_eq!(form.transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(form.state(), FormState::Editing);
    }

    #[tokio::test]
    async fn empty_name_never_reaches_transport() {
        let form = controller(FakeTransport::replying("unused"));
        let err = form.submit().await.unwrap_err();

        assert_eq!(err.to_string(), "Child's name is required");
        assert_eq!(form.transport.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(form.state(), FormState::Error(_)));
    }

    #[tokio::test]
    async fn server_error_is_surfaced_and_resubmittable() {
        let form = controller(FakeTransport::failing(429, "Rate Limit Reached"));
        form.edit(|d| d.child_name = "Ada".into());

        form.submit().await.unwrap_err();
        assert_eq!(
            form.state(),
            FormState::Error(ErrorBody {
                error: "Rate Limit Reached".into(),
                details: None,
            })
        );

        // error -> submitting is allowed
        form.submit().await.unwrap_err();
        assert_eq!(form.transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blank_letter_is_an_error() {
        let form = controller(FakeTransport::replying("   "));
        form.edit(|d| d.child_name = "Sam".into());

        let err = form.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyLetter));
        assert!(form.letter().is_none());
    }

    #[tokio::test]
    async fn reload_restores_without_request() {
        let store = Arc::new(MemorySessionStore::new());
        let first = FormController::new(FakeTransport::replying("Dear Ivy"), store.clone());
        first.edit(|d| d.child_name = "Ivy".into());
        first.submit().await.unwrap();

        let reloaded = FormController::new(FakeTransport::replying("unused"), store.clone());
        let restored = reloaded.letter().unwrap();
        assert_eq!(restored.letter, "Dear Ivy");
        assert_eq!(reloaded.draft().child_name, "Ivy");
        assert_eq!(reloaded.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reset_clears_snapshot_and_keeps_draft() {
        let store = Arc::new(MemorySessionStore::new());
        let form = FormController::new(FakeTransport::replying("Dear Max"), store.clone());
        form.edit(|d| d.child_name = "Max".into());
        form.submit().await.unwrap();

        assert!(!form.edit(|d| d.child_name = "ignored".into()));
        assert_eq!(form.submit().await.unwrap(), SubmitOutcome::Ignored);

        form.reset();
        assert_eq!(form.state(), FormState::Editing);
        assert_eq!(form.draft().child_name, "Max");
        assert!(session::load_letter(&store).is_none());
    }
}
