//! UI state machines shared by the front ends.
//!
//! Nothing here performs I/O or sleeps. Each transition reports what the
//! caller has to do next (issue a request, schedule a clear after a delay).
//! Delayed work is identified by a [`Ticket`], which also says how long to
//! wait, so that a late timer can never clobber newer state.

use std::time::Duration;

use crate::{DatasetId, EqvizError, HistoryEntry, Summary, UploadResponse};

/// How long login, signup and upload messages stay visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);
/// Delay between a successful login/signup and the view change.
pub const REDIRECT_DELAY: Duration = Duration::from_secs(3);
/// How long the "downloaded" state lasts before the button resets.
pub const DOWNLOADED_TTL: Duration = Duration::from_secs(2);
/// Number of history entries the sidebar shows.
pub const HISTORY_LIMIT: usize = 5;

pub const CSV_EXTENSION: &str = ".csv";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    id: u64,
    after: Duration,
}

impl Ticket {
    /// Delay before the follow-up keyed by this ticket should run.
    pub fn after(self) -> Duration {
        self.after
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Loading,
}

impl NoticeKind {
    pub fn as_class(self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Loading => "loading",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
}

/// A single transient message. Showing a new message supersedes the old one
/// and invalidates the old one's ticket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoticeSlot {
    current: Option<(Ticket, Notice)>,
    issued: u64,
}

impl NoticeSlot {
    /// Shows a message that clears after [`NOTICE_TTL`].
    pub fn show(&mut self, text: impl Into<String>, kind: NoticeKind) -> Ticket {
        self.show_for(text, kind, NOTICE_TTL)
    }

    pub fn show_for(
        &mut self,
        text: impl Into<String>,
        kind: NoticeKind,
        after: Duration,
    ) -> Ticket {
        self.issued += 1;
        let ticket = Ticket {
            id: self.issued,
            after,
        };
        self.current = Some((
            ticket,
            Notice {
                text: text.into(),
                kind,
            },
        ));
        ticket
    }

    /// Clears the message if `ticket` still identifies it.
    pub fn expire(&mut self, ticket: Ticket) -> bool {
        match &self.current {
            Some((current, _)) if *current == ticket => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref().map(|(_, notice)| notice)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthView {
    #[default]
    Login,
    Signup,
}

/// What a form submit asks of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submit<T> {
    /// Send this request to the backend.
    Send(T),
    /// Rejected locally; the shown error clears with this ticket.
    Rejected(Ticket),
    /// A request is already running, or the form is about to go away.
    Busy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    loading: bool,
    redirecting: bool,
    notice: NoticeSlot,
}

impl LoginForm {
    pub fn submit(&mut self) -> Submit<LoginRequest> {
        if self.is_locked() {
            return Submit::Busy;
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Submit::Rejected(
                self.notice
                    .show("Please enter both fields", NoticeKind::Error),
            );
        }
        self.loading = true;
        Submit::Send(LoginRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    /// The caller advances to the dashboard once the ticket's delay
    /// ([`REDIRECT_DELAY`]) elapses. The form stays locked until then.
    pub fn succeeded(&mut self) -> Ticket {
        self.loading = false;
        self.redirecting = true;
        self.notice.show_for(
            "Login successful! Redirecting...",
            NoticeKind::Success,
            REDIRECT_DELAY,
        )
    }

    pub fn failed(&mut self, _err: &EqvizError) -> Ticket {
        self.loading = false;
        self.notice
            .show("Invalid username or password", NoticeKind::Error)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True while a request runs or a redirect is pending.
    pub fn is_locked(&self) -> bool {
        self.loading || self.redirecting
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.current()
    }

    pub fn expire_notice(&mut self, ticket: Ticket) -> bool {
        self.notice.expire(ticket)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    loading: bool,
    redirecting: bool,
    notice: NoticeSlot,
}

impl SignupForm {
    pub fn submit(&mut self) -> Submit<SignupRequest> {
        if self.is_locked() {
            return Submit::Busy;
        }
        if self.username.is_empty() || self.email.is_empty() || self.password.is_empty() {
            return Submit::Rejected(
                self.notice
                    .show("All fields are required", NoticeKind::Error),
            );
        }
        self.loading = true;
        Submit::Send(SignupRequest {
            username: self.username.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }

    /// The caller switches to the login view once the ticket's delay
    /// ([`REDIRECT_DELAY`]) elapses. The form stays locked until then.
    pub fn succeeded(&mut self) -> Ticket {
        self.loading = false;
        self.redirecting = true;
        self.notice.show_for(
            "Account created! Redirecting to login...",
            NoticeKind::Success,
            REDIRECT_DELAY,
        )
    }

    pub fn failed(&mut self, err: &EqvizError) -> Ticket {
        self.loading = false;
        let text = match err {
            EqvizError::Auth(msg) if !msg.is_empty() => msg.clone(),
            _ => "Signup failed. Username may already exist.".to_string(),
        };
        self.notice.show(text, NoticeKind::Error)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True while a request runs or a redirect is pending.
    pub fn is_locked(&self) -> bool {
        self.loading || self.redirecting
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.current()
    }

    pub fn expire_notice(&mut self, ticket: Ticket) -> bool {
        self.notice.expire(ticket)
    }
}

pub fn is_csv_file_name(name: &str) -> bool {
    name.ends_with(CSV_EXTENSION)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Upload the file.
    Accepted,
    /// Not a CSV file; nothing is sent.
    Rejected(Ticket),
    /// An upload is already in flight.
    Busy,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadControl {
    in_flight: bool,
    notice: NoticeSlot,
}

impl UploadControl {
    pub fn select(&mut self, file_name: &str) -> Selection {
        if self.in_flight {
            return Selection::Busy;
        }
        if !is_csv_file_name(file_name) {
            return Selection::Rejected(
                self.notice.show("Only CSV files allowed!", NoticeKind::Error),
            );
        }
        self.in_flight = true;
        self.notice.show("Uploading...", NoticeKind::Loading);
        Selection::Accepted
    }

    pub fn succeeded(&mut self) -> Ticket {
        self.in_flight = false;
        self.notice.show("Upload successful", NoticeKind::Success)
    }

    pub fn failed(&mut self, _err: &EqvizError) -> Ticket {
        self.in_flight = false;
        self.notice.show("Upload failed", NoticeKind::Error)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.current()
    }

    pub fn expire_notice(&mut self, ticket: Ticket) -> bool {
        self.notice.expire(ticket)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryPanel {
    entries: Vec<HistoryEntry>,
}

impl HistoryPanel {
    /// Keeps the first [`HISTORY_LIMIT`] entries in backend order.
    pub fn load(&mut self, mut entries: Vec<HistoryEntry>) {
        entries.truncate(HISTORY_LIMIT);
        self.entries = entries;
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    Downloaded(Ticket),
}

impl DownloadStatus {
    pub fn label(self) -> &'static str {
        match self {
            DownloadStatus::Idle => "Download Report",
            DownloadStatus::Downloading => "Downloading...",
            DownloadStatus::Downloaded(_) => "Downloaded",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dashboard {
    pub summary: Option<Summary>,
    pub dataset_id: Option<DatasetId>,
    download: DownloadStatus,
    issued: u64,
}

impl Dashboard {
    pub fn download_status(&self) -> DownloadStatus {
        self.download
    }

    pub fn can_download(&self) -> bool {
        self.dataset_id.is_some() && self.download != DownloadStatus::Downloading
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Auth(AuthView),
    Dashboard(Dashboard),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppShell {
    screen: Screen,
}

impl Default for AppShell {
    fn default() -> Self {
        Self {
            screen: Screen::Auth(AuthView::Login),
        }
    }
}

impl AppShell {
    /// Credential presence alone decides the first screen.
    pub fn restore(has_credential: bool) -> Self {
        if has_credential {
            Self {
                screen: Screen::Dashboard(Dashboard::default()),
            }
        } else {
            Self::default()
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.screen, Screen::Dashboard(_))
    }

    pub fn dashboard(&self) -> Option<&Dashboard> {
        match &self.screen {
            Screen::Dashboard(dashboard) => Some(dashboard),
            Screen::Auth(_) => None,
        }
    }

    fn dashboard_mut(&mut self) -> Option<&mut Dashboard> {
        match &mut self.screen {
            Screen::Dashboard(dashboard) => Some(dashboard),
            Screen::Auth(_) => None,
        }
    }

    /// Ignored once logged in.
    pub fn show_auth(&mut self, view: AuthView) {
        if let Screen::Auth(current) = &mut self.screen {
            *current = view;
        }
    }

    pub fn login_completed(&mut self) {
        if !self.is_logged_in() {
            self.screen = Screen::Dashboard(Dashboard::default());
        }
    }

    pub fn upload_succeeded(&mut self, response: UploadResponse) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.summary = Some(response.summary);
            dashboard.dataset_id = Some(response.dataset_id);
        }
    }

    /// Returns the dataset to fetch, or `None` when there is nothing to do.
    pub fn begin_download(&mut self) -> Option<DatasetId> {
        let dashboard = self.dashboard_mut()?;
        if !dashboard.can_download() {
            return None;
        }
        dashboard.download = DownloadStatus::Downloading;
        dashboard.dataset_id
    }

    /// The caller resets with the returned ticket after its delay
    /// ([`DOWNLOADED_TTL`]).
    pub fn download_finished(&mut self) -> Option<Ticket> {
        let dashboard = self.dashboard_mut()?;
        if dashboard.download != DownloadStatus::Downloading {
            return None;
        }
        dashboard.issued += 1;
        let ticket = Ticket {
            id: dashboard.issued,
            after: DOWNLOADED_TTL,
        };
        dashboard.download = DownloadStatus::Downloaded(ticket);
        Some(ticket)
    }

    pub fn download_failed(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.download = DownloadStatus::Idle;
        }
    }

    pub fn download_reset(&mut self, ticket: Ticket) -> bool {
        match self.dashboard_mut() {
            Some(dashboard) if dashboard.download == DownloadStatus::Downloaded(ticket) => {
                dashboard.download = DownloadStatus::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drops every piece of dashboard state. The caller clears the credential.
    pub fn logout(&mut self) {
        self.screen = Screen::Auth(AuthView::Login);
    }
}
