use std::rc::Rc;

use eqviz::state::{
    AppShell, AuthView, DownloadStatus, HistoryPanel, LoginForm, Notice, Screen, Selection,
    SignupForm, Submit, Ticket, UploadControl,
};
use eqviz::view::{distribution_lines, stat_cards, ChartModel, TableView, TABLE_PLACEHOLDER};
use eqviz::{ApiClient, DatasetId, EqvizError, Summary, DEFAULT_BASE_URL};
use gloo_timers::callback::Timeout;
use leptos::*;
use tracing::{info, warn};
use wasm_bindgen_futures::JsFuture;
use web_sys::{File, HtmlInputElement};

mod plot;
mod storage;

pub use storage::LocalStorageStore;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("GIT_COMMIT_HASH");

type Client = StoredValue<Rc<ApiClient>>;

/// Holds at most one pending timer. Scheduling again drops, and so cancels,
/// the previous one; disposing the owning component cancels it too.
/// Timers fire after the delay their [`Ticket`] carries.
#[derive(Clone, Copy)]
struct TimerSlot(StoredValue<Option<Timeout>>);

impl TimerSlot {
    fn new() -> Self {
        Self(store_value(None))
    }

    fn schedule(self, ticket: Ticket, callback: impl FnOnce() + 'static) {
        let millis = u32::try_from(ticket.after().as_millis()).unwrap_or(u32::MAX);
        let timeout = Timeout::new(millis, callback);
        self.0.try_update_value(|slot| *slot = Some(timeout));
    }
}

fn alert(message: &str) {
    if let Some(window) = web_sys::window() {
        let _ = window.alert_with_message(message);
    }
}

async fn read_file(file: &File) -> eqviz::Result<Vec<u8>> {
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|err| EqvizError::Validation(format!("could not read file: {err:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

#[component]
pub fn App() -> impl IntoView {
    let client = Rc::new(ApiClient::new(DEFAULT_BASE_URL, Box::new(LocalStorageStore)));
    let shell = create_rw_signal(AppShell::restore(client.has_credential()));
    let client: Client = store_value(client);
    // Lives with the app so the redirect survives the auth view unmounting.
    let redirect = TimerSlot::new();

    let auth_view = create_memo(move |_| {
        shell.with(|s| match s.screen() {
            Screen::Auth(view) => Some(*view),
            Screen::Dashboard(_) => None,
        })
    });

    view! {
        <main class="app">
            {move || match auth_view.get() {
                Some(AuthView::Login) => {
                    view! { <LoginView client=client shell=shell redirect=redirect/> }.into_view()
                }
                Some(AuthView::Signup) => {
                    view! { <SignupView client=client shell=shell redirect=redirect/> }.into_view()
                }
                None => view! { <DashboardView client=client shell=shell/> }.into_view(),
            }}
            <footer class="note">{"Web version "}{APP_VERSION}{" ("}{APP_COMMIT}{")"}</footer>
        </main>
    }
}

#[component]
fn NoticeLine(#[prop(into)] notice: Signal<Option<Notice>>) -> impl IntoView {
    move || {
        notice.get().map(|n| {
            view! { <p class=format!("notice {}", n.kind.as_class())>{n.text}</p> }
        })
    }
}

#[component]
fn LoginView(client: Client, shell: RwSignal<AppShell>, redirect: TimerSlot) -> impl IntoView {
    let form = create_rw_signal(LoginForm::default());
    let notice_timer = TimerSlot::new();
    let expire_later = move |ticket: Ticket| {
        notice_timer.schedule(ticket, move || {
            form.try_update(|f| f.expire_notice(ticket));
        })
    };

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        match form.try_update(|f| f.submit()) {
            Some(Submit::Send(request)) => {
                let client = client.get_value();
                spawn_local(async move {
                    match client.login(&request.username, &request.password).await {
                        Ok(_) => {
                            if let Some(ticket) = form.try_update(|f| f.succeeded()) {
                                redirect.schedule(ticket, move || {
                                    shell.update(|s| s.login_completed());
                                });
                            }
                        }
                        Err(err) => {
                            warn!("Login failed: {err}");
                            if let Some(ticket) = form.try_update(|f| f.failed(&err)) {
                                expire_later(ticket);
                            }
                        }
                    }
                });
            }
            Some(Submit::Rejected(ticket)) => expire_later(ticket),
            Some(Submit::Busy) | None => {}
        }
    };

    let loading = move || form.with(LoginForm::is_loading);
    let locked = move || form.with(LoginForm::is_locked);

    view! {
        <section class="auth-card">
            <h2>"Login"</h2>
            <form on:submit=on_submit>
                <input
                    type="text"
                    placeholder="Username"
                    prop:value=move || form.with(|f| f.username.clone())
                    on:input=move |ev| form.update(|f| f.username = event_target_value(&ev))
                />
                <input
                    type="password"
                    placeholder="Password"
                    prop:value=move || form.with(|f| f.password.clone())
                    on:input=move |ev| form.update(|f| f.password = event_target_value(&ev))
                />
                <button type="submit" class="btn" disabled=locked>
                    {move || if loading() { "Logging in..." } else { "Login" }}
                </button>
            </form>
            <NoticeLine notice=Signal::derive(move || form.with(|f| f.notice().cloned()))/>
            <p class="switch">
                "Don't have an account? "
                <a href="#" on:click=move |ev| {
                    ev.prevent_default();
                    shell.update(|s| s.show_auth(AuthView::Signup));
                }>"Sign up"</a>
            </p>
        </section>
    }
}

#[component]
fn SignupView(client: Client, shell: RwSignal<AppShell>, redirect: TimerSlot) -> impl IntoView {
    let form = create_rw_signal(SignupForm::default());
    let notice_timer = TimerSlot::new();
    let expire_later = move |ticket: Ticket| {
        notice_timer.schedule(ticket, move || {
            form.try_update(|f| f.expire_notice(ticket));
        })
    };

    let on_submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        match form.try_update(|f| f.submit()) {
            Some(Submit::Send(request)) => {
                let client = client.get_value();
                spawn_local(async move {
                    let result = client
                        .signup(&request.username, &request.email, &request.password)
                        .await;
                    match result {
                        Ok(_) => {
                            if let Some(ticket) = form.try_update(|f| f.succeeded()) {
                                redirect.schedule(ticket, move || {
                                    shell.update(|s| s.show_auth(AuthView::Login));
                                });
                            }
                        }
                        Err(err) => {
                            warn!("Signup failed: {err}");
                            if let Some(ticket) = form.try_update(|f| f.failed(&err)) {
                                expire_later(ticket);
                            }
                        }
                    }
                });
            }
            Some(Submit::Rejected(ticket)) => expire_later(ticket),
            Some(Submit::Busy) | None => {}
        }
    };

    let loading = move || form.with(SignupForm::is_loading);
    let locked = move || form.with(SignupForm::is_locked);

    view! {
        <section class="auth-card">
            <h2>"Create Account"</h2>
            <form on:submit=on_submit>
                <input
                    type="text"
                    placeholder="Username"
                    prop:value=move || form.with(|f| f.username.clone())
                    on:input=move |ev| form.update(|f| f.username = event_target_value(&ev))
                />
                <input
                    type="email"
                    placeholder="Email"
                    prop:value=move || form.with(|f| f.email.clone())
                    on:input=move |ev| form.update(|f| f.email = event_target_value(&ev))
                />
                <input
                    type="password"
                    placeholder="Password"
                    prop:value=move || form.with(|f| f.password.clone())
                    on:input=move |ev| form.update(|f| f.password = event_target_value(&ev))
                />
                <button type="submit" class="btn" disabled=locked>
                    {move || if loading() { "Creating..." } else { "Sign up" }}
                </button>
            </form>
            <NoticeLine notice=Signal::derive(move || form.with(|f| f.notice().cloned()))/>
            <p class="switch">
                "Already have an account? "
                <a href="#" on:click=move |ev| {
                    ev.prevent_default();
                    shell.update(|s| s.show_auth(AuthView::Login));
                }>"Login"</a>
            </p>
        </section>
    }
}

#[component]
fn DashboardView(client: Client, shell: RwSignal<AppShell>) -> impl IntoView {
    let history = create_rw_signal(HistoryPanel::default());
    let download_timer = TimerSlot::new();

    let summary = create_memo(move |_| {
        shell.with(|s| s.dashboard().and_then(|d| d.summary.clone()))
    });
    let download = create_memo(move |_| {
        shell.with(|s| s.dashboard().map(|d| d.download_status()))
            .unwrap_or_default()
    });
    let has_dataset = move || shell.with(|s| s.dashboard().is_some_and(|d| d.dataset_id.is_some()));

    let reload_history = move || {
        let client = client.get_value();
        spawn_local(async move {
            match client.fetch_history().await {
                Ok(entries) => {
                    history.try_update(|h| h.load(entries));
                }
                Err(err) => warn!("Could not load history: {err}"),
            }
        });
    };
    reload_history();

    create_effect(move |_| {
        if let Some(model) = summary.with(|s| ChartModel::from_summary(s.as_ref())) {
            // Wait for the chart containers to be mounted.
            request_animation_frame(move || plot::render_charts(&model));
        }
    });

    let on_download = move |_: ev::MouseEvent| {
        let Some(dataset_id) = shell.try_update(|s| s.begin_download()).flatten() else {
            return;
        };
        let client = client.get_value();
        spawn_local(async move {
            let result = match client.fetch_report(dataset_id).await {
                Ok(bytes) => plot::trigger_download(&bytes, &dataset_id.report_file_name())
                    .map_err(|err| format!("{err:?}")),
                Err(err) => Err(err.to_string()),
            };
            match result {
                Ok(()) => {
                    if let Some(ticket) = shell.try_update(|s| s.download_finished()).flatten() {
                        download_timer.schedule(ticket, move || {
                            shell.update(|s| {
                                s.download_reset(ticket);
                            });
                        });
                    }
                }
                Err(err) => {
                    warn!("PDF download failed: {err}");
                    shell.try_update(|s| s.download_failed());
                    alert("PDF download failed");
                }
            }
        });
    };

    let on_logout = move |_: ev::MouseEvent| {
        if let Err(err) = client.get_value().clear_credential() {
            warn!("Could not clear credential: {err}");
        }
        info!("Logged out");
        shell.update(|s| s.logout());
    };

    view! {
        <div class="dashboard">
            <aside class="sidebar">
                <HistoryList client=client history=history/>
            </aside>
            <section class="content">
                <header class="topbar">
                    <h1>"Equipment Analytics Overview"</h1>
                    <button class="btn logout" on:click=on_logout>"Logout"</button>
                </header>
                <UploadPanel client=client shell=shell on_uploaded=reload_history/>
                <h3>"Summary Statistics"</h3>
                <SummaryCards summary=summary/>
                <h3>"Dataset Table Preview (First 10 Rows)"</h3>
                <DataTable summary=summary/>
                <Show when=move || summary.with(|s| ChartModel::from_summary(s.as_ref()).is_some())>
                    <h3>"Charts & Visualizations"</h3>
                    <div class="plots">
                        <div id={plot::BAR_DIV} class="plot"></div>
                        <div id={plot::DOUGHNUT_DIV} class="plot"></div>
                    </div>
                </Show>
                <Show when=has_dataset>
                    <button
                        class="btn download"
                        on:click=on_download
                        disabled=move || download.get() == DownloadStatus::Downloading
                    >
                        {move || download.get().label()}
                    </button>
                </Show>
            </section>
        </div>
    }
}

#[component]
fn UploadPanel<F>(client: Client, shell: RwSignal<AppShell>, on_uploaded: F) -> impl IntoView
where
    F: Fn() + Copy + 'static,
{
    let control = create_rw_signal(UploadControl::default());
    let notice_timer = TimerSlot::new();
    let expire_later = move |ticket: Ticket| {
        notice_timer.schedule(ticket, move || {
            control.try_update(|c| c.expire_notice(ticket));
        })
    };

    let on_change = move |ev: ev::Event| {
        let input = event_target::<HtmlInputElement>(&ev);
        let Some(file) = input.files().and_then(|files| files.item(0)) else {
            return;
        };
        let name = file.name();
        match control.try_update(|c| c.select(&name)) {
            Some(Selection::Accepted) => {
                let client = client.get_value();
                spawn_local(async move {
                    let result = match read_file(&file).await {
                        Ok(bytes) => client.upload_dataset(&name, bytes).await,
                        Err(err) => Err(err),
                    };
                    // Lets the same file be picked again.
                    input.set_value("");
                    match result {
                        Ok(response) => {
                            shell.try_update(|s| s.upload_succeeded(response));
                            if let Some(ticket) = control.try_update(|c| c.succeeded()) {
                                expire_later(ticket);
                            }
                            on_uploaded();
                        }
                        Err(err) => {
                            warn!("Upload of {name} failed: {err}");
                            if let Some(ticket) = control.try_update(|c| c.failed(&err)) {
                                expire_later(ticket);
                            }
                        }
                    }
                });
            }
            Some(Selection::Rejected(ticket)) => {
                input.set_value("");
                expire_later(ticket);
            }
            Some(Selection::Busy) | None => input.set_value(""),
        }
    };

    view! {
        <section class="upload">
            <label class="dropzone">
                <span>"Upload CSV"</span>
                <input
                    type="file"
                    accept=".csv"
                    on:change=on_change
                    disabled=move || control.with(UploadControl::is_busy)
                />
            </label>
            <NoticeLine notice=Signal::derive(move || control.with(|c| c.notice().cloned()))/>
        </section>
    }
}

#[component]
fn SummaryCards(summary: Memo<Option<Summary>>) -> impl IntoView {
    view! {
        <div class="cards">
            {move || {
                summary
                    .with(|s| stat_cards(s.as_ref()))
                    .into_iter()
                    .map(|card| {
                        view! {
                            <div class="card">
                                <span class="card-label">{card.label}</span>
                                <span class="card-value">{card.value}</span>
                            </div>
                        }
                    })
                    .collect_view()
            }}
        </div>
        <ul class="distribution">
            {move || {
                summary
                    .with(|s| distribution_lines(s.as_ref()))
                    .into_iter()
                    .map(|line| view! { <li>{line}</li> })
                    .collect_view()
            }}
        </ul>
    }
}

#[component]
fn DataTable(summary: Memo<Option<Summary>>) -> impl IntoView {
    move || match summary.with(|s| TableView::from_summary(s.as_ref())) {
        TableView::Placeholder => view! { <p class="placeholder">{TABLE_PLACEHOLDER}</p> }.into_view(),
        TableView::Table { columns, rows } => view! {
            <table class="preview">
                <thead>
                    <tr>{columns.into_iter().map(|c| view! { <th>{c}</th> }).collect_view()}</tr>
                </thead>
                <tbody>
                    {rows
                        .into_iter()
                        .map(|row| {
                            view! {
                                <tr>{row.into_iter().map(|cell| view! { <td>{cell}</td> }).collect_view()}</tr>
                            }
                        })
                        .collect_view()}
                </tbody>
            </table>
        }
        .into_view(),
    }
}

#[component]
fn HistoryList(client: Client, history: RwSignal<HistoryPanel>) -> impl IntoView {
    let fetch_report = move |dataset_id: DatasetId| {
        let client = client.get_value();
        spawn_local(async move {
            let result = match client.fetch_report(dataset_id).await {
                Ok(bytes) => {
                    plot::trigger_download(&bytes, &dataset_id.history_report_file_name())
                        .map_err(|err| format!("{err:?}"))
                }
                Err(err) => Err(err.to_string()),
            };
            if let Err(err) = result {
                warn!("History report {dataset_id} failed: {err}");
                alert("Could not fetch report for this dataset");
            }
        });
    };

    view! {
        <h3>"Upload History"</h3>
        {move || {
            if history.with(HistoryPanel::is_empty) {
                view! { <p class="note">"No dataset reports yet"</p> }.into_view()
            } else {
                history
                    .with(|h| h.entries().to_vec())
                    .into_iter()
                    .map(|entry| {
                        let id = entry.id;
                        view! {
                            <button class="history-item" on:click=move |_| fetch_report(id)>
                                {entry.label()}
                            </button>
                        }
                    })
                    .collect_view()
            }
        }}
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    leptos::mount_to_body(|| view! { <App/> });
}
