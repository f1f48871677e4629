/// Side panel UI

use crate::labels::LabelCollection;
use crate::protocol::{Broadcast, Request, Response};
use crate::session::{AuthSnapshot, AuthStatus};
use crate::slack::SlackStatus;
use crate::theme::{ThemeMode, ThemePreference};
use crate::ui::bridge::{apply_theme, listen, open_label_manager, request};
use crate::ui::components::{LabelChip, StatusBadge, Toast, ToastKind};
use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, HtmlSelectElement};
use yew::prelude::*;

#[derive(Clone, PartialEq)]
enum PanelState {
    Idle,
    Loading(String),
    Error(String),
}

fn mode_value(mode: ThemeMode) -> &'static str {
    match mode {
        ThemeMode::Light => "light",
        ThemeMode::Dark => "dark",
        ThemeMode::System => "system",
    }
}

fn parse_mode(value: &str) -> Option<ThemeMode> {
    match value {
        "light" => Some(ThemeMode::Light),
        "dark" => Some(ThemeMode::Dark),
        "system" => Some(ThemeMode::System),
        _ => None,
    }
}

/// Fetch labels, theme and Slack status for a freshly signed-in user
fn load_user_data(
    labels: UseStateHandle<LabelCollection>,
    theme: UseStateHandle<ThemePreference>,
    slack: UseStateHandle<SlackStatus>,
) {
    spawn_local(async move {
        if let Ok(Response::Labels { labels: current }) = request(&Request::GetLabels).await {
            labels.set(current);
        }
        if let Ok(Response::Theme { theme: current }) = request(&Request::GetTheme).await {
            apply_theme(&current);
            theme.set(current);
        }
        if let Ok(Response::SlackStatus { status }) = request(&Request::SlackStatus).await {
            slack.set(status);
        }
    });
}

#[function_component(SidePanel)]
pub fn side_panel() -> Html {
    let state = use_state(|| PanelState::Loading("Checking session...".to_string()));
    let auth = use_state(AuthSnapshot::logged_out);
    let labels = use_state(LabelCollection::default);
    let theme = use_state(ThemePreference::default);
    let slack = use_state(SlackStatus::default);
    let new_label = use_state(String::new);
    let renaming = use_state(|| None::<String>);
    let rename_value = use_state(String::new);
    let toast = use_state(|| None::<(String, ToastKind)>);

    // Initial load plus live updates from the background
    {
        let state = state.clone();
        let auth = auth.clone();
        let labels = labels.clone();
        let theme = theme.clone();
        let slack = slack.clone();

        use_effect_with((), move |_| {
            {
                let state = state.clone();
                let auth = auth.clone();
                let (labels, theme, slack) = (labels.clone(), theme.clone(), slack.clone());
                spawn_local(async move {
                    match request(&Request::GetAuthState).await {
                        Ok(Response::AuthState { auth: current }) => {
                            if current.uid().is_some() {
                                load_user_data(labels, theme, slack);
                            }
                            auth.set(current);
                            state.set(PanelState::Idle);
                        }
                        Ok(_) => state.set(PanelState::Idle),
                        Err(e) => state.set(PanelState::Error(e)),
                    }
                });
            }

            let listener = listen(move |broadcast| match broadcast {
                Broadcast::AuthStateChanged { auth: current } => {
                    if current.uid().is_some() {
                        load_user_data(labels.clone(), theme.clone(), slack.clone());
                    } else {
                        labels.set(LabelCollection::default());
                    }
                    auth.set(current);
                }
                Broadcast::LabelsChanged { labels: current } => labels.set(current),
                Broadcast::ThemeChanged { theme: current } => {
                    apply_theme(&current);
                    theme.set(current);
                }
                Broadcast::ProfilesChanged { .. } | Broadcast::NotesChanged { .. } => {}
            });
            move || drop(listener)
        });
    }

    let on_sign_in = {
        let state = state.clone();
        let auth = auth.clone();
        Callback::from(move |_| {
            let state = state.clone();
            let auth = auth.clone();
            state.set(PanelState::Loading("Signing in...".to_string()));

            spawn_local(async move {
                match request(&Request::SignIn).await {
                    Ok(Response::AuthState { auth: current }) => {
                        auth.set(current);
                        state.set(PanelState::Idle);
                    }
                    Ok(_) => state.set(PanelState::Idle),
                    Err(e) => state.set(PanelState::Error(format!("Sign-in failed: {}", e))),
                }
            });
        })
    };

    let on_sign_out = {
        let state = state.clone();
        Callback::from(move |_| {
            let state = state.clone();
            spawn_local(async move {
                if let Err(e) = request(&Request::SignOut).await {
                    state.set(PanelState::Error(format!("Sign-out failed: {}", e)));
                }
            });
        })
    };

    let on_new_label_input = {
        let new_label = new_label.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                new_label.set(input.value());
            }
        })
    };

    let on_add_label = {
        let new_label = new_label.clone();
        let labels = labels.clone();
        let toast = toast.clone();
        Callback::from(move |_| {
            let name = new_label.trim().to_string();
            if name.is_empty() {
                return;
            }
            let new_label = new_label.clone();
            let labels = labels.clone();
            let toast = toast.clone();

            spawn_local(async move {
                match request(&Request::AddLabel { name, color: None }).await {
                    Ok(Response::Labels { labels: current }) => {
                        labels.set(current);
                        new_label.set(String::new());
                    }
                    Ok(_) => {}
                    Err(e) => toast.set(Some((e, ToastKind::Error))),
                }
            });
        })
    };

    let on_remove_label = {
        let labels = labels.clone();
        let toast = toast.clone();
        Callback::from(move |name: String| {
            let labels = labels.clone();
            let toast = toast.clone();
            spawn_local(async move {
                match request(&Request::RemoveLabel { name }).await {
                    Ok(Response::Labels { labels: current }) => labels.set(current),
                    Ok(_) => {}
                    Err(e) => toast.set(Some((e, ToastKind::Error))),
                }
            });
        })
    };

    let on_start_rename = {
        let renaming = renaming.clone();
        let rename_value = rename_value.clone();
        Callback::from(move |name: String| {
            rename_value.set(name.clone());
            renaming.set(Some(name));
        })
    };

    let on_rename_input = {
        let rename_value = rename_value.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                rename_value.set(input.value());
            }
        })
    };

    let on_save_rename = {
        let renaming = renaming.clone();
        let rename_value = rename_value.clone();
        let labels = labels.clone();
        let toast = toast.clone();
        Callback::from(move |_| {
            let Some(from) = (*renaming).clone() else {
                return;
            };
            renaming.set(None);
            let to = rename_value.trim().to_string();
            if to.is_empty() || to == from {
                return;
            }
            let labels = labels.clone();
            let toast = toast.clone();

            spawn_local(async move {
                match request(&Request::RenameLabel { from, to }).await {
                    Ok(Response::Labels { labels: current }) => labels.set(current),
                    Ok(_) => {}
                    Err(e) => toast.set(Some((e, ToastKind::Error))),
                }
            });
        })
    };

    let on_cancel_rename = {
        let renaming = renaming.clone();
        Callback::from(move |_| renaming.set(None))
    };

    let on_theme_change = {
        let theme = theme.clone();
        let toast = toast.clone();
        Callback::from(move |e: Event| {
            let Some(mode) = e
                .target_dyn_into::<HtmlSelectElement>()
                .and_then(|select| parse_mode(&select.value()))
            else {
                return;
            };
            let theme = theme.clone();
            let toast = toast.clone();

            spawn_local(async move {
                match request(&Request::SetThemeMode { mode }).await {
                    Ok(Response::Theme { theme: current }) => {
                        apply_theme(&current);
                        theme.set(current);
                    }
                    Ok(_) => {}
                    Err(e) => toast.set(Some((e, ToastKind::Error))),
                }
            });
        })
    };

    let on_slack_toggle = {
        let slack = slack.clone();
        let toast = toast.clone();
        Callback::from(move |_| {
            let slack = slack.clone();
            let toast = toast.clone();
            let message = if slack.connected {
                Request::SlackDisconnect
            } else {
                Request::SlackConnect
            };

            spawn_local(async move {
                match request(&message).await {
                    Ok(Response::SlackStatus { status }) => {
                        if status.connected {
                            let team = status.team_name.clone().unwrap_or_default();
                            toast.set(Some((format!("Connected to Slack {}", team), ToastKind::Success)));
                        }
                        slack.set(status);
                    }
                    Ok(_) => {}
                    Err(e) => toast.set(Some((e, ToastKind::Error))),
                }
            });
        })
    };

    let on_open_manager = Callback::from(move |_| {
        spawn_local(async move {
            let _ = open_label_manager().await;
        });
    });

    let on_close_toast = {
        let toast = toast.clone();
        Callback::from(move |_| toast.set(None))
    };

    let is_busy = matches!(*state, PanelState::Loading(_));
    let signed_in = auth.status == AuthStatus::LoggedIn;
    let email = auth.user.as_ref().map(|u| u.email.clone());

    html! {
        <div class="padding-20">
            <h1 class="panel-title">{"Profile Labeler"}</h1>
            <StatusBadge status={auth.status} email={email} />

            if let Some((message, kind)) = (*toast).clone() {
                <Toast message={message} kind={kind} on_close={on_close_toast} />
            }

            {match &*state {
                PanelState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                PanelState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                PanelState::Idle => html! {}
            }}

            if signed_in {
                <div class="flex-column-gap">
                    <h2 class="section-title">{"Labels"}</h2>
                    <div class="label-add-row">
                        <input
                            type="text"
                            placeholder="New label"
                            value={(*new_label).clone()}
                            oninput={on_new_label_input}
                            class="label-input"
                        />
                        <Button onclick={on_add_label} disabled={is_busy} variant={ButtonVariant::Primary}>
                            {"Add"}
                        </Button>
                    </div>

                    if labels.labels.is_empty() {
                        <p class="empty-state-hint">{"No labels yet."}</p>
                    } else {
                        <div class="label-list">
                            {for labels.labels.iter().map(|(name, label)| {
                                if (*renaming).as_deref() == Some(name.as_str()) {
                                    html! {
                                        <span key={name.clone()} class="label-rename">
                                            <input
                                                type="text"
                                                value={(*rename_value).clone()}
                                                oninput={on_rename_input.clone()}
                                                class="label-input"
                                            />
                                            <Button onclick={on_save_rename.clone()} size={ButtonSize::Small}>
                                                {"✓"}
                                            </Button>
                                            <Button
                                                onclick={on_cancel_rename.clone()}
                                                size={ButtonSize::Small}
                                                variant={ButtonVariant::Secondary}
                                            >
                                                {"✗"}
                                            </Button>
                                        </span>
                                    }
                                } else {
                                    html! {
                                        <span
                                            key={name.clone()}
                                            title="Double-click to rename"
                                            ondblclick={on_start_rename.reform({
                                                let name = name.clone();
                                                move |_: MouseEvent| name.clone()
                                            })}
                                        >
                                            <LabelChip
                                                name={name.clone()}
                                                color={label.color.clone()}
                                                on_remove={on_remove_label.clone()}
                                            />
                                        </span>
                                    }
                                }
                            })}
                        </div>
                    }
                    <Button onclick={on_open_manager} variant={ButtonVariant::Link}>
                        {"Manage labels"}
                    </Button>

                    <h2 class="section-title">{"Theme"}</h2>
                    <select class="theme-select" onchange={on_theme_change}>
                        {for [ThemeMode::System, ThemeMode::Light, ThemeMode::Dark].into_iter().map(|mode| html! {
                            <option value={mode_value(mode)} selected={theme.mode == mode}>
                                {mode_value(mode)}
                            </option>
                        })}
                    </select>

                    if slack.configured {
                        <h2 class="section-title">{"Slack"}</h2>
                        <Button onclick={on_slack_toggle} variant={ButtonVariant::Secondary} block={true}>
                            {if slack.connected { "Disconnect Slack" } else { "Connect Slack" }}
                        </Button>
                    }

                    <Button onclick={on_sign_out} disabled={is_busy} variant={ButtonVariant::Secondary} block={true}>
                        {"Sign out"}
                    </Button>
                </div>
            } else {
                <div class="flex-column-gap">
                    <p class="message-text">{"Sign in with Google to sync your labels."}</p>
                    <Button onclick={on_sign_in} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                        {"Sign in"}
                    </Button>
                </div>
            }

            <p class="footer-popup">
                {format!("Profile Labeler v{}", env!("CARGO_PKG_VERSION"))}
            </p>
        </div>
    }
}
