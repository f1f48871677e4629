/// Label manager page

use crate::labels::{Label, LabelCollection};
use crate::protocol::{Broadcast, Request, Response};
use crate::ui::bridge::{apply_theme, listen, request};
use crate::ui::components::LabelChip;
use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use yew::prelude::*;

#[derive(Clone, PartialEq)]
enum ViewState {
    Loading,
    Idle,
    Error(String),
}

/// Send a label mutation and fold the answer back into view state
fn mutate(
    message: Request,
    labels: UseStateHandle<LabelCollection>,
    state: UseStateHandle<ViewState>,
) {
    spawn_local(async move {
        match request(&message).await {
            Ok(Response::Labels { labels: current }) => labels.set(current),
            Ok(_) => {}
            Err(e) => state.set(ViewState::Error(e)),
        }
    });
}

#[function_component(LabelManager)]
pub fn label_manager() -> Html {
    let state = use_state(|| ViewState::Loading);
    let labels = use_state(LabelCollection::default);
    let search_query = use_state(String::new);
    let editing_label = use_state(|| None::<String>);
    let edit_input_value = use_state(String::new);

    // Load labels on mount and follow changes made elsewhere
    {
        let state = state.clone();
        let labels = labels.clone();

        use_effect_with((), move |_| {
            {
                let state = state.clone();
                let labels = labels.clone();
                spawn_local(async move {
                    if let Ok(Response::Theme { theme }) = request(&Request::GetTheme).await {
                        apply_theme(&theme);
                    }
                    match request(&Request::GetLabels).await {
                        Ok(Response::Labels { labels: current }) => {
                            labels.set(current);
                            state.set(ViewState::Idle);
                        }
                        Ok(_) => state.set(ViewState::Idle),
                        Err(e) => state.set(ViewState::Error(format!("Failed to load: {}", e))),
                    }
                });
            }

            let listener = listen(move |broadcast| match broadcast {
                Broadcast::LabelsChanged { labels: current } => labels.set(current),
                Broadcast::ThemeChanged { theme } => apply_theme(&theme),
                Broadcast::AuthStateChanged { auth } if auth.uid().is_none() => {
                    labels.set(LabelCollection::default());
                }
                _ => {}
            });
            move || drop(listener)
        });
    }

    let on_search_input = {
        let search_query = search_query.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                search_query.set(input.value());
            }
        })
    };

    let on_delete = {
        let labels = labels.clone();
        let state = state.clone();
        Callback::from(move |name: String| {
            mutate(Request::RemoveLabel { name }, labels.clone(), state.clone());
        })
    };

    let on_start_edit = {
        let editing_label = editing_label.clone();
        let edit_input_value = edit_input_value.clone();
        Callback::from(move |name: String| {
            edit_input_value.set(name.clone());
            editing_label.set(Some(name));
        })
    };

    let on_save_edit = {
        let editing_label = editing_label.clone();
        let edit_input_value = edit_input_value.clone();
        let labels = labels.clone();
        let state = state.clone();
        Callback::from(move |_| {
            if let Some(from) = (*editing_label).clone() {
                let to = edit_input_value.trim().to_string();
                if !to.is_empty() && to != from {
                    mutate(Request::RenameLabel { from, to }, labels.clone(), state.clone());
                }
                editing_label.set(None);
            }
        })
    };

    let on_cancel_edit = {
        let editing_label = editing_label.clone();
        Callback::from(move |_| editing_label.set(None))
    };

    let on_edit_input = {
        let edit_input_value = edit_input_value.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                edit_input_value.set(input.value());
            }
        })
    };

    let on_color_change = {
        let labels = labels.clone();
        let state = state.clone();
        Callback::from(move |(name, color): (String, String)| {
            mutate(Request::SetLabelColor { name, color }, labels.clone(), state.clone());
        })
    };

    let on_detach = {
        let labels = labels.clone();
        let state = state.clone();
        Callback::from(move |(name, profile_id): (String, String)| {
            mutate(
                Request::DetachLabel { name, profile_id },
                labels.clone(),
                state.clone(),
            );
        })
    };

    let filtered = labels.search(&search_query);
    let profile_total: usize = labels.labels.values().map(|l| l.profiles.len()).sum();

    html! {
        <div class="container">
            <div class="header">
                <h1 class="main-title">{"Labels"}</h1>
            </div>

            {match &*state {
                ViewState::Loading => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{"Loading labels..."}</p>
                    </div>
                },
                ViewState::Error(err) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err.clone()}
                    </Alert>
                },
                ViewState::Idle => html! {}
            }}

            <div class="search-container">
                <input
                    type="text"
                    placeholder="Search labels..."
                    value={(*search_query).clone()}
                    oninput={on_search_input}
                    class="search-input"
                />
            </div>

            if filtered.is_empty() {
                <div class="empty-state">
                    if search_query.is_empty() {
                        <p>{"No labels yet."}</p>
                        <p class="empty-state-hint">{"Add one from the side panel."}</p>
                    } else {
                        <p>{"No labels match your search."}</p>
                    }
                </div>
            } else {
                <div class="labels-list">
                    {for filtered.iter().map(|(name, label)| {
                        let is_editing = (*editing_label).as_deref() == Some(name.as_str());
                        html! {
                            <LabelCard
                                key={(*name).clone()}
                                name={(*name).clone()}
                                label={(*label).clone()}
                                is_editing={is_editing}
                                edit_value={(*edit_input_value).clone()}
                                on_delete={on_delete.clone()}
                                on_start_edit={on_start_edit.clone()}
                                on_save_edit={on_save_edit.clone()}
                                on_cancel_edit={on_cancel_edit.clone()}
                                on_edit_input={on_edit_input.clone()}
                                on_color_change={on_color_change.clone()}
                                on_detach={on_detach.clone()}
                            />
                        }
                    })}
                </div>
            }

            <div class="footer">
                {format!("{} labels • {} labeled profiles", labels.labels.len(), profile_total)}
            </div>
        </div>
    }
}

#[derive(Properties, PartialEq)]
struct LabelCardProps {
    name: String,
    label: Label,
    is_editing: bool,
    edit_value: String,
    on_delete: Callback<String>,
    on_start_edit: Callback<String>,
    on_save_edit: Callback<()>,
    on_cancel_edit: Callback<()>,
    on_edit_input: Callback<InputEvent>,
    on_color_change: Callback<(String, String)>,
    on_detach: Callback<(String, String)>,
}

#[function_component(LabelCard)]
fn label_card(props: &LabelCardProps) -> Html {
    let expanded = use_state(|| false);
    let label = &props.label;

    let toggle_expanded = {
        let expanded = expanded.clone();
        Callback::from(move |_| expanded.set(!*expanded))
    };

    let on_color_input = {
        let name = props.name.clone();
        let on_color_change = props.on_color_change.clone();
        Callback::from(move |e: Event| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                on_color_change.emit((name.clone(), input.value()));
            }
        })
    };

    html! {
        <div class="label-card">
            <div class="label-header">
                <div class="label-title-container">
                    if props.is_editing {
                        <div class="label-title-edit-mode">
                            <input
                                type="text"
                                value={props.edit_value.clone()}
                                oninput={props.on_edit_input.clone()}
                                class="label-title-input"
                            />
                            <Button onclick={props.on_save_edit.reform(|_| ())}>
                                {"✓"}
                            </Button>
                            <Button
                                onclick={props.on_cancel_edit.reform(|_| ())}
                                variant={ButtonVariant::Secondary}
                            >
                                {"✗"}
                            </Button>
                        </div>
                    } else {
                        <div
                            class="label-title-view-mode"
                            onclick={props.on_start_edit.reform({
                                let name = props.name.clone();
                                move |_| name.clone()
                            })}
                        >
                            <LabelChip name={props.name.clone()} color={label.color.clone()} />
                            <span class="edit-icon">{"✏️"}</span>
                        </div>
                    }
                    <p class="label-meta">
                        {format!("{} profiles", label.profiles.len())}
                    </p>
                </div>

                <div class="label-actions">
                    <input
                        type="color"
                        value={label.color.clone()}
                        onchange={on_color_input}
                        class="label-color-input"
                    />
                    <Button
                        onclick={toggle_expanded.reform(|_| ())}
                        variant={ButtonVariant::Secondary}
                        disabled={label.profiles.is_empty()}
                    >
                        {if *expanded { "▲ Hide" } else { "▼ Profiles" }}
                    </Button>
                    <Button
                        onclick={props.on_delete.reform({
                            let name = props.name.clone();
                            move |_| name.clone()
                        })}
                        variant={ButtonVariant::Danger}
                    >
                        {"🗑️"}
                    </Button>
                </div>
            </div>

            if *expanded {
                <div class="profiles-list">
                    {for label.profiles.iter().map(|profile_id| {
                        let key = (props.name.clone(), profile_id.clone());
                        html! {
                            <div key={profile_id.clone()} class="profile-item">
                                <span class="profile-id">{profile_id}</span>
                                <Button
                                    onclick={props.on_detach.reform(move |_| key.clone())}
                                    size={ButtonSize::Small}
                                    variant={ButtonVariant::Secondary}
                                >
                                    {"Remove"}
                                </Button>
                            </div>
                        }
                    })}
                </div>
            }
        </div>
    }
}
