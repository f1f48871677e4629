/// Reusable UI components

use crate::session::AuthStatus;
use yew::prelude::*;

/// Black or white, whichever reads better on `background` (`#rrggbb`)
pub fn text_color_for(background: &str) -> &'static str {
    let hex = background.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .map(f64::from)
    };

    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) if hex.len() == 6 => {
            let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
            if luminance > 150.0 { "#1f1f1f" } else { "#ffffff" }
        }
        _ => "#1f1f1f",
    }
}

pub fn status_text(status: AuthStatus) -> &'static str {
    match status {
        AuthStatus::LoggedIn => "Signed in",
        AuthStatus::LoggedOut => "Signed out",
        AuthStatus::Error => "Sign-in problem",
    }
}

#[derive(Properties, PartialEq)]
pub struct StatusBadgeProps {
    pub status: AuthStatus,
    #[prop_or_default]
    pub email: Option<String>,
}

#[function_component(StatusBadge)]
pub fn status_badge(props: &StatusBadgeProps) -> Html {
    let dot = match props.status {
        AuthStatus::LoggedIn => "#3e8635",
        AuthStatus::LoggedOut => "#8a8d90",
        AuthStatus::Error => "#c9190b",
    };

    html! {
        <div class="status-badge">
            <span style={format!("display: inline-block; width: 8px; height: 8px; border-radius: 50%; background-color: {}; margin-right: 6px;", dot)}></span>
            <span class="status-text">{status_text(props.status)}</span>
            if let Some(email) = &props.email {
                <span class="status-email">{format!(" · {}", email)}</span>
            }
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct LabelChipProps {
    pub name: String,
    pub color: String,
    #[prop_or_default]
    pub on_remove: Option<Callback<String>>,
}

#[function_component(LabelChip)]
pub fn label_chip(props: &LabelChipProps) -> Html {
    let style = format!(
        "display: inline-flex; align-items: center; gap: 4px; padding: 2px 8px; border-radius: 12px; font-size: 12px; background-color: {}; color: {};",
        props.color,
        text_color_for(&props.color)
    );

    html! {
        <span class="label-chip" style={style}>
            {&props.name}
            if let Some(on_remove) = &props.on_remove {
                <button
                    class="label-chip-remove"
                    onclick={on_remove.reform({
                        let name = props.name.clone();
                        move |_: MouseEvent| name.clone()
                    })}
                >
                    {"×"}
                </button>
            }
        </span>
    }
}

#[derive(PartialEq, Clone, Copy, Default)]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Error,
}

#[derive(Properties, PartialEq)]
pub struct ToastProps {
    pub message: String,
    #[prop_or_default]
    pub kind: ToastKind,
    pub on_close: Callback<()>,
}

#[function_component(Toast)]
pub fn toast(props: &ToastProps) -> Html {
    let (bg_color, border_color) = match props.kind {
        ToastKind::Info => ("#e3f2fd", "#2196f3"),
        ToastKind::Success => ("#e8f5e9", "#4caf50"),
        ToastKind::Error => ("#ffebee", "#f44336"),
    };

    html! {
        <div
            class="toast"
            style={format!("padding: 12px; border-radius: 4px; background-color: {}; border-left: 4px solid {}; margin: 10px 0; display: flex; justify-content: space-between;", bg_color, border_color)}
        >
            <p class="message-paragraph">{&props.message}</p>
            <button class="toast-close" onclick={props.on_close.reform(|_| ())}>{"×"}</button>
        </div>
    }
}
