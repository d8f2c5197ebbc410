//! Dark/light preference for the public pages.
//!
//! The preference lives in a key/value store (browser local storage in
//! production) under [`STORAGE_KEY`] as `"true"` (dark) or `"false"` (light).
//! The page body carries the `light` class only in light mode.

use std::collections::HashMap;

pub const STORAGE_KEY: &str = "darkMode";
/// Class added to the document body in light mode
pub const LIGHT_CLASS: &str = "light";

pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

/// In-memory store, used for tests and server-side previews
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    /// Anything other than `"true"` reads as light.
    pub fn from_stored(value: &str) -> Self {
        if value == "true" {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn stored_value(self) -> &'static str {
        match self {
            Theme::Dark => "true",
            Theme::Light => "false",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn body_has_light_class(self) -> bool {
        self == Theme::Light
    }

    /// Label of the toggle button: names the mode a click switches to.
    pub fn button_label(self) -> &'static str {
        match self {
            Theme::Dark => "☀️ Claro",
            Theme::Light => "🌙 Escuro",
        }
    }
}

/// Body classes and toggle button of one page
#[derive(Debug, Default, Clone)]
pub struct PageChrome {
    pub body_classes: Vec<String>,
    /// `None` when the page has no toggle button
    pub button_label: Option<String>,
}

impl PageChrome {
    pub fn with_button() -> Self {
        Self {
            body_classes: Vec::new(),
            button_label: Some(String::new()),
        }
    }

    pub fn has_light_class(&self) -> bool {
        self.body_classes.iter().any(|c| c == LIGHT_CLASS)
    }

    fn apply(&mut self, theme: Theme) {
        self.body_classes.retain(|c| c != LIGHT_CLASS);
        if theme.body_has_light_class() {
            self.body_classes.push(LIGHT_CLASS.to_string());
        }
        if let Some(label) = self.button_label.as_mut() {
            *label = theme.button_label().to_string();
        }
    }
}

/// Page load: apply the stored preference, defaulting to dark on the first visit.
pub fn on_load<S: PreferenceStore>(store: &mut S, page: &mut PageChrome) -> Theme {
    let theme = match store.get(STORAGE_KEY) {
        Some(value) => Theme::from_stored(&value),
        None => {
            store.set(STORAGE_KEY, Theme::Dark.stored_value());
            Theme::Dark
        }
    };
    page.apply(theme);
    theme
}

/// Toggle click. Pages without a button ignore the click.
pub fn toggle<S: PreferenceStore>(store: &mut S, page: &mut PageChrome) -> Option<Theme> {
    page.button_label.as_ref()?;

    let current = if page.has_light_class() {
        Theme::Light
    } else {
        Theme::Dark
    };
    let next = current.flipped();
    store.set(STORAGE_KEY, next.stored_value());
    page.apply(next);
    Some(next)
}
