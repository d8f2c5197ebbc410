//! Navigation highlighting and the mobile menu.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    pub label: String,
    /// Relative target as written in the page, e.g. `noticias.html`
    pub href: String,
}

impl NavLink {
    pub fn new(label: &str, href: &str) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
        }
    }
}

/// Index of the link to mark active for `path`.
///
/// Compares the last path segment with each href for exact equality. The
/// site root (empty last segment) maps to `home_href`.
pub fn active_link(path: &str, links: &[NavLink], home_href: &str) -> Option<usize> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let target = if segment.is_empty() { home_href } else { segment };

    links.iter().position(|link| link.href == target)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MobileMenu {
    pub open: bool,
}

impl MobileMenu {
    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    /// Following any link closes the menu.
    pub fn link_clicked(&mut self) {
        self.open = false;
    }
}
