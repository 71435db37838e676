//! Responsive layout derived from panel visibility and viewport size.
//!
//! [`derive_layout`] is a pure function: the same inputs always give the
//! same geometry, and the cart contents are never involved. A viewport
//! change while the panel is open simply re-derives.

use serde::{Deserialize, Serialize};

use crate::visibility::VisibilityState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Widths strictly below this are mobile.
    pub breakpoint_px: u32,
    pub panel_min_width_px: u32,
    pub panel_max_width_px: u32,
    /// Preferred desktop panel width as a share of the viewport.
    pub panel_width_percent: u32,
    /// Distance the desktop panel slides in from.
    pub desktop_slide_offset_px: u32,
    pub mobile_slide_offset_px: u32,
    /// Height of the scrollable content area next to the open panel.
    pub desktop_content_height_vh: u32,
    pub content_max_width_px: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            breakpoint_px: 768,
            panel_min_width_px: 300,
            panel_max_width_px: 500,
            panel_width_percent: 35,
            desktop_slide_offset_px: 500,
            mobile_slide_offset_px: 0,
            desktop_content_height_vh: 70,
            content_max_width_px: 1440,
        }
    }
}

impl LayoutConfig {
    #[must_use]
    pub const fn classify(&self, viewport: Viewport) -> ViewportClass {
        if viewport.width < self.breakpoint_px {
            ViewportClass::Mobile
        } else {
            ViewportClass::Desktop
        }
    }

    /// Desktop panel width for a viewport, clamped to the configured range.
    #[must_use]
    pub fn panel_width(&self, viewport: Viewport) -> u32 {
        let preferred = viewport.width.saturating_mul(self.panel_width_percent) / 100;
        let (low, high) = if self.panel_min_width_px <= self.panel_max_width_px {
            (self.panel_min_width_px, self.panel_max_width_px)
        } else {
            (self.panel_max_width_px, self.panel_min_width_px)
        };
        preferred.clamp(low, high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportClass {
    Mobile,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelMode {
    Hidden,
    /// Rendered alongside the content.
    Split,
    /// Fullscreen above the content.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentArea {
    pub width_px: u32,
    pub max_width_px: Option<u32>,
    pub centered: bool,
    pub scrollable: bool,
    /// Fixed viewport-relative height, when constrained.
    pub height_vh: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelGeometry {
    pub mode: PanelMode,
    pub width_px: u32,
    pub slide_offset_px: u32,
    pub backdrop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavbarLayout {
    pub full_width: bool,
    pub search_visible: bool,
    /// Inline cart trigger (badge button).
    pub trigger_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutGeometry {
    pub state: VisibilityState,
    pub class: ViewportClass,
    pub content: ContentArea,
    pub panel: PanelGeometry,
    pub navbar: NavbarLayout,
    pub page_scroll_locked: bool,
}

/// Geometry for one visibility state on one viewport.
#[must_use]
pub fn derive_layout(
    state: VisibilityState,
    viewport: Viewport,
    config: &LayoutConfig,
) -> LayoutGeometry {
    let class = config.classify(viewport);
    let slide_offset_px = match class {
        ViewportClass::Mobile => config.mobile_slide_offset_px,
        ViewportClass::Desktop => config.desktop_slide_offset_px,
    };

    match (state, class) {
        (VisibilityState::Closed, _) => LayoutGeometry {
            state,
            class,
            content: ContentArea {
                width_px: viewport.width,
                max_width_px: Some(config.content_max_width_px),
                centered: true,
                scrollable: true,
                height_vh: None,
            },
            panel: PanelGeometry {
                mode: PanelMode::Hidden,
                width_px: 0,
                slide_offset_px,
                backdrop: false,
            },
            navbar: NavbarLayout {
                full_width: false,
                search_visible: true,
                trigger_visible: true,
            },
            page_scroll_locked: false,
        },
        (VisibilityState::Open, ViewportClass::Desktop) => {
            let panel_width = config.panel_width(viewport);
            LayoutGeometry {
                state,
                class,
                content: ContentArea {
                    width_px: viewport.width.saturating_sub(panel_width),
                    max_width_px: None,
                    centered: false,
                    scrollable: true,
                    height_vh: Some(config.desktop_content_height_vh),
                },
                panel: PanelGeometry {
                    mode: PanelMode::Split,
                    width_px: panel_width,
                    slide_offset_px,
                    backdrop: false,
                },
                navbar: NavbarLayout {
                    full_width: true,
                    search_visible: false,
                    trigger_visible: false,
                },
                page_scroll_locked: false,
            }
        }
        (VisibilityState::Open, ViewportClass::Mobile) => LayoutGeometry {
            state,
            class,
            content: ContentArea {
                width_px: viewport.width,
                max_width_px: None,
                centered: true,
                scrollable: false,
                height_vh: None,
            },
            panel: PanelGeometry {
                mode: PanelMode::Overlay,
                width_px: viewport.width,
                slide_offset_px,
                backdrop: true,
            },
            navbar: NavbarLayout {
                full_width: true,
                search_visible: false,
                trigger_visible: false,
            },
            page_scroll_locked: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LayoutConfig {
        LayoutConfig::default()
    }

    #[test]
    fn breakpoint_is_exclusive_for_mobile() {
        let cfg = config();
        assert_eq!(cfg.classify(Viewport::new(767, 900)), ViewportClass::Mobile);
        assert_eq!(cfg.classify(Viewport::new(768, 900)), ViewportClass::Desktop);
    }

    #[test]
    fn closed_layout_is_full_width_with_inline_trigger() {
        let geo = derive_layout(VisibilityState::Closed, Viewport::new(1280, 800), &config());
        assert_eq!(geo.content.width_px, 1280);
        assert!(geo.content.centered);
        assert_eq!(geo.panel.mode, PanelMode::Hidden);
        assert!(geo.navbar.trigger_visible);
        assert!(geo.navbar.search_visible);
        assert!(!geo.page_scroll_locked);
    }

    #[test]
    fn open_desktop_splits_and_keeps_content_scrollable() {
        let geo = derive_layout(VisibilityState::Open, Viewport::new(1280, 800), &config());
        assert_eq!(geo.panel.mode, PanelMode::Split);
        assert_eq!(geo.panel.width_px, 448);
        assert_eq!(geo.content.width_px, 832);
        assert!(geo.content.scrollable);
        assert_eq!(geo.content.height_vh, Some(70));
        assert_eq!(geo.panel.slide_offset_px, 500);
        assert!(geo.navbar.full_width);
        assert!(!geo.navbar.search_visible);
        assert!(!geo.page_scroll_locked);
    }

    #[test]
    fn desktop_panel_width_is_clamped() {
        let cfg = config();
        assert_eq!(cfg.panel_width(Viewport::new(800, 600)), 300);
        assert_eq!(cfg.panel_width(Viewport::new(2560, 1440)), 500);
    }

    #[test]
    fn open_mobile_is_overlay_with_scroll_lock() {
        let geo = derive_layout(VisibilityState::Open, Viewport::new(390, 844), &config());
        assert_eq!(geo.panel.mode, PanelMode::Overlay);
        assert_eq!(geo.panel.width_px, 390);
        assert_eq!(geo.panel.slide_offset_px, 0);
        assert!(geo.panel.backdrop);
        assert!(geo.page_scroll_locked);
    }

    #[test]
    fn resize_while_open_rederives() {
        let cfg = config();
        let wide = derive_layout(VisibilityState::Open, Viewport::new(1280, 800), &cfg);
        let narrow = derive_layout(VisibilityState::Open, Viewport::new(500, 800), &cfg);
        assert_eq!(wide.state, narrow.state);
        assert_eq!(narrow.panel.mode, PanelMode::Overlay);
        let back = derive_layout(VisibilityState::Open, Viewport::new(1280, 800), &cfg);
        assert_eq!(wide, back);
    }
}
