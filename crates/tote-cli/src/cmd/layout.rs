//! `tote layout` — print the derived panel geometry for a viewport.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use tote_core::config::load_project_config;
use tote_core::layout::{LayoutGeometry, PanelMode, Viewport, derive_layout};
use tote_core::visibility::VisibilityState;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Viewport width in pixels.
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Derive the geometry with the cart panel open.
    #[arg(long)]
    pub open: bool,
}

pub fn run_layout(args: &LayoutArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    if args.width == 0 || args.height == 0 {
        bail!("viewport must be at least 1x1, got {}x{}", args.width, args.height);
    }

    let project = load_project_config(project_root)?;
    let state = if args.open {
        VisibilityState::Open
    } else {
        VisibilityState::Closed
    };
    let viewport = Viewport::new(args.width, args.height);
    let geometry = derive_layout(state, viewport, &project.layout);

    render_mode(
        output,
        &geometry,
        |g, w| render_text(g, viewport, w),
        |g, w| render_pretty(g, viewport, w),
    )
}

fn render_text(g: &LayoutGeometry, viewport: Viewport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "viewport width={} height={} class={:?} state={:?}",
        viewport.width, viewport.height, g.class, g.state
    )?;
    writeln!(
        w,
        "panel mode={:?} width_px={} slide_offset_px={} backdrop={}",
        g.panel.mode, g.panel.width_px, g.panel.slide_offset_px, g.panel.backdrop
    )?;
    writeln!(
        w,
        "content width_px={} max_width_px={} centered={} scrollable={} height_vh={}",
        g.content.width_px,
        optional(g.content.max_width_px),
        g.content.centered,
        g.content.scrollable,
        optional(g.content.height_vh)
    )?;
    writeln!(
        w,
        "navbar full_width={} search_visible={} trigger_visible={}",
        g.navbar.full_width, g.navbar.search_visible, g.navbar.trigger_visible
    )?;
    writeln!(w, "page scroll_locked={}", g.page_scroll_locked)
}

fn render_pretty(g: &LayoutGeometry, viewport: Viewport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Layout {}x{}", viewport.width, viewport.height))?;
    pretty_kv(w, "Viewport", format!("{:?}", g.class))?;
    pretty_kv(w, "Panel", format!("{:?}", g.state))?;
    let panel = match g.panel.mode {
        PanelMode::Hidden => "hidden".to_string(),
        PanelMode::Split => format!("{}px beside the content", g.panel.width_px),
        PanelMode::Overlay => format!("{}px fullscreen overlay", g.panel.width_px),
    };
    pretty_kv(w, "Panel mode", panel)?;
    pretty_kv(w, "Slides from", format!("{}px", g.panel.slide_offset_px))?;
    pretty_kv(w, "Backdrop", g.panel.backdrop.to_string())?;
    pretty_kv(
        w,
        "Content",
        format!(
            "{}px wide, max {}, height {}",
            g.content.width_px,
            g.content
                .max_width_px
                .map_or_else(|| "none".to_string(), |px| format!("{px}px")),
            g.content
                .height_vh
                .map_or_else(|| "auto".to_string(), |vh| format!("{vh}vh"))
        ),
    )?;
    pretty_kv(
        w,
        "Navbar",
        format!(
            "full_width={} search={} cart_button={}",
            g.navbar.full_width, g.navbar.search_visible, g.navbar.trigger_visible
        ),
    )?;
    pretty_kv(w, "Scroll lock", g.page_scroll_locked.to_string())
}

fn optional(value: Option<u32>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}
